//! Quote Collector - Fans a symbol out to every active exchange
//!
//! Each exchange is queried independently with its own timeout. Failures are
//! logged and reported to the status tracker; they never abort collection and
//! never surface as errors. The result may be empty.

use futures_util::{stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::timeout;

use crate::oracle::error::{SourceError, SourceResult};
use crate::oracle::sources::{ConnectorRegistry, ExchangeConnector};
use crate::oracle::{Quote, QuoteSet};
use crate::types::{normalize_symbol, ExchangeId, ExchangeStatus, MarketPair, MarketSet};

/// Sink for per-exchange health updates. Reports are advisory and
/// fire-and-forget; implementations must not block or fail loudly.
#[cfg_attr(test, mockall::automock)]
pub trait StatusReporter: Send + Sync {
    fn report(&self, exchange: ExchangeId, status: ExchangeStatus, detail: Option<String>);
}

struct ConnectorSlot {
    connector: Arc<dyn ExchangeConnector>,
    markets: OnceCell<MarketSet>,
}

/// Collects normalized quotes for a symbol from all active exchanges
pub struct QuoteCollector {
    slots: Vec<ConnectorSlot>,
    reporter: Arc<dyn StatusReporter>,
    fetch_timeout: Duration,
    max_concurrency: usize,
}

impl QuoteCollector {
    pub fn new(
        registry: &ConnectorRegistry,
        reporter: Arc<dyn StatusReporter>,
        fetch_timeout: Duration,
        max_concurrency: usize,
    ) -> Self {
        let slots = registry
            .connectors()
            .map(|connector| ConnectorSlot {
                connector: Arc::clone(connector),
                markets: OnceCell::new(),
            })
            .collect();

        Self {
            slots,
            reporter,
            fetch_timeout,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Exchanges that `collect` will query
    pub fn active_exchanges(&self) -> Vec<ExchangeId> {
        self.active_slots().map(|s| s.connector.id()).collect()
    }

    fn active_slots(&self) -> impl Iterator<Item = &ConnectorSlot> {
        self.slots.iter().filter(|s| s.connector.is_active())
    }

    /// Collect one quote per exchange that has a market for `symbol`
    pub async fn collect(&self, symbol: &str) -> QuoteSet {
        let symbol = normalize_symbol(symbol);
        let started = std::time::Instant::now();

        let quotes: Vec<Option<Quote>> = stream::iter(self.active_slots())
            .map(|slot| self.collect_one(slot, &symbol))
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        let set: QuoteSet = quotes.into_iter().flatten().collect();

        tracing::info!(
            symbol = %symbol,
            quotes = set.len(),
            queried = self.active_slots().count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "📊 Quote collection finished"
        );

        set
    }

    /// Load every active exchange's market list and return its size
    pub async fn probe(&self) -> Vec<(ExchangeId, SourceResult<usize>)> {
        stream::iter(self.active_slots())
            .map(|slot| async move {
                let id = slot.connector.id();
                let result = self.markets(slot).await.map(|m| m.len());
                (id, result)
            })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await
    }

    async fn collect_one(&self, slot: &ConnectorSlot, symbol: &str) -> Option<Quote> {
        let exchange = slot.connector.id();

        let markets = match self.markets(slot).await {
            Ok(markets) => markets,
            Err(_) => return None,
        };

        let pair = match MarketPair::resolve(symbol, markets) {
            Some(pair) => pair,
            None => {
                tracing::debug!(exchange = %exchange, symbol = %symbol, "Symbol not listed");
                return None;
            }
        };

        let result = match timeout(self.fetch_timeout, slot.connector.fetch_ticker(&pair)).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::Timeout(self.fetch_timeout.as_millis() as u64)),
        };

        match result {
            Ok(mut quote) => {
                quote.exchange = exchange;
                self.reporter
                    .report(exchange, ExchangeStatus::Operational, None);
                tracing::debug!(
                    exchange = %exchange,
                    pair = %pair,
                    price = ?quote.price,
                    volume = ?quote.volume_24h,
                    "Ticker fetched"
                );
                Some(quote)
            }
            Err(e) => {
                tracing::warn!(exchange = %exchange, pair = %pair, error = %e, "Ticker fetch failed");
                self.reporter
                    .report(exchange, ExchangeStatus::Degraded, Some(e.to_string()));
                None
            }
        }
    }

    /// Cached market list; a failed load is retried on the next call
    async fn markets<'a>(&self, slot: &'a ConnectorSlot) -> SourceResult<&'a MarketSet> {
        let exchange = slot.connector.id();
        let fetch_timeout = self.fetch_timeout;

        let result = slot
            .markets
            .get_or_try_init(|| async move {
                let markets = match timeout(fetch_timeout, slot.connector.load_markets()).await {
                    Ok(result) => result?,
                    Err(_) => return Err(SourceError::Timeout(fetch_timeout.as_millis() as u64)),
                };
                tracing::info!(exchange = %exchange, markets = markets.len(), "📥 Markets loaded");
                Ok::<_, SourceError>(markets)
            })
            .await;

        if let Err(e) = &result {
            tracing::warn!(exchange = %exchange, error = %e, "Failed to load markets");
            self.reporter
                .report(exchange, ExchangeStatus::Offline, Some(e.to_string()));
        }

        result
    }
}
