//! Pricing service
//!
//! Runs collect -> aggregate -> persist for one symbol. A recent enough stored
//! snapshot is served without touching the exchanges; when no exchange yields
//! a usable quote the last stored snapshot is returned and marked stale.

use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::oracle::{AggregationError, PriceAggregator, QuoteCollector, QuoteSet};
use crate::persistence::{AggregateSnapshot, PriceStore, RawPriceRecord};
use crate::types::normalize_symbol;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    InsufficientData(#[from] AggregationError),

    #[error("persistence is disabled")]
    PersistenceDisabled,

    #[error("storage error: {0:#}")]
    Storage(anyhow::Error),
}

/// Where a reported price came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceOrigin {
    /// Aggregated from quotes collected by this call
    Fresh,
    /// Stored snapshot within the freshness window
    Cached,
    /// Stored snapshot returned because no exchange had usable data
    Stale,
}

#[derive(Debug, Clone, Serialize)]
pub struct PriceReport {
    pub symbol: String,
    pub origin: PriceOrigin,
    pub snapshot: AggregateSnapshot,
    /// Quotes collected by this call; empty for cached reports
    pub exchanges: QuoteSet,
}

pub struct PricingService {
    collector: QuoteCollector,
    aggregator: PriceAggregator,
    store: Option<Arc<dyn PriceStore>>,
    freshness: Duration,
}

impl PricingService {
    pub fn new(
        collector: QuoteCollector,
        aggregator: PriceAggregator,
        store: Option<Arc<dyn PriceStore>>,
        freshness: Duration,
    ) -> Self {
        Self {
            collector,
            aggregator,
            store,
            freshness,
        }
    }

    pub fn collector(&self) -> &QuoteCollector {
        &self.collector
    }

    /// Price `symbol`, preferring a fresh stored snapshot, then live quotes,
    /// then a stale snapshot
    pub async fn price(&self, symbol: &str) -> Result<PriceReport, ServiceError> {
        let symbol = normalize_symbol(symbol);
        let now = Utc::now();

        let stored = self.latest_best_effort(&symbol).await;
        if let Some(snapshot) = stored.as_ref().filter(|s| self.is_fresh(s, now)) {
            debug!(symbol = %symbol, run_id = %snapshot.run_id, "Serving cached snapshot");
            return Ok(PriceReport {
                symbol,
                origin: PriceOrigin::Cached,
                snapshot: snapshot.clone(),
                exchanges: QuoteSet::new(),
            });
        }

        let quotes = self.collector.collect(&symbol).await;

        match self.aggregator.aggregate(&quotes) {
            Ok(aggregated) => {
                let snapshot = AggregateSnapshot {
                    run_id: Uuid::new_v4(),
                    symbol: symbol.clone(),
                    // Stored with millisecond precision
                    timestamp: Utc::now().trunc_subsecs(3),
                    aggregated,
                };
                self.persist(&snapshot, &quotes).await;

                info!(
                    symbol = %symbol,
                    price = snapshot.aggregated.display_price(),
                    exchanges = snapshot.aggregated.exchange_count,
                    confidence = snapshot.aggregated.confidence_score,
                    "✅ Price aggregated"
                );

                Ok(PriceReport {
                    symbol,
                    origin: PriceOrigin::Fresh,
                    snapshot,
                    exchanges: quotes,
                })
            }
            Err(e) => match stored {
                Some(snapshot) => {
                    warn!(
                        symbol = %symbol,
                        as_of = %snapshot.timestamp,
                        "⚠️ No usable quotes, serving stale snapshot"
                    );
                    Ok(PriceReport {
                        symbol,
                        origin: PriceOrigin::Stale,
                        snapshot,
                        exchanges: quotes,
                    })
                }
                None => {
                    warn!(symbol = %symbol, queried = quotes.len(), "No usable quotes");
                    Err(e.into())
                }
            },
        }
    }

    /// Latest stored snapshot for `symbol`
    pub async fn latest(&self, symbol: &str) -> Result<Option<AggregateSnapshot>, ServiceError> {
        self.store()?
            .fetch_latest_aggregate(&normalize_symbol(symbol))
            .await
            .map_err(ServiceError::Storage)
    }

    /// Stored snapshots for `symbol`, newest first
    pub async fn history(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<AggregateSnapshot>, ServiceError> {
        self.store()?
            .fetch_aggregate_history(&normalize_symbol(symbol), limit)
            .await
            .map_err(ServiceError::Storage)
    }

    /// Raw per-exchange rows for `symbol` in a time window
    pub async fn raw_quotes(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RawPriceRecord>, ServiceError> {
        self.store()?
            .fetch_raw_range(&normalize_symbol(symbol), from, to)
            .await
            .map_err(ServiceError::Storage)
    }

    fn store(&self) -> Result<&Arc<dyn PriceStore>, ServiceError> {
        self.store.as_ref().ok_or(ServiceError::PersistenceDisabled)
    }

    fn is_fresh(&self, snapshot: &AggregateSnapshot, now: DateTime<Utc>) -> bool {
        if self.freshness.is_zero() {
            return false;
        }
        match (now - snapshot.timestamp).to_std() {
            Ok(age) => age < self.freshness,
            // Timestamped in the future: the clock stepped back, so the age is unknown
            Err(_) => false,
        }
    }

    async fn latest_best_effort(&self, symbol: &str) -> Option<AggregateSnapshot> {
        let store = self.store.as_ref()?;
        match store.fetch_latest_aggregate(symbol).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(symbol, error = %e, "Failed to read stored snapshot");
                None
            }
        }
    }

    async fn persist(&self, snapshot: &AggregateSnapshot, quotes: &QuoteSet) {
        let Some(store) = &self.store else {
            return;
        };

        if let Err(e) = store
            .store_raw_quotes(snapshot.run_id, &snapshot.symbol, quotes)
            .await
        {
            warn!(symbol = %snapshot.symbol, error = %e, "Failed to store raw quotes");
        }
        if let Err(e) = store.store_aggregate(snapshot).await {
            warn!(symbol = %snapshot.symbol, error = %e, "Failed to store aggregate snapshot");
        }
    }
}
