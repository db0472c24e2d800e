//! Exchange connectors (Binance, Coinbase, Kraken, KuCoin, Bybit, OKX, Gate,
//! Bitfinex, Huobi, Bitstamp)
//!
//! Every exchange is a typed REST client behind [`ExchangeConnector`]. The
//! set of connectors is fixed at compile time and resolved from config once,
//! at startup, by [`ConnectorRegistry`].

mod binance;
mod bitfinex;
mod bitstamp;
mod bybit;
mod coinbase;
mod gate;
mod http;
mod huobi;
mod kraken;
mod kucoin;
mod okx;

pub use binance::BinanceClient;
pub use bitfinex::BitfinexClient;
pub use bitstamp::BitstampClient;
pub use bybit::BybitClient;
pub use coinbase::CoinbaseClient;
pub use gate::GateClient;
pub use http::{HttpSource, SourceSettings};
pub use huobi::HuobiClient;
pub use kraken::KrakenClient;
pub use kucoin::KucoinClient;
pub use okx::OkxClient;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::oracle::error::SourceResult;
use crate::oracle::Quote;
use crate::types::{ExchangeId, MarketPair, MarketSet};

/// Capability every exchange connector provides
#[async_trait]
pub trait ExchangeConnector: Send + Sync {
    /// Exchange this connector talks to
    fn id(&self) -> ExchangeId;

    /// Whether the exchange is enabled for collection
    fn is_active(&self) -> bool;

    /// Load the spot markets listed by the exchange
    async fn load_markets(&self) -> SourceResult<MarketSet>;

    /// Fetch a normalized 24h ticker for one market
    async fn fetch_ticker(&self, pair: &MarketPair) -> SourceResult<Quote>;
}

/// Connectors for every supported exchange, keyed by id
pub struct ConnectorRegistry {
    connectors: BTreeMap<ExchangeId, Arc<dyn ExchangeConnector>>,
}

impl ConnectorRegistry {
    /// Build one connector per supported exchange. Exchanges listed in
    /// `enabled` are active; the rest are built but skipped by collection.
    pub fn new(enabled: &[ExchangeId], settings: &SourceSettings) -> SourceResult<Self> {
        let enabled: HashSet<ExchangeId> = enabled.iter().copied().collect();
        let mut connectors = BTreeMap::new();

        for id in ExchangeId::ALL {
            let active = enabled.contains(&id);
            let connector = build_connector(id, settings, active)?;
            connectors.insert(id, connector);
        }

        tracing::info!(
            active = ?enabled,
            total = connectors.len(),
            "📡 Exchange connectors resolved"
        );

        Ok(Self { connectors })
    }

    /// Registry over an explicit set of connectors
    pub fn from_connectors(connectors: Vec<Arc<dyn ExchangeConnector>>) -> Self {
        Self {
            connectors: connectors.into_iter().map(|c| (c.id(), c)).collect(),
        }
    }

    pub fn get(&self, id: ExchangeId) -> Option<Arc<dyn ExchangeConnector>> {
        self.connectors.get(&id).cloned()
    }

    pub fn connectors(&self) -> impl Iterator<Item = &Arc<dyn ExchangeConnector>> {
        self.connectors.values()
    }

    pub fn active(&self) -> Vec<ExchangeId> {
        self.connectors
            .values()
            .filter(|c| c.is_active())
            .map(|c| c.id())
            .collect()
    }
}

fn build_connector(
    id: ExchangeId,
    settings: &SourceSettings,
    active: bool,
) -> SourceResult<Arc<dyn ExchangeConnector>> {
    let http = HttpSource::new(id, settings)?;
    let connector: Arc<dyn ExchangeConnector> = match id {
        ExchangeId::Binance => Arc::new(BinanceClient::new(http, active)),
        ExchangeId::Coinbase => Arc::new(CoinbaseClient::new(http, active)),
        ExchangeId::Kraken => Arc::new(KrakenClient::new(http, active)),
        ExchangeId::Kucoin => Arc::new(KucoinClient::new(http, active)),
        ExchangeId::Bybit => Arc::new(BybitClient::new(http, active)),
        ExchangeId::Okx => Arc::new(OkxClient::new(http, active)),
        ExchangeId::Gate => Arc::new(GateClient::new(http, active)),
        ExchangeId::Bitfinex => Arc::new(BitfinexClient::new(http, active)),
        ExchangeId::Huobi => Arc::new(HuobiClient::new(http, active)),
        ExchangeId::Bitstamp => Arc::new(BitstampClient::new(http, active)),
    };
    Ok(connector)
}

/// Numeric field that may arrive as a JSON number or a numeric string.
/// Non-numeric and non-finite values read as absent.
pub(crate) fn num(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// Prefer the exchange's quote-currency volume; otherwise convert base volume
/// with the last price.
pub(crate) fn quote_volume(
    quote_vol: Option<f64>,
    base_vol: Option<f64>,
    last: Option<f64>,
) -> Option<f64> {
    quote_vol.or_else(|| match (base_vol, last) {
        (Some(v), Some(p)) => Some(v * p),
        _ => None,
    })
}

/// 24h change in percent from open and last
pub(crate) fn change_percent(open: Option<f64>, last: Option<f64>) -> Option<f64> {
    match (open, last) {
        (Some(o), Some(l)) if o > 0.0 => Some((l - o) / o * 100.0),
        _ => None,
    }
}

/// Epoch timestamp to UTC; accepts seconds or milliseconds, falls back to now
/// for missing, non-positive or out-of-range values
pub(crate) fn epoch_to_utc(ts: Option<i64>) -> DateTime<Utc> {
    ts.filter(|t| *t > 0)
        .and_then(|t| {
            let millis = if t < 10_000_000_000 {
                t.checked_mul(1000)?
            } else {
                t
            };
            Utc.timestamp_millis_opt(millis).single()
        })
        .unwrap_or_else(Utc::now)
}

/// Integer timestamp that may be a JSON number or a numeric string
pub(crate) fn int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .ok()
            .or_else(|| s.trim().parse::<f64>().ok().map(|f| f as i64)),
        _ => None,
    }
}
