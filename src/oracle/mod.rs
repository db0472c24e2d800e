//! Oracle module - Multi-exchange price reconciliation
//!
//! Collects ticker snapshots from up to ten exchanges and reconciles them
//! into a single aggregate price with a confidence score.

mod aggregator;
mod collector;
mod error;
pub mod sources;

pub use aggregator::{AggregatedPrice, ConfidenceBreakdown, ConfidenceWeights, PriceAggregator};
pub use collector::{QuoteCollector, StatusReporter};
pub use error::{AggregationError, SourceError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::ExchangeId;

/// One exchange's ticker snapshot for a symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub exchange: ExchangeId,
    pub price: Option<f64>,
    /// 24h volume in quote currency
    pub volume_24h: Option<f64>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub high_24h: Option<f64>,
    pub low_24h: Option<f64>,
    pub change_24h_percent: Option<f64>,
    pub observed_at: DateTime<Utc>,
}

impl Quote {
    /// Quote carrying only a last price; the remaining fields are empty
    pub fn with_price(exchange: ExchangeId, price: Option<f64>, observed_at: DateTime<Utc>) -> Self {
        Self {
            exchange,
            price,
            volume_24h: None,
            bid: None,
            ask: None,
            high_24h: None,
            low_24h: None,
            change_24h_percent: None,
            observed_at,
        }
    }

    /// Usable for aggregation: positive finite price and, if reported,
    /// a finite non-negative volume
    pub fn is_usable(&self) -> bool {
        let price_ok = matches!(self.price, Some(p) if p.is_finite() && p > 0.0);
        let volume_ok = match self.volume_24h {
            Some(v) => v.is_finite() && v >= 0.0,
            None => true,
        };
        price_ok && volume_ok
    }
}

/// Quotes gathered across exchanges for one aggregation run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuoteSet {
    quotes: HashMap<ExchangeId, Quote>,
}

impl QuoteSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a quote keyed by its exchange, replacing any previous one
    pub fn insert(&mut self, quote: Quote) -> Option<Quote> {
        self.quotes.insert(quote.exchange, quote)
    }

    pub fn get(&self, exchange: ExchangeId) -> Option<&Quote> {
        self.quotes.get(&exchange)
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Quote> {
        self.quotes.values()
    }

    pub fn exchanges(&self) -> Vec<ExchangeId> {
        let mut ids: Vec<ExchangeId> = self.quotes.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Subset of quotes that survive the aggregation filter
    pub fn usable(&self) -> QuoteSet {
        self.iter().filter(|q| q.is_usable()).cloned().collect()
    }
}

impl FromIterator<Quote> for QuoteSet {
    fn from_iter<I: IntoIterator<Item = Quote>>(iter: I) -> Self {
        let mut set = QuoteSet::new();
        for quote in iter {
            set.insert(quote);
        }
        set
    }
}

impl<'a> IntoIterator for &'a QuoteSet {
    type Item = &'a Quote;
    type IntoIter = std::collections::hash_map::Values<'a, ExchangeId, Quote>;

    fn into_iter(self) -> Self::IntoIter {
        self.quotes.values()
    }
}
