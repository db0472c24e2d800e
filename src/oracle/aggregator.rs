//! Price Aggregator - Reconciles per-exchange quotes into one price
//!
//! Computes simple average, VWAP, median, min/max, spread and a 0-100
//! confidence score from a set of exchange quotes. Pure: no I/O, no state
//! beyond the configured confidence weights.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::oracle::{AggregationError, Quote, QuoteSet};

const PRICE_DP: u32 = 8;
const VOLUME_DP: u32 = 8;
const SPREAD_DP: u32 = 4;
const CONFIDENCE_DP: u32 = 2;

/// Reconciled price for one symbol at one point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedPrice {
    pub price_simple_avg: f64,
    /// None when the usable quotes report no volume at all
    pub price_vwap: Option<f64>,
    pub price_median: f64,
    pub price_min: f64,
    pub price_max: f64,
    pub price_spread_percent: f64,
    pub total_volume_24h: f64,
    pub exchange_count: usize,
    pub confidence_score: f64,
}

impl AggregatedPrice {
    /// VWAP when defined, otherwise the simple average
    pub fn display_price(&self) -> f64 {
        self.price_vwap.unwrap_or(self.price_simple_avg)
    }
}

/// Weights of the three confidence components. Defaults give 30/40/30
/// points with ten expected exchanges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceWeights {
    /// Maximum points for exchange coverage
    pub coverage: f64,
    /// Exchange count that earns full coverage points
    pub expected_exchanges: f64,
    /// Maximum points for price consistency
    pub consistency: f64,
    /// Maximum points for volume distribution
    pub volume_distribution: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            coverage: 30.0,
            expected_exchanges: 10.0,
            consistency: 40.0,
            volume_distribution: 30.0,
        }
    }
}

/// The three independently capped parts of the confidence score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceBreakdown {
    pub coverage: f64,
    pub consistency: f64,
    pub volume_distribution: f64,
}

impl ConfidenceBreakdown {
    /// Sum of the components, clamped to [0, 100]
    pub fn total(&self) -> f64 {
        (self.coverage + self.consistency + self.volume_distribution).clamp(0.0, 100.0)
    }
}

/// Stateless price aggregator
#[derive(Debug, Clone, Default)]
pub struct PriceAggregator {
    weights: ConfidenceWeights,
}

impl PriceAggregator {
    pub fn new(weights: ConfidenceWeights) -> Self {
        Self { weights }
    }

    /// Aggregate a quote set
    pub fn aggregate(&self, quotes: &QuoteSet) -> Result<AggregatedPrice, AggregationError> {
        self.aggregate_quotes(quotes.iter())
    }

    /// Aggregate any collection of quotes. Unusable quotes are dropped first;
    /// the rest are put in a canonical order so the floating-point reductions
    /// below do not depend on iteration order.
    pub fn aggregate_quotes<'a, I>(&self, quotes: I) -> Result<AggregatedPrice, AggregationError>
    where
        I: IntoIterator<Item = &'a Quote>,
    {
        let mut usable: Vec<(f64, f64, &Quote)> = quotes
            .into_iter()
            .filter(|q| q.is_usable())
            .filter_map(|q| q.price.map(|p| (p, q.volume_24h.unwrap_or(0.0), q)))
            .collect();

        if usable.is_empty() {
            return Err(AggregationError::NoUsableQuotes);
        }

        usable.sort_by(|a, b| {
            a.0.total_cmp(&b.0)
                .then_with(|| a.2.exchange.cmp(&b.2.exchange))
                .then_with(|| a.1.total_cmp(&b.1))
        });

        let prices: Vec<f64> = usable.iter().map(|(p, _, _)| *p).collect();
        let volumes: Vec<f64> = usable.iter().map(|(_, v, _)| *v).collect();
        let count = prices.len();

        let simple_avg = prices.iter().sum::<f64>() / count as f64;
        let median = Self::median(&prices);
        let min = prices[0];
        let max = prices[count - 1];
        let spread = (max - min) / min * 100.0;

        let total_volume: f64 = volumes.iter().sum();
        let vwap = if total_volume > 0.0 {
            let weighted: f64 = usable
                .iter()
                .filter(|(_, _, q)| q.volume_24h.is_some())
                .map(|(p, v, _)| p * v)
                .sum();
            Some(weighted / total_volume)
        } else {
            None
        };

        let confidence = self.confidence(&prices, &volumes);

        tracing::debug!(
            exchanges = count,
            simple_avg,
            vwap = ?vwap,
            spread_pct = spread,
            coverage = confidence.coverage,
            consistency = confidence.consistency,
            volume_distribution = confidence.volume_distribution,
            "Aggregated quotes"
        );

        Ok(AggregatedPrice {
            price_simple_avg: round_dp(simple_avg, PRICE_DP),
            price_vwap: vwap.map(|v| round_dp(v, PRICE_DP)),
            price_median: round_dp(median, PRICE_DP),
            price_min: round_dp(min, PRICE_DP),
            price_max: round_dp(max, PRICE_DP),
            price_spread_percent: round_dp(spread, SPREAD_DP),
            total_volume_24h: round_dp(total_volume, VOLUME_DP),
            exchange_count: count,
            confidence_score: round_dp(confidence.total(), CONFIDENCE_DP),
        })
    }

    /// Score components for a non-empty list of prices and their volumes
    pub fn confidence(&self, prices: &[f64], volumes: &[f64]) -> ConfidenceBreakdown {
        let w = &self.weights;
        if prices.is_empty() {
            return ConfidenceBreakdown {
                coverage: 0.0,
                consistency: 0.0,
                volume_distribution: 0.0,
            };
        }

        let count = prices.len() as f64;
        let coverage = if w.expected_exchanges > 0.0 {
            (count / w.expected_exchanges * w.coverage).min(w.coverage)
        } else {
            w.coverage
        };

        let mean = prices.iter().sum::<f64>() / count;
        let variance = prices.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / count;
        let coefficient_of_variation = variance.sqrt() / mean * 100.0;
        let consistency = (w.consistency - coefficient_of_variation).max(0.0);

        let total_volume: f64 = volumes.iter().sum();
        let volume_distribution = if total_volume > 0.0 {
            let max_volume = volumes.iter().cloned().fold(0.0, f64::max);
            (1.0 - max_volume / total_volume) * w.volume_distribution
        } else {
            0.0
        };

        ConfidenceBreakdown {
            coverage,
            consistency,
            volume_distribution,
        }
    }

    /// Median of an ascending list
    fn median(sorted: &[f64]) -> f64 {
        let n = sorted.len();
        if n % 2 == 0 {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        } else {
            sorted[n / 2]
        }
    }
}

/// Round half away from zero to `dp` decimal places
pub(crate) fn round_dp(value: f64, dp: u32) -> f64 {
    Decimal::from_f64(value)
        .map(|d| d.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|d| d.to_f64())
        .unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExchangeId;
    use chrono::Utc;
    use rand::seq::SliceRandom;

    fn make_quote(exchange: ExchangeId, price: Option<f64>, volume: Option<f64>) -> Quote {
        Quote {
            volume_24h: volume,
            ..Quote::with_price(exchange, price, Utc::now())
        }
    }

    fn three_exchange_set() -> QuoteSet {
        vec![
            make_quote(ExchangeId::Binance, Some(50000.0), Some(100.0)),
            make_quote(ExchangeId::Kraken, Some(50200.0), Some(50.0)),
            make_quote(ExchangeId::Coinbase, Some(49800.0), Some(150.0)),
        ]
        .into_iter()
        .collect()
    }

    fn assert_close(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected} ± {tol}, got {actual}"
        );
    }

    #[test]
    fn test_three_exchange_scenario() {
        let result = PriceAggregator::default()
            .aggregate(&three_exchange_set())
            .unwrap();

        assert_eq!(result.price_simple_avg, 50000.0);
        assert_eq!(result.price_median, 50000.0);
        assert_eq!(result.price_min, 49800.0);
        assert_eq!(result.price_max, 50200.0);
        assert_eq!(result.price_spread_percent, 0.8032);
        assert_eq!(result.total_volume_24h, 300.0);
        assert_eq!(result.exchange_count, 3);
        // (50000*100 + 50200*50 + 49800*150) / 300
        assert_close(result.price_vwap.unwrap(), 49933.33333333, 1e-8);
    }

    #[test]
    fn test_three_exchange_confidence() {
        let result = PriceAggregator::default()
            .aggregate(&three_exchange_set())
            .unwrap();

        // coverage 9 + consistency (40 - 0.3266) + volume (1 - 150/300) * 30
        assert_close(result.confidence_score, 63.67, 1e-9);
    }

    #[test]
    fn test_single_exchange_zero_volume() {
        let set: QuoteSet = vec![make_quote(ExchangeId::Binance, Some(100.0), Some(0.0))]
            .into_iter()
            .collect();

        let result = PriceAggregator::default().aggregate(&set).unwrap();
        assert_eq!(result.price_vwap, None);
        assert_eq!(result.price_simple_avg, 100.0);
        assert_eq!(result.price_median, 100.0);
        assert_eq!(result.price_min, 100.0);
        assert_eq!(result.price_max, 100.0);
        assert_eq!(result.price_spread_percent, 0.0);
        assert_eq!(result.exchange_count, 1);
        assert_eq!(result.display_price(), 100.0);
    }

    #[test]
    fn test_absent_price_fails() {
        let set: QuoteSet = vec![make_quote(ExchangeId::Okx, None, Some(10.0))]
            .into_iter()
            .collect();

        let err = PriceAggregator::default().aggregate(&set).unwrap_err();
        assert_eq!(err, AggregationError::NoUsableQuotes);
    }

    #[test]
    fn test_empty_set_fails() {
        let err = PriceAggregator::default()
            .aggregate(&QuoteSet::new())
            .unwrap_err();
        assert_eq!(err, AggregationError::NoUsableQuotes);
    }

    #[test]
    fn test_zero_and_negative_prices_fail() {
        let set: QuoteSet = vec![
            make_quote(ExchangeId::Binance, Some(0.0), Some(1.0)),
            make_quote(ExchangeId::Bybit, Some(-3.0), Some(1.0)),
            make_quote(ExchangeId::Gate, Some(f64::NAN), None),
        ]
        .into_iter()
        .collect();

        assert!(PriceAggregator::default().aggregate(&set).is_err());
    }

    #[test]
    fn test_malformed_quotes_are_filtered_not_fatal() {
        let set: QuoteSet = vec![
            make_quote(ExchangeId::Binance, Some(200.0), Some(10.0)),
            make_quote(ExchangeId::Bybit, Some(999.0), Some(-10.0)),
            make_quote(ExchangeId::Gate, None, Some(5.0)),
        ]
        .into_iter()
        .collect();

        let result = PriceAggregator::default().aggregate(&set).unwrap();
        assert_eq!(result.exchange_count, 1);
        assert_eq!(result.price_simple_avg, 200.0);
        assert_eq!(result.total_volume_24h, 10.0);
    }

    #[test]
    fn test_even_count_median_averages_middle_values() {
        let set: QuoteSet = vec![
            make_quote(ExchangeId::Binance, Some(10.0), None),
            make_quote(ExchangeId::Bybit, Some(40.0), None),
            make_quote(ExchangeId::Okx, Some(20.0), None),
            make_quote(ExchangeId::Gate, Some(30.0), None),
        ]
        .into_iter()
        .collect();

        let result = PriceAggregator::default().aggregate(&set).unwrap();
        assert_eq!(result.price_median, 25.0);
        assert_eq!(result.price_vwap, None);
    }

    #[test]
    fn test_vwap_ignores_quotes_without_volume() {
        let set: QuoteSet = vec![
            make_quote(ExchangeId::Binance, Some(100.0), Some(3.0)),
            make_quote(ExchangeId::Bybit, Some(200.0), None),
            make_quote(ExchangeId::Okx, Some(300.0), Some(1.0)),
        ]
        .into_iter()
        .collect();

        let result = PriceAggregator::default().aggregate(&set).unwrap();
        assert_eq!(result.price_vwap, Some(150.0));
        assert_eq!(result.exchange_count, 3);
        assert_eq!(result.price_simple_avg, 200.0);
    }

    #[test]
    fn test_concentrated_volume_blends_both_signals() {
        let aggregator = PriceAggregator::default();
        let prices = [1000.0, 1000.0];
        let volumes = [1_000_000.0, 1.0];

        let breakdown = aggregator.confidence(&prices, &volumes);
        assert_eq!(breakdown.consistency, 40.0);
        assert!(breakdown.volume_distribution < 0.001);
        assert_close(breakdown.coverage, 6.0, 1e-12);

        let set: QuoteSet = vec![
            make_quote(ExchangeId::Binance, Some(1000.0), Some(1_000_000.0)),
            make_quote(ExchangeId::Bitstamp, Some(1000.0), Some(1.0)),
        ]
        .into_iter()
        .collect();
        let result = aggregator.aggregate(&set).unwrap();
        // Neither the perfect agreement nor the concentration alone
        assert_eq!(result.confidence_score, 46.0);
    }

    #[test]
    fn test_wild_disagreement_floors_consistency() {
        let aggregator = PriceAggregator::default();
        let breakdown = aggregator.confidence(&[1.0, 1000.0, 5.0], &[0.0, 0.0, 0.0]);
        assert_eq!(breakdown.consistency, 0.0);
        assert_eq!(breakdown.volume_distribution, 0.0);
        assert!(breakdown.total() >= 0.0);
    }

    #[test]
    fn test_coverage_caps_at_weight() {
        let aggregator = PriceAggregator::default();
        let prices = vec![10.0; 25];
        let volumes = vec![1.0; 25];
        let breakdown = aggregator.confidence(&prices, &volumes);
        assert_eq!(breakdown.coverage, 30.0);
        assert!(breakdown.total() <= 100.0);
    }

    #[test]
    fn test_custom_weights_are_respected() {
        let aggregator = PriceAggregator::new(ConfidenceWeights {
            coverage: 50.0,
            expected_exchanges: 2.0,
            consistency: 50.0,
            volume_distribution: 0.0,
        });
        let breakdown = aggregator.confidence(&[10.0, 10.0], &[5.0, 5.0]);
        assert_eq!(breakdown.coverage, 50.0);
        assert_eq!(breakdown.consistency, 50.0);
        assert_eq!(breakdown.volume_distribution, 0.0);
        assert_eq!(breakdown.total(), 100.0);
    }

    #[test]
    fn test_oversized_weights_are_clamped() {
        let aggregator = PriceAggregator::new(ConfidenceWeights {
            coverage: 80.0,
            expected_exchanges: 1.0,
            consistency: 80.0,
            volume_distribution: 80.0,
        });
        let set: QuoteSet = vec![
            make_quote(ExchangeId::Binance, Some(10.0), Some(1.0)),
            make_quote(ExchangeId::Okx, Some(10.0), Some(1.0)),
        ]
        .into_iter()
        .collect();
        assert_eq!(aggregator.aggregate(&set).unwrap().confidence_score, 100.0);
    }

    #[test]
    fn test_permutation_invariance() {
        let aggregator = PriceAggregator::default();
        let mut quotes = vec![
            make_quote(ExchangeId::Binance, Some(0.1 + 0.2), Some(1234.5678)),
            make_quote(ExchangeId::Coinbase, Some(0.3), Some(0.1)),
            make_quote(ExchangeId::Kraken, Some(0.30000001), Some(98765.4321)),
            make_quote(ExchangeId::Kucoin, Some(0.29999), None),
            make_quote(ExchangeId::Bybit, Some(0.31), Some(3.3)),
            make_quote(ExchangeId::Okx, None, Some(7.0)),
            make_quote(ExchangeId::Gate, Some(0.2999999), Some(1e-9)),
        ];

        let baseline = aggregator.aggregate_quotes(quotes.iter()).unwrap();
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            quotes.shuffle(&mut rng);
            let shuffled = aggregator.aggregate_quotes(quotes.iter()).unwrap();
            assert_eq!(shuffled, baseline);

            let as_set: QuoteSet = quotes.iter().cloned().collect();
            assert_eq!(aggregator.aggregate(&as_set).unwrap(), baseline);
        }
    }

    #[test]
    fn test_ordering_and_score_bounds_hold_for_random_inputs() {
        let aggregator = PriceAggregator::default();
        let mut rng = rand::thread_rng();

        for _ in 0..200 {
            let quotes: Vec<Quote> = ExchangeId::ALL
                .iter()
                .map(|&id| {
                    let price = rand::Rng::gen_range(&mut rng, 0.0001..1_000_000.0);
                    let volume = rand::Rng::gen_range(&mut rng, 0.0..1e9);
                    make_quote(id, Some(price), Some(volume))
                })
                .collect();
            let count = rand::Rng::gen_range(&mut rng, 1..=quotes.len());

            let result = aggregator.aggregate_quotes(quotes[..count].iter()).unwrap();
            assert!(result.price_min <= result.price_median);
            assert!(result.price_median <= result.price_max);
            assert!(result.price_spread_percent >= 0.0);
            assert!((0.0..=100.0).contains(&result.confidence_score));
            assert_eq!(result.exchange_count, count);
        }
    }

    #[test]
    fn test_round_dp_half_away_from_zero() {
        assert_eq!(round_dp(0.125, 2), 0.13);
        assert_eq!(round_dp(-0.125, 2), -0.13);
        assert_eq!(round_dp(49933.333333333336, 8), 49933.33333333);
    }
}
