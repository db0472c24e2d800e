//! Continuous collection loop
//!
//! Prices every configured symbol once per interval until shutdown.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::service::{PriceOrigin, PricingService};

/// Outcome of one pass over the symbol list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoundSummary {
    pub succeeded: usize,
    pub failed: usize,
    /// Symbols answered from a stored snapshot instead of live quotes
    pub stale: usize,
    pub total_volume: f64,
    pub elapsed: Duration,
}

pub struct CollectionRunner {
    service: Arc<PricingService>,
    symbols: Vec<String>,
    interval: Duration,
}

impl CollectionRunner {
    pub fn new(service: Arc<PricingService>, symbols: Vec<String>, interval: Duration) -> Self {
        Self {
            service,
            symbols,
            interval,
        }
    }

    /// Price every symbol once
    pub async fn run_once(&self) -> RoundSummary {
        let started = Instant::now();
        let mut summary = RoundSummary::default();

        for symbol in &self.symbols {
            match self.service.price(symbol).await {
                Ok(report) => {
                    if report.origin == PriceOrigin::Stale {
                        summary.stale += 1;
                    }
                    summary.succeeded += 1;
                    summary.total_volume += report.snapshot.aggregated.total_volume_24h;
                }
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "Pricing failed");
                    summary.failed += 1;
                }
            }
        }

        summary.elapsed = started.elapsed();
        summary
    }

    /// Run rounds on a fixed interval until `shutdown` resolves
    pub async fn run_until<F>(&self, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        info!(
            symbols = ?self.symbols,
            interval_secs = self.interval.as_secs(),
            "🔄 Collection loop started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        let mut rounds = 0usize;
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(rounds, "🛑 Shutdown signal received");
                    break;
                }
                _ = ticker.tick() => {
                    let summary = self.run_once().await;
                    rounds += 1;

                    if summary.succeeded == 0 && !self.symbols.is_empty() {
                        error!(round = rounds, failed = summary.failed, "❌ No symbol could be priced");
                    } else {
                        info!(
                            round = rounds,
                            succeeded = summary.succeeded,
                            failed = summary.failed,
                            stale = summary.stale,
                            total_volume = summary.total_volume,
                            elapsed_ms = summary.elapsed.as_millis() as u64,
                            "Collection round finished"
                        );
                    }
                }
            }
        }

        rounds
    }
}
