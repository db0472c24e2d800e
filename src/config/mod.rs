//! Configuration management for the ticker aggregator
//!
//! Loads from YAML files + environment variables via .env

use anyhow::{bail, Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::oracle::sources::SourceSettings;
use crate::oracle::ConfidenceWeights;
use crate::types::{normalize_symbol, ExchangeId};

const ENV_PREFIX: &str = "TICKAGG";

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub collector: CollectorConfig,
    pub aggregator: AggregatorConfig,
    pub persistence: PersistenceConfig,
    pub service: ServiceConfig,
    pub runner: RunnerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectorConfig {
    /// Exchanges to query (binance, coinbase, kraken, ...)
    pub exchanges: Vec<String>,
    /// Per market-load / ticker request timeout in milliseconds
    pub fetch_timeout_ms: u64,
    /// Maximum exchanges queried at once
    pub max_concurrent_fetches: usize,
    /// Request budget per exchange
    pub rate_limit_per_minute: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AggregatorConfig {
    /// Maximum points for exchange coverage
    pub coverage_weight: f64,
    /// Exchange count that earns full coverage points
    pub expected_exchanges: f64,
    /// Maximum points for price consistency
    pub consistency_weight: f64,
    /// Maximum points for volume distribution
    pub volume_weight: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    /// Data directory
    pub data_dir: String,
    /// Enable CSV storage
    pub csv_enabled: bool,
    /// Daily files scanned by latest/history queries
    pub lookback_days: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Stored snapshots younger than this are served without collecting.
    /// 0 disables the cache.
    pub freshness_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunnerConfig {
    /// Symbols priced by the `run` loop
    pub symbols: Vec<String>,
    /// Seconds between collection rounds
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON log lines
    pub json: bool,
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let builder = Self::defaults()?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (TICKAGG__SECTION__KEY)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("collector.exchanges")
                    .with_list_parse_key("runner.symbols"),
            );

        Self::from_builder(builder)
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>> {
        let all_exchanges: Vec<&str> = ExchangeId::ALL.iter().map(|e| e.as_str()).collect();
        let weights = ConfidenceWeights::default();

        Ok(Config::builder()
            // Collector defaults
            .set_default("collector.exchanges", all_exchanges)?
            .set_default("collector.fetch_timeout_ms", 10_000)?
            .set_default("collector.max_concurrent_fetches", 10)?
            .set_default("collector.rate_limit_per_minute", 100)?
            // Aggregator defaults
            .set_default("aggregator.coverage_weight", weights.coverage)?
            .set_default("aggregator.expected_exchanges", weights.expected_exchanges)?
            .set_default("aggregator.consistency_weight", weights.consistency)?
            .set_default("aggregator.volume_weight", weights.volume_distribution)?
            // Persistence defaults
            .set_default("persistence.data_dir", "./data")?
            .set_default("persistence.csv_enabled", true)?
            .set_default("persistence.lookback_days", 7)?
            // Service defaults
            .set_default("service.freshness_secs", 30)?
            // Runner defaults
            .set_default("runner.symbols", vec!["BTC", "ETH"])?
            .set_default("runner.interval_secs", 60)?
            .set_default("logging.json", false)?)
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let config = builder.build().context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app_config.validate()?;
        Ok(app_config)
    }

    /// Reject settings the collector cannot run with
    pub fn validate(&self) -> Result<()> {
        self.exchanges()?;

        if self.collector.fetch_timeout_ms == 0 {
            bail!("collector.fetch_timeout_ms must be greater than zero");
        }
        if self.collector.max_concurrent_fetches == 0 {
            bail!("collector.max_concurrent_fetches must be greater than zero");
        }
        if self.aggregator.expected_exchanges <= 0.0 {
            bail!("aggregator.expected_exchanges must be positive");
        }
        for (name, weight) in [
            ("coverage_weight", self.aggregator.coverage_weight),
            ("consistency_weight", self.aggregator.consistency_weight),
            ("volume_weight", self.aggregator.volume_weight),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                bail!("aggregator.{} must be a non-negative number", name);
            }
        }
        if self.runner.interval_secs == 0 {
            bail!("runner.interval_secs must be greater than zero");
        }

        Ok(())
    }

    /// Configured exchanges, deduplicated in configuration order
    pub fn exchanges(&self) -> Result<Vec<ExchangeId>> {
        let mut ids = Vec::new();
        for name in &self.collector.exchanges {
            let id = ExchangeId::from_str(name)
                .with_context(|| format!("Unknown exchange '{}' in collector.exchanges", name))?;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    pub fn symbols(&self) -> Vec<String> {
        self.runner
            .symbols
            .iter()
            .map(|s| normalize_symbol(s))
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn source_settings(&self) -> SourceSettings {
        SourceSettings {
            request_timeout: self.fetch_timeout(),
            rate_limit_per_minute: self.collector.rate_limit_per_minute,
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.collector.fetch_timeout_ms)
    }

    pub fn confidence_weights(&self) -> ConfidenceWeights {
        ConfidenceWeights {
            coverage: self.aggregator.coverage_weight,
            expected_exchanges: self.aggregator.expected_exchanges,
            consistency: self.aggregator.consistency_weight,
            volume_distribution: self.aggregator.volume_weight,
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.persistence.data_dir)
    }

    /// Generate a digest of the config for logging
    pub fn digest(&self) -> String {
        format!(
            "exchanges={:?} symbols={:?} interval={}s timeout={}ms csv={} freshness={}s",
            self.collector.exchanges,
            self.runner.symbols,
            self.runner.interval_secs,
            self.collector.fetch_timeout_ms,
            self.persistence.csv_enabled,
            self.service.freshness_secs
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
