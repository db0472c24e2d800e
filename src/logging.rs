//! Structured logging initialization.

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "info,ticker_aggregator=debug";

/// Initialize structured logging.
///
/// JSON output when `json` is set or `RUST_ENV=production`, pretty output
/// otherwise. Logs go to stderr so command output on stdout stays parseable.
pub fn init_logging(json: bool) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let is_production = std::env::var("RUST_ENV")
        .map(|v| v == "production")
        .unwrap_or(false);

    if json || is_production {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .context("Failed to install JSON log subscriber")?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .context("Failed to install log subscriber")?;
    }

    Ok(())
}
