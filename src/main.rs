//! Ticker Aggregator - Entry Point
//!
//! Collects tickers from the configured exchanges, reconciles them into one
//! price per symbol and stores the raw and aggregate results.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use ticker_aggregator::config::AppConfig;
use ticker_aggregator::logging::init_logging;
use ticker_aggregator::oracle::sources::ConnectorRegistry;
use ticker_aggregator::oracle::{PriceAggregator, QuoteCollector, StatusReporter};
use ticker_aggregator::persistence::{CsvPersistence, PriceStore, StatusBoard};
use ticker_aggregator::runner::CollectionRunner;
use ticker_aggregator::service::PricingService;

/// Multi-exchange crypto ticker aggregator
#[derive(Parser, Debug)]
#[command(name = "ticker-aggregator", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Price the configured symbols on an interval until interrupted
    Run {
        /// Comma-separated symbols, overrides runner.symbols
        #[arg(long, value_delimiter = ',')]
        symbols: Option<Vec<String>>,
        /// Seconds between rounds, overrides runner.interval_secs
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Price one symbol now and print the report as JSON
    Price { symbol: String },
    /// Print the latest stored snapshot for a symbol
    Latest { symbol: String },
    /// Print stored snapshots for a symbol, newest first
    History {
        symbol: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Print stored per-exchange quotes for a symbol, oldest first
    Raw {
        symbol: String,
        /// Minutes to look back from now
        #[arg(long, default_value_t = 60)]
        since: u32,
    },
    /// Print the exchange health board
    Status,
    /// Load every exchange's market list and report reachability
    Probe,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load()?;
    init_logging(config.logging.json)?;

    info!("🚀 Starting ticker-aggregator v{}", env!("CARGO_PKG_VERSION"));
    info!(config = %config, "Configuration loaded");

    match cli.command {
        Commands::Status => print_status(&config),
        Commands::Run { symbols, interval } => {
            let service = Arc::new(build_service(&config)?);
            let symbols = match symbols {
                Some(list) => list
                    .iter()
                    .map(|s| ticker_aggregator::types::normalize_symbol(s))
                    .filter(|s| !s.is_empty())
                    .collect(),
                None => config.symbols(),
            };
            let interval =
                Duration::from_secs(interval.unwrap_or(config.runner.interval_secs).max(1));

            let runner = CollectionRunner::new(service, symbols, interval);
            runner.run_until(shutdown_signal()).await;
            info!("🛑 Shutting down");
            Ok(())
        }
        Commands::Price { symbol } => {
            let service = build_service(&config)?;
            let report = service.price(&symbol).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Commands::Latest { symbol } => {
            let service = build_service(&config)?;
            match service.latest(&symbol).await? {
                Some(snapshot) => println!("{}", serde_json::to_string_pretty(&snapshot)?),
                None => println!("No stored snapshot for {}", symbol.trim().to_uppercase()),
            }
            Ok(())
        }
        Commands::History { symbol, limit } => {
            let service = build_service(&config)?;
            let history = service.history(&symbol, limit).await?;
            println!("{}", serde_json::to_string_pretty(&history)?);
            Ok(())
        }
        Commands::Raw { symbol, since } => {
            let service = build_service(&config)?;
            let to = Utc::now();
            let from = to - chrono::Duration::minutes(i64::from(since));
            let rows = service.raw_quotes(&symbol, from, to).await?;
            println!("{}", serde_json::to_string_pretty(&rows)?);
            Ok(())
        }
        Commands::Probe => {
            let service = build_service(&config)?;
            let mut results = service.collector().probe().await;
            results.sort_by_key(|(id, _)| *id);
            for (exchange, result) in results {
                match result {
                    Ok(markets) => println!("{:<10} ok       {} markets", exchange, markets),
                    Err(e) => println!("{:<10} failed   {}", exchange, e),
                }
            }
            Ok(())
        }
    }
}

fn build_service(config: &AppConfig) -> Result<PricingService> {
    let data_dir = config.data_dir();

    let (reporter, store): (Arc<dyn StatusReporter>, Option<Arc<dyn PriceStore>>) =
        if config.persistence.csv_enabled {
            let board: Arc<dyn StatusReporter> = Arc::new(StatusBoard::open(&data_dir)?);
            let store: Arc<dyn PriceStore> = Arc::new(CsvPersistence::new(
                &data_dir,
                config.persistence.lookback_days,
            )?);
            info!(data_dir = %data_dir.display(), "💾 CSV persistence enabled");
            (board, Some(store))
        } else {
            let board: Arc<dyn StatusReporter> = Arc::new(StatusBoard::in_memory());
            (board, None)
        };

    let registry = ConnectorRegistry::new(&config.exchanges()?, &config.source_settings())
        .context("Failed to build exchange connectors")?;
    let collector = QuoteCollector::new(
        &registry,
        reporter,
        config.fetch_timeout(),
        config.collector.max_concurrent_fetches,
    );

    Ok(PricingService::new(
        collector,
        PriceAggregator::new(config.confidence_weights()),
        store,
        Duration::from_secs(config.service.freshness_secs),
    ))
}

fn print_status(config: &AppConfig) -> Result<()> {
    let board = StatusBoard::load(&config.data_dir())?;
    if board.is_empty() {
        println!("No exchange status recorded yet");
        return Ok(());
    }

    for (exchange, health) in board {
        let last_ok = health
            .last_successful_fetch
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<10} {:<12} last_ok={} {}",
            exchange,
            health.status,
            last_ok,
            health.last_error_message.unwrap_or_default()
        );
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl+c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
