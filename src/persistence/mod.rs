//! CSV Persistence Module
//!
//! Stores raw per-exchange quotes and aggregate snapshots in daily CSV files
//! (`prices/prices_YYYY-MM-DD.csv`, `aggregates/aggregates_YYYY-MM-DD.csv`)
//! and reads them back for latest/history queries.

mod status;

pub use status::{ExchangeHealth, StatusBoard, MAX_ERROR_MESSAGE_CHARS};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock as AsyncRwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::oracle::{AggregatedPrice, Quote, QuoteSet};
use crate::types::ExchangeId;

const PRICES_DIR: &str = "prices";
const AGGREGATES_DIR: &str = "aggregates";

/// One exchange's quote, as written to the raw price file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPriceRecord {
    pub timestamp: i64,
    pub run_id: Uuid,
    pub symbol: String,
    pub exchange: ExchangeId,
    pub price: f64,
    pub volume_24h: Option<f64>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub high_24h: Option<f64>,
    pub low_24h: Option<f64>,
    pub change_24h_percent: Option<f64>,
}

/// Flat CSV form of [`AggregateSnapshot`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRecord {
    pub timestamp: i64,
    pub run_id: Uuid,
    pub symbol: String,
    pub price_simple_avg: f64,
    pub price_vwap: Option<f64>,
    pub price_median: f64,
    pub price_min: f64,
    pub price_max: f64,
    pub price_spread_percent: f64,
    pub total_volume_24h: f64,
    pub exchange_count: usize,
    pub confidence_score: f64,
}

/// A timestamped aggregate price for one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateSnapshot {
    pub run_id: Uuid,
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub aggregated: AggregatedPrice,
}

impl From<&AggregateSnapshot> for AggregateRecord {
    fn from(snapshot: &AggregateSnapshot) -> Self {
        let a = &snapshot.aggregated;
        Self {
            timestamp: snapshot.timestamp.timestamp_millis(),
            run_id: snapshot.run_id,
            symbol: snapshot.symbol.clone(),
            price_simple_avg: a.price_simple_avg,
            price_vwap: a.price_vwap,
            price_median: a.price_median,
            price_min: a.price_min,
            price_max: a.price_max,
            price_spread_percent: a.price_spread_percent,
            total_volume_24h: a.total_volume_24h,
            exchange_count: a.exchange_count,
            confidence_score: a.confidence_score,
        }
    }
}

impl TryFrom<AggregateRecord> for AggregateSnapshot {
    type Error = anyhow::Error;

    fn try_from(record: AggregateRecord) -> Result<Self> {
        let timestamp = Utc
            .timestamp_millis_opt(record.timestamp)
            .single()
            .with_context(|| format!("Invalid snapshot timestamp {}", record.timestamp))?;

        Ok(Self {
            run_id: record.run_id,
            symbol: record.symbol,
            timestamp,
            aggregated: AggregatedPrice {
                price_simple_avg: record.price_simple_avg,
                price_vwap: record.price_vwap,
                price_median: record.price_median,
                price_min: record.price_min,
                price_max: record.price_max,
                price_spread_percent: record.price_spread_percent,
                total_volume_24h: record.total_volume_24h,
                exchange_count: record.exchange_count,
                confidence_score: record.confidence_score,
            },
        })
    }
}

/// Storage for raw quotes and aggregate snapshots
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceStore: Send + Sync {
    /// Persist the usable quotes of one run; returns the number of rows written
    async fn store_raw_quotes(&self, run_id: Uuid, symbol: &str, quotes: &QuoteSet)
        -> Result<usize>;

    async fn store_aggregate(&self, snapshot: &AggregateSnapshot) -> Result<()>;

    /// Most recent snapshot for `symbol`, if any
    async fn fetch_latest_aggregate(&self, symbol: &str) -> Result<Option<AggregateSnapshot>>;

    /// Up to `limit` snapshots for `symbol`, newest first
    async fn fetch_aggregate_history(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<AggregateSnapshot>>;

    /// Raw quotes for `symbol` observed in `[from, to]`, oldest first
    async fn fetch_raw_range(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RawPriceRecord>>;
}

/// Append-only CSV writer for one dated file, reopened when the day changes
struct DailyWriter {
    dir: PathBuf,
    prefix: &'static str,
    date: NaiveDate,
    writer: csv::Writer<File>,
}

impl DailyWriter {
    fn open(dir: PathBuf, prefix: &'static str, date: NaiveDate) -> Result<Self> {
        let writer = create_writer(&dir, &daily_filename(prefix, date))?;
        Ok(Self {
            dir,
            prefix,
            date,
            writer,
        })
    }

    fn writer_for(&mut self, date: NaiveDate) -> Result<&mut csv::Writer<File>> {
        if date != self.date {
            self.writer.flush().context("Failed to flush CSV writer")?;
            self.writer = create_writer(&self.dir, &daily_filename(self.prefix, date))?;
            self.date = date;
            debug!(prefix = self.prefix, %date, "Rotated CSV file");
        }
        Ok(&mut self.writer)
    }
}

fn daily_filename(prefix: &str, date: NaiveDate) -> String {
    format!("{}_{}.csv", prefix, date.format("%Y-%m-%d"))
}

fn create_writer(dir: &Path, filename: &str) -> Result<csv::Writer<File>> {
    let path = dir.join(filename);
    let file_has_data = path.exists() && fs::metadata(&path).map(|m| m.len() > 0).unwrap_or(false);

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open CSV file {}", path.display()))?;

    Ok(WriterBuilder::new()
        .has_headers(!file_has_data)
        .from_writer(file))
}

/// CSV persistence manager
pub struct CsvPersistence {
    data_dir: PathBuf,
    lookback_days: u32,
    price_writer: AsyncRwLock<DailyWriter>,
    aggregate_writer: AsyncRwLock<DailyWriter>,
}

impl CsvPersistence {
    /// Create a new CSV persistence manager. Reads look back `lookback_days`
    /// daily files (today included).
    pub fn new(data_dir: impl Into<PathBuf>, lookback_days: u32) -> Result<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir).context("Failed to create data directory")?;
        fs::create_dir_all(data_dir.join(PRICES_DIR))?;
        fs::create_dir_all(data_dir.join(AGGREGATES_DIR))?;

        let today = Utc::now().date_naive();
        let price_writer = DailyWriter::open(data_dir.join(PRICES_DIR), "prices", today)?;
        let aggregate_writer =
            DailyWriter::open(data_dir.join(AGGREGATES_DIR), "aggregates", today)?;

        Ok(Self {
            data_dir,
            lookback_days: lookback_days.max(1),
            price_writer: AsyncRwLock::new(price_writer),
            aggregate_writer: AsyncRwLock::new(aggregate_writer),
        })
    }

    /// Existing daily files between two dates, oldest first
    fn daily_files(&self, dir: &str, prefix: &str, from: NaiveDate, to: NaiveDate) -> Vec<PathBuf> {
        from.iter_days()
            .take_while(|d| *d <= to)
            .map(|d| self.data_dir.join(dir).join(daily_filename(prefix, d)))
            .filter(|p| p.exists())
            .collect()
    }

    /// Every row of `path` that deserializes; torn or corrupt rows are
    /// skipped so one bad append does not hide the rest of the file
    fn read_records<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);

        let mut records = Vec::new();
        for (row, result) in reader.deserialize().enumerate() {
            match result {
                Ok(record) => records.push(record),
                Err(e) => warn!(
                    file = %path.display(),
                    row = row + 1,
                    error = %e,
                    "⚠️ Skipping unreadable CSV row"
                ),
            }
        }
        Ok(records)
    }

    fn load_aggregates(&self, symbol: &str) -> Result<Vec<AggregateRecord>> {
        let today = Utc::now().date_naive();
        let from = today - chrono::Duration::days(i64::from(self.lookback_days) - 1);

        let mut records = Vec::new();
        for path in self.daily_files(AGGREGATES_DIR, "aggregates", from, today) {
            let rows: Vec<AggregateRecord> = Self::read_records(&path)?;
            records.extend(rows.into_iter().filter(|r| r.symbol == symbol));
        }
        records.sort_by_key(|r| r.timestamp);
        Ok(records)
    }
}

#[async_trait]
impl PriceStore for CsvPersistence {
    async fn store_raw_quotes(
        &self,
        run_id: Uuid,
        symbol: &str,
        quotes: &QuoteSet,
    ) -> Result<usize> {
        let usable = quotes.usable();
        let mut rows: Vec<&Quote> = usable.iter().collect();
        rows.sort_by_key(|q| q.exchange);

        let mut guard = self.price_writer.write().await;
        let writer = guard.writer_for(Utc::now().date_naive())?;

        for quote in &rows {
            let Some(price) = quote.price else { continue };
            writer
                .serialize(RawPriceRecord {
                    timestamp: quote.observed_at.timestamp_millis(),
                    run_id,
                    symbol: symbol.to_string(),
                    exchange: quote.exchange,
                    price,
                    volume_24h: quote.volume_24h,
                    bid: quote.bid,
                    ask: quote.ask,
                    high_24h: quote.high_24h,
                    low_24h: quote.low_24h,
                    change_24h_percent: quote.change_24h_percent,
                })
                .context("Failed to write price record")?;
        }
        writer.flush().context("Failed to flush price writer")?;

        debug!(symbol, %run_id, rows = rows.len(), "Stored raw quotes");
        Ok(rows.len())
    }

    async fn store_aggregate(&self, snapshot: &AggregateSnapshot) -> Result<()> {
        let mut guard = self.aggregate_writer.write().await;
        let writer = guard.writer_for(Utc::now().date_naive())?;
        writer
            .serialize(AggregateRecord::from(snapshot))
            .context("Failed to write aggregate record")?;
        writer.flush().context("Failed to flush aggregate writer")?;
        Ok(())
    }

    async fn fetch_latest_aggregate(&self, symbol: &str) -> Result<Option<AggregateSnapshot>> {
        // Hold the writer lock so a half-written row is never read
        let _guard = self.aggregate_writer.read().await;
        self.load_aggregates(symbol)?
            .pop()
            .map(AggregateSnapshot::try_from)
            .transpose()
    }

    async fn fetch_aggregate_history(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<AggregateSnapshot>> {
        let _guard = self.aggregate_writer.read().await;
        self.load_aggregates(symbol)?
            .into_iter()
            .rev()
            .take(limit)
            .map(AggregateSnapshot::try_from)
            .collect()
    }

    async fn fetch_raw_range(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<RawPriceRecord>> {
        if from > to {
            return Ok(Vec::new());
        }

        let _guard = self.price_writer.read().await;
        let (from_ms, to_ms) = (from.timestamp_millis(), to.timestamp_millis());

        // Rows land in the file of the day they were written, which may trail
        // the quote's own timestamp across midnight
        let last_day = (to + chrono::Duration::days(1)).date_naive();
        let mut records = Vec::new();
        for path in self.daily_files(PRICES_DIR, "prices", from.date_naive(), last_day) {
            let rows: Vec<RawPriceRecord> = Self::read_records(&path)?;
            records.extend(rows.into_iter().filter(|r| {
                r.symbol == symbol && r.timestamp >= from_ms && r.timestamp <= to_ms
            }));
        }
        records.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.exchange.cmp(&b.exchange))
        });
        Ok(records)
    }
}
