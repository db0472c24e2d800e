//! Exchange status board
//!
//! Last-writer-wins health record per exchange. Optionally mirrored to a JSON
//! file so `status` can read what a running collector last observed.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::warn;

use crate::oracle::StatusReporter;
use crate::types::{ExchangeId, ExchangeStatus};

/// Longest error message kept per exchange
pub const MAX_ERROR_MESSAGE_CHARS: usize = 500;

const STATUS_FILE: &str = "exchange_status.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeHealth {
    pub status: ExchangeStatus,
    pub last_successful_fetch: Option<DateTime<Utc>>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub last_error_message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ExchangeHealth {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            status: ExchangeStatus::default(),
            last_successful_fetch: None,
            last_error_at: None,
            last_error_message: None,
            updated_at: now,
        }
    }

    fn apply(&mut self, status: ExchangeStatus, detail: Option<String>, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
        match status {
            ExchangeStatus::Operational => self.last_successful_fetch = Some(now),
            ExchangeStatus::Degraded | ExchangeStatus::Offline => {
                self.last_error_at = Some(now);
                self.last_error_message = detail.map(|d| truncate_chars(&d, MAX_ERROR_MESSAGE_CHARS));
            }
        }
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Shared exchange health tracker
pub struct StatusBoard {
    entries: RwLock<BTreeMap<ExchangeId, ExchangeHealth>>,
    path: Option<PathBuf>,
}

impl StatusBoard {
    /// Board that is never written to disk
    pub fn in_memory() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            path: None,
        }
    }

    /// Board mirrored to `<data_dir>/exchange_status.json`, seeded from an
    /// existing file when one is present
    pub fn open(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir).context("Failed to create data directory")?;
        let path = data_dir.join(STATUS_FILE);
        let entries = Self::read_file(&path)?;

        Ok(Self {
            entries: RwLock::new(entries),
            path: Some(path),
        })
    }

    /// Load the board a collector left behind, without taking ownership of it
    pub fn load(data_dir: &Path) -> Result<BTreeMap<ExchangeId, ExchangeHealth>> {
        Self::read_file(&data_dir.join(STATUS_FILE))
    }

    fn read_file(path: &Path) -> Result<BTreeMap<ExchangeId, ExchangeHealth>> {
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read status file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse status file {}", path.display()))
    }

    pub fn get(&self, exchange: ExchangeId) -> Option<ExchangeHealth> {
        self.entries.read().ok()?.get(&exchange).cloned()
    }

    pub fn snapshot(&self) -> BTreeMap<ExchangeId, ExchangeHealth> {
        self.entries
            .read()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    fn persist(&self, entries: &BTreeMap<ExchangeId, ExchangeHealth>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let json = serde_json::to_string_pretty(entries).context("Failed to serialize status")?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).context("Failed to write status file")?;
        fs::rename(&tmp, path).context("Failed to replace status file")?;
        Ok(())
    }
}

impl StatusReporter for StatusBoard {
    fn report(&self, exchange: ExchangeId, status: ExchangeStatus, detail: Option<String>) {
        let now = Utc::now();
        let snapshot = match self.entries.write() {
            Ok(mut entries) => {
                entries
                    .entry(exchange)
                    .or_insert_with(|| ExchangeHealth::new(now))
                    .apply(status, detail, now);
                entries.clone()
            }
            Err(_) => return,
        };

        if let Err(e) = self.persist(&snapshot) {
            warn!(exchange = %exchange, error = %e, "Failed to persist exchange status");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_data_dir(test_name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "tickagg_status_{}_{}",
            test_name,
            uuid::Uuid::new_v4()
        ))
    }

    #[test]
    fn success_marks_operational_and_records_fetch_time() {
        let board = StatusBoard::in_memory();
        board.report(ExchangeId::Binance, ExchangeStatus::Operational, None);

        let health = board.get(ExchangeId::Binance).unwrap();
        assert_eq!(health.status, ExchangeStatus::Operational);
        assert!(health.last_successful_fetch.is_some());
        assert!(health.last_error_at.is_none());
    }

    #[test]
    fn error_keeps_last_success_and_records_message() {
        let board = StatusBoard::in_memory();
        board.report(ExchangeId::Kraken, ExchangeStatus::Operational, None);
        board.report(
            ExchangeId::Kraken,
            ExchangeStatus::Degraded,
            Some("Timed out after 10000 ms".into()),
        );

        let health = board.get(ExchangeId::Kraken).unwrap();
        assert_eq!(health.status, ExchangeStatus::Degraded);
        assert!(health.last_successful_fetch.is_some());
        assert_eq!(
            health.last_error_message.as_deref(),
            Some("Timed out after 10000 ms")
        );
    }

    #[test]
    fn long_error_messages_are_truncated() {
        let board = StatusBoard::in_memory();
        board.report(ExchangeId::Okx, ExchangeStatus::Offline, Some("é".repeat(800)));

        let message = board.get(ExchangeId::Okx).unwrap().last_error_message.unwrap();
        assert_eq!(message.chars().count(), MAX_ERROR_MESSAGE_CHARS);
    }

    #[test]
    fn unknown_exchange_has_no_entry() {
        let board = StatusBoard::in_memory();
        assert!(board.get(ExchangeId::Huobi).is_none());
        assert!(board.snapshot().is_empty());
    }

    #[test]
    fn file_backed_board_survives_reopen() {
        let data_dir = temp_data_dir("reopen");
        {
            let board = StatusBoard::open(&data_dir).unwrap();
            board.report(ExchangeId::Gate, ExchangeStatus::Offline, Some("maintenance".into()));
            board.report(ExchangeId::Bybit, ExchangeStatus::Operational, None);
        }

        let loaded = StatusBoard::load(&data_dir).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[&ExchangeId::Gate].status, ExchangeStatus::Offline);

        let reopened = StatusBoard::open(&data_dir).unwrap();
        assert_eq!(
            reopened.get(ExchangeId::Bybit).map(|h| h.status),
            Some(ExchangeStatus::Operational)
        );

        let _ = fs::remove_dir_all(&data_dir);
    }

    #[test]
    fn missing_status_file_loads_empty() {
        let data_dir = temp_data_dir("missing");
        assert!(StatusBoard::load(&data_dir).unwrap().is_empty());
    }
}
