//! Ticker Aggregator Library
//!
//! Multi-exchange ticker collection and price reconciliation for crypto
//! symbols

pub mod config;
pub mod logging;
pub mod oracle;
pub mod persistence;
pub mod runner;
pub mod service;
pub mod types;
