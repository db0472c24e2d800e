//! Oracle error types.
//!
//! Per-exchange failures (`SourceError`) are recoverable and never leave the
//! collector. `AggregationError` is the only failure callers must handle.

use thiserror::Error;

use crate::types::MarketPair;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Rate limited by exchange")]
    RateLimited,

    #[error("Market not listed: {0}")]
    MarketNotListed(MarketPair),

    #[error("Exchange API error: {0}")]
    Api(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Timed out after {0} ms")]
    Timeout(u64),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AggregationError {
    #[error("insufficient data: no usable quotes to price this symbol right now")]
    NoUsableQuotes,
}

pub type SourceResult<T> = Result<T, SourceError>;
