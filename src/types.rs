//! Core types used throughout the aggregator
//!
//! Exchange identifiers, exchange health states and the market-pair
//! conventions used to map a bare symbol onto an exchange's order books.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Quote currencies treated as stablecoins. A stablecoin is priced against
/// USD instead of against another stablecoin.
pub const STABLECOINS: [&str; 4] = ["USDT", "USDC", "BUSD", "DAI"];

/// Supported exchanges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeId {
    Binance,
    Coinbase,
    Kraken,
    Kucoin,
    Bybit,
    Okx,
    Gate,
    Bitfinex,
    Huobi,
    Bitstamp,
}

impl ExchangeId {
    /// Every exchange with a connector, in default priority order
    pub const ALL: [ExchangeId; 10] = [
        ExchangeId::Binance,
        ExchangeId::Coinbase,
        ExchangeId::Kraken,
        ExchangeId::Kucoin,
        ExchangeId::Bybit,
        ExchangeId::Okx,
        ExchangeId::Gate,
        ExchangeId::Bitfinex,
        ExchangeId::Huobi,
        ExchangeId::Bitstamp,
    ];

    /// Lowercase identifier used in config, CSV rows and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeId::Binance => "binance",
            ExchangeId::Coinbase => "coinbase",
            ExchangeId::Kraken => "kraken",
            ExchangeId::Kucoin => "kucoin",
            ExchangeId::Bybit => "bybit",
            ExchangeId::Okx => "okx",
            ExchangeId::Gate => "gate",
            ExchangeId::Bitfinex => "bitfinex",
            ExchangeId::Huobi => "huobi",
            ExchangeId::Bitstamp => "bitstamp",
        }
    }

    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "binance" => Some(ExchangeId::Binance),
            "coinbase" => Some(ExchangeId::Coinbase),
            "kraken" => Some(ExchangeId::Kraken),
            "kucoin" => Some(ExchangeId::Kucoin),
            "bybit" => Some(ExchangeId::Bybit),
            "okx" => Some(ExchangeId::Okx),
            "gate" | "gateio" => Some(ExchangeId::Gate),
            "bitfinex" => Some(ExchangeId::Bitfinex),
            "huobi" | "htx" => Some(ExchangeId::Huobi),
            "bitstamp" => Some(ExchangeId::Bitstamp),
            _ => None,
        }
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Last-known operational state of an exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeStatus {
    Operational,
    Degraded,
    Offline,
}

impl Default for ExchangeStatus {
    fn default() -> Self {
        ExchangeStatus::Operational
    }
}

impl fmt::Display for ExchangeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ExchangeStatus::Operational => "operational",
            ExchangeStatus::Degraded => "degraded",
            ExchangeStatus::Offline => "offline",
        };
        f.pad(label)
    }
}

/// A spot market, e.g. BTC/USDT
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarketPair {
    pub base: String,
    pub quote: String,
}

impl MarketPair {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Self {
            base: base.into().to_uppercase(),
            quote: quote.into().to_uppercase(),
        }
    }

    /// Pairs to try for a symbol, most preferred first.
    ///
    /// Regular assets prefer USDT and fall back to USD, BUSD, USDC.
    /// Stablecoins prefer USD and never quote against themselves.
    pub fn candidates(symbol: &str) -> Vec<MarketPair> {
        let base = symbol.trim().to_uppercase();
        let quotes: &[&str] = if is_stablecoin(&base) {
            &["USD", "USDT", "USDC"]
        } else {
            &["USDT", "USD", "BUSD", "USDC"]
        };

        quotes
            .iter()
            .filter(|q| **q != base)
            .map(|q| MarketPair::new(base.clone(), *q))
            .collect()
    }

    /// Pick the first candidate pair listed in `markets`
    pub fn resolve(symbol: &str, markets: &MarketSet) -> Option<MarketPair> {
        Self::candidates(symbol)
            .into_iter()
            .find(|pair| markets.contains(pair))
    }

    /// Concatenated form, e.g. "BTCUSDT"
    pub fn joined(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }

    /// Separated form, e.g. "BTC-USDT"
    pub fn with_separator(&self, sep: &str) -> String {
        format!("{}{}{}", self.base, sep, self.quote)
    }
}

impl fmt::Display for MarketPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// Markets listed by one exchange
pub type MarketSet = HashSet<MarketPair>;

pub fn is_stablecoin(symbol: &str) -> bool {
    STABLECOINS.contains(&symbol.to_uppercase().as_str())
}

/// Normalize a caller-supplied symbol ("btc " -> "BTC")
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}
