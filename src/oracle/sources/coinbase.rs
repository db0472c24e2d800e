//! Coinbase Exchange REST client
//!
//! Top of book and last trade from `/products/{id}/ticker`, 24h open/high/low
//! from `/products/{id}/stats`. Volume is reported in base currency and is
//! converted with the last price.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::oracle::error::{SourceError, SourceResult};
use crate::oracle::sources::{change_percent, num, quote_volume, ExchangeConnector, HttpSource};
use crate::oracle::Quote;
use crate::types::{ExchangeId, MarketPair, MarketSet};

const COINBASE_REST_URL: &str = "https://api.exchange.coinbase.com";

pub struct CoinbaseClient {
    http: HttpSource,
    active: bool,
}

impl CoinbaseClient {
    pub fn new(http: HttpSource, active: bool) -> Self {
        Self { http, active }
    }

    fn parse_markets(body: &Value) -> SourceResult<MarketSet> {
        let products = body
            .as_array()
            .ok_or_else(|| SourceError::Parse("expected product array".into()))?;

        Ok(products
            .iter()
            .filter(|p| !p["trading_disabled"].as_bool().unwrap_or(false))
            .filter(|p| p["status"].as_str().map_or(true, |s| s == "online"))
            .filter_map(|p| {
                let base = p["base_currency"].as_str()?;
                let quote = p["quote_currency"].as_str()?;
                Some(MarketPair::new(base, quote))
            })
            .collect())
    }

    fn parse_ticker(ticker: &Value, stats: &Value) -> SourceResult<Quote> {
        if let Some(msg) = ticker["message"].as_str() {
            return Err(SourceError::Api(msg.to_string()));
        }

        let last = num(&ticker["price"]).or_else(|| num(&stats["last"]));
        let base_volume = num(&stats["volume"]).or_else(|| num(&ticker["volume"]));
        let observed_at = ticker["time"]
            .as_str()
            .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Ok(Quote {
            exchange: ExchangeId::Coinbase,
            price: last,
            volume_24h: quote_volume(None, base_volume, last),
            bid: num(&ticker["bid"]),
            ask: num(&ticker["ask"]),
            high_24h: num(&stats["high"]),
            low_24h: num(&stats["low"]),
            change_24h_percent: change_percent(num(&stats["open"]), last),
            observed_at,
        })
    }
}

#[async_trait]
impl ExchangeConnector for CoinbaseClient {
    fn id(&self) -> ExchangeId {
        ExchangeId::Coinbase
    }

    fn is_active(&self) -> bool {
        self.active
    }

    async fn load_markets(&self) -> SourceResult<MarketSet> {
        let url = format!("{}/products", COINBASE_REST_URL);
        let body = self.http.get_json(&url).await?;
        Self::parse_markets(&body)
    }

    async fn fetch_ticker(&self, pair: &MarketPair) -> SourceResult<Quote> {
        let product = pair.with_separator("-");
        let ticker_url = format!("{}/products/{}/ticker", COINBASE_REST_URL, product);
        let stats_url = format!("{}/products/{}/stats", COINBASE_REST_URL, product);

        let ticker = self.http.get_json(&ticker_url).await?;
        let stats = self.http.get_json(&stats_url).await?;
        Self::parse_ticker(&ticker, &stats)
    }
}
