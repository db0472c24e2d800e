//! Bitstamp V2 REST client

use async_trait::async_trait;
use serde_json::Value;

use crate::oracle::error::{SourceError, SourceResult};
use crate::oracle::sources::{
    change_percent, epoch_to_utc, int, num, quote_volume, ExchangeConnector, HttpSource,
};
use crate::oracle::Quote;
use crate::types::{ExchangeId, MarketPair, MarketSet};

const BITSTAMP_REST_URL: &str = "https://www.bitstamp.net/api/v2";

pub struct BitstampClient {
    http: HttpSource,
    active: bool,
}

impl BitstampClient {
    pub fn new(http: HttpSource, active: bool) -> Self {
        Self { http, active }
    }

    fn parse_markets(body: &Value) -> SourceResult<MarketSet> {
        let pairs = body
            .as_array()
            .ok_or_else(|| SourceError::Parse("expected trading pair array".into()))?;

        Ok(pairs
            .iter()
            .filter(|p| p["trading"].as_str() == Some("Enabled"))
            .filter_map(|p| {
                let (base, quote) = p["name"].as_str()?.split_once('/')?;
                Some(MarketPair::new(base, quote))
            })
            .collect())
    }

    fn parse_ticker(body: &Value) -> SourceResult<Quote> {
        if body["status"].as_str() == Some("error") || body["error"].is_string() {
            let reason = body["reason"]
                .as_str()
                .or_else(|| body["error"].as_str())
                .unwrap_or("unknown Bitstamp error");
            return Err(SourceError::Api(reason.to_string()));
        }

        let last = num(&body["last"]);
        let change = num(&body["percent_change_24"])
            .or_else(|| change_percent(num(&body["open"]), last));

        Ok(Quote {
            exchange: ExchangeId::Bitstamp,
            price: last,
            volume_24h: quote_volume(None, num(&body["volume"]), last),
            bid: num(&body["bid"]),
            ask: num(&body["ask"]),
            high_24h: num(&body["high"]),
            low_24h: num(&body["low"]),
            change_24h_percent: change,
            observed_at: epoch_to_utc(int(&body["timestamp"])),
        })
    }
}

#[async_trait]
impl ExchangeConnector for BitstampClient {
    fn id(&self) -> ExchangeId {
        ExchangeId::Bitstamp
    }

    fn is_active(&self) -> bool {
        self.active
    }

    async fn load_markets(&self) -> SourceResult<MarketSet> {
        let url = format!("{}/trading-pairs-info/", BITSTAMP_REST_URL);
        let body = self.http.get_json(&url).await?;
        Self::parse_markets(&body)
    }

    async fn fetch_ticker(&self, pair: &MarketPair) -> SourceResult<Quote> {
        let url = format!(
            "{}/ticker/{}/",
            BITSTAMP_REST_URL,
            pair.joined().to_lowercase()
        );
        let body = self.http.get_json(&url).await?;
        Self::parse_ticker(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_ticker_converts_base_volume_and_seconds_timestamp() {
        let body = json!({
            "timestamp": "1700000000",
            "open": "49000",
            "high": "50500",
            "low": "48800",
            "last": "50000",
            "volume": "120.5",
            "bid": "49995",
            "ask": "50005",
            "percent_change_24": "2.04"
        });

        let quote = BitstampClient::parse_ticker(&body).unwrap();
        assert_eq!(quote.price, Some(50000.0));
        assert_eq!(quote.volume_24h, Some(120.5 * 50000.0));
        assert_eq!(quote.change_24h_percent, Some(2.04));
        assert_eq!(quote.observed_at.timestamp(), 1_700_000_000);
    }

    #[test]
    fn garbage_timestamp_falls_back_to_now() {
        let body = json!({
            "last": "50000",
            "volume": "1",
            "timestamp": "-9999999999999999"
        });

        let before = chrono::Utc::now();
        let quote = BitstampClient::parse_ticker(&body).unwrap();
        assert_eq!(quote.price, Some(50000.0));
        assert!(quote.observed_at >= before);
    }

    #[test]
    fn parse_markets_reads_pair_names() {
        let body = json!([
            {"name": "BTC/USD", "url_symbol": "btcusd", "trading": "Enabled"},
            {"name": "XYZ/USD", "url_symbol": "xyzusd", "trading": "Disabled"}
        ]);
        let markets = BitstampClient::parse_markets(&body).unwrap();
        assert_eq!(markets.len(), 1);
        assert!(markets.contains(&MarketPair::new("BTC", "USD")));
    }

    #[test]
    fn error_payload_is_an_api_error() {
        let body = json!({"status": "error", "reason": "Invalid currency pair."});
        assert!(BitstampClient::parse_ticker(&body).is_err());
    }
}
