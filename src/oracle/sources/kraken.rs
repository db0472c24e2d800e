//! Kraken REST client
//!
//! Kraken names some assets differently (XBT for BTC, XDG for DOGE); pairs are
//! translated both ways so the rest of the system only sees common symbols.

use async_trait::async_trait;
use serde_json::Value;

use crate::oracle::error::{SourceError, SourceResult};
use crate::oracle::sources::{change_percent, num, quote_volume, ExchangeConnector, HttpSource};
use crate::oracle::Quote;
use crate::types::{ExchangeId, MarketPair, MarketSet};

const KRAKEN_REST_URL: &str = "https://api.kraken.com";

const ASSET_ALIASES: [(&str, &str); 2] = [("XBT", "BTC"), ("XDG", "DOGE")];

pub struct KrakenClient {
    http: HttpSource,
    active: bool,
}

impl KrakenClient {
    pub fn new(http: HttpSource, active: bool) -> Self {
        Self { http, active }
    }

    fn to_common(asset: &str) -> String {
        ASSET_ALIASES
            .iter()
            .find(|(kraken, _)| *kraken == asset)
            .map(|(_, common)| common.to_string())
            .unwrap_or_else(|| asset.to_string())
    }

    fn to_kraken(asset: &str) -> String {
        ASSET_ALIASES
            .iter()
            .find(|(_, common)| *common == asset)
            .map(|(kraken, _)| kraken.to_string())
            .unwrap_or_else(|| asset.to_string())
    }

    fn pair_name(pair: &MarketPair) -> String {
        format!("{}{}", Self::to_kraken(&pair.base), Self::to_kraken(&pair.quote))
    }

    fn check_errors(body: &Value) -> SourceResult<()> {
        match body["error"].as_array() {
            Some(errors) if !errors.is_empty() => {
                let joined = errors
                    .iter()
                    .filter_map(|e| e.as_str())
                    .collect::<Vec<_>>()
                    .join("; ");
                Err(SourceError::Api(joined))
            }
            _ => Ok(()),
        }
    }

    fn parse_markets(body: &Value) -> SourceResult<MarketSet> {
        Self::check_errors(body)?;
        let pairs = body["result"]
            .as_object()
            .ok_or_else(|| SourceError::Parse("missing result object".into()))?;

        Ok(pairs
            .values()
            .filter(|p| p["status"].as_str().map_or(true, |s| s == "online"))
            .filter_map(|p| {
                let (base, quote) = p["wsname"].as_str()?.split_once('/')?;
                Some(MarketPair::new(Self::to_common(base), Self::to_common(quote)))
            })
            .collect())
    }

    fn parse_ticker(body: &Value) -> SourceResult<Quote> {
        Self::check_errors(body)?;
        let ticker = body["result"]
            .as_object()
            .and_then(|r| r.values().next())
            .ok_or_else(|| SourceError::Parse("empty ticker result".into()))?;

        let last = num(&ticker["c"][0]);
        Ok(Quote {
            exchange: ExchangeId::Kraken,
            price: last,
            volume_24h: quote_volume(None, num(&ticker["v"][1]), last),
            bid: num(&ticker["b"][0]),
            ask: num(&ticker["a"][0]),
            high_24h: num(&ticker["h"][1]),
            low_24h: num(&ticker["l"][1]),
            change_24h_percent: change_percent(num(&ticker["o"]), last),
            observed_at: chrono::Utc::now(),
        })
    }
}

#[async_trait]
impl ExchangeConnector for KrakenClient {
    fn id(&self) -> ExchangeId {
        ExchangeId::Kraken
    }

    fn is_active(&self) -> bool {
        self.active
    }

    async fn load_markets(&self) -> SourceResult<MarketSet> {
        let url = format!("{}/0/public/AssetPairs", KRAKEN_REST_URL);
        let body = self.http.get_json(&url).await?;
        Self::parse_markets(&body)
    }

    async fn fetch_ticker(&self, pair: &MarketPair) -> SourceResult<Quote> {
        let url = format!(
            "{}/0/public/Ticker?pair={}",
            KRAKEN_REST_URL,
            Self::pair_name(pair)
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
    fn pair_name_translates_btc_to_xbt() {
        assert_eq!(
            KrakenClient::pair_name(&MarketPair::new("BTC", "USDT")),
            "XBTUSDT"
        );
        assert_eq!(KrakenClient::pair_name(&MarketPair::new("ETH", "USD")), "ETHUSD");
    }

    #[test]
    fn parse_markets_maps_wsname_to_common_symbols() {
        let body = json!({
            "error": [],
            "result": {
                "XXBTZUSD": {"altname": "XBTUSD", "wsname": "XBT/USD", "status": "online"},
                "XDGUSD": {"altname": "XDGUSD", "wsname": "XDG/USD", "status": "online"},
                "OLDUSD": {"altname": "OLDUSD", "wsname": "OLD/USD", "status": "delisted"}
            }
        });

        let markets = KrakenClient::parse_markets(&body).unwrap();
        assert!(markets.contains(&MarketPair::new("BTC", "USD")));
        assert!(markets.contains(&MarketPair::new("DOGE", "USD")));
        assert!(!markets.contains(&MarketPair::new("OLD", "USD")));
    }

    #[test]
    fn parse_ticker_uses_rolling_24h_values() {
        let body = json!({
            "error": [],
            "result": {
                "XXBTZUSD": {
                    "a": ["50010.0", "1", "1.000"],
                    "b": ["50000.0", "2", "2.000"],
                    "c": ["50005.0", "0.1"],
                    "v": ["10.0", "100.0"],
                    "l": ["49500.0", "49000.0"],
                    "h": ["50500.0", "51000.0"],
                    "o": "49005.0"
                }
            }
        });

        let quote = KrakenClient::parse_ticker(&body).unwrap();
        assert_eq!(quote.price, Some(50005.0));
        assert_eq!(quote.volume_24h, Some(100.0 * 50005.0));
        assert_eq!(quote.high_24h, Some(51000.0));
        assert_eq!(quote.low_24h, Some(49000.0));
        assert_eq!(quote.bid, Some(50000.0));
        assert_eq!(quote.ask, Some(50010.0));
        assert!(quote.change_24h_percent.unwrap() > 2.0);
    }

    #[test]
    fn parse_ticker_reports_kraken_errors() {
        let body = json!({"error": ["EQuery:Unknown asset pair"]});
        match KrakenClient::parse_ticker(&body) {
            Err(SourceError::Api(msg)) => assert!(msg.contains("Unknown asset pair")),
            other => panic!("expected api error, got {:?}", other),
        }
    }
}
