//! Bitfinex V2 REST client
//!
//! Tickers are positional arrays:
//! `[BID, BID_SIZE, ASK, ASK_SIZE, DAILY_CHANGE, DAILY_CHANGE_RELATIVE,
//! LAST_PRICE, VOLUME, HIGH, LOW]`. Bitfinex lists USDT as `UST`.

use async_trait::async_trait;
use serde_json::Value;

use crate::oracle::error::{SourceError, SourceResult};
use crate::oracle::sources::{num, quote_volume, ExchangeConnector, HttpSource};
use crate::oracle::Quote;
use crate::types::{ExchangeId, MarketPair, MarketSet};

const BITFINEX_REST_URL: &str = "https://api-pub.bitfinex.com/v2";

const ASSET_ALIASES: [(&str, &str); 1] = [("UST", "USDT")];

const BID: usize = 0;
const ASK: usize = 2;
const DAILY_CHANGE_RELATIVE: usize = 5;
const LAST_PRICE: usize = 6;
const VOLUME: usize = 7;
const HIGH: usize = 8;
const LOW: usize = 9;

pub struct BitfinexClient {
    http: HttpSource,
    active: bool,
}

impl BitfinexClient {
    pub fn new(http: HttpSource, active: bool) -> Self {
        Self { http, active }
    }

    fn to_common(asset: &str) -> &str {
        ASSET_ALIASES
            .iter()
            .find(|(bfx, _)| *bfx == asset)
            .map(|(_, common)| *common)
            .unwrap_or(asset)
    }

    fn to_bitfinex(asset: &str) -> &str {
        ASSET_ALIASES
            .iter()
            .find(|(_, common)| *common == asset)
            .map(|(bfx, _)| *bfx)
            .unwrap_or(asset)
    }

    /// Trading symbol, e.g. `tBTCUST` or `tDOGE:USD`
    fn symbol(pair: &MarketPair) -> String {
        let base = Self::to_bitfinex(&pair.base);
        let quote = Self::to_bitfinex(&pair.quote);
        if base.len() > 3 || quote.len() > 3 {
            format!("t{}:{}", base, quote)
        } else {
            format!("t{}{}", base, quote)
        }
    }

    fn split_pair(raw: &str) -> Option<MarketPair> {
        let (base, quote) = match raw.split_once(':') {
            Some(parts) => parts,
            None if raw.len() == 6 => raw.split_at(3),
            None => return None,
        };
        Some(MarketPair::new(Self::to_common(base), Self::to_common(quote)))
    }

    fn check_error(body: &Value) -> SourceResult<()> {
        if body[0].as_str() == Some("error") {
            return Err(SourceError::Api(
                body[2].as_str().unwrap_or("unknown Bitfinex error").to_string(),
            ));
        }
        Ok(())
    }

    fn parse_markets(body: &Value) -> SourceResult<MarketSet> {
        Self::check_error(body)?;
        let pairs = body[0]
            .as_array()
            .ok_or_else(|| SourceError::Parse("expected nested pair list".into()))?;

        Ok(pairs
            .iter()
            .filter_map(|p| p.as_str())
            .filter_map(Self::split_pair)
            .collect())
    }

    fn parse_ticker(body: &Value) -> SourceResult<Quote> {
        Self::check_error(body)?;
        let fields = body
            .as_array()
            .filter(|f| f.len() > LOW)
            .ok_or_else(|| SourceError::Parse("short ticker array".into()))?;

        let last = num(&fields[LAST_PRICE]);
        Ok(Quote {
            exchange: ExchangeId::Bitfinex,
            price: last,
            volume_24h: quote_volume(None, num(&fields[VOLUME]), last),
            bid: num(&fields[BID]),
            ask: num(&fields[ASK]),
            high_24h: num(&fields[HIGH]),
            low_24h: num(&fields[LOW]),
            change_24h_percent: num(&fields[DAILY_CHANGE_RELATIVE]).map(|r| r * 100.0),
            observed_at: chrono::Utc::now(),
        })
    }
}

#[async_trait]
impl ExchangeConnector for BitfinexClient {
    fn id(&self) -> ExchangeId {
        ExchangeId::Bitfinex
    }

    fn is_active(&self) -> bool {
        self.active
    }

    async fn load_markets(&self) -> SourceResult<MarketSet> {
        let url = format!("{}/conf/pub:list:pair:exchange", BITFINEX_REST_URL);
        let body = self.http.get_json(&url).await?;
        Self::parse_markets(&body)
    }

    async fn fetch_ticker(&self, pair: &MarketPair) -> SourceResult<Quote> {
        let url = format!("{}/ticker/{}", BITFINEX_REST_URL, Self::symbol(pair));
        let body = self.http.get_json(&url).await?;
        Self::parse_ticker(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn symbol_uses_ust_and_colon_for_long_codes() {
        assert_eq!(BitfinexClient::symbol(&MarketPair::new("BTC", "USDT")), "tBTCUST");
        assert_eq!(BitfinexClient::symbol(&MarketPair::new("DOGE", "USD")), "tDOGE:USD");
    }

    #[test]
    fn parse_markets_splits_plain_and_colon_pairs() {
        let body = json!([["BTCUSD", "BTCUST", "DOGE:USD", "WEIRD"]]);
        let markets = BitfinexClient::parse_markets(&body).unwrap();
        assert!(markets.contains(&MarketPair::new("BTC", "USD")));
        assert!(markets.contains(&MarketPair::new("BTC", "USDT")));
        assert!(markets.contains(&MarketPair::new("DOGE", "USD")));
        assert_eq!(markets.len(), 3);
    }

    #[test]
    fn parse_ticker_reads_positional_fields() {
        let body = json!([49990.0, 1.5, 50010.0, 2.0, 500.0, 0.0101, 50000.0, 250.0, 50500.0, 49000.0]);
        let quote = BitfinexClient::parse_ticker(&body).unwrap();
        assert_eq!(quote.price, Some(50000.0));
        assert_eq!(quote.volume_24h, Some(250.0 * 50000.0));
        assert_eq!(quote.bid, Some(49990.0));
        assert_eq!(quote.ask, Some(50010.0));
        assert!((quote.change_24h_percent.unwrap() - 1.01).abs() < 1e-9);
    }

    #[test]
    fn error_array_is_an_api_error() {
        let body = json!(["error", 10020, "symbol: invalid"]);
        assert!(matches!(
            BitfinexClient::parse_ticker(&body),
            Err(SourceError::Api(_))
        ));
    }
}
