//! Huobi (HTX) REST client
//!
//! Merged ticker from `/market/detail/merged`, symbols from
//! `/v1/common/symbols`. Symbols are lowercase and concatenated (`btcusdt`).

use async_trait::async_trait;
use serde_json::Value;

use crate::oracle::error::{SourceError, SourceResult};
use crate::oracle::sources::{
    change_percent, epoch_to_utc, int, num, quote_volume, ExchangeConnector, HttpSource,
};
use crate::oracle::Quote;
use crate::types::{ExchangeId, MarketPair, MarketSet};

const HUOBI_REST_URL: &str = "https://api.huobi.pro";

pub struct HuobiClient {
    http: HttpSource,
    active: bool,
}

impl HuobiClient {
    pub fn new(http: HttpSource, active: bool) -> Self {
        Self { http, active }
    }

    fn check_status(body: &Value) -> SourceResult<()> {
        if body["status"].as_str() != Some("ok") {
            return Err(SourceError::Api(
                body["err-msg"].as_str().unwrap_or("unknown Huobi error").to_string(),
            ));
        }
        Ok(())
    }

    fn parse_markets(body: &Value) -> SourceResult<MarketSet> {
        Self::check_status(body)?;
        let symbols = body["data"]
            .as_array()
            .ok_or_else(|| SourceError::Parse("missing data array".into()))?;

        Ok(symbols
            .iter()
            .filter(|s| s["state"].as_str() == Some("online"))
            .filter_map(|s| {
                let base = s["base-currency"].as_str()?;
                let quote = s["quote-currency"].as_str()?;
                Some(MarketPair::new(base, quote))
            })
            .collect())
    }

    fn parse_ticker(body: &Value) -> SourceResult<Quote> {
        Self::check_status(body)?;
        let tick = &body["tick"];
        if tick.is_null() {
            return Err(SourceError::Parse("missing tick".into()));
        }

        let last = num(&tick["close"]);
        Ok(Quote {
            exchange: ExchangeId::Huobi,
            price: last,
            // `vol` is turnover in quote currency, `amount` is base volume
            volume_24h: quote_volume(num(&tick["vol"]), num(&tick["amount"]), last),
            bid: num(&tick["bid"][0]),
            ask: num(&tick["ask"][0]),
            high_24h: num(&tick["high"]),
            low_24h: num(&tick["low"]),
            change_24h_percent: change_percent(num(&tick["open"]), last),
            observed_at: epoch_to_utc(int(&body["ts"])),
        })
    }
}

#[async_trait]
impl ExchangeConnector for HuobiClient {
    fn id(&self) -> ExchangeId {
        ExchangeId::Huobi
    }

    fn is_active(&self) -> bool {
        self.active
    }

    async fn load_markets(&self) -> SourceResult<MarketSet> {
        let url = format!("{}/v1/common/symbols", HUOBI_REST_URL);
        let body = self.http.get_json(&url).await?;
        Self::parse_markets(&body)
    }

    async fn fetch_ticker(&self, pair: &MarketPair) -> SourceResult<Quote> {
        let url = format!(
            "{}/market/detail/merged?symbol={}",
            HUOBI_REST_URL,
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
    fn parse_ticker_reads_merged_detail() {
        let body = json!({
            "status": "ok",
            "ch": "market.btcusdt.detail.merged",
            "ts": 1_700_000_000_000_i64,
            "tick": {
                "close": 50000.0,
                "open": 48000.0,
                "high": 50500.0,
                "low": 47900.0,
                "amount": 900.0,
                "vol": 44_000_000.0,
                "bid": [49999.0, 1.2],
                "ask": [50001.0, 0.8]
            }
        });

        let quote = HuobiClient::parse_ticker(&body).unwrap();
        assert_eq!(quote.price, Some(50000.0));
        assert_eq!(quote.volume_24h, Some(44_000_000.0));
        assert_eq!(quote.bid, Some(49999.0));
        assert_eq!(quote.ask, Some(50001.0));
        assert!((quote.change_24h_percent.unwrap() - 4.1666666).abs() < 1e-6);
    }

    #[test]
    fn error_status_is_an_api_error() {
        let body = json!({"status": "error", "err-code": "invalid-parameter", "err-msg": "invalid symbol"});
        assert!(matches!(
            HuobiClient::parse_ticker(&body),
            Err(SourceError::Api(_))
        ));
    }

    #[test]
    fn parse_markets_keeps_online_symbols() {
        let body = json!({
            "status": "ok",
            "data": [
                {"symbol": "btcusdt", "base-currency": "btc", "quote-currency": "usdt", "state": "online"},
                {"symbol": "oldusdt", "base-currency": "old", "quote-currency": "usdt", "state": "offline"}
            ]
        });
        let markets = HuobiClient::parse_markets(&body).unwrap();
        assert!(markets.contains(&MarketPair::new("BTC", "USDT")));
        assert_eq!(markets.len(), 1);
    }
}
