//! KuCoin REST client
//!
//! 24h statistics from `/api/v1/market/stats`, symbols from `/api/v2/symbols`.
//! KuCoin wraps every payload as `{"code": "200000", "data": ...}`.

use async_trait::async_trait;
use serde_json::Value;

use crate::oracle::error::{SourceError, SourceResult};
use crate::oracle::sources::{epoch_to_utc, int, num, quote_volume, ExchangeConnector, HttpSource};
use crate::oracle::Quote;
use crate::types::{ExchangeId, MarketPair, MarketSet};

const KUCOIN_REST_URL: &str = "https://api.kucoin.com";
const KUCOIN_OK: &str = "200000";

pub struct KucoinClient {
    http: HttpSource,
    active: bool,
}

impl KucoinClient {
    pub fn new(http: HttpSource, active: bool) -> Self {
        Self { http, active }
    }

    fn data(body: &Value) -> SourceResult<&Value> {
        match body["code"].as_str() {
            Some(KUCOIN_OK) => Ok(&body["data"]),
            _ => Err(SourceError::Api(
                body["msg"].as_str().unwrap_or("unknown KuCoin error").to_string(),
            )),
        }
    }

    fn parse_markets(body: &Value) -> SourceResult<MarketSet> {
        let symbols = Self::data(body)?
            .as_array()
            .ok_or_else(|| SourceError::Parse("expected symbol array".into()))?;

        Ok(symbols
            .iter()
            .filter(|s| s["enableTrading"].as_bool().unwrap_or(true))
            .filter_map(|s| {
                let base = s["baseCurrency"].as_str()?;
                let quote = s["quoteCurrency"].as_str()?;
                Some(MarketPair::new(base, quote))
            })
            .collect())
    }

    fn parse_ticker(body: &Value) -> SourceResult<Quote> {
        let data = Self::data(body)?;
        if data.is_null() {
            return Err(SourceError::Parse("empty stats payload".into()));
        }

        let last = num(&data["last"]);
        Ok(Quote {
            exchange: ExchangeId::Kucoin,
            price: last,
            volume_24h: quote_volume(num(&data["volValue"]), num(&data["vol"]), last),
            bid: num(&data["buy"]),
            ask: num(&data["sell"]),
            high_24h: num(&data["high"]),
            low_24h: num(&data["low"]),
            change_24h_percent: num(&data["changeRate"]).map(|r| r * 100.0),
            observed_at: epoch_to_utc(int(&data["time"])),
        })
    }
}

#[async_trait]
impl ExchangeConnector for KucoinClient {
    fn id(&self) -> ExchangeId {
        ExchangeId::Kucoin
    }

    fn is_active(&self) -> bool {
        self.active
    }

    async fn load_markets(&self) -> SourceResult<MarketSet> {
        let url = format!("{}/api/v2/symbols", KUCOIN_REST_URL);
        let body = self.http.get_json(&url).await?;
        Self::parse_markets(&body)
    }

    async fn fetch_ticker(&self, pair: &MarketPair) -> SourceResult<Quote> {
        let url = format!(
            "{}/api/v1/market/stats?symbol={}",
            KUCOIN_REST_URL,
            pair.with_separator("-")
        );
        let body = self.http.get_json(&url).await?;
        Self::parse_ticker(&body)
    }
}
