//! Bybit V5 spot REST client
//!
//! Tickers from `/v5/market/tickers?category=spot`, instruments from
//! `/v5/market/instruments-info?category=spot`.

use async_trait::async_trait;
use serde_json::Value;

use crate::oracle::error::{SourceError, SourceResult};
use crate::oracle::sources::{epoch_to_utc, int, num, quote_volume, ExchangeConnector, HttpSource};
use crate::oracle::Quote;
use crate::types::{ExchangeId, MarketPair, MarketSet};

const BYBIT_REST_URL: &str = "https://api.bybit.com";

pub struct BybitClient {
    http: HttpSource,
    active: bool,
}

impl BybitClient {
    pub fn new(http: HttpSource, active: bool) -> Self {
        Self { http, active }
    }

    /// `result.list` of a successful V5 response
    fn result_list(body: &Value) -> SourceResult<&Vec<Value>> {
        if body["retCode"].as_i64() != Some(0) {
            return Err(SourceError::Api(
                body["retMsg"].as_str().unwrap_or("unknown Bybit error").to_string(),
            ));
        }
        body["result"]["list"]
            .as_array()
            .ok_or_else(|| SourceError::Parse("missing result.list".into()))
    }

    fn parse_markets(body: &Value) -> SourceResult<MarketSet> {
        Ok(Self::result_list(body)?
            .iter()
            .filter(|i| i["status"].as_str() == Some("Trading"))
            .filter_map(|i| {
                let base = i["baseCoin"].as_str()?;
                let quote = i["quoteCoin"].as_str()?;
                Some(MarketPair::new(base, quote))
            })
            .collect())
    }

    fn parse_ticker(body: &Value) -> SourceResult<Quote> {
        let ticker = Self::result_list(body)?
            .first()
            .ok_or_else(|| SourceError::Parse("empty ticker list".into()))?;

        let last = num(&ticker["lastPrice"]);
        Ok(Quote {
            exchange: ExchangeId::Bybit,
            price: last,
            volume_24h: quote_volume(num(&ticker["turnover24h"]), num(&ticker["volume24h"]), last),
            bid: num(&ticker["bid1Price"]),
            ask: num(&ticker["ask1Price"]),
            high_24h: num(&ticker["highPrice24h"]),
            low_24h: num(&ticker["lowPrice24h"]),
            change_24h_percent: num(&ticker["price24hPcnt"]).map(|p| p * 100.0),
            observed_at: epoch_to_utc(int(&body["time"])),
        })
    }
}

#[async_trait]
impl ExchangeConnector for BybitClient {
    fn id(&self) -> ExchangeId {
        ExchangeId::Bybit
    }

    fn is_active(&self) -> bool {
        self.active
    }

    async fn load_markets(&self) -> SourceResult<MarketSet> {
        let url = format!(
            "{}/v5/market/instruments-info?category=spot&limit=1000",
            BYBIT_REST_URL
        );
        let body = self.http.get_json(&url).await?;
        Self::parse_markets(&body)
    }

    async fn fetch_ticker(&self, pair: &MarketPair) -> SourceResult<Quote> {
        let url = format!(
            "{}/v5/market/tickers?category=spot&symbol={}",
            BYBIT_REST_URL,
            pair.joined()
        );
        let body = self.http.get_json(&url).await?;
        Self::parse_ticker(&body)
    }
}
