//! OKX V5 REST client

use async_trait::async_trait;
use serde_json::Value;

use crate::oracle::error::{SourceError, SourceResult};
use crate::oracle::sources::{
    change_percent, epoch_to_utc, int, num, quote_volume, ExchangeConnector, HttpSource,
};
use crate::oracle::Quote;
use crate::types::{ExchangeId, MarketPair, MarketSet};

const OKX_REST_URL: &str = "https://www.okx.com";

pub struct OkxClient {
    http: HttpSource,
    active: bool,
}

impl OkxClient {
    pub fn new(http: HttpSource, active: bool) -> Self {
        Self { http, active }
    }

    fn data(body: &Value) -> SourceResult<&Vec<Value>> {
        if body["code"].as_str() != Some("0") {
            return Err(SourceError::Api(
                body["msg"].as_str().unwrap_or("unknown OKX error").to_string(),
            ));
        }
        body["data"]
            .as_array()
            .ok_or_else(|| SourceError::Parse("missing data array".into()))
    }

    fn parse_markets(body: &Value) -> SourceResult<MarketSet> {
        Ok(Self::data(body)?
            .iter()
            .filter(|i| i["state"].as_str() == Some("live"))
            .filter_map(|i| {
                let base = i["baseCcy"].as_str()?;
                let quote = i["quoteCcy"].as_str()?;
                Some(MarketPair::new(base, quote))
            })
            .collect())
    }

    fn parse_ticker(body: &Value) -> SourceResult<Quote> {
        let ticker = Self::data(body)?
            .first()
            .ok_or_else(|| SourceError::Parse("empty ticker data".into()))?;

        let last = num(&ticker["last"]);
        Ok(Quote {
            exchange: ExchangeId::Okx,
            price: last,
            // For spot instruments volCcy24h is denominated in the quote currency
            volume_24h: quote_volume(num(&ticker["volCcy24h"]), num(&ticker["vol24h"]), last),
            bid: num(&ticker["bidPx"]),
            ask: num(&ticker["askPx"]),
            high_24h: num(&ticker["high24h"]),
            low_24h: num(&ticker["low24h"]),
            change_24h_percent: change_percent(num(&ticker["open24h"]), last),
            observed_at: epoch_to_utc(int(&ticker["ts"])),
        })
    }
}

#[async_trait]
impl ExchangeConnector for OkxClient {
    fn id(&self) -> ExchangeId {
        ExchangeId::Okx
    }

    fn is_active(&self) -> bool {
        self.active
    }

    async fn load_markets(&self) -> SourceResult<MarketSet> {
        let url = format!("{}/api/v5/public/instruments?instType=SPOT", OKX_REST_URL);
        let body = self.http.get_json(&url).await?;
        Self::parse_markets(&body)
    }

    async fn fetch_ticker(&self, pair: &MarketPair) -> SourceResult<Quote> {
        let url = format!(
            "{}/api/v5/market/ticker?instId={}",
            OKX_REST_URL,
            pair.with_separator("-")
        );
        let body = self.http.get_json(&url).await?;
        Self::parse_ticker(&body)
    }
}
