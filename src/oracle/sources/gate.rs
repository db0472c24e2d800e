//! Gate.io V4 spot REST client

use async_trait::async_trait;
use serde_json::Value;

use crate::oracle::error::{SourceError, SourceResult};
use crate::oracle::sources::{num, quote_volume, ExchangeConnector, HttpSource};
use crate::oracle::Quote;
use crate::types::{ExchangeId, MarketPair, MarketSet};

const GATE_REST_URL: &str = "https://api.gateio.ws/api/v4";

pub struct GateClient {
    http: HttpSource,
    active: bool,
}

impl GateClient {
    pub fn new(http: HttpSource, active: bool) -> Self {
        Self { http, active }
    }

    fn check_error(body: &Value) -> SourceResult<()> {
        match body["label"].as_str() {
            Some(label) => Err(SourceError::Api(format!(
                "{}: {}",
                label,
                body["message"].as_str().unwrap_or_default()
            ))),
            None => Ok(()),
        }
    }

    fn parse_markets(body: &Value) -> SourceResult<MarketSet> {
        Self::check_error(body)?;
        let pairs = body
            .as_array()
            .ok_or_else(|| SourceError::Parse("expected currency pair array".into()))?;

        Ok(pairs
            .iter()
            .filter(|p| p["trade_status"].as_str() == Some("tradable"))
            .filter_map(|p| {
                let base = p["base"].as_str()?;
                let quote = p["quote"].as_str()?;
                Some(MarketPair::new(base, quote))
            })
            .collect())
    }

    fn parse_ticker(body: &Value) -> SourceResult<Quote> {
        Self::check_error(body)?;
        let ticker = body
            .as_array()
            .and_then(|t| t.first())
            .ok_or_else(|| SourceError::Parse("empty ticker array".into()))?;

        let last = num(&ticker["last"]);
        Ok(Quote {
            exchange: ExchangeId::Gate,
            price: last,
            volume_24h: quote_volume(num(&ticker["quote_volume"]), num(&ticker["base_volume"]), last),
            bid: num(&ticker["highest_bid"]),
            ask: num(&ticker["lowest_ask"]),
            high_24h: num(&ticker["high_24h"]),
            low_24h: num(&ticker["low_24h"]),
            change_24h_percent: num(&ticker["change_percentage"]),
            observed_at: chrono::Utc::now(),
        })
    }
}

#[async_trait]
impl ExchangeConnector for GateClient {
    fn id(&self) -> ExchangeId {
        ExchangeId::Gate
    }

    fn is_active(&self) -> bool {
        self.active
    }

    async fn load_markets(&self) -> SourceResult<MarketSet> {
        let url = format!("{}/spot/currency_pairs", GATE_REST_URL);
        let body = self.http.get_json(&url).await?;
        Self::parse_markets(&body)
    }

    async fn fetch_ticker(&self, pair: &MarketPair) -> SourceResult<Quote> {
        let url = format!(
            "{}/spot/tickers?currency_pair={}",
            GATE_REST_URL,
            pair.with_separator("_")
        );
        let body = self.http.get_json(&url).await?;
        Self::parse_ticker(&body)
    }
}
