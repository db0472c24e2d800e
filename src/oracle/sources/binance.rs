//! Binance spot REST client
//!
//! Rolling 24h ticker from `/api/v3/ticker/24hr`, listed markets from
//! `/api/v3/exchangeInfo`.

use async_trait::async_trait;
use serde_json::Value;

use crate::oracle::error::{SourceError, SourceResult};
use crate::oracle::sources::{epoch_to_utc, int, num, quote_volume, ExchangeConnector, HttpSource};
use crate::oracle::Quote;
use crate::types::{ExchangeId, MarketPair, MarketSet};

const BINANCE_REST_URL: &str = "https://api.binance.com";

pub struct BinanceClient {
    http: HttpSource,
    active: bool,
}

impl BinanceClient {
    pub fn new(http: HttpSource, active: bool) -> Self {
        Self { http, active }
    }

    fn parse_markets(body: &Value) -> SourceResult<MarketSet> {
        let symbols = body["symbols"]
            .as_array()
            .ok_or_else(|| SourceError::Parse("missing symbols array".into()))?;

        Ok(symbols
            .iter()
            .filter(|s| s["status"].as_str() == Some("TRADING"))
            .filter_map(|s| {
                let base = s["baseAsset"].as_str()?;
                let quote = s["quoteAsset"].as_str()?;
                Some(MarketPair::new(base, quote))
            })
            .collect())
    }

    fn parse_ticker(body: &Value) -> SourceResult<Quote> {
        if let Some(msg) = body["msg"].as_str() {
            return Err(SourceError::Api(msg.to_string()));
        }

        let last = num(&body["lastPrice"]);
        Ok(Quote {
            exchange: ExchangeId::Binance,
            price: last,
            volume_24h: quote_volume(num(&body["quoteVolume"]), num(&body["volume"]), last),
            bid: num(&body["bidPrice"]),
            ask: num(&body["askPrice"]),
            high_24h: num(&body["highPrice"]),
            low_24h: num(&body["lowPrice"]),
            change_24h_percent: num(&body["priceChangePercent"]),
            observed_at: epoch_to_utc(int(&body["closeTime"])),
        })
    }
}

#[async_trait]
impl ExchangeConnector for BinanceClient {
    fn id(&self) -> ExchangeId {
        ExchangeId::Binance
    }

    fn is_active(&self) -> bool {
        self.active
    }

    async fn load_markets(&self) -> SourceResult<MarketSet> {
        let url = format!("{}/api/v3/exchangeInfo", BINANCE_REST_URL);
        let body = self.http.get_json(&url).await?;
        Self::parse_markets(&body)
    }

    async fn fetch_ticker(&self, pair: &MarketPair) -> SourceResult<Quote> {
        let url = format!(
            "{}/api/v3/ticker/24hr?symbol={}",
            BINANCE_REST_URL,
            pair.joined()
        );
        let body = self.http.get_json(&url).await?;
        Self::parse_ticker(&body)
    }
}
