//! Shared HTTP plumbing for REST connectors
//!
//! One `reqwest::Client` per exchange with a request timeout, plus request
//! spacing so a connector never exceeds its per-minute rate limit.

use serde_json::Value;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::oracle::error::{SourceError, SourceResult};
use crate::types::ExchangeId;

const USER_AGENT: &str = concat!("ticker-aggregator/", env!("CARGO_PKG_VERSION"));
const ERROR_BODY_LIMIT: usize = 200;

/// HTTP settings shared by all connectors
#[derive(Debug, Clone)]
pub struct SourceSettings {
    /// Per-request timeout enforced by the HTTP client
    pub request_timeout: Duration,
    /// Requests allowed per minute; 0 disables spacing
    pub rate_limit_per_minute: u32,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            rate_limit_per_minute: 100,
        }
    }
}

impl SourceSettings {
    /// Minimum gap between two requests to the same exchange
    pub fn min_interval(&self) -> Duration {
        if self.rate_limit_per_minute == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(60_000 / self.rate_limit_per_minute as u64)
        }
    }
}

/// Rate-limited JSON-over-HTTP client for one exchange
pub struct HttpSource {
    exchange: ExchangeId,
    client: reqwest::Client,
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl HttpSource {
    pub fn new(exchange: ExchangeId, settings: &SourceSettings) -> SourceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            exchange,
            client,
            min_interval: settings.min_interval(),
            last_request: Mutex::new(None),
        })
    }

    /// Wait until the exchange's request budget allows another call
    async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// GET a URL and decode the body as JSON
    pub async fn get_json(&self, url: &str) -> SourceResult<Value> {
        self.pace().await;

        tracing::trace!(
            exchange = %self.exchange,
            url = %url.split('?').next().unwrap_or(url),
            "GET"
        );

        let response = self.client.get(url).send().await?;
        let status = response.status();

        if status.as_u16() == 429 {
            return Err(SourceError::RateLimited);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Status {
                status: status.as_u16(),
                body: body.chars().take(ERROR_BODY_LIMIT).collect(),
            });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
