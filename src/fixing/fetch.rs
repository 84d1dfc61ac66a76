//! Upstream document fetcher
//!
//! Fetches the official fixing page over HTTP with an explicit timeout and a
//! small bounded retry budget with jittered exponential backoff. The body is
//! always decoded as UTF-8 regardless of the declared charset, so Albanian
//! currency labels survive mislabelled responses.

use std::time::Duration;

use rand::Rng;
use reqwest::Client;
use tokio::time::sleep;
use tracing::{info, warn};

use super::FixingError;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// HTTP fetcher for the fixing page.
#[derive(Clone)]
pub struct FixingFetcher {
    http: Client,
    url: String,
    max_attempts: u32,
    backoff_base_ms: u64,
}

impl FixingFetcher {
    /// Create a fetcher for the given page URL.
    pub fn new(
        url: String,
        timeout: Duration,
        max_attempts: u32,
        backoff_base_ms: u64,
    ) -> Result<Self, FixingError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FixingError::Fetch {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            http,
            url,
            max_attempts: max_attempts.max(1),
            backoff_base_ms,
        })
    }

    /// Fetch the page body, retrying transient failures up to the budget.
    pub async fn fetch_document(&self) -> Result<String, FixingError> {
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            match self.fetch_once().await {
                Ok(body) => {
                    info!(url = %self.url, attempt, bytes = body.len(), "fetched fixing page");
                    return Ok(body);
                }
                Err(err) => {
                    warn!(
                        url = %self.url,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "fixing page fetch failed"
                    );
                    last_error = Some(err);

                    if attempt < self.max_attempts {
                        sleep(self.backoff_delay(attempt)).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or(FixingError::Fetch {
            message: "fetch retries exhausted".to_string(),
        }))
    }

    async fn fetch_once(&self) -> Result<String, FixingError> {
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FixingError::Fetch {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FixingError::Upstream {
                status: status.as_u16(),
            });
        }

        // Decode as UTF-8 regardless of the declared charset.
        let bytes = response.bytes().await.map_err(|e| FixingError::Fetch {
            message: e.to_string(),
        })?;

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.backoff_base_ms.saturating_mul(1 << (attempt - 1));
        let jitter = rand::thread_rng().gen_range(0..=self.backoff_base_ms / 2 + 1);
        Duration::from_millis(base + jitter)
    }
}
