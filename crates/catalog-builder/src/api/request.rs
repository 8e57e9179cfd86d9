//! Single HTTP JSON calls with pacing and bounded retries.

use super::rate_limiter::{PacingPolicy, RateLimiter};
use crate::error::{CrawlError, CrawlResult};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

const USER_AGENT: &str = concat!("anime-catalog-builder/", env!("CARGO_PKG_VERSION"));

/// Request client settings
#[derive(Debug, Clone)]
pub struct RequestSettings {
    pub base_url: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub pacing: PacingPolicy,
}

/// Issues paced requests against the upstream API.
///
/// The HTTP session is opened on first use and dropped by [`RequestClient::close`].
pub struct RequestClient {
    settings: RequestSettings,
    /// Lazily created HTTP session
    session: Option<Client>,
    rate_limiter: RateLimiter,
}

impl RequestClient {
    pub fn new(settings: RequestSettings) -> Self {
        let rate_limiter = RateLimiter::new(settings.pacing.clone());
        Self {
            settings,
            session: None,
            rate_limiter,
        }
    }

    fn session(&mut self) -> CrawlResult<Client> {
        if let Some(client) = &self.session {
            return Ok(client.clone());
        }

        let client = Client::builder()
            .timeout(self.settings.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| CrawlError::UpstreamUnavailable {
                endpoint: self.settings.base_url.clone(),
                reason: format!("failed to create HTTP client: {}", e),
            })?;

        debug!(base_url = %self.settings.base_url, "HTTP session opened");
        self.session = Some(client.clone());
        Ok(client)
    }

    /// Release the HTTP session. A later request opens a new one.
    pub fn close(&mut self) {
        if self.session.take().is_some() {
            info!("HTTP session closed");
        }
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// Issue one GET request.
    ///
    /// Returns `Ok(None)` for a non-429 error status: the call failed but the
    /// caller decides how to degrade. HTTP 429 and transport failures are
    /// retried up to `max_retries` times with capped backoff.
    pub async fn issue(&mut self, endpoint: &str, params: &[(&str, String)]) -> CrawlResult<Option<Value>> {
        let client = self.session()?;
        let url = format!("{}{}", self.settings.base_url, endpoint);
        let max_retries = self.settings.max_retries;

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            self.rate_limiter.acquire().await;

            debug!(url = %url, attempt = attempt, "Making API request");
            let sent = client.get(&url).query(params).send().await;

            let response = match sent {
                Ok(response) => response,
                Err(source) => {
                    self.rate_limiter.complete();
                    let error = CrawlError::TransientNetwork {
                        endpoint: endpoint.to_string(),
                        source,
                    };
                    if attempt > max_retries {
                        return Err(CrawlError::UpstreamUnavailable {
                            endpoint: endpoint.to_string(),
                            reason: format!("{} (after {} attempts)", error, attempt),
                        });
                    }

                    let delay = self.rate_limiter.retry_delay(attempt);
                    warn!(url = %url, error = %error, delay_ms = delay.as_millis(), "Request error, retrying");
                    sleep(delay).await;
                    continue;
                }
            };

            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                self.rate_limiter.complete();
                let delay = self.rate_limiter.record_throttle();
                if attempt > max_retries {
                    warn!(url = %url, attempts = attempt, "Rate limited, giving up");
                    return Err(CrawlError::RateLimited {
                        endpoint: endpoint.to_string(),
                        attempts: attempt,
                    });
                }

                warn!(
                    url = %url,
                    delay_ms = delay.as_millis(),
                    consecutive = self.rate_limiter.consecutive_throttles(),
                    "Rate limited by server, waiting"
                );
                sleep(delay).await;
                continue;
            }

            if !status.is_success() {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                self.rate_limiter.complete();

                warn!(
                    url = %url,
                    status = %status,
                    error = %error_text,
                    "Request failed"
                );
                return Ok(None);
            }

            let body = response.bytes().await;
            self.rate_limiter.complete();

            let body = match body {
                Ok(body) => body,
                Err(source) => {
                    let error = CrawlError::TransientNetwork {
                        endpoint: endpoint.to_string(),
                        source,
                    };
                    if attempt > max_retries {
                        return Err(CrawlError::UpstreamUnavailable {
                            endpoint: endpoint.to_string(),
                            reason: format!("{} (after {} attempts)", error, attempt),
                        });
                    }

                    let delay = self.rate_limiter.retry_delay(attempt);
                    warn!(url = %url, error = %error, delay_ms = delay.as_millis(), "Failed to read body, retrying");
                    sleep(delay).await;
                    continue;
                }
            };

            self.rate_limiter.record_success();

            return serde_json::from_slice(&body)
                .map(Some)
                .map_err(|e| CrawlError::MalformedResponse {
                    endpoint: endpoint.to_string(),
                    reason: e.to_string(),
                });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> RequestSettings {
        RequestSettings {
            base_url: "https://api.jikan.moe/v4".to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 3,
            pacing: PacingPolicy {
                min_interval: Duration::from_millis(1000),
                max_per_minute: 60,
                throttle_interval_factor: 0.5,
                backoff_base: Duration::from_secs(4),
                backoff_factor: 1.0,
                max_backoff: Duration::from_secs(60),
            },
        }
    }

    #[test]
    fn test_session_is_lazy() -> CrawlResult<()> {
        let mut client = RequestClient::new(settings());
        assert!(!client.is_open());

        client.session()?;
        assert!(client.is_open());

        client.close();
        assert!(!client.is_open());

        Ok(())
    }
}
