//! Outbound GET with retry and exponential backoff.
//!
//! Retried: HTTP 429, any 5xx, connection failures and timeouts.
//! Everything else (including other 4xx) is handed back to the caller as is.

use std::time::Duration;

use reqwest::{Client, StatusCode};

use crate::{config::RetrySettings, error::NetworkCause};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: settings.base_delay(),
        }
    }
}

impl RetryPolicy {
    /// Delay after the failed attempt `attempt` (0-indexed): `base * 2^attempt`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Whether a status should be retried.
pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_body()
}

/// A completed exchange: the status plus the full body text.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: StatusCode,
    pub body: String,
}

#[derive(Debug)]
pub struct FetchError {
    pub attempts: u32,
    pub cause: NetworkCause,
}

#[derive(Debug, Clone)]
pub struct RetryingFetcher {
    http: Client,
    policy: RetryPolicy,
}

impl RetryingFetcher {
    pub fn new(settings: &RetrySettings) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(settings.timeout()).build()?;

        Ok(Self {
            http,
            policy: RetryPolicy::from(settings),
        })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// GET `url` with `query`, retrying transient failures.
    ///
    /// Returns the first non-retryable reply (success or not). Fails only when
    /// every attempt hit a retryable condition, or on a transport error that
    /// retrying cannot fix.
    pub async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<HttpReply, FetchError> {
        let max_attempts = self.policy.max_attempts;
        let mut last_cause = None;

        for attempt in 0..max_attempts {
            if attempt > 0 {
                let delay = self.policy.delay_for_attempt(attempt - 1);
                tracing::debug!(attempt = attempt + 1, ?delay, "backing off before retry");
                tokio::time::sleep(delay).await;
            }

            match self.attempt(url, query).await {
                Ok(reply) if is_retryable_status(reply.status) => {
                    tracing::warn!(
                        url,
                        status = %reply.status,
                        "retryable status on attempt {} of {}",
                        attempt + 1,
                        max_attempts
                    );
                    last_cause = Some(NetworkCause::Status(reply.status));
                }
                Ok(reply) => {
                    if attempt > 0 {
                        tracing::info!(url, "request succeeded after {} retries", attempt);
                    }
                    return Ok(reply);
                }
                Err(e) if is_retryable_error(&e) => {
                    tracing::warn!(
                        url,
                        "retryable error on attempt {} of {}: {}",
                        attempt + 1,
                        max_attempts,
                        e
                    );
                    last_cause = Some(NetworkCause::Transport(e));
                }
                Err(e) => {
                    tracing::debug!(url, "non-retryable error: {}", e);
                    return Err(FetchError {
                        attempts: attempt + 1,
                        cause: NetworkCause::Transport(e),
                    });
                }
            }
        }

        tracing::error!(url, "all {} attempts exhausted", max_attempts);

        // max_attempts >= 1, so the loop ran and recorded a cause
        let cause = last_cause.unwrap_or(NetworkCause::Status(StatusCode::SERVICE_UNAVAILABLE));
        Err(FetchError {
            attempts: max_attempts,
            cause,
        })
    }

    async fn attempt(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<HttpReply, reqwest::Error> {
        let res = self.http.get(url).query(query).send().await?;
        let status = res.status();
        let body = res.text().await?;

        Ok(HttpReply { status, body })
    }
}
