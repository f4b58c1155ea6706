// src/services/fetcher.rs

//! Resilient upstream fetcher.
//!
//! Issues paced JSON GET requests with retry and exponential backoff.
//! The retry policy is a small explicit state machine (attempt counter,
//! classified failure kind, computed backoff) so it can be exercised
//! without any network mocking. All requests funnel through a shared
//! pacing lock, which makes one `Fetcher` the serializing throttle for
//! any number of concurrent callers.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{AppError, Result};
use crate::models::FetcherConfig;

/// Raw response handed back by a transport.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// Seam between retry logic and the actual HTTP stack.
///
/// The error string carries the transport-level failure description
/// (connect error, timeout). HTTP error statuses are not transport
/// errors; they come back as a `TransportResponse`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> std::result::Result<TransportResponse, String>;
}

/// Transport backed by `reqwest`.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(user_agent: &str, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> std::result::Result<TransportResponse, String> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let response = request.send().await.map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| e.to_string())?;
        Ok(TransportResponse { status, body })
    }
}

/// Failure kinds that may warrant another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// HTTP 429
    RateLimited,
    /// Transport error or 5xx
    Transient,
}

/// Retry budget and backoff computation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_backoff: Duration) -> Self {
        Self {
            max_retries,
            base_backoff,
        }
    }

    /// Whether another attempt is allowed after `attempts` completed
    /// attempts failed with `kind`.
    ///
    /// A rate-limit response grants `max_retries` retries beyond the
    /// first attempt; any other retryable failure is capped at
    /// `max_retries` total attempts.
    pub fn should_retry(&self, kind: FailureKind, attempts: u32) -> bool {
        match kind {
            FailureKind::RateLimited => attempts <= self.max_retries,
            FailureKind::Transient => attempts < self.max_retries,
        }
    }

    /// Backoff before the retry following the `attempts`-th attempt:
    /// `base * 2^(attempts-1)`.
    pub fn backoff_delay(&self, attempts: u32) -> Duration {
        self.base_backoff * 2u32.saturating_pow(attempts.saturating_sub(1))
    }
}

/// Classified result of a single attempt.
enum Attempt {
    Success(Value),
    Fatal(AppError),
    Retryable(FailureKind, String),
}

/// Paced, retrying JSON fetcher over a pluggable transport.
pub struct Fetcher<T: Transport> {
    transport: T,
    policy: RetryPolicy,
    request_delay: Duration,
    // Completion time of the last request; held across the pacing sleep
    // so concurrent callers cannot bypass the spacing.
    last_request: Mutex<Option<Instant>>,
}

impl<T: Transport> Fetcher<T> {
    pub fn new(transport: T, config: &FetcherConfig) -> Self {
        Self {
            transport,
            policy: RetryPolicy::new(
                config.max_retries,
                Duration::from_millis(config.base_backoff_ms),
            ),
            request_delay: Duration::from_millis(config.request_delay_ms),
            last_request: Mutex::new(None),
        }
    }

    /// Fetch a URL and parse the body as JSON.
    ///
    /// Transport errors and 429s are retried under the policy; any
    /// other non-200 status returns immediately as `UpstreamRejected`.
    /// A body that does not parse as JSON returns `Malformed`.
    pub async fn fetch(&self, url: &str, headers: &[(&str, &str)]) -> Result<Value> {
        let mut attempts = 0u32;
        loop {
            self.pace().await;
            attempts += 1;

            match self.attempt(url, headers).await {
                Attempt::Success(value) => return Ok(value),
                Attempt::Fatal(error) => return Err(error),
                Attempt::Retryable(kind, detail) => {
                    if !self.policy.should_retry(kind, attempts) {
                        return Err(match kind {
                            FailureKind::RateLimited => AppError::RateLimited {
                                url: url.to_string(),
                                attempts,
                            },
                            FailureKind::Transient => AppError::transient(url, detail),
                        });
                    }
                    let wait = self.policy.backoff_delay(attempts);
                    match kind {
                        FailureKind::RateLimited => log::warn!(
                            "Rate limited (429) on {url}, attempt {attempts}; backing off {wait:?}"
                        ),
                        FailureKind::Transient => log::warn!(
                            "Upstream failure on {url}, attempt {attempts} ({detail}); retrying in {wait:?}"
                        ),
                    }
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    async fn attempt(&self, url: &str, headers: &[(&str, &str)]) -> Attempt {
        let response = match self.transport.execute(url, headers).await {
            Ok(response) => response,
            Err(detail) => return Attempt::Retryable(FailureKind::Transient, detail),
        };

        match response.status {
            200 => match serde_json::from_str::<Value>(&response.body) {
                Ok(value) => Attempt::Success(value),
                Err(e) => Attempt::Fatal(AppError::malformed(url, e)),
            },
            429 => Attempt::Retryable(FailureKind::RateLimited, "429".to_string()),
            status if status >= 500 => {
                Attempt::Retryable(FailureKind::Transient, format!("status {status}"))
            }
            status => Attempt::Fatal(AppError::UpstreamRejected {
                url: url.to_string(),
                status,
            }),
        }
    }

    /// Enforce the minimum inter-request delay.
    async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.request_delay {
                tokio::time::sleep(self.request_delay - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}
