//! Retry of transient HTTP failures for object store requests.
//!
//! `send_with_retry()` replaces `client.execute(request)` and adds:
//! - Exponential backoff with jitter on 429 (Too Many Requests) and 5xx errors
//! - Retry on connection and timeout failures
//! - Retry-After header parsing (seconds)
//! - Transparent passthrough for non-retryable status codes (4xx except 429)
//!
//! Only the transport is retried here. A request that finally fails is
//! reported to the caller, which never retries on its own.

use reqwest::{Client, Request, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for HTTP retry behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpRetryConfig {
    /// Maximum number of retry attempts (default: 3)
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff (default: 1000)
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds (default: 30000)
    pub max_delay_ms: u64,
    /// Backoff multiplier (default: 2.0)
    pub backoff_multiplier: f64,
}

impl Default for HttpRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl HttpRetryConfig {
    /// No retries at all
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

/// Determine if a status code is retryable
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Transport failures worth another attempt
fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect()
}

/// Whether `request` may be sent again after a failed attempt.
///
/// A conditional write whose response was lost may already have been applied;
/// replaying it would fail its own precondition.
fn is_replay_safe(request: &Request) -> bool {
    !request.headers().contains_key(reqwest::header::IF_NONE_MATCH)
}

/// Parse Retry-After header value given in seconds
fn parse_retry_after(response: &Response) -> Option<Duration> {
    let value = response.headers().get("retry-after")?.to_str().ok()?;
    let secs = value.trim().parse::<u64>().ok()?;
    Some(Duration::from_secs(secs.min(300)))
}

/// Calculate delay for a given retry attempt with jitter
fn calculate_delay(attempt: u32, config: &HttpRetryConfig) -> Duration {
    let base = config.base_delay_ms as f64 * config.backoff_multiplier.powi(attempt as i32);
    let capped = base.min(config.max_delay_ms as f64);
    // 10-30% jitter keeps concurrent clients apart
    let jitter = capped * (0.1 + rand::random::<f64>() * 0.2);
    Duration::from_millis((capped + jitter) as u64)
}

/// Send an HTTP request with automatic retry on 429/5xx and transport failures.
///
/// Each attempt executes a clone of `request`; requests with streaming bodies
/// cannot be cloned and conditional writes are not replayed, so both are sent
/// exactly once.
pub async fn send_with_retry(
    client: &Client,
    request: Request,
    config: &HttpRetryConfig,
) -> Result<Response, reqwest::Error> {
    let method = request.method().clone();
    let url = request.url().clone();
    let max_retries = if is_replay_safe(&request) { config.max_retries } else { 0 };
    let mut attempt = 0;

    loop {
        let retry_copy = if attempt < max_retries {
            request.try_clone()
        } else {
            None
        };

        let Some(next) = retry_copy else {
            return client.execute(request).await;
        };

        let delay = match client.execute(next).await {
            Ok(response) if !is_retryable_status(response.status().as_u16()) => {
                return Ok(response);
            }
            Ok(response) => {
                let delay = parse_retry_after(&response)
                    .unwrap_or_else(|| calculate_delay(attempt, config));
                tracing::debug!(
                    "HTTP {} {} returned {}. Retry {}/{} after {:?}",
                    method, url, response.status(), attempt + 1, max_retries, delay
                );
                delay
            }
            Err(e) if is_retryable_error(&e) => {
                let delay = calculate_delay(attempt, config);
                tracing::debug!(
                    "HTTP {} {} failed: {}. Retry {}/{} after {:?}",
                    method, url, e, attempt + 1, max_retries, delay
                );
                delay
            }
            Err(e) => return Err(e),
        };

        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
