//! Retry configuration, delay calculation, and the retrying network decorator.
//!
//! [`RetryingNetwork`] wraps any [`Network`] and retries transient failures
//! with exponential backoff. The worker uses it for install-time asset
//! fetches, where a flaky connection should not leave holes in the static
//! store. Interactive fetches are not retried: the network-first strategy
//! falls back to the store instead of waiting.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use super::Network;
use crate::error::is_transient_status;
use crate::telemetry;
use crate::types::{Request, Response};
use crate::{HifadhiError, Result};

/// Configuration for retry behaviour on transient errors.
///
/// Uses exponential backoff, capped at `max_delay`:
///
/// ```rust
/// # use hifadhi::network::RetryConfig;
/// # use std::time::Duration;
/// let config = RetryConfig::new()
///     .max_attempts(5)
///     .initial_delay(Duration::from_millis(200));
/// assert_eq!(config.delay_for_attempt(1), Duration::from_millis(400));
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the initial request).
    /// 1 = no retry. Default: 3.
    pub max_attempts: u32,
    /// Base delay before the first retry. Default: 500ms.
    #[serde(with = "millis")]
    pub initial_delay: Duration,
    /// Maximum delay between retries (caps exponential growth). Default: 30s.
    #[serde(with = "millis")]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config that disables retries (single attempt).
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Set maximum attempts (including the initial request).
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    /// Set the base delay before the first retry.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay between retries.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    ///
    /// Uses exponential backoff: `initial_delay * 2^attempt`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self
            .initial_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        delay.min(self.max_delay)
    }

    /// Calculate the effective delay, respecting server `retry_after` hints.
    pub fn effective_delay(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        retry_after.unwrap_or_else(|| self.delay_for_attempt(attempt))
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

/// Execute an async operation with retry logic.
///
/// Retries on transient errors (as classified by
/// [`HifadhiError::is_transient()`]) up to `config.max_attempts`. Permanent
/// errors are returned immediately.
pub(crate) async fn with_retry<F, Fut, T>(config: &RetryConfig, operation: &str, f: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_err = None;
    for attempt in 0..config.max_attempts.max(1) {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_transient() => {
                if attempt + 1 < config.max_attempts {
                    metrics::counter!(telemetry::RETRIES_TOTAL, "operation" => operation.to_owned())
                        .increment(1);
                    let delay = config.effective_delay(attempt, e.retry_after());
                    warn!(
                        operation,
                        attempt = attempt + 1,
                        max_attempts = config.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying after transient error"
                    );
                    tokio::time::sleep(delay).await;
                }
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or_else(|| HifadhiError::Network("no attempts made".into())))
}

/// Decorator that wraps a [`Network`] with retry logic.
///
/// Transport failures and transient HTTP statuses (408, 429, 5xx) are
/// retried. A transient status that persists through the last attempt is
/// reported as [`HifadhiError::Api`], so callers see it as a failure.
pub struct RetryingNetwork {
    inner: Arc<dyn Network>,
    config: RetryConfig,
}

impl RetryingNetwork {
    /// Wrap a network with retry logic.
    pub fn new(inner: Arc<dyn Network>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl Network for RetryingNetwork {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn fetch(&self, request: &Request) -> Result<Response> {
        with_retry(&self.config, "fetch", || async move {
            let response = self.inner.fetch(request).await?;
            let status = response.status().as_u16();
            if is_transient_status(status) {
                return Err(HifadhiError::Api {
                    status,
                    message: format!("{} answered {status}", request.url()),
                });
            }
            Ok(response)
        })
        .await
    }
}
