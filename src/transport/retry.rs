//! Bounded exponential-backoff retry around any transport

use super::{RawResponse, Transport, TransportError};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);

/// Attempt budget and backoff base
///
/// `max_retries` counts total attempts. The delay after failed attempt `i`
/// (0-indexed) is `base_delay * 2^i`; the last attempt's failure is returned
/// without waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Exponential backoff: 1s, 2s, 4s with the default base
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }
}

/// Wraps a transport and retries transport-level failures
pub struct RetryingTransport<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T: Transport> RetryingTransport<T> {
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }
}

#[async_trait]
impl<T: Transport> Transport for RetryingTransport<T> {
    async fn send(&self, endpoint: &str, payload: &Value) -> Result<RawResponse, TransportError> {
        let attempts = self.policy.attempts();
        let mut attempt = 0;

        loop {
            match self.inner.send(endpoint, payload).await {
                Ok(response) => {
                    if attempt > 0 {
                        tracing::info!(endpoint, attempt = attempt + 1, "Request succeeded after retry");
                    }
                    return Ok(response);
                }
                Err(e) if attempt + 1 >= attempts => {
                    tracing::error!(
                        endpoint,
                        attempts,
                        error = %e.message,
                        "Request failed, retries exhausted"
                    );
                    return Err(e.with_attempts(attempt + 1));
                }
                Err(e) => {
                    let delay = self.policy.delay_for(attempt);
                    tracing::warn!(
                        endpoint,
                        attempt = attempt + 1,
                        max_attempts = attempts,
                        delay_ms = %delay.as_millis(),
                        error = %e.message,
                        "Request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
