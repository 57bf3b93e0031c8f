//! Retry wrapper for calls to external services.
//!
//! Every attempt runs under its own timeout. Retryable failures back off
//! exponentially up to `max_delay`; anything else is returned at once.
//! Adapters never retry on their own, so this is the only retry layer.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, timeout};

use crate::ports::{AIError, ContextStoreError, ExternalError};

/// Backoff settings shared by all external calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub multiplier: u32,
    pub max_delay: Duration,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            multiplier: 2,
            max_delay: Duration::from_secs(4),
            attempt_timeout: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// A policy that tries once, for callers that must not wait.
    pub fn no_retry(attempt_timeout: Duration) -> Self {
        Self {
            max_retries: 0,
            attempt_timeout,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (0-based), capped at `max_delay`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.multiplier.max(1).saturating_pow(retry);
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

/// Errors the retry wrapper knows how to classify.
pub trait Retryable: Sized {
    fn is_retryable(&self) -> bool;

    /// The error reported when an attempt exceeds its timeout.
    fn timed_out(operation: &str, after: Duration) -> Self;
}

impl Retryable for ExternalError {
    fn is_retryable(&self) -> bool {
        ExternalError::is_retryable(self)
    }

    fn timed_out(operation: &str, after: Duration) -> Self {
        ExternalError::Timeout {
            operation: operation.to_string(),
            timeout_ms: after.as_millis() as u64,
        }
    }
}

impl Retryable for AIError {
    fn is_retryable(&self) -> bool {
        AIError::is_retryable(self)
    }

    fn timed_out(_operation: &str, after: Duration) -> Self {
        AIError::Timeout {
            timeout_secs: after.as_secs().max(1) as u32,
        }
    }
}

impl Retryable for ContextStoreError {
    fn is_retryable(&self) -> bool {
        ContextStoreError::is_retryable(self)
    }

    fn timed_out(_operation: &str, after: Duration) -> Self {
        ContextStoreError::Timeout {
            timeout_ms: after.as_millis() as u64,
        }
    }
}

/// Runs `call` until it succeeds, fails for good, or runs out of retries.
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, operation: &str, mut call: F) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut retry = 0;
    loop {
        let outcome = match timeout(policy.attempt_timeout, call()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(E::timed_out(operation, policy.attempt_timeout)),
        };
        match outcome {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && retry < policy.max_retries => {
                let delay = policy.delay_for(retry);
                tracing::warn!(
                    operation,
                    attempt = retry + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "external call failed, retrying"
                );
                sleep(delay).await;
                retry += 1;
            }
            Err(err) => {
                if err.is_retryable() {
                    tracing::warn!(operation, attempts = retry + 1, error = %err, "retries exhausted");
                }
                return Err(err);
            }
        }
    }
}
