//! Caller-owned retry with exponential backoff.
//!
//! Nothing in the crate retries on its own. Callers opt in for idempotent
//! reads through [`ForgeConfigBuilder::retry`](crate::config::ForgeConfigBuilder::retry),
//! which every page iterator picks up, or per iterator with
//! [`PageIterator::with_retry`](crate::pagination::PageIterator::with_retry).

use crate::errors::ForgeResult;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Retry policy with exponential backoff and jitter.
///
/// Only transport-class errors ([`ForgeError::is_retryable`](crate::errors::ForgeError::is_retryable))
/// are retried; any HTTP status the provider answered with is final.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Upper bound on any single delay.
    pub max_backoff: Duration,
    /// Backoff growth factor.
    pub multiplier: f64,
    /// Jitter as a fraction of the delay (0.0 to 1.0).
    pub jitter: f64,
    /// Whether retries happen at all.
    pub enabled: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.1,
            enabled: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Executes an operation, retrying transport-class failures.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> ForgeResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ForgeResult<T>>,
    {
        let max_attempts = if self.enabled { self.max_attempts.max(1) } else { 1 };
        let mut attempt = 0;

        loop {
            attempt += 1;
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if !e.is_retryable() || attempt >= max_attempts => return Err(e),
                Err(e) => {
                    let delay = self.backoff(attempt);
                    tracing::debug!(
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Retrying after transport error"
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    /// Calculates the delay after a failed attempt.
    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.initial_backoff.as_millis() as f64
            * self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let capped = base.min(self.max_backoff.as_millis() as f64);

        let jitter_range = capped * self.jitter.clamp(0.0, 1.0);
        let jitter_value = rand::random::<f64>() * jitter_range * 2.0 - jitter_range;

        Duration::from_millis((capped + jitter_value).max(0.0) as u64)
    }
}
