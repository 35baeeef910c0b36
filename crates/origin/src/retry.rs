//! Linear-backoff retry for origin attempts

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Outcome of one failed attempt
#[derive(Debug)]
pub enum AttemptError {
    /// Worth retrying (5xx, timeout, connection failure)
    Transient(String),
    /// Surfaced immediately
    Permanent(Error),
}

/// Retry schedule: `retry_attempts + 1` attempts, waiting `attempt × unit`
/// after failed attempt `attempt`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    retry_attempts: u32,
    backoff_unit: Duration,
}

impl RetryPolicy {
    /// Create a policy
    #[must_use]
    pub fn new(retry_attempts: u32, backoff_unit: Duration) -> Self {
        Self {
            retry_attempts,
            backoff_unit,
        }
    }

    /// Total attempts including the first
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.retry_attempts.saturating_add(1)
    }

    /// Delay after failed attempt `attempt` (1-based)
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff_unit.saturating_mul(attempt)
    }

    /// Run `f` until it succeeds, fails permanently or runs out of attempts.
    ///
    /// `f` receives the 1-based attempt number.
    pub async fn run<F, Fut, T>(&self, url: &str, mut f: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = std::result::Result<T, AttemptError>>,
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;

            match f(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(url, attempts = attempt, "Origin fetch succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(AttemptError::Permanent(err)) => {
                    debug!(url, error = %err, "Origin error is not retryable, failing immediately");
                    return Err(err);
                }
                Err(AttemptError::Transient(reason)) => {
                    if attempt >= max_attempts {
                        warn!(
                            url,
                            attempts = attempt,
                            reason = %reason,
                            "Origin fetch failed after maximum retries"
                        );
                        return Err(Error::fetch_failed(url, attempt, reason));
                    }

                    let delay = self.delay_for(attempt);
                    warn!(
                        url,
                        attempts = attempt,
                        reason = %reason,
                        retry_in_ms = delay.as_millis(),
                        "Origin fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
