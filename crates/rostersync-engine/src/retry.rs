//! Retry policy with exponential backoff for directory operations.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};

/// Retry configuration for transient directory failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Base delay in seconds, doubled on every retry.
    pub base_delay_secs: u64,
    /// Ceiling on any single delay.
    pub max_delay_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 2,
            base_delay_secs: 1,
            max_delay_secs: 30,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay_secs: u64) -> Self {
        RetryPolicy {
            max_retries,
            base_delay_secs,
            max_delay_secs: 30,
        }
    }

    /// Whether another attempt should be made after `error` on the given
    /// zero-based attempt number.
    pub fn should_retry(&self, attempt: u32, error: &SyncError) -> bool {
        if attempt >= self.max_retries {
            return false;
        }
        error.is_transient()
    }

    /// Delay before the next attempt. A rate-limit response that names its
    /// own delay wins over the exponential schedule, capped either way.
    pub fn delay_for(&self, attempt: u32, error: &SyncError) -> Duration {
        if let SyncError::RateLimited {
            retry_after_secs: Some(secs),
        } = error
        {
            return Duration::from_secs((*secs).min(self.max_delay_secs));
        }
        let exponential = self
            .base_delay_secs
            .saturating_mul(2u64.saturating_pow(attempt));
        Duration::from_secs(exponential.min(self.max_delay_secs))
    }

    /// Run `operation` until it succeeds, a permanent error surfaces, or
    /// the retry budget is exhausted. Exhaustion comes back as
    /// [`SyncError::MaxRetriesExceeded`]; permanent errors come back
    /// untouched.
    pub async fn execute<F, Fut, T>(&self, operation_name: &str, mut operation: F) -> SyncResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SyncResult<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(
                            operation = operation_name,
                            attempts = attempt + 1,
                            "operation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(error) if self.should_retry(attempt, &error) => {
                    let delay = self.delay_for(attempt, &error);
                    debug!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        delay_secs = delay.as_secs(),
                        error = %error,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    if error.is_transient() {
                        warn!(
                            operation = operation_name,
                            attempts = attempt + 1,
                            error = %error,
                            "giving up after retries"
                        );
                        return Err(SyncError::MaxRetriesExceeded {
                            attempts: attempt + 1,
                            message: format!(
                                "{operation_name} failed after {} attempt(s): {error}",
                                attempt + 1
                            ),
                        });
                    }
                    return Err(error);
                }
            }
        }
    }
}
