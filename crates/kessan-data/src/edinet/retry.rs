//! Bounded retry with exponential backoff for EDINET requests.

use crate::error::{DataError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Default number of attempts per request (first try included).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default wait before the first retry.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(1000);

/// Retry policy shared by listing and archive requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Never below 1.
    pub max_attempts: u32,
    /// Wait before the first retry; doubles on each further retry.
    pub initial_backoff: Duration,
}

/// Result of a retried operation together with the number of attempts used.
#[derive(Debug)]
pub struct Attempted<T> {
    /// Final value or the last error seen
    pub result: Result<T>,
    /// Attempts actually made
    pub attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the given attempts and initial backoff.
    pub const fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff,
        }
    }

    /// A policy that never retries.
    pub const fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Wait duration before retry number `retry` (0-indexed), with ±20% jitter.
    pub fn backoff(&self, retry: u32) -> Duration {
        let base_ms = self.initial_backoff.as_millis() as u64;
        if base_ms == 0 {
            return Duration::ZERO;
        }
        let backoff_ms = base_ms.saturating_mul(2_u64.saturating_pow(retry));
        let jitter = (backoff_ms as f64 * 0.2 * (fastrand::f64() - 0.5)) as i64;
        Duration::from_millis((backoff_ms as i64 + jitter).max(0) as u64)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Attempted<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempts = 0;

        loop {
            attempts += 1;
            match op().await {
                Ok(value) => {
                    return Attempted {
                        result: Ok(value),
                        attempts,
                    };
                }
                Err(e) if e.is_retryable() && attempts < max_attempts => {
                    let wait = self.backoff(attempts - 1);
                    tracing::debug!(
                        attempt = attempts,
                        max_attempts,
                        error = %e,
                        "{} failed, retrying in {:?}",
                        what,
                        wait
                    );
                    sleep(wait).await;
                }
                Err(e) => {
                    return Attempted {
                        result: Err(e),
                        attempts,
                    };
                }
            }
        }
    }
}

impl<T> Attempted<T> {
    /// Discard the attempt count.
    pub fn into_result(self) -> Result<T> {
        self.result
    }

    /// Whether the final error was a rejected subscription key.
    pub const fn is_authentication_failure(&self) -> bool {
        matches!(self.result, Err(DataError::Authentication(_)))
    }
}
