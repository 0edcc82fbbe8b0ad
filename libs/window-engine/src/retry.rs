//! Retry with exponential backoff for stream-service calls.
//!
//! ```text
//! attempt 1: immediate
//! attempt 2: wait initial_backoff
//! attempt 3: wait initial_backoff * multiplier
//! ...        capped at max_backoff
//! ```
//!
//! Only `Throttled` and `Transient` errors are retried; everything else
//! fails on the first attempt. Every wait is raced against the caller's
//! cancellation token.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use window_api::ServiceError;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt + 1` (0-indexed).
    ///
    /// `min(initial_backoff * multiplier^attempt, max_backoff)`
    pub fn backoff(&self, attempt: usize) -> Duration {
        let backoff_ms =
            self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        let backoff = Duration::from_millis(backoff_ms as u64);
        backoff.min(self.max_backoff)
    }
}

#[derive(Debug)]
pub enum RetryError {
    /// The cancellation token fired while calling or backing off.
    Cancelled,
    /// Non-retryable error, or retries exhausted.
    Failed { attempts: usize, error: ServiceError },
}

pub async fn retry_with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let mut attempt = 0;

    loop {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            result = operation() => result,
        };

        let error = match result {
            Ok(value) => {
                if attempt > 0 {
                    tracing::debug!(attempt = attempt + 1, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        if !error.is_retryable() {
            return Err(RetryError::Failed { attempts: attempt + 1, error });
        }

        if attempt >= policy.max_retries {
            tracing::warn!(
                attempt = attempt + 1,
                max_retries = policy.max_retries,
                error = ?error,
                "max retries exhausted, giving up"
            );
            return Err(RetryError::Failed { attempts: attempt + 1, error });
        }

        let backoff = policy.backoff(attempt);
        tracing::warn!(
            attempt = attempt + 1,
            max_retries = policy.max_retries,
            backoff_ms = backoff.as_millis() as u64,
            error = ?error,
            "retryable error, backing off"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            _ = tokio::time::sleep(backoff) => {}
        }
        attempt += 1;
    }
}
