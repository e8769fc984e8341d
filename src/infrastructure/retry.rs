//! Bounded exponential backoff for remote calls.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::domain::errors::AlmError;
use crate::domain::models::RetryConfig;

/// Retry policy with exponential backoff
///
/// Waits `base_delay * 2^n` before retry `n` (0-based). Only errors for
/// which [`AlmError::is_transient`] holds are retried; everything else, and
/// the last transient error once attempts run out, is returned unchanged.
///
/// Requests that must not run twice use [`RetryPolicy::for_create`], which
/// only retries failures the backend cannot have acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first
    max_attempts: u32,
    /// Delay before the first retry
    base_delay: Duration,
    /// Retry only failures where the request was never processed
    unsent_only: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            unsent_only: false,
        }
    }
}

impl RetryPolicy {
    /// Create a policy. `max_attempts` below 1 is treated as 1.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            unsent_only: false,
        }
    }

    /// The same policy for a non-idempotent request such as a create.
    ///
    /// A timeout or 5xx may arrive after the backend committed the write,
    /// so only connect failures and 429 responses are retried.
    pub fn for_create(self) -> Self {
        Self {
            unsent_only: true,
            ..self
        }
    }

    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Build from configuration.
    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
        )
    }

    /// Total attempts including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Execute an operation, retrying transient failures.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, AlmError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AlmError>>,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        debug!(retries = attempt, "Operation succeeded after retry");
                    }
                    return Ok(result);
                }
                Err(err) => {
                    if !self.should_retry(&err, attempt) {
                        if err.is_transient() && attempt > 0 {
                            warn!(attempts = attempt + 1, error = %err, "Operation failed after retries");
                        }
                        return Err(err);
                    }
                    let backoff = self.calculate_backoff(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "Transient failure, retrying"
                    );
                    sleep(backoff).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Delay before retry `attempt` (0-based).
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2_u32.saturating_pow(attempt))
    }

    fn should_retry(&self, error: &AlmError, attempt: u32) -> bool {
        let retryable = if self.unsent_only {
            error.is_unsent()
        } else {
            error.is_transient()
        };
        attempt + 1 < self.max_attempts && retryable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1))
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.calculate_backoff(0), Duration::from_secs(1));
        assert_eq!(policy.calculate_backoff(1), Duration::from_secs(2));
        assert_eq!(policy.calculate_backoff(2), Duration::from_secs(4));
    }

    #[test]
    fn test_from_config() {
        let policy = RetryPolicy::from_config(&RetryConfig {
            max_attempts: 0,
            base_delay_ms: 250,
        });
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(policy.calculate_backoff(1), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = fast(3)
            .execute(|| async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(AlmError::Connection("reset".into()))
                } else {
                    Ok(n)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_with_last_error() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = fast(3)
            .execute(|| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(AlmError::Remote {
                    status: 503,
                    message: "unavailable".into(),
                })
            })
            .await;
        assert!(matches!(result, Err(AlmError::Remote { status: 503, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_create_policy_does_not_repeat_possibly_committed_writes() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = fast(3)
            .for_create()
            .execute(|| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(AlmError::Remote {
                    status: 502,
                    message: "bad gateway".into(),
                })
            })
            .await;
        assert!(matches!(result, Err(AlmError::Remote { status: 502, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let timeouts = AtomicU32::new(0);
        let counter = &timeouts;
        let result: Result<(), _> = fast(3)
            .for_create()
            .execute(|| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(AlmError::Connection("operation timed out".into()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(timeouts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_create_policy_retries_unsent_requests() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = fast(3)
            .for_create()
            .execute(|| async move {
                match counter.fetch_add(1, Ordering::SeqCst) {
                    0 => Err(AlmError::Unreachable("connection refused".into())),
                    1 => Err(AlmError::Remote {
                        status: 429,
                        message: "slow down".into(),
                    }),
                    n => Ok(n),
                }
            })
            .await;
        assert_eq!(result.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = fast(5)
            .execute(|| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(AlmError::Authentication("401".into()))
            })
            .await;
        assert!(matches!(result, Err(AlmError::Authentication(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
