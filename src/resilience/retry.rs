use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;

/// Bounded-retry policy: capped exponential backoff, multiplier 2.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }
}

/// Retries a single operation with exponential backoff.
///
/// Only errors classified retryable by [`Error::is_retryable`] are retried;
/// validation and non-transient upstream errors propagate immediately. On
/// exhaustion the last error is wrapped in [`Error::RetriesExhausted`] naming
/// the operation and attempt count.
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Delay before retry number `attempt + 1` (0-based failed attempt).
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.policy.base_delay.as_millis() as u64;
        let cap = self.policy.max_delay.as_millis() as u64;
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(base.saturating_mul(factor).min(cap))
    }

    pub async fn execute_with_retry<T, F, Fut>(&self, operation: &str, mut factory: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match factory().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if !err.is_retryable() {
                        return Err(err);
                    }
                    if attempt >= self.policy.max_retries.max(1) {
                        return Err(Error::RetriesExhausted {
                            operation: operation.to_string(),
                            attempts: attempt,
                            source: Box::new(err),
                        });
                    }
                    let delay = self.backoff_delay(attempt - 1);
                    tracing::warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn executor(max_retries: u32) -> RetryExecutor {
        RetryExecutor::new(
            RetryPolicy::new()
                .with_max_retries(max_retries)
                .with_base_delay(Duration::from_millis(1))
                .with_max_delay(Duration::from_millis(8)),
        )
    }

    #[test]
    fn test_backoff_schedule_is_capped_exponential() {
        let ex = RetryExecutor::new(
            RetryPolicy::new()
                .with_base_delay(Duration::from_millis(1000))
                .with_max_delay(Duration::from_millis(10_000)),
        );
        assert_eq!(ex.backoff_delay(0), Duration::from_millis(1000));
        assert_eq!(ex.backoff_delay(1), Duration::from_millis(2000));
        assert_eq!(ex.backoff_delay(2), Duration::from_millis(4000));
        assert_eq!(ex.backoff_delay(3), Duration::from_millis(8000));
        // capped at max_delay
        assert_eq!(ex.backoff_delay(4), Duration::from_millis(10_000));
        assert_eq!(ex.backoff_delay(40), Duration::from_millis(10_000));
    }

    #[tokio::test]
    async fn test_succeeds_without_retry() {
        let ex = executor(3);
        let attempts = AtomicU32::new(0);
        let out = ex
            .execute_with_retry("op", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Error>("done")
            })
            .await
            .unwrap();
        assert_eq!(out, "done");
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let ex = executor(3);
        let attempts = AtomicU32::new(0);
        let out = ex
            .execute_with_retry("op", || async {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(Error::upstream(503, "overloaded"))
                } else {
                    Ok("recovered")
                }
            })
            .await
            .unwrap();
        assert_eq!(out, "recovered");
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_yields_aggregate_error() {
        let ex = executor(3);
        let attempts = AtomicU32::new(0);
        let err = ex
            .execute_with_retry("generate", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Error::upstream(500, "boom"))
            })
            .await
            .unwrap_err();
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        match err {
            Error::RetriesExhausted {
                operation,
                attempts,
                ..
            } => {
                assert_eq!(operation, "generate");
                assert_eq!(attempts, 3);
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_retryable_propagates_immediately() {
        let ex = executor(3);
        let attempts = AtomicU32::new(0);
        let err = ex
            .execute_with_retry("op", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Error::upstream(400, "bad request"))
            })
            .await
            .unwrap_err();
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(matches!(err, Error::Upstream { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried() {
        let ex = executor(2);
        let attempts = AtomicU32::new(0);
        let _ = ex
            .execute_with_retry("op", || async {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Error::upstream(429, "slow down"))
            })
            .await;
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
