//! Bounded timeout and retry for store and ledger calls.

use crate::config::GiftRoomConfig;
use crate::error::{AppError, AppResult};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    timeout: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_backoff: Duration, timeout: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            timeout,
        }
    }

    pub fn from_config(config: &GiftRoomConfig) -> Self {
        Self::new(
            config.ledger_max_attempts,
            config.retry_backoff(),
            config.ledger_timeout(),
        )
    }

    /// Same timeout, a single attempt. For operations that are not idempotent.
    pub fn single_attempt(&self) -> Self {
        Self {
            max_attempts: 1,
            ..*self
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. Each attempt is bounded by the timeout; a
    /// timed-out attempt counts as a retryable `Network` error.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let mut attempt = 1;
        let mut backoff = self.initial_backoff;

        loop {
            let result = match tokio::time::timeout(self.timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(AppError::Network(format!(
                    "{} timed out after {:?}",
                    operation, self.timeout
                ))),
            };

            match result {
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    warn!(
                        "{} failed (attempt {}/{}): {}; retrying in {:?}",
                        operation, attempt, self.max_attempts, e, backoff
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_retries_transient_errors_until_success() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let result = policy(3)
            .run("flaky", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(AppError::Network("connection reset".into()))
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_surfaces_error_after_budget_is_spent() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let result: AppResult<()> = policy(2)
            .run("down", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AppError::Network("unreachable".into()))
            })
            .await;

        assert!(matches!(result, Err(AppError::Network(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_business_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let result: AppResult<()> = policy(5)
            .run("join", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(AppError::RoomFull)
            })
            .await;

        assert!(matches!(result, Err(AppError::RoomFull)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_becomes_network_error() {
        let policy = RetryPolicy::new(1, Duration::from_millis(1), Duration::from_millis(10));
        let result: AppResult<()> = policy
            .run("slow", || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        let err = result.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.code(), "NETWORK_ERROR");
    }

    #[test]
    fn test_single_attempt_keeps_timeout() {
        let policy = policy(3).single_attempt();
        assert_eq!(policy.max_attempts(), 1);
    }
}
