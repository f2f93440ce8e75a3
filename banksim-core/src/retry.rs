//! Retry strategy - exponential backoff with jitter for storage writes

use crate::config::RetryConfig;
use crate::Result;
use std::time::Duration;
use tracing::{info, warn};

/// Exponential backoff runner
#[derive(Debug, Clone)]
pub struct RetryStrategy {
    config: RetryConfig,
    /// `None` retries until the operation succeeds
    max_retries: Option<u32>,
}

impl RetryStrategy {
    /// Give up after `max_retries` retries
    pub fn new(config: RetryConfig, max_retries: u32) -> Self {
        Self {
            config,
            max_retries: Some(max_retries),
        }
    }

    /// Keep retrying transient failures forever
    pub fn unbounded(config: RetryConfig) -> Self {
        Self {
            config,
            max_retries: None,
        }
    }

    /// Delay before the nth retry (0-based)
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(32) as i32;
        let base_delay =
            self.config.initial_delay_ms as f64 * self.config.backoff_multiplier.powi(exponent);

        // Cap at max_delay
        let capped_delay = base_delay.min(self.config.max_delay_ms as f64);

        // Spread retries from concurrent callers
        let jitter_range = capped_delay * self.config.jitter_factor;
        let jitter = (rand::random::<f64>() - 0.5) * jitter_range * 2.0;
        let final_delay = (capped_delay + jitter).max(0.0);

        Duration::from_millis(final_delay as u64)
    }

    /// Run `operation`, retrying while it fails with a transient error.
    /// `on_retry` is called once per failed attempt that will be retried.
    pub async fn execute_with_retry<F, Fut, T, R>(
        &self,
        mut operation: F,
        operation_name: &str,
        mut on_retry: R,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
        R: FnMut(),
    {
        let mut attempt: u32 = 0;

        loop {
            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        info!(
                            operation = operation_name,
                            attempt, "Operation succeeded after retry"
                        );
                    }
                    return Ok(result);
                }
                Err(e) => {
                    if !e.is_transient() {
                        warn!(operation = operation_name, error = %e, "Non-retryable error");
                        return Err(e);
                    }
                    if let Some(max) = self.max_retries {
                        if attempt >= max {
                            warn!(
                                operation = operation_name,
                                attempts = attempt + 1,
                                error = %e,
                                "Retries exhausted"
                            );
                            return Err(e);
                        }
                    }

                    let delay = self.calculate_delay(attempt);
                    warn!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Attempt failed, retrying"
                    );
                    on_retry();
                    tokio::time::sleep(delay).await;
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config() -> RetryConfig {
        RetryConfig {
            initial_delay_ms: 1,
            max_delay_ms: 5,
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }

    #[test]
    fn test_delay_growth_and_cap() {
        let strategy = RetryStrategy::new(
            RetryConfig {
                initial_delay_ms: 100,
                max_delay_ms: 1_000,
                backoff_multiplier: 2.0,
                jitter_factor: 0.0,
            },
            3,
        );

        assert_eq!(strategy.calculate_delay(0), Duration::from_millis(100));
        assert_eq!(strategy.calculate_delay(1), Duration::from_millis(200));
        assert_eq!(strategy.calculate_delay(2), Duration::from_millis(400));
        assert_eq!(strategy.calculate_delay(10), Duration::from_millis(1_000));
        assert_eq!(strategy.calculate_delay(u32::MAX), Duration::from_millis(1_000));
    }

    #[tokio::test]
    async fn test_transient_errors_retried() {
        let strategy = RetryStrategy::unbounded(fast_config());
        let calls = AtomicU32::new(0);
        let mut retries = 0;

        let result = strategy
            .execute_with_retry(
                || async {
                    if calls.fetch_add(1, Ordering::SeqCst) < 3 {
                        Err(Error::PersistenceFailure("busy".into()))
                    } else {
                        Ok(42)
                    }
                },
                "test_op",
                || retries += 1,
            )
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(retries, 3);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let strategy = RetryStrategy::unbounded(fast_config());
        let calls = AtomicU32::new(0);

        let result: Result<()> = strategy
            .execute_with_retry(
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(Error::Internal("corrupt".into()))
                },
                "test_op",
                || {},
            )
            .await;

        assert!(matches!(result, Err(Error::Internal(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_bounded_gives_up() {
        let strategy = RetryStrategy::new(fast_config(), 2);
        let calls = AtomicU32::new(0);

        let result: Result<()> = strategy
            .execute_with_retry(
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(Error::PersistenceFailure("down".into()))
                },
                "test_op",
                || {},
            )
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
