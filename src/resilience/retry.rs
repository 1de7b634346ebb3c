// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry logic with exponential backoff.
//!
//! Every remote-tier call runs through [`retry`]. Two presets cover the
//! cache's needs: a patient one for establishing the connection and a quick
//! one for individual get/put/remove calls.
//!
//! # Example
//!
//! ```
//! use tiered_cache::RetryConfig;
//!
//! // Connect: a few more attempts, slower backoff
//! let connect = RetryConfig::connect();
//! assert_eq!(connect.max_retries, Some(5));
//!
//! // Operation: quick retry, then surface the error
//! let op = RetryConfig::operation();
//! assert_eq!(op.max_retries, Some(3));
//! ```

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Configuration for remote call retry behavior.
///
/// `max_retries` counts total attempts, including the first. `None` retries
/// forever.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    pub max_retries: Option<usize>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::operation()
    }
}

impl RetryConfig {
    /// Retry for establishing the remote connection.
    /// 5 attempts, failing after a few seconds so bad addresses surface quickly.
    #[must_use]
    pub fn connect() -> Self {
        Self {
            max_retries: Some(5),
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            factor: 2.0,
        }
    }

    /// Quick retry for individual cache operations.
    /// 3 attempts with fast backoff - if it fails, the caller decides.
    #[must_use]
    pub fn operation() -> Self {
        Self {
            max_retries: Some(3),
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            factor: 2.0,
        }
    }

    /// Fast retry for tests (minimal delays)
    #[must_use]
    pub fn test() -> Self {
        Self {
            max_retries: Some(3),
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            factor: 2.0,
        }
    }

    /// Delay before the attempt following one that waited `delay`.
    #[must_use]
    #[inline]
    pub fn next_delay(&self, delay: Duration) -> Duration {
        delay.mul_f64(self.factor).min(self.max_delay)
    }
}

/// Run `operation` until it succeeds or the attempt budget is spent.
/// Returns the last error on exhaustion.
pub async fn retry<F, Fut, T, E>(
    operation_name: &str,
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = config.initial_delay;
    let mut attempts = 0;

    loop {
        match operation().await {
            Ok(val) => {
                if attempts > 0 {
                    info!("Operation '{}' succeeded after {} retries", operation_name, attempts);
                }
                return Ok(val);
            }
            Err(err) => {
                attempts += 1;

                match config.max_retries {
                    Some(max) if attempts >= max => {
                        warn!(
                            "Operation '{}' failed after {} attempts, giving up: {}",
                            operation_name, attempts, err
                        );
                        crate::metrics::record_retry_exhausted(operation_name);
                        return Err(err);
                    }
                    Some(max) => warn!(
                        "Operation '{}' failed (attempt {}/{}): {}. Retrying in {:?}...",
                        operation_name, attempts, max, err, delay
                    ),
                    None => warn!(
                        "Operation '{}' failed (attempt {}, will retry forever): {}. Next retry in {:?}...",
                        operation_name, attempts, err, delay
                    ),
                }

                sleep(delay).await;
                delay = config.next_delay(delay);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    struct TestError(String);

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    #[tokio::test]
    async fn test_retry_succeeds_first_try() {
        let result: Result<i32, TestError> = retry(
            "test_op",
            &RetryConfig::test(),
            || async { Ok(42) },
        ).await;

        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();

        let result: Result<i32, TestError> = retry(
            "test_op",
            &RetryConfig::test(),
            || {
                let a = attempts_clone.clone();
                async move {
                    let count = a.fetch_add(1, Ordering::SeqCst) + 1;
                    if count < 3 {
                        Err(TestError(format!("fail {}", count)))
                    } else {
                        Ok(42)
                    }
                }
            },
        ).await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhausts_attempts() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();

        let result: Result<i32, TestError> = retry(
            "test_op",
            &RetryConfig::test(),
            || {
                let a = attempts_clone.clone();
                async move {
                    a.fetch_add(1, Ordering::SeqCst);
                    Err(TestError("always fail".to_string()))
                }
            },
        ).await;

        assert!(result.unwrap_err().0.contains("always fail"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_single_attempt_does_not_sleep() {
        let config = RetryConfig {
            max_retries: Some(1),
            initial_delay: Duration::from_secs(3600),
            max_delay: Duration::from_secs(3600),
            factor: 2.0,
        };

        let result: Result<(), TestError> = tokio::time::timeout(
            Duration::from_secs(1),
            retry("test_op", &config, || async { Err(TestError("nope".into())) }),
        )
        .await
        .expect("a single attempt must not back off");

        assert!(result.is_err());
    }

    #[test]
    fn test_retry_config_presets() {
        assert_eq!(RetryConfig::connect().max_retries, Some(5));
        assert_eq!(RetryConfig::operation().max_retries, Some(3));
        assert_eq!(RetryConfig::default().max_retries, Some(3));
    }

    #[test]
    fn test_delay_exponential_backoff() {
        let config = RetryConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            factor: 2.0,
            max_retries: Some(5),
        };

        let mut delay = config.initial_delay;
        assert_eq!(delay, Duration::from_millis(100));

        delay = config.next_delay(delay);
        assert_eq!(delay, Duration::from_millis(200));

        delay = config.next_delay(delay);
        assert_eq!(delay, Duration::from_millis(400));
    }

    #[test]
    fn test_delay_caps_at_max() {
        let config = RetryConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            factor: 10.0,
            max_retries: Some(5),
        };

        assert_eq!(config.next_delay(config.initial_delay), Duration::from_secs(5));
    }
}
