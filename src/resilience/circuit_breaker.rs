// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Fail-fast guard for the remote tier, built on `recloser`.
//!
//! The breaker wraps the whole retry loop of one remote call, so a tripped
//! breaker skips the retry and timeout budget entirely. A rejected call
//! reaches the cache as [`RemoteError::CircuitOpen`](crate::RemoteError).
//!
//! Trips once more than half of the last `failure_threshold` calls failed,
//! stays open for `recovery_timeout`, then lets `success_threshold` trial
//! calls decide whether to close again.

use std::future::Future;
use std::time::Duration;

use recloser::{AsyncRecloser, Error as RecloserError, Recloser};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum CircuitError<E> {
    #[error("circuit open, remote call skipped")]
    Rejected,

    #[error("remote call failed: {0}")]
    Inner(#[source] E),
}

#[derive(Debug, Clone)]
pub struct CircuitConfig {
    /// Calls in the closed-state window
    pub failure_threshold: u32,
    /// Trial calls while half-open
    pub success_threshold: u32,
    pub recovery_timeout: Duration,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            recovery_timeout: Duration::from_secs(30),
        }
    }
}

impl CircuitConfig {
    #[must_use]
    pub fn test() -> Self {
        Self {
            failure_threshold: 2,
            success_threshold: 1,
            recovery_timeout: Duration::from_millis(50),
        }
    }
}

pub struct CircuitBreaker {
    name: String,
    inner: AsyncRecloser,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitConfig) -> Self {
        let recloser = Recloser::custom()
            .error_rate(0.5)
            .closed_len(config.failure_threshold as usize)
            .half_open_len(config.success_threshold as usize)
            .open_wait(config.recovery_timeout)
            .build();
        Self { name: name.into(), inner: recloser.into() }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `f` unless the circuit is open. `f` is not invoked on rejection.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let (outcome, result) = match self.inner.call(f()).await {
            Ok(value) => ("success", Ok(value)),
            Err(RecloserError::Rejected) => {
                warn!(circuit = %self.name, "Circuit open, call skipped");
                ("rejected", Err(CircuitError::Rejected))
            }
            Err(RecloserError::Inner(e)) => ("failure", Err(CircuitError::Inner(e))),
        };
        debug!(circuit = %self.name, outcome, "Circuit call finished");
        crate::metrics::record_circuit_call(&self.name, outcome);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn slow_recovery() -> CircuitConfig {
        CircuitConfig {
            failure_threshold: 2,
            success_threshold: 1,
            recovery_timeout: Duration::from_secs(60),
        }
    }

    async fn fail(cb: &CircuitBreaker) {
        let _: Result<(), CircuitError<&str>> = cb.call(|| async { Err("down") }).await;
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let cb = CircuitBreaker::new("remote_tier", CircuitConfig::test());
        let result: Result<u64, CircuitError<&str>> = cb.call(|| async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_inner_error_is_wrapped() {
        let cb = CircuitBreaker::new("remote_tier", CircuitConfig::test());
        let result: Result<(), CircuitError<&str>> = cb.call(|| async { Err("boom") }).await;
        assert!(matches!(result, Err(CircuitError::Inner("boom"))));
    }

    #[tokio::test]
    async fn test_open_circuit_skips_the_call() {
        let cb = CircuitBreaker::new("remote_tier", slow_recovery());
        for _ in 0..4 {
            fail(&cb).await;
        }

        let ran = Arc::new(AtomicUsize::new(0));
        let counter = ran.clone();
        let result: Result<(), CircuitError<&str>> = cb
            .call(|| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(CircuitError::Rejected)));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_recovers_after_open_wait() {
        let cb = CircuitBreaker::new("remote_tier", CircuitConfig::test());
        for _ in 0..4 {
            fail(&cb).await;
        }

        tokio::time::sleep(Duration::from_millis(80)).await;
        let result: Result<u8, CircuitError<&str>> = cb.call(|| async { Ok(1) }).await;
        assert_eq!(result.unwrap(), 1);
    }
}
