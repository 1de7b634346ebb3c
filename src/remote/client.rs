//! Remote tier client: timeout, retry and circuit breaking around a
//! [`RemoteStore`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::RemoteConfig;
use crate::entry::{CacheKey, CacheValue};
use crate::error::CacheError;
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitConfig, CircuitError};
use crate::resilience::retry::{retry, RetryConfig};

use super::traits::{RemoteError, RemoteStore};

/// Wraps every remote call with a per-attempt timeout, bounded retry with
/// exponential backoff, and a circuit breaker.
///
/// Failures surface as [`CacheError::RemoteUnavailable`] once the attempt
/// budget is spent. A timed-out attempt counts as a failed attempt.
pub struct RemoteTierClient<K: CacheKey, V: CacheValue> {
    store: Arc<dyn RemoteStore<K, V>>,
    retry: RetryConfig,
    timeout: Duration,
    circuit: CircuitBreaker,
}

impl<K: CacheKey, V: CacheValue> RemoteTierClient<K, V> {
    pub fn new(store: Arc<dyn RemoteStore<K, V>>, config: &RemoteConfig) -> Self {
        Self::with_settings(store, config.retry(), config.timeout(), config.circuit())
    }

    pub fn with_settings(
        store: Arc<dyn RemoteStore<K, V>>,
        retry: RetryConfig,
        timeout: Duration,
        circuit: CircuitConfig,
    ) -> Self {
        Self {
            store,
            retry,
            timeout,
            circuit: CircuitBreaker::new("remote_tier", circuit),
        }
    }

    pub async fn get(&self, key: &K) -> Result<Option<V>, CacheError> {
        self.call("remote.get", || self.store.get(key)).await
    }

    pub async fn put(&self, key: &K, value: &V) -> Result<(), CacheError> {
        self.call("remote.put", || self.store.put(key, value)).await
    }

    pub async fn remove(&self, key: &K) -> Result<(), CacheError> {
        self.call("remote.remove", || self.store.remove(key)).await
    }

    /// Close the underlying connection. Not retried.
    pub async fn close(&self) -> Result<(), CacheError> {
        self.store
            .close()
            .await
            .map_err(|source| CacheError::RemoteUnavailable { operation: "remote.close", source })
    }

    #[must_use]
    pub fn circuit(&self) -> &CircuitBreaker {
        &self.circuit
    }

    async fn call<T, F, Fut>(&self, operation: &'static str, f: F) -> Result<T, CacheError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let start = std::time::Instant::now();
        let timeout = self.timeout;

        let result = self
            .circuit
            .call(|| {
                retry(operation, &self.retry, || {
                    let attempt = f();
                    async move {
                        match tokio::time::timeout(timeout, attempt).await {
                            Ok(outcome) => outcome,
                            Err(_) => {
                                crate::metrics::record_timeout("remote", operation);
                                Err(RemoteError::Timeout(timeout))
                            }
                        }
                    }
                })
            })
            .await;

        crate::metrics::record_latency("remote", operation, start.elapsed());
        match result {
            Ok(value) => {
                debug!(operation, "Remote call succeeded");
                crate::metrics::record_operation("remote", operation, "success");
                Ok(value)
            }
            Err(CircuitError::Rejected) => {
                warn!(operation, "Remote call rejected, circuit open");
                crate::metrics::record_operation("remote", operation, "rejected");
                Err(CacheError::RemoteUnavailable { operation, source: RemoteError::CircuitOpen })
            }
            Err(CircuitError::Inner(source)) => {
                warn!(operation, error = %source, "Remote call failed after retries");
                crate::metrics::record_operation("remote", operation, "error");
                Err(CacheError::RemoteUnavailable { operation, source })
            }
        }
    }
}
