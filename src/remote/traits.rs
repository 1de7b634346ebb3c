use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::entry::{CacheKey, CacheValue};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("remote backend error: {0}")]
    Backend(String),
    #[error("remote connection error: {0}")]
    Connection(String),
    #[error("remote call timed out after {0:?}")]
    Timeout(Duration),
    #[error("circuit breaker open, remote tier presumed down")]
    CircuitOpen,
}

/// The authoritative shared store behind the local tiers.
///
/// Implementations talk to the clustered server; the cache only relies on
/// this contract. Not-found is `Ok(None)`, never an error.
#[async_trait]
pub trait RemoteStore<K: CacheKey, V: CacheValue>: Send + Sync {
    async fn get(&self, key: &K) -> Result<Option<V>, RemoteError>;
    async fn put(&self, key: &K, value: &V) -> Result<(), RemoteError>;
    async fn remove(&self, key: &K) -> Result<(), RemoteError>;

    /// Release the underlying connection.
    /// Default implementation has nothing to release.
    async fn close(&self) -> Result<(), RemoteError> {
        Ok(())
    }
}

/// Opens a connection to the shared store at a server URI.
#[async_trait]
pub trait Connector<K: CacheKey, V: CacheValue>: Send + Sync {
    async fn connect(&self, uri: &str) -> Result<Arc<dyn RemoteStore<K, V>>, RemoteError>;
}
