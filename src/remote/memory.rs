use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::info;

use crate::entry::{CacheKey, CacheValue};
use super::traits::{Connector, RemoteError, RemoteStore};

/// In-process stand-in for the clustered store.
///
/// Behaves like a single logical shared store: every cache connected to the
/// same instance sees the same data.
pub struct InMemoryRemoteStore<K: CacheKey, V: CacheValue> {
    data: DashMap<K, V>,
    closed: AtomicBool,
}

impl<K: CacheKey, V: CacheValue> InMemoryRemoteStore<K, V> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Get current item count
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Read a value without going through the trait (test inspection).
    #[must_use]
    pub fn peek(&self, key: &K) -> Option<V> {
        self.data.get(key).map(|r| r.value().clone())
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn clear(&self) {
        self.data.clear();
    }

    fn ensure_open(&self) -> Result<(), RemoteError> {
        if self.is_closed() {
            return Err(RemoteError::Connection("connection closed".into()));
        }
        Ok(())
    }
}

impl<K: CacheKey, V: CacheValue> Default for InMemoryRemoteStore<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K: CacheKey, V: CacheValue> RemoteStore<K, V> for InMemoryRemoteStore<K, V> {
    async fn get(&self, key: &K) -> Result<Option<V>, RemoteError> {
        self.ensure_open()?;
        Ok(self.peek(key))
    }

    async fn put(&self, key: &K, value: &V) -> Result<(), RemoteError> {
        self.ensure_open()?;
        self.data.insert(key.clone(), value.clone());
        Ok(())
    }

    async fn remove(&self, key: &K) -> Result<(), RemoteError> {
        self.ensure_open()?;
        self.data.remove(key);
        Ok(())
    }

    async fn close(&self) -> Result<(), RemoteError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Connector that hands out one shared [`InMemoryRemoteStore`] for any URI.
pub struct InMemoryConnector<K: CacheKey, V: CacheValue> {
    store: Arc<InMemoryRemoteStore<K, V>>,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K: CacheKey, V: CacheValue> InMemoryConnector<K, V> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_store(Arc::new(InMemoryRemoteStore::new()))
    }

    #[must_use]
    pub fn with_store(store: Arc<InMemoryRemoteStore<K, V>>) -> Self {
        Self { store, _marker: PhantomData }
    }

    /// The store every connection from this connector shares.
    #[must_use]
    pub fn store(&self) -> &Arc<InMemoryRemoteStore<K, V>> {
        &self.store
    }
}

impl<K: CacheKey, V: CacheValue> Default for InMemoryConnector<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K: CacheKey, V: CacheValue> Connector<K, V> for InMemoryConnector<K, V> {
    async fn connect(&self, uri: &str) -> Result<Arc<dyn RemoteStore<K, V>>, RemoteError> {
        if self.store.is_closed() {
            return Err(RemoteError::Connection(format!("{} refused: store closed", uri)));
        }
        info!(uri = %uri, "Connected to in-memory shared store");
        Ok(self.store.clone())
    }
}
