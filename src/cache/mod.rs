// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Tiered cache: local tiers in front of the shared remote store.
//!
//! # Architecture
//!
//! ```text
//!   get ──► heap ──► offheap ──► remote
//!            ▲          │           │
//!            └─promote──┘           │
//!            ▲                      │
//!            └──────populate────────┘
//!
//!   put ──► heap, offheap (evicting as needed) ──► remote (write-through)
//!                  ▲                                   │ failure
//!                  └──────────invalidate───────────────┘
//! ```
//!
//! The remote store is authoritative. A local tier may lack a key the remote
//! holds, but never holds a value the remote has rejected: a failed
//! write-through removes the key from every local tier before the error is
//! returned.
//!
//! Local copies are kept in step with the remote per stripe of keys. A put
//! or remove marks its stripe in flight from before its local change until
//! its remote call has finished, bumping the stripe's generation on both
//! edges. A writer that saw another write on its stripe while its remote
//! call ran drops the key locally. A reader only promotes or populates when
//! no write was in flight as it sampled the generation and the generation
//! is unchanged before and after copying. Otherwise only the caller sees
//! the value.

mod manager;
mod types;

pub use manager::CacheManager;
pub use types::{CacheStats, ManagerState};

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::entry::{CacheKey, CacheValue};
use crate::error::CacheError;
use crate::metrics::LatencyTimer;
use crate::pool::CapacityPool;
use crate::remote::RemoteTierClient;
use crate::tier::LocalTier;

/// A key/value cache over ordered local tiers (fastest first) and the remote
/// tier.
pub struct TieredCache<K: CacheKey, V: CacheValue> {
    alias: String,
    tiers: Vec<LocalTier<K, V>>,
    remote: Arc<RemoteTierClient<K, V>>,
    stripes: Vec<WriteStripe>,
    closed: AtomicBool,
}

/// Write bookkeeping for the keys hashing to one stripe.
#[derive(Default)]
struct WriteStripe {
    generation: AtomicU64,
    in_flight: AtomicU64,
}

impl WriteStripe {
    /// Current generation, or `None` while a write is in flight.
    fn quiet_generation(&self) -> Option<u64> {
        let generation = self.generation.load(Ordering::SeqCst);
        (self.in_flight.load(Ordering::SeqCst) == 0).then_some(generation)
    }

    fn unchanged_since(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }
}

/// Marks a stripe in flight for the lifetime of one put or remove,
/// including when the caller drops the future midway.
struct WriteGuard<'a> {
    stripe: &'a WriteStripe,
    started: u64,
}

impl<'a> WriteGuard<'a> {
    fn begin(stripe: &'a WriteStripe) -> Self {
        stripe.in_flight.fetch_add(1, Ordering::SeqCst);
        let started = stripe.generation.fetch_add(1, Ordering::SeqCst) + 1;
        Self { stripe, started }
    }

    /// Whether another write began or finished on this stripe since `begin`.
    fn overlapped(&self) -> bool {
        !self.stripe.unchanged_since(self.started)
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.stripe.generation.fetch_add(1, Ordering::SeqCst);
        self.stripe.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<K: CacheKey, V: CacheValue> TieredCache<K, V> {
    /// Build the tiers described by `config`. Shared pools are looked up by
    /// name and must already exist.
    pub fn from_config(
        config: &CacheConfig,
        shared_pools: &HashMap<String, Arc<CapacityPool>>,
        remote: Arc<RemoteTierClient<K, V>>,
    ) -> Result<Self, CacheError> {
        let tiers = config
            .tiers
            .iter()
            .map(|tier| LocalTier::from_config(tier, shared_pools))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(config.alias.clone(), tiers, remote, config.write_stripes)
    }

    pub fn new(
        alias: impl Into<String>,
        tiers: Vec<LocalTier<K, V>>,
        remote: Arc<RemoteTierClient<K, V>>,
        write_stripes: usize,
    ) -> Result<Self, CacheError> {
        let alias = alias.into();
        if tiers.is_empty() {
            return Err(CacheError::Config(format!("cache '{}' has no local tiers", alias)));
        }
        Ok(Self {
            alias,
            tiers,
            remote,
            stripes: (0..write_stripes.max(1)).map(|_| WriteStripe::default()).collect(),
            closed: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.alias
    }

    /// Look up a key: local tiers fast-to-slow, then the remote tier.
    ///
    /// A hit in a slower tier is promoted into every faster tier. A remote
    /// hit populates all local tiers. Remote failure is reported as
    /// [`CacheError::CacheUnavailable`], never as a miss.
    #[tracing::instrument(skip_all, fields(cache = %self.alias, key = ?key))]
    pub async fn get(&self, key: &K) -> Result<Option<V>, CacheError> {
        self.ensure_open()?;
        let _timer = LatencyTimer::new("cache", "get");

        let stripe = self.stripe(key);
        let generation = stripe.quiet_generation();

        for (index, tier) in self.tiers.iter().enumerate() {
            if let Some(value) = tier.get(key) {
                debug!(tier = tier.name(), "Local hit");
                if index > 0 {
                    self.copy_if_unchanged(stripe, generation, key, &value, index);
                }
                return Ok(Some(value));
            }
        }

        let fetched = self.remote.get(key).await.map_err(|e| match e {
            CacheError::RemoteUnavailable { source, .. } => {
                crate::metrics::record_error(&self.alias, "get", "cache_unavailable");
                CacheError::CacheUnavailable { source }
            }
            other => other,
        })?;

        let Some(value) = fetched else {
            crate::metrics::record_read_through(&self.alias, "absent");
            return Ok(None);
        };

        let outcome = self.copy_if_unchanged(stripe, generation, key, &value, self.tiers.len());
        crate::metrics::record_read_through(&self.alias, outcome);
        Ok(Some(value))
    }

    /// Write to every local tier, then through to the remote tier.
    ///
    /// On remote failure the key is removed from every local tier and
    /// [`CacheError::WriteThrough`] is returned.
    #[tracing::instrument(skip_all, fields(cache = %self.alias, key = ?key))]
    pub async fn put(&self, key: K, value: V) -> Result<(), CacheError> {
        self.ensure_open()?;
        let _timer = LatencyTimer::new("cache", "put");
        let write = WriteGuard::begin(self.stripe(&key));

        for tier in &self.tiers {
            match tier.put(key.clone(), value.clone()) {
                Ok(_) => {}
                Err(e @ (CacheError::EntryTooLarge { .. } | CacheError::PoolExhausted { .. })) => {
                    // The tier can't hold the new value; make sure it doesn't keep the old one.
                    debug!(tier = tier.name(), error = %e, "Tier skipped for this entry");
                    tier.remove(&key);
                }
                Err(e) => {
                    warn!(tier = tier.name(), error = %e, "Local write failed");
                    self.invalidate(&key);
                    return Err(e);
                }
            }
        }

        if let Err(e) = self.remote.put(&key, &value).await {
            self.invalidate(&key);
            warn!(error = %e, "Write-through failed, key invalidated locally");
            crate::metrics::record_error(&self.alias, "put", "write_through");
            return Err(match e {
                CacheError::RemoteUnavailable { source, .. } => CacheError::WriteThrough { source },
                other => other,
            });
        }
        if write.overlapped() {
            // Remote order between overlapping writes is unknown.
            debug!("Concurrent write on stripe, dropping local copies");
            self.invalidate(&key);
        }
        Ok(())
    }

    /// Remove from every local tier, then from the remote tier.
    ///
    /// Returns whether any local tier held the key. Local removal stays
    /// applied if the remote call fails.
    #[tracing::instrument(skip_all, fields(cache = %self.alias, key = ?key))]
    pub async fn remove(&self, key: &K) -> Result<bool, CacheError> {
        self.ensure_open()?;
        let write = WriteGuard::begin(self.stripe(key));
        let removed = self.invalidate(key);

        let result = self.remote.remove(key).await;
        if write.overlapped() {
            self.invalidate(key);
        }
        result.map_err(|e| {
            crate::metrics::record_error(&self.alias, "remove", "remote_unavailable");
            e
        })?;
        Ok(removed)
    }

    /// Whether any local tier currently holds the key. No remote call.
    #[must_use]
    pub fn contains_local(&self, key: &K) -> bool {
        self.tiers.iter().any(|tier| tier.contains(key))
    }

    /// Drop every local entry. The remote tier is untouched.
    pub fn clear_local(&self) {
        for tier in &self.tiers {
            tier.clear();
        }
    }

    #[must_use]
    pub fn tiers(&self) -> &[LocalTier<K, V>] {
        &self.tiers
    }

    #[must_use]
    pub fn remote(&self) -> &RemoteTierClient<K, V> {
        &self.remote
    }

    /// Snapshot of every local tier. Also refreshes the pool and tier gauges.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let tiers: Vec<_> = self.tiers.iter().map(LocalTier::stats).collect();
        for tier in &tiers {
            crate::metrics::set_tier_entries(&tier.name, tier.entries);
            for pool in &tier.pools {
                crate::metrics::set_pool_usage(&pool.name, pool.usage, pool.limit);
            }
        }
        CacheStats {
            alias: self.alias.clone(),
            tiers,
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Reject further calls and release all local capacity.
    pub(crate) fn shut_down(&self) {
        self.closed.store(true, Ordering::Release);
        self.clear_local();
    }

    // --- Internal helpers ---

    fn ensure_open(&self) -> Result<(), CacheError> {
        if self.is_closed() {
            return Err(CacheError::Closed);
        }
        Ok(())
    }

    /// Copy a value into tiers `0..upto`, fastest first.
    /// Failures are logged and never reach the caller.
    fn populate(&self, key: &K, value: &V, upto: usize) {
        for tier in &self.tiers[..upto] {
            match tier.put(key.clone(), value.clone()) {
                Ok(_) => crate::metrics::record_promotion(&self.alias, tier.name()),
                Err(e) => debug!(tier = tier.name(), error = %e, "Promotion skipped"),
            }
        }
    }

    /// Copy a value into tiers `0..upto` unless a write on the key's stripe
    /// was in flight at `generation` or started since. A write that starts
    /// while copying drops the key from every tier again.
    fn copy_if_unchanged(
        &self,
        stripe: &WriteStripe,
        generation: Option<u64>,
        key: &K,
        value: &V,
        upto: usize,
    ) -> &'static str {
        let Some(generation) = generation.filter(|g| stripe.unchanged_since(*g)) else {
            debug!("Write in flight on stripe, not copying");
            return "skipped";
        };
        self.populate(key, value, upto);
        if stripe.unchanged_since(generation) {
            "loaded"
        } else {
            debug!("Concurrent write while copying, dropping local copies");
            self.invalidate(key);
            "stale"
        }
    }

    /// Remove the key from every local tier. True if any held it.
    fn invalidate(&self, key: &K) -> bool {
        self.tiers
            .iter()
            .fold(false, |removed, tier| tier.remove(key) | removed)
    }

    fn stripe(&self, key: &K) -> &WriteStripe {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() % self.stripes.len() as u64) as usize;
        &self.stripes[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eviction::EvictionPolicyKind;
    use crate::pool::PoolUnit;
    use crate::remote::{InMemoryRemoteStore, RemoteError, RemoteStore};
    use crate::resilience::circuit_breaker::CircuitConfig;
    use crate::resilience::retry::RetryConfig;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Counts calls and fails every call while `down` is set.
    #[derive(Default)]
    struct ToggleStore {
        inner: InMemoryRemoteStore<u64, String>,
        down: AtomicBool,
        gets: AtomicUsize,
        puts: AtomicUsize,
    }

    impl ToggleStore {
        fn check(&self) -> Result<(), RemoteError> {
            if self.down.load(Ordering::SeqCst) {
                return Err(RemoteError::Connection("down".into()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl RemoteStore<u64, String> for ToggleStore {
        async fn get(&self, key: &u64) -> Result<Option<String>, RemoteError> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            self.check()?;
            self.inner.get(key).await
        }
        async fn put(&self, key: &u64, value: &String) -> Result<(), RemoteError> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            self.check()?;
            self.inner.put(key, value).await
        }
        async fn remove(&self, key: &u64) -> Result<(), RemoteError> {
            self.check()?;
            self.inner.remove(key).await
        }
    }

    /// Parks `put` once `gated` is set, until the test releases it.
    #[derive(Default)]
    struct GatedStore {
        inner: InMemoryRemoteStore<u64, String>,
        gated: AtomicBool,
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl RemoteStore<u64, String> for GatedStore {
        async fn get(&self, key: &u64) -> Result<Option<String>, RemoteError> {
            self.inner.get(key).await
        }
        async fn put(&self, key: &u64, value: &String) -> Result<(), RemoteError> {
            if self.gated.load(Ordering::SeqCst) {
                self.entered.notify_one();
                self.release.notified().await;
            }
            self.inner.put(key, value).await
        }
        async fn remove(&self, key: &u64) -> Result<(), RemoteError> {
            self.inner.remove(key).await
        }
    }

    fn tier(name: &str, unit: PoolUnit, limit: u64) -> LocalTier<u64, String> {
        let pool = Arc::new(CapacityPool::new(format!("{}-{}", name, unit), unit, limit).unwrap());
        LocalTier::new(name, vec![pool], EvictionPolicyKind::Lru.build()).unwrap()
    }

    fn cache(store: Arc<ToggleStore>) -> TieredCache<u64, String> {
        let remote = RemoteTierClient::with_settings(
            store,
            RetryConfig::test(),
            Duration::from_millis(50),
            CircuitConfig::test(),
        );
        TieredCache::new(
            "test",
            vec![tier("heap", PoolUnit::Count, 2), tier("offheap", PoolUnit::Bytes, 256)],
            Arc::new(remote),
            8,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_put_then_get_is_local() {
        let store = Arc::new(ToggleStore::default());
        let cache = cache(store.clone());

        cache.put(1, "one".into()).await.unwrap();
        assert_eq!(cache.get(&1).await.unwrap().as_deref(), Some("one"));

        assert_eq!(store.gets.load(Ordering::SeqCst), 0);
        assert_eq!(store.inner.peek(&1).as_deref(), Some("one"));
    }

    #[tokio::test]
    async fn test_read_through_populates_all_tiers() {
        let store = Arc::new(ToggleStore::default());
        store.inner.put(&7, &"seven".to_string()).await.unwrap();
        let cache = cache(store.clone());

        assert_eq!(cache.get(&7).await.unwrap().as_deref(), Some("seven"));
        assert!(cache.tiers()[0].contains(&7));
        assert!(cache.tiers()[1].contains(&7));

        cache.get(&7).await.unwrap();
        assert_eq!(store.gets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hit_in_slower_tier_promotes() {
        let store = Arc::new(ToggleStore::default());
        let cache = cache(store.clone());
        for k in 1..=3u64 {
            cache.put(k, format!("v{}", k)).await.unwrap();
        }
        // heap holds two entries; key 1 now lives only in offheap
        assert!(!cache.tiers()[0].contains(&1));
        assert!(cache.tiers()[1].contains(&1));

        assert_eq!(cache.get(&1).await.unwrap().as_deref(), Some("v1"));
        assert!(cache.tiers()[0].contains(&1));
        assert_eq!(store.gets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_remote_miss_is_none() {
        let cache = cache(Arc::new(ToggleStore::default()));
        assert_eq!(cache.get(&404).await.unwrap(), None);
        assert!(!cache.contains_local(&404));
    }

    #[tokio::test]
    async fn test_remote_error_on_read_is_cache_unavailable() {
        let store = Arc::new(ToggleStore::default());
        store.down.store(true, Ordering::SeqCst);
        let cache = cache(store);

        let err = cache.get(&1).await.unwrap_err();
        assert!(matches!(err, CacheError::CacheUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_failed_write_through_invalidates() {
        let store = Arc::new(ToggleStore::default());
        let cache = cache(store.clone());
        cache.put(1, "old".into()).await.unwrap();

        store.down.store(true, Ordering::SeqCst);
        let err = cache.put(1, "new".into()).await.unwrap_err();

        assert!(matches!(err, CacheError::WriteThrough { .. }));
        assert!(!cache.contains_local(&1));
        for tier in cache.tiers() {
            assert_eq!(tier.pools()[0].usage(), 0);
        }
    }

    #[tokio::test]
    async fn test_read_during_pending_write_does_not_cache_old_value() {
        let store = Arc::new(GatedStore::default());
        store.inner.put(&1, &"old".to_string()).await.unwrap();
        let remote = RemoteTierClient::with_settings(
            store.clone() as Arc<dyn RemoteStore<u64, String>>,
            RetryConfig::test(),
            Duration::from_secs(30),
            CircuitConfig::test(),
        );
        let cache = Arc::new(
            TieredCache::new(
                "test",
                vec![tier("heap", PoolUnit::Count, 2), tier("offheap", PoolUnit::Bytes, 256)],
                Arc::new(remote),
                8,
            )
            .unwrap(),
        );

        store.gated.store(true, Ordering::SeqCst);
        let writer = tokio::spawn({
            let cache = cache.clone();
            async move { cache.put(1, "new".into()).await }
        });
        store.entered.notified().await;

        // The local copy is evicted while the remote write is still pending
        for tier in cache.tiers() {
            tier.remove(&1);
        }
        assert_eq!(cache.get(&1).await.unwrap().as_deref(), Some("old"));
        assert!(!cache.contains_local(&1), "value read mid-write must not be cached");

        store.release.notify_one();
        writer.await.unwrap().unwrap();

        assert_eq!(store.inner.peek(&1).as_deref(), Some("new"));
        assert_eq!(cache.get(&1).await.unwrap().as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_read_after_write_completes_is_cached() {
        let store = Arc::new(ToggleStore::default());
        let cache = cache(store.clone());
        cache.put(1, "v".into()).await.unwrap();
        cache.clear_local();

        assert_eq!(cache.get(&1).await.unwrap().as_deref(), Some("v"));
        assert!(cache.contains_local(&1));
    }

    #[tokio::test]
    async fn test_remove_reports_local_presence() {
        let store = Arc::new(ToggleStore::default());
        let cache = cache(store.clone());
        cache.put(1, "x".into()).await.unwrap();

        assert!(cache.remove(&1).await.unwrap());
        assert!(!cache.remove(&1).await.unwrap());
        assert!(store.inner.peek(&1).is_none());
    }

    #[tokio::test]
    async fn test_remove_applies_locally_when_remote_fails() {
        let store = Arc::new(ToggleStore::default());
        let cache = cache(store.clone());
        cache.put(1, "x".into()).await.unwrap();
        store.down.store(true, Ordering::SeqCst);

        let err = cache.remove(&1).await.unwrap_err();
        assert!(matches!(err, CacheError::RemoteUnavailable { .. }));
        assert!(!cache.contains_local(&1));
    }

    #[tokio::test]
    async fn test_oversized_value_skips_tier_but_is_written() {
        let store = Arc::new(ToggleStore::default());
        let cache = cache(store.clone());
        cache.put(1, "small".into()).await.unwrap();

        let big = "x".repeat(512);
        cache.put(1, big.clone()).await.unwrap();

        assert_eq!(cache.tiers()[0].peek(&1).map(|e| e.value), Some(big.clone()));
        assert!(!cache.tiers()[1].contains(&1), "offheap must not keep the old value");
        assert_eq!(store.inner.peek(&1), Some(big));
    }

    #[tokio::test]
    async fn test_closed_cache_rejects_calls() {
        let cache = cache(Arc::new(ToggleStore::default()));
        cache.put(1, "x".into()).await.unwrap();

        cache.shut_down();

        assert!(matches!(cache.get(&1).await, Err(CacheError::Closed)));
        assert!(matches!(cache.put(2, "y".into()).await, Err(CacheError::Closed)));
        assert_eq!(cache.stats().total_entries(), 0);
    }

    #[test]
    fn test_cache_needs_a_tier() {
        let remote = RemoteTierClient::with_settings(
            Arc::new(ToggleStore::default()) as Arc<dyn RemoteStore<u64, String>>,
            RetryConfig::test(),
            Duration::from_millis(10),
            CircuitConfig::test(),
        );
        let result = TieredCache::new("empty", Vec::new(), Arc::new(remote), 4);
        assert!(matches!(result, Err(CacheError::Config(_))));
    }
}
