// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! A single local tier.
//!
//! Entries live in a sharded [`DashMap`], so operations on unrelated keys do
//! not contend on one lock. Pool usage is tracked by the pools themselves
//! (atomic check-and-add); every entry remembers exactly what it was charged
//! so eviction and removal give back the same amounts on every pool.
//!
//! No map guard is ever held while another map operation runs, which rules
//! out shard self-deadlock during eviction.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tiered_cache::{CapacityPool, EvictionPolicyKind, LocalTier, PoolUnit};
//!
//! let pool = Arc::new(CapacityPool::new("heap", PoolUnit::Count, 2).unwrap());
//! let tier = LocalTier::new("heap", vec![pool], EvictionPolicyKind::Lru.build()).unwrap();
//!
//! tier.put(1u64, "a".to_string()).unwrap();
//! tier.put(2u64, "b".to_string()).unwrap();
//! tier.get(&1);                               // 1 is now the most recent
//! let outcome = tier.put(3u64, "c".to_string()).unwrap();
//!
//! assert_eq!(outcome.evicted, vec![2]);
//! assert_eq!(tier.len(), 2);
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, trace, warn};

use crate::config::TierConfig;
use crate::entry::{entry_size, CacheEntry, CacheKey, CacheValue};
use crate::error::CacheError;
use crate::eviction::{EvictionPolicy, VictimCandidate};
use crate::pool::CapacityPool;

use super::{PoolStats, TierStats};

/// Yields a put will spend waiting on other puts' reservations before it
/// reports [`CacheError::PoolExhausted`].
const MAX_IN_FLIGHT_WAITS: u32 = 10_000;

/// What a successful [`LocalTier::put`] did to make room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOutcome<K> {
    /// Keys evicted, in eviction order
    pub evicted: Vec<K>,
    /// Whether an older value for the same key was dropped
    pub replaced: bool,
}

pub struct LocalTier<K: CacheKey, V: CacheValue> {
    name: Arc<str>,
    /// Own pool first, then shared pools, in declaration order
    pools: Vec<Arc<CapacityPool>>,
    entries: DashMap<K, CacheEntry<V>>,
    policy: Arc<dyn EvictionPolicy<K>>,
    /// Per pool: charges held by puts that are still between reserve and insert
    in_flight: Vec<AtomicU64>,
    /// Logical clock for access and insertion ordering
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<K: CacheKey, V: CacheValue> LocalTier<K, V> {
    pub fn new(
        name: impl Into<String>,
        pools: Vec<Arc<CapacityPool>>,
        policy: Arc<dyn EvictionPolicy<K>>,
    ) -> Result<Self, CacheError> {
        let name: String = name.into();
        if pools.is_empty() {
            return Err(CacheError::Config(format!("tier '{}' has no capacity pool", name)));
        }
        Ok(Self {
            name: Arc::from(name),
            in_flight: pools.iter().map(|_| AtomicU64::new(0)).collect(),
            pools,
            entries: DashMap::new(),
            policy,
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        })
    }

    /// Build a tier with its own pool, charging the named shared pools too.
    pub fn from_config(
        config: &TierConfig,
        shared_pools: &HashMap<String, Arc<CapacityPool>>,
    ) -> Result<Self, CacheError> {
        let own = CapacityPool::new(format!("{}-{}", config.name, config.unit), config.unit, config.limit)?;
        let mut pools = vec![Arc::new(own)];
        for pool_name in &config.shared_pools {
            let pool = shared_pools.get(pool_name).ok_or_else(|| {
                CacheError::Config(format!(
                    "tier '{}' references undeclared shared pool '{}'",
                    config.name, pool_name
                ))
            })?;
            pools.push(pool.clone());
        }
        Self::new(config.name.clone(), pools, config.eviction.build())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a value, refreshing its recency.
    pub fn get(&self, key: &K) -> Option<V> {
        let found = self.entries.get_mut(key).map(|mut entry| {
            entry.record_access(self.tick());
            entry.value.clone()
        });

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            crate::metrics::record_operation(&self.name, "get", "hit");
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            crate::metrics::record_operation(&self.name, "get", "miss");
        }
        found
    }

    /// Copy of the stored entry without touching its recency.
    #[must_use]
    pub fn peek(&self, key: &K) -> Option<CacheEntry<V>> {
        self.entries.get(key).map(|entry| entry.clone())
    }

    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or overwrite, evicting until every pool has room.
    ///
    /// An entry whose charge exceeds any pool's total limit is rejected with
    /// [`CacheError::EntryTooLarge`] before anything in the tier is touched,
    /// so an older value for the key survives.
    ///
    /// [`CacheError::PoolExhausted`] means the tier is empty and a shared
    /// pool is still held by other tiers. By then an older value for the key
    /// has already been dropped, so the key reads as a miss afterwards.
    ///
    /// Victims are taken from one policy-ordered snapshot; a fresh snapshot
    /// is only taken if that one runs out before the entry fits.
    pub fn put(&self, key: K, value: V) -> Result<PutOutcome<K>, CacheError> {
        let size = entry_size(&key, &value);
        let charges: Vec<u64> = self
            .pools
            .iter()
            .map(|pool| pool.unit().charge_for(size))
            .collect();

        if let Some((pool, &charge)) = self
            .pools
            .iter()
            .zip(&charges)
            .find(|(pool, charge)| !pool.can_ever_fit(**charge))
        {
            debug!(tier = %self.name, pool = pool.name(), charge, limit = pool.limit(), "Entry can never fit");
            crate::metrics::record_operation(&self.name, "put", "too_large");
            return Err(CacheError::EntryTooLarge {
                tier: self.name.to_string(),
                pool: pool.name().to_string(),
                charge,
                limit: pool.limit(),
            });
        }

        let replaced = self.remove_entry(&key).is_some();
        let mut evicted = Vec::new();
        let mut candidates = Vec::new().into_iter();
        let mut waits = 0u32;

        let _in_flight = InFlight::enter(&self.in_flight, &charges);
        while !self.try_reserve(&charges) {
            let Some(victim) = candidates.next() else {
                let mut snapshot = self.snapshot();
                if snapshot.is_empty() {
                    // Other puts may hold reservations they haven't inserted yet.
                    if waits < MAX_IN_FLIGHT_WAITS && self.shortfall_is_in_flight(&charges) {
                        waits += 1;
                        std::thread::yield_now();
                        continue;
                    }
                    let pool = self.blocking_pool(&charges);
                    warn!(tier = %self.name, pool = %pool, "Pool exhausted with nothing left to evict");
                    crate::metrics::record_operation(&self.name, "put", "exhausted");
                    return Err(CacheError::PoolExhausted {
                        tier: self.name.to_string(),
                        pool,
                    });
                }
                self.policy.eviction_order(&mut snapshot);
                candidates = snapshot.into_iter();
                continue;
            };

            // Another caller may have removed the victim already; move on.
            if let Some(entry) = self.remove_entry(&victim.key) {
                trace!(tier = %self.name, key = ?victim.key, "Evicted");
                self.evictions.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_eviction(&self.name, entry.size_bytes);
                evicted.push(victim.key);
            }
        }

        let entry = CacheEntry::new(value, size, self.tick(), self.name.clone(), charges.clone());
        if let Some(raced) = self.entries.insert(key, entry) {
            // A concurrent put on the same key landed first; last insert wins.
            self.release(&raced.charges);
        }

        crate::metrics::record_operation(&self.name, "put", "success");
        if !evicted.is_empty() {
            debug!(tier = %self.name, evicted = evicted.len(), "Made room by eviction");
        }
        Ok(PutOutcome { evicted, replaced })
    }

    /// Remove a key, releasing its charges on every pool.
    pub fn remove(&self, key: &K) -> bool {
        let removed = self.remove_entry(key).is_some();
        if removed {
            crate::metrics::record_operation(&self.name, "remove", "success");
        }
        removed
    }

    /// Drop every entry and give back all charges.
    pub fn clear(&self) {
        self.entries.retain(|_, entry| {
            for (pool, charge) in self.pools.iter().zip(&entry.charges) {
                pool.release(*charge);
            }
            false
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn pools(&self) -> &[Arc<CapacityPool>] {
        &self.pools
    }

    /// Sum of live entries' recorded charges, per pool.
    ///
    /// For pools this tier does not share, this equals the pool's usage.
    #[must_use]
    pub fn charged(&self) -> Vec<u64> {
        let mut totals = vec![0u64; self.pools.len()];
        for entry in self.entries.iter() {
            for (total, charge) in totals.iter_mut().zip(&entry.charges) {
                *total += charge;
            }
        }
        totals
    }

    #[must_use]
    pub fn stats(&self) -> TierStats {
        TierStats {
            name: self.name.to_string(),
            entries: self.entries.len(),
            pools: self
                .pools
                .iter()
                .map(|pool| PoolStats {
                    name: pool.name().to_string(),
                    unit: pool.unit(),
                    usage: pool.usage(),
                    limit: pool.limit(),
                })
                .collect(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    // --- Internal helpers ---

    #[inline]
    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    fn remove_entry(&self, key: &K) -> Option<CacheEntry<V>> {
        let (_, entry) = self.entries.remove(key)?;
        self.release(&entry.charges);
        Some(entry)
    }

    fn release(&self, charges: &[u64]) {
        for (pool, charge) in self.pools.iter().zip(charges) {
            pool.release(*charge);
        }
    }

    /// All-or-nothing reservation across pools.
    fn try_reserve(&self, charges: &[u64]) -> bool {
        for (i, (pool, charge)) in self.pools.iter().zip(charges).enumerate() {
            if !pool.reserve(*charge) {
                self.release(&charges[..i]);
                return false;
            }
        }
        true
    }

    fn blocking_pool(&self, charges: &[u64]) -> String {
        self.pools
            .iter()
            .zip(charges)
            .find(|(pool, charge)| pool.usage().saturating_add(**charge) > pool.limit())
            .map(|(pool, _)| pool.name().to_string())
            .unwrap_or_else(|| self.pools[0].name().to_string())
    }

    /// True when every pool that can't take `charges` would, once other puts'
    /// reservations land in the map and become evictable.
    fn shortfall_is_in_flight(&self, charges: &[u64]) -> bool {
        self.pools
            .iter()
            .zip(charges)
            .zip(&self.in_flight)
            .all(|((pool, &charge), in_flight)| {
                let others = in_flight.load(Ordering::SeqCst).saturating_sub(charge);
                pool.usage().saturating_sub(others).saturating_add(charge) <= pool.limit()
            })
    }

    fn snapshot(&self) -> Vec<VictimCandidate<K>> {
        self.entries
            .iter()
            .map(|entry| VictimCandidate {
                key: entry.key().clone(),
                last_access: entry.last_access,
                inserted_seq: entry.inserted_seq,
                size_bytes: entry.size_bytes,
            })
            .collect()
    }
}

/// Publishes a put's charges in the tier's in-flight counters until it
/// finishes, on every exit path.
struct InFlight<'a> {
    counters: &'a [AtomicU64],
    charges: &'a [u64],
}

impl<'a> InFlight<'a> {
    fn enter(counters: &'a [AtomicU64], charges: &'a [u64]) -> Self {
        for (counter, charge) in counters.iter().zip(charges) {
            counter.fetch_add(*charge, Ordering::SeqCst);
        }
        Self { counters, charges }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        for (counter, charge) in self.counters.iter().zip(self.charges) {
            counter.fetch_sub(*charge, Ordering::SeqCst);
        }
    }
}
