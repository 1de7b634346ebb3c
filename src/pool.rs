// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Capacity accounting.
//!
//! A [`CapacityPool`] bounds usage in exactly one [`PoolUnit`]. Pools are
//! shared via `Arc`, so a single pool can be charged by several tiers (the
//! manager-level shared pool is charged by every tier that names it).
//!
//! # Example
//!
//! ```
//! use tiered_cache::{CapacityPool, PoolUnit};
//!
//! let pool = CapacityPool::new("heap", PoolUnit::Count, 2).unwrap();
//! assert!(pool.reserve(1));
//! assert!(pool.reserve(1));
//! assert!(!pool.reserve(1)); // would exceed the limit
//! pool.release(1);
//! assert_eq!(pool.usage(), 1);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Deserialize;

use crate::error::CapacityError;

/// Unit a pool is measured in. Fixed for the pool's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolUnit {
    /// One unit per entry
    Count,
    /// Entry size in bytes
    Bytes,
}

impl PoolUnit {
    /// What an entry of `size_bytes` costs in this unit.
    #[must_use]
    #[inline]
    pub fn charge_for(&self, size_bytes: usize) -> u64 {
        match self {
            Self::Count => 1,
            Self::Bytes => size_bytes as u64,
        }
    }
}

impl std::fmt::Display for PoolUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Count => write!(f, "entries"),
            Self::Bytes => write!(f, "bytes"),
        }
    }
}

/// Usage counter bounded by a fixed limit.
///
/// `reserve` is a compare-and-swap loop, so the limit check and the update
/// are a single atomic step and usage can never be observed above the limit.
#[derive(Debug)]
pub struct CapacityPool {
    name: String,
    unit: PoolUnit,
    limit: u64,
    usage: AtomicU64,
}

impl CapacityPool {
    pub fn new(name: impl Into<String>, unit: PoolUnit, limit: u64) -> Result<Self, CapacityError> {
        let name = name.into();
        if limit == 0 {
            return Err(CapacityError::ZeroLimit { pool: name });
        }
        Ok(Self {
            name,
            unit,
            limit,
            usage: AtomicU64::new(0),
        })
    }

    /// Try to take `amount` units. Returns `false` (and changes nothing) if
    /// that would push usage past the limit.
    pub fn reserve(&self, amount: u64) -> bool {
        self.usage
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current
                    .checked_add(amount)
                    .filter(|next| *next <= self.limit)
            })
            .is_ok()
    }

    /// Give back `amount` units. Floors at zero.
    pub fn release(&self, amount: u64) {
        let _ = self
            .usage
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_sub(amount))
            });
    }

    #[must_use]
    pub fn usage(&self) -> u64 {
        self.usage.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn limit(&self) -> u64 {
        self.limit
    }

    #[must_use]
    pub fn unit(&self) -> PoolUnit {
        self.unit
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Usage as a fraction of the limit (0.0 - 1.0).
    #[must_use]
    pub fn utilization(&self) -> f64 {
        self.usage() as f64 / self.limit as f64
    }

    /// Whether `amount` could ever fit, regardless of current usage.
    #[must_use]
    #[inline]
    pub fn can_ever_fit(&self, amount: u64) -> bool {
        amount <= self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_zero_limit_rejected() {
        let err = CapacityPool::new("empty", PoolUnit::Bytes, 0).unwrap_err();
        assert_eq!(err, CapacityError::ZeroLimit { pool: "empty".into() });
    }

    #[test]
    fn test_reserve_up_to_limit() {
        let pool = CapacityPool::new("bytes", PoolUnit::Bytes, 100).unwrap();
        assert!(pool.reserve(60));
        assert!(pool.reserve(40));
        assert_eq!(pool.usage(), 100);
        assert!(!pool.reserve(1));
        assert_eq!(pool.usage(), 100, "failed reserve must not change usage");
    }

    #[test]
    fn test_reserve_zero_always_fits() {
        let pool = CapacityPool::new("bytes", PoolUnit::Bytes, 10).unwrap();
        assert!(pool.reserve(10));
        assert!(pool.reserve(0));
    }

    #[test]
    fn test_reserve_overflow_rejected() {
        let pool = CapacityPool::new("bytes", PoolUnit::Bytes, u64::MAX).unwrap();
        assert!(pool.reserve(u64::MAX - 1));
        assert!(!pool.reserve(u64::MAX));
    }

    #[test]
    fn test_release_floors_at_zero() {
        let pool = CapacityPool::new("count", PoolUnit::Count, 5).unwrap();
        assert!(pool.reserve(2));
        pool.release(10);
        assert_eq!(pool.usage(), 0);
    }

    #[test]
    fn test_utilization() {
        let pool = CapacityPool::new("count", PoolUnit::Count, 4).unwrap();
        assert_eq!(pool.utilization(), 0.0);
        pool.reserve(1);
        assert!((pool.utilization() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_charge_for_unit() {
        assert_eq!(PoolUnit::Count.charge_for(4096), 1);
        assert_eq!(PoolUnit::Bytes.charge_for(4096), 4096);
        assert!(CapacityPool::new("b", PoolUnit::Bytes, 10).unwrap().can_ever_fit(10));
    }

    #[test]
    fn test_concurrent_reserve_never_exceeds_limit() {
        let pool = Arc::new(CapacityPool::new("count", PoolUnit::Count, 50).unwrap());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                std::thread::spawn(move || (0..100).filter(|_| pool.reserve(1)).count())
            })
            .collect();

        let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(granted, 50);
        assert_eq!(pool.usage(), 50);
    }
}
