//! Local (in-process) tiers.
//!
//! A [`LocalTier`] is a concurrent key/value map bounded by one or more
//! [`CapacityPool`](crate::pool::CapacityPool)s. The heap tier of a typical
//! layout is bounded by entry count; the off-heap tier by bytes, and it may
//! also charge a manager-level shared pool.

pub mod local;

pub use local::{LocalTier, PutOutcome};

use crate::pool::PoolUnit;

/// Point-in-time view of one pool as seen by a tier.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolStats {
    pub name: String,
    pub unit: PoolUnit,
    pub usage: u64,
    pub limit: u64,
}

impl PoolStats {
    /// Usage as a fraction of the limit (0.0 - 1.0).
    #[must_use]
    pub fn utilization(&self) -> f64 {
        if self.limit == 0 {
            0.0
        } else {
            self.usage as f64 / self.limit as f64
        }
    }
}

/// Point-in-time view of a tier.
#[derive(Debug, Clone, PartialEq)]
pub struct TierStats {
    pub name: String,
    pub entries: usize,
    pub pools: Vec<PoolStats>,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl TierStats {
    /// Fraction of lookups that hit (0.0 when nothing was looked up).
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
