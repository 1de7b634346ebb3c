//! Eviction policies for local tiers.
//!
//! A tier hands its policy a snapshot of entry metadata and gets it back in
//! eviction order. Policies never mutate the tier themselves.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Eviction Module                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  mod.rs        - EvictionPolicy trait, VictimCandidate       │
//! │                  EvictionPolicyKind: config name → policy    │
//! ├──────────────────────────────────────────────────────────────┤
//! │  policies.rs   - LruPolicy: oldest last access               │
//! │                  FifoPolicy: oldest insertion                │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod policies;

use std::sync::Arc;

use serde::Deserialize;

use crate::entry::CacheKey;
use crate::error::CacheError;

pub use policies::{FifoPolicy, LruPolicy};

/// Entry metadata handed to a policy when a tier needs room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VictimCandidate<K> {
    pub key: K,
    pub last_access: u64,
    pub inserted_seq: u64,
    pub size_bytes: usize,
}

/// Orders entries for eviction.
///
/// `compare` must be a total order over candidates so that selection is
/// deterministic: the same snapshot always yields the same victim, and
/// [`eviction_order`](Self::eviction_order) always yields the same sequence.
pub trait EvictionPolicy<K>: Send + Sync {
    /// `Less` means `a` is evicted before `b`.
    fn compare(&self, a: &VictimCandidate<K>, b: &VictimCandidate<K>) -> std::cmp::Ordering;

    fn name(&self) -> &'static str;

    /// The next entry to evict. An empty snapshot is a caller bug and
    /// yields [`CacheError::EmptyTier`].
    fn select_victim(&self, tier: &str, snapshot: &[VictimCandidate<K>]) -> Result<K, CacheError>
    where
        K: Clone,
    {
        snapshot
            .iter()
            .min_by(|a, b| self.compare(a, b))
            .map(|c| c.key.clone())
            .ok_or_else(|| CacheError::EmptyTier { tier: tier.to_string() })
    }

    /// Sort a whole snapshot, first victim first.
    fn eviction_order(&self, snapshot: &mut [VictimCandidate<K>]) {
        snapshot.sort_unstable_by(|a, b| self.compare(a, b));
    }
}

/// Policy selector used in tier configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicyKind {
    #[default]
    Lru,
    Fifo,
}

impl EvictionPolicyKind {
    /// Build the policy for a tier keyed by `K`.
    #[must_use]
    pub fn build<K: CacheKey>(self) -> Arc<dyn EvictionPolicy<K>> {
        match self {
            Self::Lru => Arc::new(LruPolicy),
            Self::Fifo => Arc::new(FifoPolicy),
        }
    }
}

impl std::str::FromStr for EvictionPolicyKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lru" => Ok(Self::Lru),
            "fifo" => Ok(Self::Fifo),
            other => Err(CacheError::Config(format!("unknown eviction policy '{}'", other))),
        }
    }
}

impl std::fmt::Display for EvictionPolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lru => write!(f, "lru"),
            Self::Fifo => write!(f, "fifo"),
        }
    }
}
