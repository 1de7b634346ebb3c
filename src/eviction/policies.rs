// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::cmp::Ordering;

use super::{EvictionPolicy, VictimCandidate};

/// Least recently used: oldest `last_access`, ties broken by insertion order.
#[derive(Debug, Clone, Copy, Default)]
pub struct LruPolicy;

/// First in, first out: oldest `inserted_seq`, accesses ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct FifoPolicy;

impl<K: Clone + Send + Sync> EvictionPolicy<K> for LruPolicy {
    fn compare(&self, a: &VictimCandidate<K>, b: &VictimCandidate<K>) -> Ordering {
        (a.last_access, a.inserted_seq).cmp(&(b.last_access, b.inserted_seq))
    }

    fn name(&self) -> &'static str {
        "lru"
    }
}

impl<K: Clone + Send + Sync> EvictionPolicy<K> for FifoPolicy {
    fn compare(&self, a: &VictimCandidate<K>, b: &VictimCandidate<K>) -> Ordering {
        a.inserted_seq.cmp(&b.inserted_seq)
    }

    fn name(&self) -> &'static str {
        "fifo"
    }
}
