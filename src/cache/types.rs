//! Public types for the tiered cache and its manager.

use crate::tier::TierStats;

/// Manager lifecycle state.
///
/// Use [`super::CacheManager::state()`] to check the current state or
/// [`super::CacheManager::state_receiver()`] to watch for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    /// Configuration accepted, nothing connected yet
    Created,
    /// Opening the remote connection
    Connecting,
    /// Caches built, serving requests
    Ready,
    /// Close in progress
    Closing,
    /// Connection released; caches reject further calls
    Closed,
}

impl std::fmt::Display for ManagerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Ready => write!(f, "Ready"),
            Self::Closing => write!(f, "Closing"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

/// Point-in-time view of a cache, one entry per local tier, fastest first.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub alias: String,
    pub tiers: Vec<TierStats>,
}

impl CacheStats {
    /// Entries across all local tiers. A key held by two tiers counts twice.
    #[must_use]
    pub fn total_entries(&self) -> usize {
        self.tiers.iter().map(|t| t.entries).sum()
    }

    #[must_use]
    pub fn tier(&self, name: &str) -> Option<&TierStats> {
        self.tiers.iter().find(|t| t.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manager_state_display() {
        assert_eq!(format!("{}", ManagerState::Created), "Created");
        assert_eq!(format!("{}", ManagerState::Ready), "Ready");
        assert_eq!(format!("{}", ManagerState::Closed), "Closed");
    }

    #[test]
    fn test_cache_stats_lookup() {
        let tier = |name: &str, entries| TierStats {
            name: name.into(),
            entries,
            pools: vec![],
            hits: 0,
            misses: 0,
            evictions: 0,
        };
        let stats = CacheStats {
            alias: "orders".into(),
            tiers: vec![tier("heap", 3), tier("offheap", 5)],
        };

        assert_eq!(stats.total_entries(), 8);
        assert_eq!(stats.tier("offheap").map(|t| t.entries), Some(5));
        assert!(stats.tier("disk").is_none());
    }
}
