//! Error taxonomy for the tiered cache.
//!
//! Local bookkeeping problems ([`CapacityError`], [`CacheError::EmptyTier`])
//! are programmer errors. Remote problems are transient and always surface as
//! their own variants so callers can tell "no such value" apart from
//! "couldn't check".

use thiserror::Error;

use crate::remote::traits::RemoteError;

/// Invalid input to a [`CapacityPool`](crate::pool::CapacityPool).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CapacityError {
    #[error("pool '{pool}' declared with a zero limit")]
    ZeroLimit { pool: String },
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error(transparent)]
    Capacity(#[from] CapacityError),

    /// The entry can never fit: its charge exceeds a pool's total limit.
    #[error("entry of charge {charge} exceeds limit {limit} of pool '{pool}' in tier '{tier}'")]
    EntryTooLarge {
        tier: String,
        pool: String,
        charge: u64,
        limit: u64,
    },

    /// The tier is empty but a shared pool is still held by other tiers.
    #[error("pool '{pool}' exhausted by other tiers; nothing left to evict in tier '{tier}'")]
    PoolExhausted { tier: String, pool: String },

    /// Victim selection ran against an empty tier. Pool/tier accounting is out of sync.
    #[error("eviction requested on empty tier '{tier}'")]
    EmptyTier { tier: String },

    #[error("remote tier unavailable during {operation}: {source}")]
    RemoteUnavailable {
        operation: &'static str,
        #[source]
        source: RemoteError,
    },

    #[error("cache unavailable: {source}")]
    CacheUnavailable {
        #[source]
        source: RemoteError,
    },

    /// Remote write failed; the key was invalidated in every local tier.
    #[error("write-through failed, local tiers invalidated: {source}")]
    WriteThrough {
        #[source]
        source: RemoteError,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("cache manager is closed")]
    Closed,
}

impl CacheError {
    /// True for errors that reflect remote-tier trouble rather than local bookkeeping.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RemoteUnavailable { .. } | Self::CacheUnavailable { .. } | Self::WriteThrough { .. }
        )
    }

    /// Unwrap the remote error behind a transient failure, if any.
    #[must_use]
    pub fn remote_source(&self) -> Option<&RemoteError> {
        match self {
            Self::RemoteUnavailable { source, .. }
            | Self::CacheUnavailable { source }
            | Self::WriteThrough { source } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_too_large_display() {
        let err = CacheError::EntryTooLarge {
            tier: "offheap".into(),
            pool: "offheap-bytes".into(),
            charge: 2048,
            limit: 1024,
        };
        assert_eq!(
            err.to_string(),
            "entry of charge 2048 exceeds limit 1024 of pool 'offheap-bytes' in tier 'offheap'"
        );
        assert!(!err.is_transient());
    }

    #[test]
    fn test_remote_errors_are_transient() {
        let err = CacheError::WriteThrough { source: RemoteError::Backend("down".into()) };
        assert!(err.is_transient());
        assert!(matches!(err.remote_source(), Some(RemoteError::Backend(_))));

        let err = CacheError::CacheUnavailable { source: RemoteError::CircuitOpen };
        assert!(err.is_transient());
    }

    #[test]
    fn test_capacity_error_converts() {
        let err: CacheError = CapacityError::ZeroLimit { pool: "heap".into() }.into();
        assert!(matches!(err, CacheError::Capacity(_)));
        assert_eq!(err.to_string(), "pool 'heap' declared with a zero limit");
    }
}
