//! # Tiered Cache
//!
//! A multi-tier key/value cache: small, fast local tiers in front of a
//! shared, authoritative remote store.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        TieredCache                          │
//! │  • get: read-through, promotes hits into faster tiers       │
//! │  • put: write-through, invalidates locally on remote error  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 LocalTier: heap (entry count)               │
//! │  • DashMap for concurrent access                            │
//! │  • LRU / FIFO eviction on insert                            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │              LocalTier: offheap (bytes + shared pool)       │
//! │  • charged against its own pool and a manager-level pool    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                 (timeout → retry → circuit breaker)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 RemoteTierClient → RemoteStore              │
//! │  • authoritative copy, shared across processes              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tiered_cache::{
//!     CacheConfig, CacheManager, InMemoryConnector, ManagerConfig, PoolUnit,
//!     SharedPoolConfig, TierConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tiered_cache::CacheError> {
//!     let config = ManagerConfig {
//!         server_url: "cluster://localhost:9410".into(),
//!         shared_pools: vec![SharedPoolConfig::new("resource-pool-a", PoolUnit::Bytes, 10 << 20)],
//!         caches: vec![CacheConfig::new(
//!             "clustered-cache",
//!             vec![
//!                 TierConfig::new("heap", PoolUnit::Count, 1000),
//!                 TierConfig::new("offheap", PoolUnit::Bytes, 1 << 20)
//!                     .with_shared_pool("resource-pool-a"),
//!             ],
//!         )],
//!         ..Default::default()
//!     };
//!
//!     let connector = InMemoryConnector::<u64, String>::new();
//!     let manager = CacheManager::open(config, &connector).await?;
//!     let cache = manager.get_cache("clustered-cache").expect("configured above");
//!
//!     cache.put(42, "answer".to_string()).await?;
//!     assert_eq!(cache.get(&42).await?.as_deref(), Some("answer"));
//!
//!     manager.close().await
//! }
//! ```
//!
//! ## Modules
//!
//! - [`cache`]: [`TieredCache`] and the [`CacheManager`] that owns the connection
//! - [`tier`]: Local tiers bounded by capacity pools
//! - [`pool`]: Capacity accounting by entry count or bytes
//! - [`eviction`]: LRU and FIFO victim selection
//! - [`remote`]: Remote store contract and its resilient client
//! - [`resilience`]: Circuit breaker and retry with backoff
//! - [`config`]: Manager, cache, tier and remote configuration

pub mod cache;
pub mod config;
pub mod entry;
pub mod error;
pub mod eviction;
pub mod metrics;
pub mod pool;
pub mod remote;
pub mod resilience;
pub mod tier;

// Note: We don't expose a `tracing` module to avoid conflict with the tracing crate

pub use cache::{CacheManager, CacheStats, ManagerState, TieredCache};
pub use config::{CacheConfig, ManagerConfig, RemoteConfig, SharedPoolConfig, TierConfig};
pub use entry::{CacheEntry, CacheKey, CacheValue, SizedItem};
pub use error::{CacheError, CapacityError};
pub use eviction::{EvictionPolicy, EvictionPolicyKind, FifoPolicy, LruPolicy, VictimCandidate};
pub use pool::{CapacityPool, PoolUnit};
pub use remote::{Connector, InMemoryConnector, InMemoryRemoteStore, RemoteError, RemoteStore, RemoteTierClient};
pub use resilience::circuit_breaker::{CircuitBreaker, CircuitConfig, CircuitError};
pub use resilience::retry::RetryConfig;
pub use tier::{LocalTier, PoolStats, PutOutcome, TierStats};
pub use metrics::LatencyTimer;
