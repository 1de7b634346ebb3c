//! Configuration for the tiered cache.
//!
//! Configuration is plain data: build it in code or deserialize it, then hand
//! it to [`CacheManager::open`](crate::CacheManager::open), which validates it
//! before anything is allocated.
//!
//! # Example
//!
//! ```
//! use tiered_cache::{CacheConfig, ManagerConfig, SharedPoolConfig, TierConfig, PoolUnit};
//!
//! let config = ManagerConfig {
//!     server_url: "cluster://localhost:9410".into(),
//!     shared_pools: vec![SharedPoolConfig::new("resource-pool-a", PoolUnit::Bytes, 10 * 1024 * 1024)],
//!     caches: vec![CacheConfig::new(
//!         "clustered-cache",
//!         vec![
//!             TierConfig::new("heap", PoolUnit::Count, 1000),
//!             TierConfig::new("offheap", PoolUnit::Bytes, 1024 * 1024)
//!                 .with_shared_pool("resource-pool-a"),
//!         ],
//!     )],
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;

use crate::error::CacheError;
use crate::eviction::EvictionPolicyKind;
use crate::pool::PoolUnit;
use crate::resilience::circuit_breaker::CircuitConfig;
use crate::resilience::retry::RetryConfig;

/// One local tier: its own pool plus any shared pools it also charges.
#[derive(Debug, Clone, Deserialize)]
pub struct TierConfig {
    pub name: String,
    pub unit: PoolUnit,
    pub limit: u64,

    /// Victim selection for this tier (default: LRU)
    #[serde(default)]
    pub eviction: EvictionPolicyKind,

    /// Names of manager-level shared pools this tier is also charged against
    #[serde(default)]
    pub shared_pools: Vec<String>,
}

impl TierConfig {
    pub fn new(name: impl Into<String>, unit: PoolUnit, limit: u64) -> Self {
        Self {
            name: name.into(),
            unit,
            limit,
            eviction: EvictionPolicyKind::default(),
            shared_pools: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_eviction(mut self, eviction: EvictionPolicyKind) -> Self {
        self.eviction = eviction;
        self
    }

    #[must_use]
    pub fn with_shared_pool(mut self, pool: impl Into<String>) -> Self {
        self.shared_pools.push(pool.into());
        self
    }
}

/// A named pool declared once and shared by every tier that references it.
#[derive(Debug, Clone, Deserialize)]
pub struct SharedPoolConfig {
    pub name: String,
    pub unit: PoolUnit,
    pub limit: u64,
}

impl SharedPoolConfig {
    pub fn new(name: impl Into<String>, unit: PoolUnit, limit: u64) -> Self {
        Self { name: name.into(), unit, limit }
    }
}

/// A cache: ordered local tiers, fastest first. The remote tier is implicit.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub alias: String,
    pub tiers: Vec<TierConfig>,

    /// Stripes used to detect writes racing a read-through (default: 64)
    #[serde(default = "default_write_stripes")]
    pub write_stripes: usize,
}

impl CacheConfig {
    pub fn new(alias: impl Into<String>, tiers: Vec<TierConfig>) -> Self {
        Self {
            alias: alias.into(),
            tiers,
            write_stripes: default_write_stripes(),
        }
    }

    /// Check tier layout against the declared shared pool names.
    pub fn validate(&self, shared_pools: &HashSet<&str>) -> Result<(), CacheError> {
        if self.alias.is_empty() {
            return Err(CacheError::Config("cache alias must not be empty".into()));
        }
        if self.tiers.is_empty() {
            return Err(CacheError::Config(format!(
                "cache '{}' declares no local tiers",
                self.alias
            )));
        }
        if self.write_stripes == 0 {
            return Err(CacheError::Config(format!(
                "cache '{}' needs at least one write stripe",
                self.alias
            )));
        }

        let mut seen = HashSet::new();
        for tier in &self.tiers {
            if !seen.insert(tier.name.as_str()) {
                return Err(CacheError::Config(format!(
                    "cache '{}' declares tier '{}' twice",
                    self.alias, tier.name
                )));
            }
            if tier.limit == 0 {
                return Err(CacheError::Config(format!(
                    "tier '{}' in cache '{}' has a zero limit",
                    tier.name, self.alias
                )));
            }
            for pool in &tier.shared_pools {
                if !shared_pools.contains(pool.as_str()) {
                    return Err(CacheError::Config(format!(
                        "tier '{}' references undeclared shared pool '{}'",
                        tier.name, pool
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Timeouts, retry and circuit breaking around every remote call.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    /// Per-attempt timeout (default: 5s)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Attempts per operation, including the first (default: 3)
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: usize,
    #[serde(default = "default_retry_initial_delay_ms")]
    pub retry_initial_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    #[serde(default = "default_retry_factor")]
    pub retry_factor: f64,

    /// Circuit breaker settings
    #[serde(default = "default_circuit_failure_threshold")]
    pub circuit_failure_threshold: u32,
    #[serde(default = "default_circuit_success_threshold")]
    pub circuit_success_threshold: u32,
    #[serde(default = "default_circuit_recovery_ms")]
    pub circuit_recovery_ms: u64,
}

fn default_timeout_ms() -> u64 { 5_000 }
fn default_retry_max_attempts() -> usize { 3 }
fn default_retry_initial_delay_ms() -> u64 { 100 }
fn default_retry_max_delay_ms() -> u64 { 2_000 }
fn default_retry_factor() -> f64 { 2.0 }
fn default_circuit_failure_threshold() -> u32 { 5 }
fn default_circuit_success_threshold() -> u32 { 2 }
fn default_circuit_recovery_ms() -> u64 { 30_000 }
fn default_write_stripes() -> usize { 64 }
fn default_server_url() -> String { "cluster://localhost:9410".to_string() }
fn default_manager_alias() -> String { "tiered-cache-manager".to_string() }

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            retry_max_attempts: default_retry_max_attempts(),
            retry_initial_delay_ms: default_retry_initial_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            retry_factor: default_retry_factor(),
            circuit_failure_threshold: default_circuit_failure_threshold(),
            circuit_success_threshold: default_circuit_success_threshold(),
            circuit_recovery_ms: default_circuit_recovery_ms(),
        }
    }
}

impl RemoteConfig {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    #[must_use]
    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_retries: Some(self.retry_max_attempts),
            initial_delay: Duration::from_millis(self.retry_initial_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            factor: self.retry_factor,
        }
    }

    #[must_use]
    pub fn circuit(&self) -> CircuitConfig {
        CircuitConfig {
            failure_threshold: self.circuit_failure_threshold,
            success_threshold: self.circuit_success_threshold,
            recovery_timeout: Duration::from_millis(self.circuit_recovery_ms),
        }
    }

    pub fn validate(&self) -> Result<(), CacheError> {
        if self.timeout_ms == 0 {
            return Err(CacheError::Config("remote timeout must be non-zero".into()));
        }
        if self.retry_max_attempts == 0 {
            return Err(CacheError::Config("remote retry needs at least one attempt".into()));
        }
        if !(self.retry_factor >= 1.0) {
            return Err(CacheError::Config(format!(
                "retry backoff factor must be >= 1.0, got {}",
                self.retry_factor
            )));
        }
        if self.circuit_failure_threshold == 0 || self.circuit_success_threshold == 0 {
            return Err(CacheError::Config("circuit thresholds must be non-zero".into()));
        }
        Ok(())
    }
}

/// Everything a [`CacheManager`](crate::CacheManager) needs at construction.
#[derive(Debug, Clone, Deserialize)]
pub struct ManagerConfig {
    /// Address of the shared store (e.g., "cluster://localhost:9410")
    #[serde(default = "default_server_url")]
    pub server_url: String,

    /// Manager alias, appended to the server URL on connect
    #[serde(default = "default_manager_alias")]
    pub alias: String,

    /// Pools declared before any cache that uses them
    #[serde(default)]
    pub shared_pools: Vec<SharedPoolConfig>,

    #[serde(default)]
    pub caches: Vec<CacheConfig>,

    #[serde(default)]
    pub remote: RemoteConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            alias: default_manager_alias(),
            shared_pools: Vec::new(),
            caches: Vec::new(),
            remote: RemoteConfig::default(),
        }
    }
}

impl ManagerConfig {
    /// URI the connector is asked to open: `{server_url}/{alias}`.
    #[must_use]
    pub fn connection_uri(&self) -> String {
        format!("{}/{}", self.server_url.trim_end_matches('/'), self.alias)
    }

    /// Fail fast on any inconsistent combination.
    pub fn validate(&self) -> Result<(), CacheError> {
        let pools = self.validate_connection()?;

        let mut aliases = HashSet::new();
        for cache in &self.caches {
            if !aliases.insert(cache.alias.as_str()) {
                return Err(CacheError::Config(format!(
                    "cache '{}' declared twice",
                    cache.alias
                )));
            }
            cache.validate(&pools)?;
        }
        Ok(())
    }

    /// Check everything needed before connecting: server, remote settings
    /// and shared pools. Returns the declared shared pool names.
    pub fn validate_connection(&self) -> Result<HashSet<&str>, CacheError> {
        if self.server_url.is_empty() {
            return Err(CacheError::Config("server_url must not be empty".into()));
        }
        self.remote.validate()?;

        let mut pools = HashSet::new();
        for pool in &self.shared_pools {
            if pool.limit == 0 {
                return Err(CacheError::Config(format!(
                    "shared pool '{}' has a zero limit",
                    pool.name
                )));
            }
            if !pools.insert(pool.name.as_str()) {
                return Err(CacheError::Config(format!(
                    "shared pool '{}' declared twice",
                    pool.name
                )));
            }
        }
        Ok(pools)
    }
}
