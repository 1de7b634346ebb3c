//! Cache manager: owns the remote connection and every cache built on it.
//!
//! Opening a manager is a scoped acquisition. The remote connection is
//! released by [`CacheManager::close`], and also when cache creation fails
//! partway through [`CacheManager::open`]. Dropping a manager that was never
//! closed still releases all local capacity.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::{CacheConfig, ManagerConfig};
use crate::entry::{CacheKey, CacheValue};
use crate::error::CacheError;
use crate::pool::CapacityPool;
use crate::remote::{Connector, RemoteTierClient};
use crate::resilience::retry::{retry, RetryConfig};

use super::{ManagerState, TieredCache};

pub struct CacheManager<K: CacheKey, V: CacheValue> {
    alias: String,
    remote: Arc<RemoteTierClient<K, V>>,
    shared_pools: HashMap<String, Arc<CapacityPool>>,
    caches: RwLock<HashMap<String, Arc<TieredCache<K, V>>>>,
    state: watch::Sender<ManagerState>,
    state_rx: watch::Receiver<ManagerState>,
}

impl<K: CacheKey, V: CacheValue> std::fmt::Debug for CacheManager<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("alias", &self.alias)
            .field("state", &*self.state_rx.borrow())
            .field("caches", &self.cache_aliases())
            .finish()
    }
}

impl<K: CacheKey, V: CacheValue> CacheManager<K, V> {
    /// Validate the connection settings, connect to `{server_url}/{alias}`,
    /// declare shared pools, then build every configured cache.
    ///
    /// Each cache layout is checked as it is created. If any cache fails to
    /// build, the connection is closed before the error is returned.
    #[tracing::instrument(skip_all, fields(alias = %config.alias))]
    pub async fn open(config: ManagerConfig, connector: &dyn Connector<K, V>) -> Result<Self, CacheError> {
        let open_start = Instant::now();
        config.validate_connection()?;

        let (state, state_rx) = watch::channel(ManagerState::Created);
        crate::metrics::set_manager_state("Created");

        let uri = config.connection_uri();
        info!(uri = %uri, "Connecting to remote tier...");
        let _ = state.send(ManagerState::Connecting);
        crate::metrics::set_manager_state("Connecting");

        let store = retry("remote_connect", &RetryConfig::connect(), || connector.connect(&uri))
            .await
            .map_err(|source| {
                error!(uri = %uri, error = %source, "Could not connect to remote tier");
                crate::metrics::record_connection_error("remote");
                CacheError::RemoteUnavailable { operation: "connect", source }
            })?;
        let remote = Arc::new(RemoteTierClient::new(store, &config.remote));

        let manager = match Self::assemble(&config, remote.clone(), state, state_rx) {
            Ok(manager) => manager,
            Err(e) => {
                error!(error = %e, "Cache creation failed, releasing connection");
                if let Err(close_err) = remote.close().await {
                    warn!(error = %close_err, "Close after failed creation also failed");
                }
                return Err(e);
            }
        };

        let _ = manager.state.send(ManagerState::Ready);
        crate::metrics::set_manager_state("Ready");
        crate::metrics::record_open_duration(open_start.elapsed());
        info!(
            caches = manager.caches.read().len(),
            shared_pools = manager.shared_pools.len(),
            "Cache manager ready"
        );
        Ok(manager)
    }

    fn assemble(
        config: &ManagerConfig,
        remote: Arc<RemoteTierClient<K, V>>,
        state: watch::Sender<ManagerState>,
        state_rx: watch::Receiver<ManagerState>,
    ) -> Result<Self, CacheError> {
        let mut shared_pools = HashMap::new();
        for pool in &config.shared_pools {
            let built = CapacityPool::new(pool.name.clone(), pool.unit, pool.limit)?;
            debug!(pool = %pool.name, unit = %pool.unit, limit = pool.limit, "Declared shared pool");
            shared_pools.insert(pool.name.clone(), Arc::new(built));
        }

        let declared: HashSet<&str> = shared_pools.keys().map(String::as_str).collect();
        let mut caches = HashMap::new();
        for cache in &config.caches {
            cache.validate(&declared)?;
            if caches.contains_key(&cache.alias) {
                return Err(CacheError::Config(format!("cache '{}' already exists", cache.alias)));
            }
            let built = TieredCache::from_config(cache, &shared_pools, remote.clone())?;
            info!(cache = %cache.alias, tiers = cache.tiers.len(), "Cache created");
            caches.insert(cache.alias.clone(), Arc::new(built));
        }

        Ok(Self {
            alias: config.alias.clone(),
            remote,
            shared_pools,
            caches: RwLock::new(caches),
            state,
            state_rx,
        })
    }

    /// Add a cache to a running manager.
    pub fn create_cache(&self, config: CacheConfig) -> Result<Arc<TieredCache<K, V>>, CacheError> {
        if self.state() != ManagerState::Ready {
            return Err(CacheError::Closed);
        }
        let declared: HashSet<&str> = self.shared_pools.keys().map(String::as_str).collect();
        config.validate(&declared)?;

        let mut caches = self.caches.write();
        if caches.contains_key(&config.alias) {
            return Err(CacheError::Config(format!("cache '{}' already exists", config.alias)));
        }
        let cache = Arc::new(TieredCache::from_config(&config, &self.shared_pools, self.remote.clone())?);
        caches.insert(config.alias.clone(), cache.clone());
        info!(cache = %config.alias, tiers = config.tiers.len(), "Cache created");
        Ok(cache)
    }

    #[must_use]
    pub fn get_cache(&self, alias: &str) -> Option<Arc<TieredCache<K, V>>> {
        self.caches.read().get(alias).cloned()
    }

    #[must_use]
    pub fn cache_aliases(&self) -> Vec<String> {
        let mut aliases: Vec<_> = self.caches.read().keys().cloned().collect();
        aliases.sort();
        aliases
    }

    #[must_use]
    pub fn shared_pool(&self, name: &str) -> Option<Arc<CapacityPool>> {
        self.shared_pools.get(name).cloned()
    }

    #[must_use]
    pub fn alias(&self) -> &str {
        &self.alias
    }

    #[must_use]
    pub fn state(&self) -> ManagerState {
        *self.state_rx.borrow()
    }

    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ManagerState> {
        self.state_rx.clone()
    }

    /// Shut every cache down and release the remote connection.
    ///
    /// Caches handed out earlier reject further calls with
    /// [`CacheError::Closed`]. Closing twice is a no-op.
    #[tracing::instrument(skip(self), fields(alias = %self.alias))]
    pub async fn close(&self) -> Result<(), CacheError> {
        if matches!(self.state(), ManagerState::Closing | ManagerState::Closed) {
            return Ok(());
        }
        info!("Closing cache manager...");
        let _ = self.state.send(ManagerState::Closing);
        crate::metrics::set_manager_state("Closing");

        self.shut_down_caches();
        let result = self.remote.close().await;

        let _ = self.state.send(ManagerState::Closed);
        crate::metrics::set_manager_state("Closed");
        match &result {
            Ok(()) => info!("Cache manager closed"),
            Err(e) => warn!(error = %e, "Remote connection did not close cleanly"),
        }
        result
    }

    fn shut_down_caches(&self) {
        for cache in self.caches.read().values() {
            cache.shut_down();
        }
    }
}

impl<K: CacheKey, V: CacheValue> Drop for CacheManager<K, V> {
    fn drop(&mut self) {
        if self.state() != ManagerState::Closed {
            warn!(alias = %self.alias, "Cache manager dropped without close(), releasing local tiers");
            self.shut_down_caches();
            let _ = self.state.send(ManagerState::Closed);
        }
    }
}
