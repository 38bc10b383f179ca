//! Multi-tenant registry of repositories.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use arbor_lock::{BroadcastLockListener, LockCoordinator, LockEventStream};
use chrono::{DateTime, Utc};
use tracing::info;

use crate::config::CoreConfig;
use crate::error::{CoreError, Result};
use crate::maintenance::{spawn_maintenance, MaintenanceHandle, MaintenanceReport};
use crate::repository::Repository;

/// Every repository served by this node. All repositories share one lock
/// coordinator, so repository-wide and branch locks are judged together.
pub struct Repositories {
    config: CoreConfig,
    locks: Arc<LockCoordinator>,
    lock_events: Arc<BroadcastLockListener>,
    repos: RwLock<BTreeMap<String, Arc<Repository>>>,
}

impl Repositories {
    /// Create the registry and the repositories named in `config`.
    pub fn new(config: CoreConfig) -> Result<Self> {
        config.validate()?;
        let locks = Arc::new(LockCoordinator::new(&config.lock));
        let lock_events = Arc::new(BroadcastLockListener::new(config.lock.notification_capacity));
        locks.add_listener(lock_events.clone())?;

        let registry = Self {
            config,
            locks,
            lock_events,
            repos: RwLock::new(BTreeMap::new()),
        };
        for id in registry.config.repositories.clone() {
            registry.create(&id)?;
        }
        Ok(registry)
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn locks(&self) -> &Arc<LockCoordinator> {
        &self.locks
    }

    /// Lock transitions of remote sessions, for other nodes to mirror.
    pub fn subscribe_lock_events(&self) -> LockEventStream {
        self.lock_events.subscribe()
    }

    pub fn create(&self, id: &str) -> Result<Arc<Repository>> {
        let mut repos = self
            .repos
            .write()
            .map_err(|e| CoreError::Internal(format!("lock poisoned: {e}")))?;
        if repos.contains_key(id) {
            return Err(CoreError::RepositoryExists { id: id.to_string() });
        }
        let repo = Arc::new(Repository::new(id, &self.config, self.locks.clone())?);
        repos.insert(id.to_string(), repo.clone());
        Ok(repo)
    }

    pub fn get(&self, id: &str) -> Result<Arc<Repository>> {
        let repos = self
            .repos
            .read()
            .map_err(|e| CoreError::Internal(format!("lock poisoned: {e}")))?;
        repos
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::UnknownRepository { id: id.to_string() })
    }

    /// Repository ids, sorted.
    pub fn ids(&self) -> Result<Vec<String>> {
        let repos = self
            .repos
            .read()
            .map_err(|e| CoreError::Internal(format!("lock poisoned: {e}")))?;
        Ok(repos.keys().cloned().collect())
    }

    /// Stop serving a repository. Its data is dropped with the last handle.
    pub fn remove(&self, id: &str) -> Result<Arc<Repository>> {
        let mut repos = self
            .repos
            .write()
            .map_err(|e| CoreError::Internal(format!("lock poisoned: {e}")))?;
        let repo = repos
            .remove(id)
            .ok_or_else(|| CoreError::UnknownRepository { id: id.to_string() })?;
        info!(repository = id, "repository removed");
        Ok(repo)
    }

    /// Start the background staleness and retention sweep, once every
    /// `review.sweep_interval_secs`. The sweep stops when the handle drops.
    pub fn start_maintenance(self: &Arc<Self>) -> MaintenanceHandle {
        spawn_maintenance(self.clone(), self.config.review.sweep_interval())
    }

    /// Run review maintenance on every repository.
    pub fn maintain(&self, now: DateTime<Utc>) -> Result<MaintenanceReport> {
        let repos: Vec<Arc<Repository>> = {
            let repos = self
                .repos
                .read()
                .map_err(|e| CoreError::Internal(format!("lock poisoned: {e}")))?;
            repos.values().cloned().collect()
        };
        let mut total = MaintenanceReport::default();
        for repo in repos {
            total += repo.maintain(now)?;
        }
        Ok(total)
    }
}
