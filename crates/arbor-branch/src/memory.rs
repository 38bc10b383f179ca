//! In-memory branch store.
//!
//! [`InMemoryBranchStore`] keeps every branch in a `BTreeMap` keyed by path
//! behind a `RwLock`. Parent links are paths, never references, so the
//! arena has no ownership cycles and ancestor queries walk the path.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use arbor_types::{BranchPath, Timestamp};
use tracing::{debug, info};

use crate::error::{BranchError, Result};
use crate::traits::{BranchListener, BranchStore};
use crate::types::{Branch, BranchEvent, BranchLifecycle};

/// An in-memory implementation of [`BranchStore`].
///
/// `MAIN` is created on construction. Data is lost when the store is
/// dropped.
pub struct InMemoryBranchStore {
    branches: RwLock<BTreeMap<BranchPath, Branch>>,
    listeners: RwLock<Vec<Arc<dyn BranchListener>>>,
}

impl InMemoryBranchStore {
    /// Create a store whose `MAIN` branch has base and head at `initial`.
    pub fn new(initial: Timestamp) -> Self {
        let mut branches = BTreeMap::new();
        branches.insert(BranchPath::main(), Branch::main(initial));
        Self {
            branches: RwLock::new(branches),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Register a listener for branch events.
    pub fn add_listener(&self, listener: Arc<dyn BranchListener>) -> Result<()> {
        self.listeners
            .write()
            .map_err(|e| BranchError::Storage(format!("lock poisoned: {e}")))?
            .push(listener);
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<BranchPath, Branch>>> {
        self.branches
            .read()
            .map_err(|e| BranchError::Storage(format!("lock poisoned: {e}")))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<BranchPath, Branch>>> {
        self.branches
            .write()
            .map_err(|e| BranchError::Storage(format!("lock poisoned: {e}")))
    }

    fn notify(&self, events: &[BranchEvent]) {
        let listeners = match self.listeners.read() {
            Ok(listeners) => listeners.clone(),
            Err(_) => return,
        };
        for event in events {
            for listener in &listeners {
                listener.on_branch_event(event);
            }
        }
    }
}

impl Default for InMemoryBranchStore {
    fn default() -> Self {
        Self::new(Timestamp::ZERO)
    }
}

/// Fail if `path` or any of its ancestors is deleted.
fn ensure_writable(branches: &BTreeMap<BranchPath, Branch>, path: &BranchPath) -> Result<()> {
    let branch = branches.get(path).ok_or_else(|| BranchError::not_found(path))?;
    if branch.is_deleted() {
        return Err(BranchError::Deleted {
            path: path.clone(),
            deleted: path.clone(),
        });
    }
    for ancestor in path.ancestors() {
        let deleted = branches
            .get(&ancestor)
            .map(Branch::is_deleted)
            .ok_or_else(|| BranchError::InvariantViolation {
                path: path.to_string(),
                reason: format!("ancestor {ancestor} is missing"),
            })?;
        if deleted {
            return Err(BranchError::Deleted {
                path: path.clone(),
                deleted: ancestor,
            });
        }
    }
    Ok(())
}

impl BranchStore for InMemoryBranchStore {
    fn create(&self, parent: &BranchPath, name: &str) -> Result<Branch> {
        let path = parent.child(name)?;

        let created = {
            let mut branches = self.write()?;
            let parent_branch = branches
                .get(parent)
                .cloned()
                .ok_or_else(|| BranchError::ParentNotFound {
                    path: path.to_string(),
                    parent: parent.to_string(),
                })?;
            ensure_writable(&branches, parent)?;
            if branches.contains_key(&path) {
                return Err(BranchError::AlreadyExists { path });
            }

            let created = Branch::fork(&parent_branch, path.clone());
            branches.insert(path.clone(), created.clone());
            created
        };

        info!(path = %path, base = %created.base_timestamp, "branch created");
        self.notify(&[BranchEvent::Created { path }]);
        Ok(created)
    }

    fn find(&self, path: &BranchPath) -> Result<Option<Branch>> {
        Ok(self.read()?.get(path).cloned())
    }

    fn advance_head_deferred(&self, path: &BranchPath, timestamp: Timestamp) -> Result<(Branch, BranchEvent)> {
        let updated = {
            let mut branches = self.write()?;
            ensure_writable(&branches, path)?;
            let branch = branches
                .get_mut(path)
                .ok_or_else(|| BranchError::not_found(path))?;
            if timestamp <= branch.head_timestamp {
                return Err(BranchError::ConcurrentModification {
                    path: path.clone(),
                    current: branch.head_timestamp,
                    attempted: timestamp,
                });
            }
            branch.head_timestamp = timestamp;
            branch.clone()
        };

        debug!(path = %path, head = %timestamp, "head advanced");
        let event = BranchEvent::HeadAdvanced {
            path: path.clone(),
            head: timestamp,
        };
        Ok((updated, event))
    }

    fn publish(&self, event: &BranchEvent) {
        self.notify(std::slice::from_ref(event));
    }

    fn delete(&self, path: &BranchPath) -> Result<Branch> {
        if path.is_main() {
            return Err(BranchError::CannotDeleteMain);
        }

        let deleted = {
            let mut branches = self.write()?;
            let branch = branches
                .get_mut(path)
                .ok_or_else(|| BranchError::not_found(path))?;
            if branch.is_deleted() {
                return Err(BranchError::Deleted {
                    path: path.clone(),
                    deleted: path.clone(),
                });
            }
            branch.state = BranchLifecycle::Deleted;
            let deleted = branch.clone();

            for (descendant_path, descendant) in branches.range_mut(path.clone()..) {
                if !path.is_ancestor_of(descendant_path) {
                    continue;
                }
                if descendant.state == BranchLifecycle::Active {
                    descendant.state = BranchLifecycle::Stale;
                    debug!(path = %descendant_path, "branch marked stale");
                }
            }
            deleted
        };

        info!(path = %path, "branch deleted");
        self.notify(&[BranchEvent::Deleted { path: path.clone() }]);
        Ok(deleted)
    }

    fn children(&self, path: &BranchPath) -> Result<Vec<Branch>> {
        let branches = self.read()?;
        Ok(branches
            .values()
            .filter(|b| b.parent_path.as_ref() == Some(path))
            .cloned()
            .collect())
    }

    fn list(&self, prefix: &str) -> Result<Vec<Branch>> {
        let branches = self.read()?;
        Ok(branches
            .iter()
            .filter(|(path, _)| path.as_str().starts_with(prefix))
            .map(|(_, branch)| branch.clone())
            .collect())
    }
}
