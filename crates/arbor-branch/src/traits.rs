//! The [`BranchStore`] trait defining the branch storage interface.

use arbor_types::{BranchPath, Timestamp};

use crate::error::{BranchError, Result};
use crate::types::{Branch, BranchEvent, BranchState};

/// Storage backend for the branch hierarchy.
///
/// Implementations must be thread-safe and apply each operation atomically.
/// Paths are unique; a branch can only be created under an existing parent,
/// which keeps the hierarchy acyclic by construction.
pub trait BranchStore: Send + Sync {
    /// Create `name` under `parent`, forked at the parent's current head.
    ///
    /// Fails with [`BranchError::AlreadyExists`] if any branch, deleted or
    /// not, holds the path and [`BranchError::ParentNotFound`] if the parent
    /// is absent.
    fn create(&self, parent: &BranchPath, name: &str) -> Result<Branch>;

    /// Read a branch, or `Ok(None)` if it does not exist.
    fn find(&self, path: &BranchPath) -> Result<Option<Branch>>;

    /// Move the head of `path` to `timestamp` without notifying listeners.
    ///
    /// Fails with [`BranchError::ConcurrentModification`] unless `timestamp`
    /// is strictly greater than the current head, and with
    /// [`BranchError::Deleted`] if the branch does not accept writes. The
    /// returned event must be handed to [`publish`](Self::publish) once the
    /// caller has released its own locks.
    fn advance_head_deferred(&self, path: &BranchPath, timestamp: Timestamp) -> Result<(Branch, BranchEvent)>;

    /// Deliver `event` to the registered listeners.
    fn publish(&self, event: &BranchEvent);

    /// Move the head of `path` to `timestamp` and notify listeners.
    fn advance_head(&self, path: &BranchPath, timestamp: Timestamp) -> Result<Branch> {
        let (branch, event) = self.advance_head_deferred(path, timestamp)?;
        self.publish(&event);
        Ok(branch)
    }

    /// Mark a branch deleted. Its live descendants become
    /// [`Stale`](crate::BranchLifecycle::Stale): addressable but read-only.
    fn delete(&self, path: &BranchPath) -> Result<Branch>;

    /// Direct children of `path`, sorted by path.
    fn children(&self, path: &BranchPath) -> Result<Vec<Branch>>;

    /// All branches whose path starts with `prefix`, sorted by path.
    fn list(&self, prefix: &str) -> Result<Vec<Branch>>;

    /// Read a branch, failing with [`BranchError::NotFound`] if absent.
    fn get(&self, path: &BranchPath) -> Result<Branch> {
        self.find(path)?.ok_or_else(|| BranchError::not_found(path))
    }

    /// Snapshot a branch.
    fn state(&self, path: &BranchPath) -> Result<BranchState> {
        self.get(path).map(|branch| branch.state())
    }

    /// Fail unless commits may be written to `path`.
    fn check_writable(&self, path: &BranchPath) -> Result<()> {
        if self.get(path)?.is_deleted() {
            return Err(BranchError::Deleted {
                path: path.clone(),
                deleted: path.clone(),
            });
        }
        for ancestor in path.ancestors() {
            if self.get(&ancestor)?.is_deleted() {
                return Err(BranchError::Deleted {
                    path: path.clone(),
                    deleted: ancestor,
                });
            }
        }
        Ok(())
    }

    /// Check the structural invariants of a stored branch.
    fn validate(&self, path: &BranchPath) -> Result<()> {
        let branch = self.get(path)?;
        if branch.base_timestamp > branch.head_timestamp {
            return Err(BranchError::InvariantViolation {
                path: path.to_string(),
                reason: format!(
                    "base {} is after head {}",
                    branch.base_timestamp, branch.head_timestamp
                ),
            });
        }
        if branch.parent_path != path.parent() {
            return Err(BranchError::InvariantViolation {
                path: path.to_string(),
                reason: "recorded parent does not match the path".into(),
            });
        }
        Ok(())
    }
}

/// Receives branch hierarchy changes after they are applied.
///
/// Listeners are invoked outside the store's internal locks, so they may
/// call back into the store.
pub trait BranchListener: Send + Sync {
    fn on_branch_event(&self, event: &BranchEvent);
}
