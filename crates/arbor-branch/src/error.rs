//! Error types for branch operations.

use arbor_types::{BranchPath, Timestamp, TypeError};
use thiserror::Error;

/// Errors that can occur during branch operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BranchError {
    /// The branch does not exist.
    #[error("branch not found: {path}")]
    NotFound { path: String },

    /// A branch (live or deleted) already holds this path.
    #[error("branch already exists: {path}")]
    AlreadyExists { path: BranchPath },

    /// The parent of the requested branch does not exist.
    #[error("parent branch {parent} of {path} not found")]
    ParentNotFound { path: String, parent: String },

    /// The branch, or one of its ancestors, has been deleted.
    #[error("branch {path} is not writable: {deleted} is deleted")]
    Deleted { path: BranchPath, deleted: BranchPath },

    /// The root branch cannot be deleted.
    #[error("MAIN cannot be deleted")]
    CannotDeleteMain,

    /// A head update lost against a concurrent writer.
    #[error("concurrent modification of {path}: head is {current}, attempted {attempted}")]
    ConcurrentModification {
        path: BranchPath,
        current: Timestamp,
        attempted: Timestamp,
    },

    /// The path is syntactically invalid.
    #[error(transparent)]
    InvalidPath(#[from] TypeError),

    /// A structural invariant does not hold; the operation is aborted.
    #[error("invariant violation on {path}: {reason}")]
    InvariantViolation { path: String, reason: String },

    /// Failure inside the storage backend.
    #[error("storage error: {0}")]
    Storage(String),
}

impl BranchError {
    pub(crate) fn not_found(path: &BranchPath) -> Self {
        Self::NotFound {
            path: path.to_string(),
        }
    }
}

/// Convenience type alias for branch operations.
pub type Result<T> = std::result::Result<T, BranchError>;
