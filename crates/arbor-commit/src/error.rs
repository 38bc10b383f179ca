use arbor_branch::BranchError;
use arbor_types::{BranchPath, CommitId};

/// Errors produced by commit log operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommitError {
    #[error("commit not found: {id}")]
    NotFound { id: CommitId },

    #[error("concurrent modification of {branch}: gave up after {attempts} attempts")]
    ConcurrentModification { branch: BranchPath, attempts: u32 },

    #[error("invariant violation in history of {branch}: {reason}")]
    InvariantViolation { branch: BranchPath, reason: String },

    #[error(transparent)]
    Branch(#[from] BranchError),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Convenience alias for commit log operations.
pub type Result<T> = std::result::Result<T, CommitError>;
