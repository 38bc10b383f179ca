//! Error types for conflict detection.
//!
//! Conflicts themselves are not errors; these cover failures to read the
//! branches or commits being compared.

use arbor_branch::BranchError;
use arbor_commit::CommitError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MergeError {
    #[error(transparent)]
    Branch(#[from] BranchError),

    #[error(transparent)]
    Commit(#[from] CommitError),
}

/// Convenience alias for merge operations.
pub type Result<T> = std::result::Result<T, MergeError>;
