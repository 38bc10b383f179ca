//! Error types for the review engine.

use arbor_branch::BranchError;
use arbor_commit::CommitError;
use arbor_types::{BranchPath, ReviewId};

use crate::review::ReviewStatus;

/// Errors that can occur during review operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReviewError {
    #[error("review not found: {id}")]
    NotFound { id: ReviewId },

    /// Neither branch is an ancestor of the other.
    #[error("branches {source_branch} and {target_branch} are not related")]
    UnrelatedBranches {
        source_branch: BranchPath,
        target_branch: BranchPath,
    },

    /// Changes are only served for `CURRENT` reviews.
    #[error("changes of review {id} are not available: review is {status}")]
    ChangesNotAvailable { id: ReviewId, status: ReviewStatus },

    #[error(transparent)]
    Branch(#[from] BranchError),

    #[error(transparent)]
    Commit(#[from] CommitError),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias for review operations.
pub type Result<T> = std::result::Result<T, ReviewError>;
