//! Error types for lock operations.

use crate::types::Lockable;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LockError {
    /// A target stayed held by an unrelated context until the deadline.
    #[error("timed out after {timeout_ms} ms waiting for {lockable}, held by {holder}")]
    LockTimeout {
        lockable: Lockable,
        holder: String,
        timeout_ms: u64,
    },

    #[error("no lock targets given")]
    NoTargets,

    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias for lock operations.
pub type Result<T> = std::result::Result<T, LockError>;
