use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid branch path '{path}': {reason}")]
    InvalidBranchPath { path: String, reason: String },

    #[error("invalid identifier '{0}'")]
    InvalidId(String),
}
