use arbor_branch::BranchError;
use arbor_commit::CommitError;
use arbor_lock::LockError;
use arbor_merge::MergeError;
use arbor_review::ReviewError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown repository: {id}")]
    UnknownRepository { id: String },

    #[error("repository already exists: {id}")]
    RepositoryExists { id: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Branch(#[from] BranchError),

    #[error(transparent)]
    Commit(#[from] CommitError),

    #[error(transparent)]
    Review(#[from] ReviewError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
