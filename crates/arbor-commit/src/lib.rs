//! Append-only commit log for arbor.
//!
//! This crate provides:
//! - [`Commit`] / [`CommitDetail`] records describing object-level changes
//! - The [`CommitLog`] trait boundary
//! - [`InMemoryCommitLog`], which appends a commit and advances the branch
//!   head as one atomic step per branch
//! - Commit search with author, comment, timestamp and object filters
//! - History validation against the branch store

pub mod error;
pub mod memory;
pub mod records;
pub mod search;
pub mod traits;
pub mod validation;

pub use error::{CommitError, Result};
pub use memory::{InMemoryCommitLog, DEFAULT_MAX_APPEND_RETRIES};
pub use records::{ChangeOp, Commit, CommitDetail, NewCommit};
pub use search::{CommitQuery, Page, SortOrder};
pub use traits::CommitLog;
pub use validation::{validate_history, HistoryReport};
