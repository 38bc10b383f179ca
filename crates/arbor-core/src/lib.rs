//! Arbor core facade.
//!
//! Wires the branch store, commit log, review manager, conflict detector
//! and lock coordinator of each repository together and exposes the
//! operations request handlers call. Transport-agnostic: no web framework
//! is involved.
//!
//! # Key Types
//!
//! - [`Repository`] -- every branching operation for one repository
//! - [`Repositories`] -- multi-tenant registry sharing one lock coordinator
//! - [`CoreConfig`] -- TOML-loadable configuration
//! - [`spawn_maintenance`] -- background review staleness and retention sweeps

pub mod config;
pub mod error;
pub mod maintenance;
pub mod registry;
pub mod repository;

pub use config::{ClockConfig, ClockKind, CommitConfig, CoreConfig};
pub use error::{CoreError, Result};
pub use maintenance::{spawn_maintenance, MaintenanceHandle, MaintenanceReport};
pub use registry::Repositories;
pub use repository::Repository;

pub use arbor_branch::{Branch, BranchLifecycle, BranchState, CompareState};
pub use arbor_commit::{ChangeOp, Commit, CommitDetail, CommitQuery, HistoryReport, NewCommit, Page, SortOrder};
pub use arbor_lock::{LockContext, LockInfo, Lockable};
pub use arbor_merge::{ConflictKind, DetectorOptions, MergeConflict};
pub use arbor_review::{ConceptChanges, Review, ReviewConfig, ReviewStatus};
pub use arbor_types::{BranchPath, CommitId, ReviewId, Timestamp};
