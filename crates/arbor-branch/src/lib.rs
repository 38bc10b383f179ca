//! Branch store for arbor.
//!
//! Branches are long-lived, hierarchical lines of history. Each branch is
//! forked from its parent's head (`base`) and moves its own `head` forward
//! as commits land. History is append-only, so a branch's past states never
//! change and any `(base, head]` range can be read without coordination.
//!
//! # Modules
//!
//! - [`error`] -- Error types for branch operations
//! - [`types`] -- [`Branch`], [`BranchState`] snapshots, lifecycle and events
//! - [`traits`] -- The [`BranchStore`] trait defining the storage interface
//! - [`memory`] -- [`InMemoryBranchStore`], an arena of branches keyed by path
//! - [`lineage`] -- Ancestry, divergence segments and branch comparison

pub mod error;
pub mod lineage;
pub mod memory;
pub mod traits;
pub mod types;

pub use error::{BranchError, Result};
pub use lineage::{compare, divergence, relation, CompareState, Divergence, Relation, Segment};
pub use memory::InMemoryBranchStore;
pub use traits::{BranchListener, BranchStore};
pub use types::{Branch, BranchEvent, BranchLifecycle, BranchState};
