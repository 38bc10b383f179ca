//! Review engine for arbor.
//!
//! A review is the set of objects added, changed and deleted between two
//! related branch states. Reviews are computed once per branch pair,
//! cached, and marked stale as soon as either branch moves.
//!
//! # Key Types
//!
//! - [`ReviewManager`] -- creates, caches, invalidates and expires reviews
//! - [`Review`] / [`ReviewStatus`] -- review record and lifecycle
//! - [`ConceptChanges`] -- the computed new/changed/deleted id sets
//! - [`classify`] -- folds a commit sequence into a [`ChangeSet`]

pub mod changes;
pub mod config;
pub mod error;
pub mod manager;
pub mod review;

pub use changes::{classify, ChangeSet};
pub use config::ReviewConfig;
pub use error::{Result, ReviewError};
pub use manager::ReviewManager;
pub use review::{ConceptChanges, Review, ReviewStatus};
