//! Merge conflict detection for arbor.
//!
//! Compares what two diverging branches did to each object since their
//! common ancestor and classifies the combinations that cannot be applied
//! together. Conflicts are returned as data; the caller decides whether to
//! apply or abort.
//!
//! # Key Types
//!
//! - [`Delta`] / [`ObjectDelta`] -- net per-object effect of one side's commits
//! - [`ConflictDetector`] -- the three-way comparison, with optional [`TypeResolver`]
//! - [`MergeConflict`] / [`ConflictKind`] -- one reported incompatibility

pub mod conflict;
pub mod delta;
pub mod detector;
pub mod error;

pub use conflict::{ConflictKind, MergeConflict, UNKNOWN_TYPE};
pub use delta::{branch_deltas, Delta, ObjectDelta};
pub use detector::{ConflictDetector, DetectorOptions, TypeResolver};
pub use error::{MergeError, Result};
