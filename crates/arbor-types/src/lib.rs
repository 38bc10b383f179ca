//! Foundation types for arbor.
//!
//! Every other arbor crate depends on `arbor-types`. Nothing in here knows
//! about storage or concurrency beyond the timestamp authority.
//!
//! # Key Types
//!
//! - [`Timestamp`] -- Logical commit timestamp, totally ordered
//! - [`TimestampAuthority`] -- Issues strictly increasing timestamps
//! - [`BranchPath`] -- Validated slash-separated branch path rooted at `MAIN`
//! - [`CommitId`] / [`ReviewId`] -- UUID v7 identifiers

pub mod clock;
pub mod error;
pub mod id;
pub mod path;
pub mod timestamp;

pub use clock::{LogicalClock, TimestampAuthority, WallClock};
pub use error::TypeError;
pub use id::{CommitId, ReviewId};
pub use path::BranchPath;
pub use timestamp::Timestamp;
