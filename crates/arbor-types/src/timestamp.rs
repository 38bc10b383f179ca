use std::fmt;

use serde::{Deserialize, Serialize};

/// Logical timestamp used to order commits.
///
/// Timestamps are issued by a [`TimestampAuthority`](crate::TimestampAuthority)
/// and are unique and strictly increasing per branch. The raw value is an
/// `i64` so that it can be stored next to epoch milliseconds.
#[derive(
    Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// The smallest meaningful timestamp.
    pub const ZERO: Timestamp = Timestamp(0);

    /// Wrap a raw value.
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// The raw value.
    pub const fn value(self) -> i64 {
        self.0
    }

    /// The next timestamp after this one.
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Returns `true` if this timestamp is strictly after `other`.
    pub fn is_after(self, other: Self) -> bool {
        self > other
    }
}

impl From<i64> for Timestamp {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
