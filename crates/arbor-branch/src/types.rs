//! Core branch types.
//!
//! A [`Branch`] is the live, mutable record kept by a store. A
//! [`BranchState`] is an immutable copy of its identity and timestamps taken
//! at one point in time; comparing it against the live branch later tells
//! whether anything landed in between.

use arbor_types::{BranchPath, Timestamp};
use serde::{Deserialize, Serialize};

/// Lifecycle of a branch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BranchLifecycle {
    /// Accepts commits.
    Active,
    /// Readable, but an ancestor was deleted so writes are refused.
    Stale,
    /// Deleted. Irreversible; the path stays taken.
    Deleted,
}

/// A named, hierarchical line of history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
    /// Full path, e.g. `MAIN/task1`.
    pub path: BranchPath,
    /// Path of the parent branch; `None` only for `MAIN`.
    pub parent_path: Option<BranchPath>,
    /// Parent head at the time this branch was created.
    pub base_timestamp: Timestamp,
    /// Timestamp of the latest commit, or the base if there is none.
    pub head_timestamp: Timestamp,
    /// Lifecycle state.
    pub state: BranchLifecycle,
}

impl Branch {
    /// The root branch with both timestamps at `timestamp`.
    pub fn main(timestamp: Timestamp) -> Self {
        Self {
            path: BranchPath::main(),
            parent_path: None,
            base_timestamp: timestamp,
            head_timestamp: timestamp,
            state: BranchLifecycle::Active,
        }
    }

    /// A fresh child of `parent`, forked at the parent's head.
    pub fn fork(parent: &Branch, path: BranchPath) -> Self {
        Self {
            path,
            parent_path: Some(parent.path.clone()),
            base_timestamp: parent.head_timestamp,
            head_timestamp: parent.head_timestamp,
            state: BranchLifecycle::Active,
        }
    }

    /// Snapshot the branch's identity and timestamps.
    pub fn state(&self) -> BranchState {
        BranchState {
            path: self.path.clone(),
            base_timestamp: self.base_timestamp,
            head_timestamp: self.head_timestamp,
        }
    }

    /// Returns `true` once the branch is deleted.
    pub fn is_deleted(&self) -> bool {
        self.state == BranchLifecycle::Deleted
    }

    /// Returns `true` if commits have landed since the fork point.
    pub fn has_commits(&self) -> bool {
        self.head_timestamp > self.base_timestamp
    }
}

/// An immutable snapshot of a branch.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchState {
    pub path: BranchPath,
    pub base_timestamp: Timestamp,
    pub head_timestamp: Timestamp,
}

impl BranchState {
    /// Returns `true` if `branch` still has exactly this path, base and head.
    pub fn matches(&self, branch: &Branch) -> bool {
        self.path == branch.path
            && self.base_timestamp == branch.base_timestamp
            && self.head_timestamp == branch.head_timestamp
    }
}

/// A change to the branch hierarchy, delivered to
/// [`BranchListener`](crate::BranchListener)s after it is applied.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BranchEvent {
    Created { path: BranchPath },
    HeadAdvanced { path: BranchPath, head: Timestamp },
    Deleted { path: BranchPath },
}

impl BranchEvent {
    /// The branch the event is about.
    pub fn path(&self) -> &BranchPath {
        match self {
            BranchEvent::Created { path }
            | BranchEvent::HeadAdvanced { path, .. }
            | BranchEvent::Deleted { path } => path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fork_starts_at_parent_head() {
        let mut main = Branch::main(Timestamp::new(50));
        main.head_timestamp = Timestamp::new(100);

        let child = Branch::fork(&main, main.path.child("task1").unwrap());
        assert_eq!(child.base_timestamp, Timestamp::new(100));
        assert_eq!(child.head_timestamp, Timestamp::new(100));
        assert_eq!(child.parent_path, Some(BranchPath::main()));
        assert!(!child.has_commits());
    }

    #[test]
    fn snapshot_matches_until_head_moves() {
        let mut main = Branch::main(Timestamp::new(100));
        let snapshot = main.state();
        assert!(snapshot.matches(&main));

        main.head_timestamp = Timestamp::new(101);
        assert!(!snapshot.matches(&main));
    }

    #[test]
    fn lifecycle_serializes_in_upper_case() {
        let json = serde_json::to_string(&BranchLifecycle::Deleted).unwrap();
        assert_eq!(json, "\"DELETED\"");
    }

    #[test]
    fn branch_serializes_camel_case_fields() {
        let json = serde_json::to_value(Branch::main(Timestamp::new(7))).unwrap();
        assert_eq!(json["path"], "MAIN");
        assert_eq!(json["baseTimestamp"], 7);
        assert_eq!(json["headTimestamp"], 7);
        assert_eq!(json["state"], "ACTIVE");
    }
}
