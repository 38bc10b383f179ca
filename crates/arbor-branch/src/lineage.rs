//! Ancestry and divergence queries over the branch hierarchy.
//!
//! The divergence of two branches is described as a list of [`Segment`]s per
//! side: half-open timestamp ranges `(after, until]` on specific branches
//! whose commits make up that side's changes since the common fork point.
//! Because heads only move when commits land, a non-empty segment always
//! contains at least one commit.
//!
//! ```text
//!              base   head
//! MAIN/a/b           o-----●            segment (b.base, b.head]
//! MAIN/a        o----●                  segment (a.base, b.base]
//! MAIN    ------●--------------●        fork = a.base
//! ```

use arbor_types::{BranchPath, Timestamp};
use serde::{Deserialize, Serialize};

use crate::error::{BranchError, Result};
use crate::traits::BranchStore;
use crate::types::BranchState;

/// How two branch paths relate in the hierarchy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Relation {
    Same,
    /// The left path is a strict ancestor of the right one.
    AncestorOf,
    /// The left path is a strict descendant of the right one.
    DescendantOf,
    /// Neither contains the other (siblings, cousins).
    Unrelated,
}

/// Relation of `left` to `right`.
pub fn relation(left: &BranchPath, right: &BranchPath) -> Relation {
    if left == right {
        Relation::Same
    } else if left.is_ancestor_of(right) {
        Relation::AncestorOf
    } else if left.is_descendant_of(right) {
        Relation::DescendantOf
    } else {
        Relation::Unrelated
    }
}

/// The deepest path that is `a`, `b`, or an ancestor of both.
pub fn common_ancestor(a: &BranchPath, b: &BranchPath) -> BranchPath {
    if a == b || a.is_ancestor_of(b) {
        return a.clone();
    }
    if b.is_ancestor_of(a) {
        return b.clone();
    }
    a.ancestors()
        .into_iter()
        .find(|candidate| candidate.is_ancestor_of(b))
        .unwrap_or_else(BranchPath::main)
}

/// Commits on `path` with `after < timestamp <= until`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub path: BranchPath,
    pub after: Timestamp,
    pub until: Timestamp,
}

impl Segment {
    /// Returns `true` if the range cannot contain any commit.
    pub fn is_empty(&self) -> bool {
        self.until <= self.after
    }

    /// Returns `true` if `timestamp` falls into the range.
    pub fn contains(&self, timestamp: Timestamp) -> bool {
        timestamp > self.after && timestamp <= self.until
    }
}

/// The divergence of two branch states from their common ancestor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Divergence {
    /// The deepest branch both sides descend from (or are).
    pub ancestor: BranchPath,
    /// Timestamp on `ancestor` up to which both sides share history.
    pub fork_point: Timestamp,
    /// Segments holding the left side's changes, nearest branch first.
    pub left: Vec<Segment>,
    /// Segments holding the right side's changes, nearest branch first.
    pub right: Vec<Segment>,
}

impl Divergence {
    pub fn left_changed(&self) -> bool {
        !self.left.is_empty()
    }

    pub fn right_changed(&self) -> bool {
        !self.right.is_empty()
    }
}

/// Segments from `side` up to (excluding) `ancestor`, plus the timestamp on
/// `ancestor` at which `side`'s line of history leaves it.
fn climb<S: BranchStore + ?Sized>(
    store: &S,
    side: &BranchState,
    ancestor: &BranchPath,
) -> Result<(Vec<Segment>, Timestamp)> {
    if &side.path == ancestor {
        return Ok((Vec::new(), side.head_timestamp));
    }

    let mut segments = vec![Segment {
        path: side.path.clone(),
        after: side.base_timestamp,
        until: side.head_timestamp,
    }];
    let mut child_base = side.base_timestamp;

    for path in side.path.ancestors() {
        if &path == ancestor {
            segments.retain(|s| !s.is_empty());
            return Ok((segments, child_base));
        }
        let branch = store.get(&path)?;
        if branch.base_timestamp > child_base {
            return Err(BranchError::InvariantViolation {
                path: path.to_string(),
                reason: format!(
                    "base {} is after the fork point {child_base} of a child",
                    branch.base_timestamp
                ),
            });
        }
        segments.push(Segment {
            path,
            after: branch.base_timestamp,
            until: child_base,
        });
        child_base = branch.base_timestamp;
    }

    Err(BranchError::InvariantViolation {
        path: side.path.to_string(),
        reason: format!("{ancestor} is not an ancestor"),
    })
}

/// Compute how `left` and `right` diverged from their common ancestor.
///
/// The heads of `left` and `right` are taken from the snapshots; the bases of
/// intermediate branches are read from the store (they never change).
pub fn divergence<S: BranchStore + ?Sized>(
    store: &S,
    left: &BranchState,
    right: &BranchState,
) -> Result<Divergence> {
    let ancestor = common_ancestor(&left.path, &right.path);
    let (mut left_segments, left_cutoff) = climb(store, left, &ancestor)?;
    let (mut right_segments, right_cutoff) = climb(store, right, &ancestor)?;
    let fork_point = left_cutoff.min(right_cutoff);

    for (segments, cutoff) in [
        (&mut left_segments, left_cutoff),
        (&mut right_segments, right_cutoff),
    ] {
        if cutoff > fork_point {
            segments.push(Segment {
                path: ancestor.clone(),
                after: fork_point,
                until: cutoff,
            });
        }
    }

    Ok(Divergence {
        ancestor,
        fork_point,
        left: left_segments,
        right: right_segments,
    })
}

/// State of one branch compared with another.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompareState {
    /// No commits on either side since the fork point.
    UpToDate,
    /// Commits only on the left side.
    Forward,
    /// Commits only on the right side.
    Behind,
    /// Commits on both sides.
    Diverged,
}

/// Compare the live states of `left` and `right`.
pub fn compare<S: BranchStore + ?Sized>(
    store: &S,
    left: &BranchPath,
    right: &BranchPath,
) -> Result<CompareState> {
    let left = store.state(left)?;
    let right = store.state(right)?;
    let divergence = divergence(store, &left, &right)?;
    Ok(
        match (divergence.left_changed(), divergence.right_changed()) {
            (false, false) => CompareState::UpToDate,
            (true, false) => CompareState::Forward,
            (false, true) => CompareState::Behind,
            (true, true) => CompareState::Diverged,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBranchStore;

    fn path(s: &str) -> BranchPath {
        BranchPath::parse(s).unwrap()
    }

    fn ts(v: i64) -> Timestamp {
        Timestamp::new(v)
    }

    fn seg(p: &str, after: i64, until: i64) -> Segment {
        Segment {
            path: path(p),
            after: ts(after),
            until: ts(until),
        }
    }

    #[test]
    fn relation_cases() {
        assert_eq!(relation(&path("MAIN"), &path("MAIN")), Relation::Same);
        assert_eq!(relation(&path("MAIN"), &path("MAIN/a")), Relation::AncestorOf);
        assert_eq!(relation(&path("MAIN/a/b"), &path("MAIN")), Relation::DescendantOf);
        assert_eq!(relation(&path("MAIN/a"), &path("MAIN/b")), Relation::Unrelated);
    }

    #[test]
    fn common_ancestor_cases() {
        assert_eq!(common_ancestor(&path("MAIN/a/b"), &path("MAIN/a/c")), path("MAIN/a"));
        assert_eq!(common_ancestor(&path("MAIN/a"), &path("MAIN/a/c")), path("MAIN/a"));
        assert_eq!(common_ancestor(&path("MAIN/x"), &path("MAIN/y/z")), path("MAIN"));
        assert_eq!(common_ancestor(&path("MAIN/a"), &path("MAIN/a")), path("MAIN/a"));
    }

    #[test]
    fn task_against_parent_after_both_moved() {
        let store = InMemoryBranchStore::new(ts(100));
        store.create(&BranchPath::main(), "task1").unwrap();
        store.advance_head(&path("MAIN/task1"), ts(105)).unwrap();
        store.advance_head(&path("MAIN"), ts(110)).unwrap();

        let left = store.state(&path("MAIN/task1")).unwrap();
        let right = store.state(&path("MAIN")).unwrap();
        let d = divergence(&store, &left, &right).unwrap();

        assert_eq!(d.ancestor, path("MAIN"));
        assert_eq!(d.fork_point, ts(100));
        assert_eq!(d.left, vec![seg("MAIN/task1", 100, 105)]);
        assert_eq!(d.right, vec![seg("MAIN", 100, 110)]);
    }

    #[test]
    fn grandchild_includes_intermediate_history() {
        let store = InMemoryBranchStore::new(ts(100));
        store.create(&BranchPath::main(), "a").unwrap();
        store.advance_head(&path("MAIN/a"), ts(120)).unwrap();
        store.create(&path("MAIN/a"), "b").unwrap();
        store.advance_head(&path("MAIN/a/b"), ts(130)).unwrap();
        store.advance_head(&path("MAIN/a"), ts(140)).unwrap();

        let b = store.state(&path("MAIN/a/b")).unwrap();
        let main = store.state(&path("MAIN")).unwrap();
        let d = divergence(&store, &b, &main).unwrap();

        // Commits on MAIN/a after b forked (140) are not part of b.
        assert_eq!(d.left, vec![seg("MAIN/a/b", 120, 130), seg("MAIN/a", 100, 120)]);
        assert!(d.right.is_empty());
    }

    #[test]
    fn siblings_split_shared_parent_history() {
        let store = InMemoryBranchStore::new(ts(100));
        store.create(&BranchPath::main(), "x").unwrap();
        store.advance_head(&path("MAIN"), ts(110)).unwrap();
        store.create(&BranchPath::main(), "y").unwrap();
        store.advance_head(&path("MAIN/x"), ts(115)).unwrap();

        let x = store.state(&path("MAIN/x")).unwrap();
        let y = store.state(&path("MAIN/y")).unwrap();
        let d = divergence(&store, &x, &y).unwrap();

        assert_eq!(d.fork_point, ts(100));
        assert_eq!(d.left, vec![seg("MAIN/x", 100, 115)]);
        // y inherited MAIN's commit at 110 that x never saw.
        assert_eq!(d.right, vec![seg("MAIN", 100, 110)]);
    }

    #[test]
    fn same_branch_has_no_divergence() {
        let store = InMemoryBranchStore::new(ts(100));
        store.advance_head(&path("MAIN"), ts(110)).unwrap();
        let main = store.state(&path("MAIN")).unwrap();
        let d = divergence(&store, &main, &main).unwrap();
        assert!(!d.left_changed());
        assert!(!d.right_changed());
    }

    #[test]
    fn compare_states() {
        let store = InMemoryBranchStore::new(ts(100));
        store.create(&BranchPath::main(), "t").unwrap();
        let t = path("MAIN/t");
        let main = BranchPath::main();

        assert_eq!(compare(&store, &t, &main).unwrap(), CompareState::UpToDate);

        store.advance_head(&t, ts(101)).unwrap();
        assert_eq!(compare(&store, &t, &main).unwrap(), CompareState::Forward);
        assert_eq!(compare(&store, &main, &t).unwrap(), CompareState::Behind);

        store.advance_head(&main, ts(102)).unwrap();
        assert_eq!(compare(&store, &t, &main).unwrap(), CompareState::Diverged);
    }

    #[test]
    fn segment_bounds_are_half_open() {
        let s = seg("MAIN", 100, 110);
        assert!(!s.contains(ts(100)));
        assert!(s.contains(ts(101)));
        assert!(s.contains(ts(110)));
        assert!(!s.contains(ts(111)));
        assert!(seg("MAIN", 100, 100).is_empty());
    }
}
