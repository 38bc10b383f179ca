use arbor_branch::{BranchStore, Segment};
use arbor_types::{BranchPath, Timestamp};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::traits::CommitLog;

/// Result of checking one branch's history against its head.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryReport {
    pub branch: BranchPath,
    pub base_timestamp: Timestamp,
    pub head_timestamp: Timestamp,
    /// Commits found in `(base, head]`.
    pub commit_count: usize,
    pub violations: Vec<String>,
}

impl HistoryReport {
    /// Returns `true` if all checks passed.
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Check that the commits of `branch` agree with its recorded head.
///
/// Within `(base, head]` timestamps must strictly increase and, if there is
/// any commit, the newest one must sit exactly at the head. No commit may
/// exist after the head.
pub fn validate_history<S, L>(store: &S, log: &L, branch: &BranchPath) -> Result<HistoryReport>
where
    S: BranchStore + ?Sized,
    L: CommitLog + ?Sized,
{
    let live = store.get(branch)?;
    store.validate(branch)?;
    let mut violations = Vec::new();

    let commits = log.commits_in(&Segment {
        path: branch.clone(),
        after: live.base_timestamp,
        until: live.head_timestamp,
    })?;

    for pair in commits.windows(2) {
        if pair[1].timestamp <= pair[0].timestamp {
            violations.push(format!(
                "commit {} at {} does not follow {} at {}",
                pair[1].id, pair[1].timestamp, pair[0].id, pair[0].timestamp
            ));
        }
    }

    match commits.last() {
        Some(newest) if newest.timestamp != live.head_timestamp => violations.push(format!(
            "newest commit is at {} but head is {}",
            newest.timestamp, live.head_timestamp
        )),
        None if live.has_commits() => violations.push(format!(
            "head {} is past base {} without any commit",
            live.head_timestamp, live.base_timestamp
        )),
        _ => {}
    }

    let beyond_head = log.commits_in(&Segment {
        path: branch.clone(),
        after: live.head_timestamp,
        until: Timestamp::new(i64::MAX),
    })?;
    for commit in &beyond_head {
        violations.push(format!(
            "commit {} at {} is after head {}",
            commit.id, commit.timestamp, live.head_timestamp
        ));
    }

    Ok(HistoryReport {
        branch: branch.clone(),
        base_timestamp: live.base_timestamp,
        head_timestamp: live.head_timestamp,
        commit_count: commits.len(),
        violations,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arbor_branch::InMemoryBranchStore;
    use arbor_types::LogicalClock;

    use super::*;
    use crate::memory::InMemoryCommitLog;
    use crate::records::{CommitDetail, NewCommit};

    fn add(branch: &BranchPath, id: &str) -> NewCommit {
        NewCommit::new(branch.clone(), "alice", "add")
            .with_detail(CommitDetail::added("Concept", [id]))
    }

    #[test]
    fn appended_history_is_valid() {
        let store = Arc::new(InMemoryBranchStore::new(Timestamp::new(100)));
        let log = InMemoryCommitLog::new(store.clone(), Arc::new(LogicalClock::starting_at(100)));
        store.create(&BranchPath::main(), "task").unwrap();
        let task = BranchPath::parse("MAIN/task").unwrap();

        for i in 0..4 {
            log.append(add(&task, &format!("C{i}"))).unwrap();
        }

        let report = validate_history(store.as_ref(), &log, &task).unwrap();
        assert!(report.is_valid(), "{:?}", report.violations);
        assert_eq!(report.commit_count, 4);
        assert_eq!(report.head_timestamp, Timestamp::new(104));
    }

    #[test]
    fn empty_branch_is_valid() {
        let store = Arc::new(InMemoryBranchStore::new(Timestamp::new(100)));
        let log = InMemoryCommitLog::new(store.clone(), Arc::new(LogicalClock::starting_at(100)));
        let report = validate_history(store.as_ref(), &log, &BranchPath::main()).unwrap();
        assert!(report.is_valid());
        assert_eq!(report.commit_count, 0);
    }

    #[test]
    fn head_moved_without_commit_is_reported() {
        let store = Arc::new(InMemoryBranchStore::new(Timestamp::new(100)));
        let log = InMemoryCommitLog::new(store.clone(), Arc::new(LogicalClock::starting_at(100)));
        log.append(add(&BranchPath::main(), "C1")).unwrap();
        // Head moved behind the log's back.
        store.advance_head(&BranchPath::main(), Timestamp::new(150)).unwrap();

        let report = validate_history(store.as_ref(), &log, &BranchPath::main()).unwrap();
        assert!(!report.is_valid());
        assert!(report.violations[0].contains("head is 150"));
    }
}
