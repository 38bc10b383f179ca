use arbor_branch::Segment;
use arbor_types::{BranchPath, CommitId, Timestamp};

use crate::error::Result;
use crate::records::{Commit, NewCommit};
use crate::search::{CommitQuery, Page};

/// The append-only commit log.
///
/// There is no update or delete: corrections are new commits.
pub trait CommitLog: Send + Sync {
    /// Append a commit at the next timestamp of the timestamp authority and
    /// advance the branch head, atomically.
    fn append(&self, commit: NewCommit) -> Result<Commit>;

    /// Append a commit at an explicit timestamp, which must be strictly
    /// greater than the branch head.
    fn append_at(&self, commit: NewCommit, timestamp: Timestamp) -> Result<Commit>;

    /// Read a commit by id.
    fn get(&self, id: &CommitId) -> Result<Commit>;

    /// Filtered, sorted, paged search.
    fn search(&self, query: &CommitQuery) -> Result<Page<Commit>>;

    /// Commits on `segment.path` in `(segment.after, segment.until]`,
    /// ascending by timestamp.
    fn commits_in(&self, segment: &Segment) -> Result<Vec<Commit>>;

    /// Commits on `branch` in `(after, until]`, ascending by timestamp.
    fn commits_between(
        &self,
        branch: &BranchPath,
        after: Timestamp,
        until: Timestamp,
    ) -> Result<Vec<Commit>> {
        self.commits_in(&Segment {
            path: branch.clone(),
            after,
            until,
        })
    }

    /// Commits of every segment, ascending by timestamp.
    fn commits_in_all(&self, segments: &[Segment]) -> Result<Vec<Commit>> {
        let mut commits = Vec::new();
        for segment in segments {
            commits.extend(self.commits_in(segment)?);
        }
        commits.sort_by_key(|commit| commit.timestamp);
        Ok(commits)
    }
}
