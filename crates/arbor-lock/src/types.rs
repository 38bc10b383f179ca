//! What is locked, and on whose behalf.

use std::fmt;

use arbor_types::BranchPath;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The unit a lock is taken on: a branch of a repository, or the whole
/// repository when `branch_path` is `None`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lockable {
    pub repository_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_path: Option<BranchPath>,
}

impl Lockable {
    pub fn branch(repository_id: impl Into<String>, path: BranchPath) -> Self {
        Self {
            repository_id: repository_id.into(),
            branch_path: Some(path),
        }
    }

    /// Every branch of the repository.
    pub fn repository(repository_id: impl Into<String>) -> Self {
        Self {
            repository_id: repository_id.into(),
            branch_path: None,
        }
    }

    /// Returns `true` if holding `self` implies holding `other`.
    pub fn covers(&self, other: &Lockable) -> bool {
        if self.repository_id != other.repository_id {
            return false;
        }
        match (&self.branch_path, &other.branch_path) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(mine), Some(theirs)) => mine == theirs || mine.is_ancestor_of(theirs),
        }
    }

    /// Returns `true` if the two lockables cannot be held by unrelated
    /// contexts at the same time.
    pub fn overlaps(&self, other: &Lockable) -> bool {
        self.covers(other) || other.covers(self)
    }
}

impl fmt::Display for Lockable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.branch_path {
            Some(path) => write!(f, "{}:{}", self.repository_id, path),
            None => write!(f, "{}:*", self.repository_id),
        }
    }
}

/// Who takes a lock and why.
///
/// Nested operations pass their caller's description as
/// `parent_description`, so a merge that locks inside a larger versioning
/// job can re-enter the job's locks.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockContext {
    pub user_id: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_description: Option<String>,
    /// Connection of a remote client. Transitions of session-bound locks
    /// are published to listeners.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl LockContext {
    pub fn new(user_id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            description: description.into(),
            parent_description: None,
            session_id: None,
        }
    }

    pub fn with_parent(mut self, parent_description: impl Into<String>) -> Self {
        self.parent_description = Some(parent_description.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Same user, and the descriptions are equal or one is the other's
    /// parent. The coordinator follows these links through every context
    /// the user holds, so deeper nesting is related too.
    pub fn is_related_to(&self, other: &LockContext) -> bool {
        if self.user_id != other.user_id {
            return false;
        }
        self.description == other.description
            || self.parent_description.as_deref() == Some(other.description.as_str())
            || other.parent_description.as_deref() == Some(self.description.as_str())
    }

    /// Identity used by `unlock`: the session is not part of it.
    pub(crate) fn same_owner(&self, other: &LockContext) -> bool {
        self.user_id == other.user_id
            && self.description == other.description
            && self.parent_description == other.parent_description
    }
}

impl fmt::Display for LockContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.user_id, self.description)?;
        if let Some(parent) = &self.parent_description {
            write!(f, " within '{parent}'")?;
        }
        Ok(())
    }
}

/// A held lock as reported by the coordinator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockInfo {
    pub lockable: Lockable,
    pub holder: LockContext,
    /// Re-entrant acquisitions not yet released.
    pub count: u32,
    pub acquired_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(p: &str) -> BranchPath {
        BranchPath::parse(p).unwrap()
    }

    #[test]
    fn branch_lock_covers_descendants_only() {
        let main = Lockable::branch("snomed", BranchPath::main());
        let task = Lockable::branch("snomed", path("MAIN/task"));
        let sibling = Lockable::branch("snomed", path("MAIN/other"));

        assert!(main.covers(&task));
        assert!(!task.covers(&main));
        assert!(task.overlaps(&main));
        assert!(!task.overlaps(&sibling));
    }

    #[test]
    fn repository_lock_covers_every_branch_of_that_repository() {
        let repo = Lockable::repository("snomed");
        assert!(repo.covers(&Lockable::branch("snomed", path("MAIN/a/b"))));
        assert!(!repo.covers(&Lockable::branch("loinc", BranchPath::main())));
        assert!(!Lockable::branch("snomed", BranchPath::main()).covers(&repo));
    }

    #[test]
    fn contexts_are_related_along_the_description_chain() {
        let job = LockContext::new("alice", "versioning");
        let merge = LockContext::new("alice", "merge").with_parent("versioning");
        let stranger = LockContext::new("bob", "merge").with_parent("versioning");

        assert!(job.is_related_to(&merge));
        assert!(merge.is_related_to(&job));
        assert!(!merge.is_related_to(&stranger));
        assert!(!LockContext::new("alice", "rebase").is_related_to(&merge));
    }

    #[test]
    fn display_forms() {
        assert_eq!(Lockable::branch("snomed", path("MAIN/a")).to_string(), "snomed:MAIN/a");
        assert_eq!(Lockable::repository("snomed").to_string(), "snomed:*");
        assert_eq!(
            LockContext::new("alice", "merge").with_parent("versioning").to_string(),
            "alice (merge) within 'versioning'"
        );
    }
}
