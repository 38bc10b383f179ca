//! Review records.

use std::fmt;

use arbor_branch::BranchState;
use arbor_types::ReviewId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::changes::ChangeSet;

/// Lifecycle of a review.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewStatus {
    /// The diff is being computed.
    Pending,
    /// Computed, and neither branch has moved since the snapshots.
    Current,
    /// A branch moved after the snapshots were taken. Terminal.
    Stale,
    /// The computation failed. Terminal.
    Failed,
}

impl ReviewStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReviewStatus::Pending => "PENDING",
            ReviewStatus::Current => "CURRENT",
            ReviewStatus::Stale => "STALE",
            ReviewStatus::Failed => "FAILED",
        }
    }

    /// Returns `true` once the status can no longer change.
    pub fn is_terminal(self) -> bool {
        matches!(self, ReviewStatus::Stale | ReviewStatus::Failed)
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A diff between two related branch states.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: ReviewId,
    pub source: BranchState,
    pub target: BranchState,
    pub status: ReviewStatus,
    pub last_updated: DateTime<Utc>,
    /// Failure message for `FAILED` reviews.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Review {
    pub(crate) fn pending(source: BranchState, target: BranchState, now: DateTime<Utc>) -> Self {
        Self {
            id: ReviewId::new(),
            source,
            target,
            status: ReviewStatus::Pending,
            last_updated: now,
            error: None,
        }
    }

    pub(crate) fn transition(&mut self, status: ReviewStatus, now: DateTime<Utc>) {
        self.status = status;
        self.last_updated = now;
    }
}

/// The computed payload of a `CURRENT` review. Immutable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptChanges {
    pub review_id: ReviewId,
    #[serde(flatten)]
    pub changes: ChangeSet,
}

impl ConceptChanges {
    pub fn new_ids(&self) -> impl Iterator<Item = &str> {
        self.changes.new_ids.iter().map(String::as_str)
    }

    pub fn changed_ids(&self) -> impl Iterator<Item = &str> {
        self.changes.changed_ids.iter().map(String::as_str)
    }

    pub fn deleted_ids(&self) -> impl Iterator<Item = &str> {
        self.changes.deleted_ids.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_branch::Branch;
    use arbor_types::Timestamp;

    #[test]
    fn status_wire_names() {
        assert_eq!(serde_json::to_string(&ReviewStatus::Current).unwrap(), "\"CURRENT\"");
        assert_eq!(ReviewStatus::Stale.to_string(), "STALE");
        assert!(ReviewStatus::Failed.is_terminal());
        assert!(!ReviewStatus::Pending.is_terminal());
    }

    #[test]
    fn concept_changes_flatten_id_sets() {
        let mut changes = ChangeSet::default();
        changes.new_ids.insert("N1".into());
        let payload = ConceptChanges {
            review_id: ReviewId::new(),
            changes,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["newIds"], serde_json::json!(["N1"]));
        assert_eq!(json["deletedIds"], serde_json::json!([]));
        assert_eq!(payload.new_ids().collect::<Vec<_>>(), vec!["N1"]);
    }

    #[test]
    fn pending_review_records_snapshots() {
        let main = Branch::main(Timestamp::new(100)).state();
        let review = Review::pending(main.clone(), main.clone(), Utc::now());
        assert_eq!(review.status, ReviewStatus::Pending);
        assert_eq!(review.source, main);
        assert!(review.error.is_none());
    }
}
