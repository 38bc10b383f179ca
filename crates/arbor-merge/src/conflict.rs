use serde::{Deserialize, Serialize};

/// Artefact type reported when neither the delta nor a resolver knows it.
pub const UNKNOWN_TYPE: &str = "Unknown";

/// The five kinds of merge conflict.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictKind {
    /// Both sides set the same attribute to different values, or both added
    /// the same id.
    ConflictingChange,
    /// Changed on the source, deleted on the target.
    DeletedWhileChanged,
    /// Deleted on the source, changed on the target.
    ChangedWhileDeleted,
    /// Added on the source inside a container the target deleted.
    CausesMissingReference,
    /// Added on the target inside a container the source deleted.
    HasMissingReference,
}

impl ConflictKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ConflictKind::ConflictingChange => "CONFLICTING_CHANGE",
            ConflictKind::DeletedWhileChanged => "DELETED_WHILE_CHANGED",
            ConflictKind::ChangedWhileDeleted => "CHANGED_WHILE_DELETED",
            ConflictKind::CausesMissingReference => "CAUSES_MISSING_REFERENCE",
            ConflictKind::HasMissingReference => "HAS_MISSING_REFERENCE",
        }
    }
}

/// One incompatibility between the source and target deltas.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeConflict {
    pub artefact_id: String,
    pub artefact_type: String,
    #[serde(rename = "type")]
    pub kind: ConflictKind,
    /// Sorted and de-duplicated.
    pub conflicting_attributes: Vec<String>,
}

impl MergeConflict {
    /// A human-readable explanation.
    pub fn message(&self) -> String {
        let subject = format!("{} '{}'", self.artefact_type, self.artefact_id);
        let attributes = self.conflicting_attributes.join(", ");
        match self.kind {
            ConflictKind::ConflictingChange if self.conflicting_attributes.is_empty() => {
                format!("{subject} was added on both branches")
            }
            ConflictKind::ConflictingChange => {
                format!("{subject} has conflicting changes to {attributes}")
            }
            ConflictKind::DeletedWhileChanged => {
                format!("{subject} was changed on the source but deleted on the target")
            }
            ConflictKind::ChangedWhileDeleted => {
                format!("{subject} was deleted on the source but changed on the target")
            }
            ConflictKind::CausesMissingReference => {
                format!("{subject} added on the source refers to {attributes}, deleted on the target")
            }
            ConflictKind::HasMissingReference => {
                format!("{subject} added on the target refers to {attributes}, deleted on the source")
            }
        }
    }
}
