//! Commit records.
//!
//! A [`Commit`] is immutable once written. Each [`CommitDetail`] describes
//! either a scalar property change on one or more objects, or a structural
//! add/remove. Structural details that carry a `component_type` describe
//! components added to (or removed from) container objects: the containers
//! listed in `object_ids` own the component ids listed per container in
//! `components_by_object`.

use std::collections::{BTreeMap, BTreeSet};

use arbor_types::{BranchPath, CommitId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of change recorded by a [`CommitDetail`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeOp {
    Add,
    Remove,
    Change,
}

/// One object-level change inside a commit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitDetail {
    pub op: ChangeOp,
    pub object_type: String,
    pub object_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_type: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub components_by_object: BTreeMap<String, BTreeSet<String>>,
}

impl CommitDetail {
    fn structural(op: ChangeOp, object_type: impl Into<String>, ids: Vec<String>) -> Self {
        Self {
            op,
            object_type: object_type.into(),
            object_ids: ids,
            property: None,
            from_value: None,
            to_value: None,
            component_type: None,
            components_by_object: BTreeMap::new(),
        }
    }

    /// New objects of `object_type`.
    pub fn added<I, S>(object_type: impl Into<String>, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::structural(ChangeOp::Add, object_type, ids.into_iter().map(Into::into).collect())
    }

    /// Removed objects of `object_type`.
    pub fn removed<I, S>(object_type: impl Into<String>, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::structural(ChangeOp::Remove, object_type, ids.into_iter().map(Into::into).collect())
    }

    /// A scalar property change on a single object.
    pub fn changed(
        object_type: impl Into<String>,
        id: impl Into<String>,
        property: impl Into<String>,
        from: Value,
        to: Value,
    ) -> Self {
        Self {
            op: ChangeOp::Change,
            object_type: object_type.into(),
            object_ids: vec![id.into()],
            property: Some(property.into()),
            from_value: Some(from),
            to_value: Some(to),
            component_type: None,
            components_by_object: BTreeMap::new(),
        }
    }

    /// Components of `component_type` added to containers of `object_type`.
    pub fn components_added(
        object_type: impl Into<String>,
        component_type: impl Into<String>,
        components_by_object: BTreeMap<String, BTreeSet<String>>,
    ) -> Self {
        Self::components(ChangeOp::Add, object_type, component_type, components_by_object)
    }

    /// Components of `component_type` removed from containers of
    /// `object_type`.
    pub fn components_removed(
        object_type: impl Into<String>,
        component_type: impl Into<String>,
        components_by_object: BTreeMap<String, BTreeSet<String>>,
    ) -> Self {
        Self::components(ChangeOp::Remove, object_type, component_type, components_by_object)
    }

    fn components(
        op: ChangeOp,
        object_type: impl Into<String>,
        component_type: impl Into<String>,
        components_by_object: BTreeMap<String, BTreeSet<String>>,
    ) -> Self {
        Self {
            op,
            object_type: object_type.into(),
            object_ids: components_by_object.keys().cloned().collect(),
            property: None,
            from_value: None,
            to_value: None,
            component_type: Some(component_type.into()),
            components_by_object,
        }
    }

    /// Returns `true` for structural details about related components.
    pub fn is_component_change(&self) -> bool {
        self.component_type.is_some()
    }

    /// Returns `true` for scalar property changes.
    pub fn is_property_change(&self) -> bool {
        self.op == ChangeOp::Change && self.property.is_some()
    }

    /// Every object id this detail touches: the listed objects plus any
    /// components.
    pub fn affected_ids(&self) -> impl Iterator<Item = &str> {
        self.object_ids.iter().map(String::as_str).chain(
            self.components_by_object
                .values()
                .flat_map(|components| components.iter().map(String::as_str)),
        )
    }
}

/// An immutable, timestamped set of changes on one branch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    pub id: CommitId,
    pub branch: BranchPath,
    pub author: String,
    pub comment: String,
    pub timestamp: Timestamp,
    pub group_id: String,
    pub details: Vec<CommitDetail>,
}

impl Commit {
    /// Returns `true` if any detail touches `object_id`.
    pub fn affects(&self, object_id: &str) -> bool {
        self.details
            .iter()
            .any(|detail| detail.affected_ids().any(|id| id == object_id))
    }
}

/// A commit waiting to be appended.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCommit {
    pub branch: BranchPath,
    pub author: String,
    pub comment: String,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub details: Vec<CommitDetail>,
}

impl NewCommit {
    pub fn new(branch: BranchPath, author: impl Into<String>, comment: impl Into<String>) -> Self {
        Self {
            branch,
            author: author.into(),
            comment: comment.into(),
            group_id: None,
            details: Vec::new(),
        }
    }

    /// Attach a detail.
    pub fn with_detail(mut self, detail: CommitDetail) -> Self {
        self.details.push(detail);
        self
    }

    /// Group this commit with others (e.g. a multi-branch operation).
    pub fn with_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    /// Materialize the commit at `timestamp`.
    pub(crate) fn into_commit(self, timestamp: Timestamp) -> Commit {
        let id = CommitId::new();
        Commit {
            id,
            group_id: self.group_id.unwrap_or_else(|| id.to_string()),
            branch: self.branch,
            author: self.author,
            comment: self.comment,
            timestamp,
            details: self.details,
        }
    }
}
