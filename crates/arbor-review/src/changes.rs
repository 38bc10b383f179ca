//! Folding a commit sequence into new/changed/deleted object ids.
//!
//! Every detail is reduced to per-object operations. An object's
//! classification depends on the first and last operation seen for it:
//!
//! | first  | last   | result  |
//! |--------|--------|---------|
//! | ADD    | REMOVE | nothing |
//! | ADD    | other  | new     |
//! | REMOVE | ADD    | changed |
//! | other  | REMOVE | deleted |
//! | other  | other  | changed |

use std::collections::{BTreeMap, BTreeSet};

use arbor_commit::{ChangeOp, Commit, CommitDetail};
use serde::{Deserialize, Serialize};

/// Object ids grouped by how they changed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSet {
    pub new_ids: BTreeSet<String>,
    pub changed_ids: BTreeSet<String>,
    pub deleted_ids: BTreeSet<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.new_ids.is_empty() && self.changed_ids.is_empty() && self.deleted_ids.is_empty()
    }

    /// Total number of ids across the three sets.
    pub fn len(&self) -> usize {
        self.new_ids.len() + self.changed_ids.len() + self.deleted_ids.len()
    }
}

#[derive(Clone, Copy)]
struct Trace {
    first: ChangeOp,
    last: ChangeOp,
}

/// Per-object operations described by one detail.
fn object_ops(detail: &CommitDetail) -> Vec<(&str, ChangeOp)> {
    if !detail.is_component_change() {
        return detail
            .object_ids
            .iter()
            .map(|id| (id.as_str(), detail.op))
            .collect();
    }
    // Adding or removing components changes the containers.
    let mut ops: Vec<(&str, ChangeOp)> = detail
        .object_ids
        .iter()
        .map(|id| (id.as_str(), ChangeOp::Change))
        .collect();
    for components in detail.components_by_object.values() {
        ops.extend(components.iter().map(|id| (id.as_str(), detail.op)));
    }
    ops
}

/// Classify every object touched by `commits`, which must be in timestamp
/// order.
pub fn classify<'a, I>(commits: I) -> ChangeSet
where
    I: IntoIterator<Item = &'a Commit>,
{
    let mut traces: BTreeMap<String, Trace> = BTreeMap::new();
    for commit in commits {
        for detail in &commit.details {
            for (id, op) in object_ops(detail) {
                traces
                    .entry(id.to_string())
                    .and_modify(|trace| trace.last = op)
                    .or_insert(Trace { first: op, last: op });
            }
        }
    }

    let mut changes = ChangeSet::default();
    for (id, trace) in traces {
        match (trace.first, trace.last) {
            (ChangeOp::Add, ChangeOp::Remove) => {}
            (ChangeOp::Add, _) => {
                changes.new_ids.insert(id);
            }
            (ChangeOp::Remove, ChangeOp::Add) => {
                changes.changed_ids.insert(id);
            }
            (_, ChangeOp::Remove) => {
                changes.deleted_ids.insert(id);
            }
            _ => {
                changes.changed_ids.insert(id);
            }
        }
    }
    changes
}
