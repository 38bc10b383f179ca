//! Net per-object effect of one side's commits since the common ancestor.

use std::collections::BTreeMap;

use arbor_branch::{divergence, BranchStore};
use arbor_commit::{ChangeOp, Commit, CommitDetail, CommitLog};
use arbor_types::BranchPath;
use serde_json::Value;
use tracing::debug;

use crate::error::Result;

/// What one side did to a single object.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjectDelta {
    pub object_type: Option<String>,
    /// Created on this side.
    pub added: bool,
    /// Deleted on this side.
    pub removed: bool,
    /// Touched by a `CHANGE` detail, or deleted and re-created, on this side.
    pub changed: bool,
    /// Final value of every property this side set.
    pub properties: BTreeMap<String, Value>,
    /// Owning container, for components that were added or removed.
    pub container: Option<String>,
    /// Components were added to or removed from this object.
    pub components_changed: bool,
}

impl ObjectDelta {
    /// Returns `true` if this side changed an object that existed before
    /// and still exists.
    pub fn is_changed(&self) -> bool {
        !self.added && !self.removed && (self.changed || !self.properties.is_empty())
    }

    fn note_type(&mut self, object_type: &str) {
        if self.object_type.is_none() && !object_type.is_empty() {
            self.object_type = Some(object_type.to_string());
        }
    }
}

/// The net effect of a sequence of commits, keyed by object id.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Delta {
    objects: BTreeMap<String, ObjectDelta>,
}

impl Delta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `commits`, in timestamp order.
    pub fn from_commits<'a, I>(commits: I) -> Self
    where
        I: IntoIterator<Item = &'a Commit>,
    {
        let mut delta = Self::new();
        for commit in commits {
            for detail in &commit.details {
                delta.apply(detail);
            }
        }
        delta
    }

    /// Fold one detail into the delta.
    pub fn apply(&mut self, detail: &CommitDetail) {
        match (detail.op, detail.component_type.as_deref()) {
            (ChangeOp::Change, _) => {
                let value = detail.to_value.clone().unwrap_or(Value::Null);
                for id in &detail.object_ids {
                    let object = self.entry(id);
                    object.note_type(&detail.object_type);
                    object.changed = true;
                    if let Some(property) = detail.property.as_ref() {
                        object.properties.insert(property.clone(), value.clone());
                    }
                }
            }
            (op, Some(component_type)) => {
                for (container, components) in &detail.components_by_object {
                    let owner = self.entry(container);
                    owner.note_type(&detail.object_type);
                    owner.components_changed = true;
                    for component in components {
                        self.structural(component, component_type, op);
                        if let Some(object) = self.objects.get_mut(component) {
                            object.container = Some(container.clone());
                        }
                    }
                }
            }
            (op, None) => {
                for id in &detail.object_ids {
                    self.structural(id, &detail.object_type, op);
                }
            }
        }
    }

    fn entry(&mut self, id: &str) -> &mut ObjectDelta {
        self.objects.entry(id.to_string()).or_default()
    }

    fn structural(&mut self, id: &str, object_type: &str, op: ChangeOp) {
        match op {
            ChangeOp::Add => {
                let object = self.entry(id);
                object.note_type(object_type);
                if object.removed {
                    // Re-created: the object existed before this side began.
                    object.removed = false;
                    object.changed = true;
                } else {
                    object.added = true;
                }
            }
            ChangeOp::Remove => {
                if self.objects.get(id).is_some_and(|object| object.added) {
                    // Created and deleted on the same side.
                    self.objects.remove(id);
                    return;
                }
                let object = self.entry(id);
                object.note_type(object_type);
                object.removed = true;
                object.changed = false;
                object.properties.clear();
            }
            ChangeOp::Change => {
                let object = self.entry(id);
                object.note_type(object_type);
                object.changed = true;
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&ObjectDelta> {
        self.objects.get(id)
    }

    /// Objects in id order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ObjectDelta)> {
        self.objects.iter().map(|(id, object)| (id.as_str(), object))
    }

    pub fn is_added(&self, id: &str) -> bool {
        self.get(id).is_some_and(|object| object.added)
    }

    pub fn is_removed(&self, id: &str) -> bool {
        self.get(id).is_some_and(|object| object.removed)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// Deltas of `source` and `target` since their common fork point, built
/// from the live branch states.
pub fn branch_deltas<S, L>(
    store: &S,
    log: &L,
    source: &BranchPath,
    target: &BranchPath,
) -> Result<(Delta, Delta)>
where
    S: BranchStore + ?Sized,
    L: CommitLog + ?Sized,
{
    let source_state = store.state(source)?;
    let target_state = store.state(target)?;
    let divergence = divergence(store, &source_state, &target_state)?;

    let source_commits = log.commits_in_all(&divergence.left)?;
    let target_commits = log.commits_in_all(&divergence.right)?;
    debug!(
        source = %source,
        target = %target,
        fork_point = %divergence.fork_point,
        source_commits = source_commits.len(),
        target_commits = target_commits.len(),
        "collected branch deltas"
    );

    Ok((
        Delta::from_commits(&source_commits),
        Delta::from_commits(&target_commits),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use arbor_branch::InMemoryBranchStore;
    use arbor_commit::{InMemoryCommitLog, NewCommit};
    use arbor_types::{CommitId, LogicalClock, Timestamp};
    use serde_json::json;

    fn commit(details: Vec<CommitDetail>) -> Commit {
        Commit {
            id: CommitId::new(),
            branch: BranchPath::main(),
            author: "alice".into(),
            comment: String::new(),
            timestamp: Timestamp::new(1),
            group_id: String::new(),
            details,
        }
    }

    #[test]
    fn property_changes_keep_the_final_value() {
        let delta = Delta::from_commits(&[
            commit(vec![CommitDetail::changed("Concept", "C1", "name", json!("Foo"), json!("Bar"))]),
            commit(vec![CommitDetail::changed("Concept", "C1", "name", json!("Bar"), json!("Qux"))]),
        ]);
        let c1 = delta.get("C1").unwrap();
        assert!(c1.is_changed());
        assert_eq!(c1.properties["name"], json!("Qux"));
        assert_eq!(c1.object_type.as_deref(), Some("Concept"));
    }

    #[test]
    fn add_then_remove_leaves_nothing() {
        let delta = Delta::from_commits(&[
            commit(vec![CommitDetail::added("Concept", ["X"])]),
            commit(vec![CommitDetail::removed("Concept", ["X"])]),
        ]);
        assert!(delta.is_empty());
    }

    #[test]
    fn remove_discards_earlier_property_changes() {
        let delta = Delta::from_commits(&[
            commit(vec![CommitDetail::changed("Concept", "X", "name", json!("a"), json!("b"))]),
            commit(vec![CommitDetail::removed("Concept", ["X"])]),
        ]);
        let x = delta.get("X").unwrap();
        assert!(x.removed);
        assert!(x.properties.is_empty());
        assert!(!x.is_changed());
    }

    #[test]
    fn change_without_a_property_still_counts_as_changed() {
        let mut detail = CommitDetail::changed("Concept", "C1", "name", json!("a"), json!("b"));
        detail.property = None;
        let delta = Delta::from_commits(&[commit(vec![detail])]);

        let c1 = delta.get("C1").unwrap();
        assert!(c1.properties.is_empty());
        assert!(c1.is_changed());
    }

    #[test]
    fn remove_then_add_is_a_change_not_an_addition() {
        let delta = Delta::from_commits(&[
            commit(vec![CommitDetail::removed("Concept", ["C1"])]),
            commit(vec![CommitDetail::added("Concept", ["C1"])]),
        ]);
        let c1 = delta.get("C1").unwrap();
        assert!(!c1.added);
        assert!(!c1.removed);
        assert!(c1.is_changed());
    }

    #[test]
    fn components_record_their_container() {
        let mut map = BTreeMap::new();
        map.insert("C1".to_string(), BTreeSet::from(["D1".to_string()]));
        let delta = Delta::from_commits(&[commit(vec![CommitDetail::components_added(
            "Concept",
            "Description",
            map,
        )])]);

        let d1 = delta.get("D1").unwrap();
        assert!(d1.added);
        assert_eq!(d1.container.as_deref(), Some("C1"));
        assert_eq!(d1.object_type.as_deref(), Some("Description"));
        let c1 = delta.get("C1").unwrap();
        assert!(c1.components_changed);
        assert!(!c1.is_changed());
    }

    #[test]
    fn branch_deltas_split_history_at_the_fork_point() {
        let store = Arc::new(InMemoryBranchStore::new(Timestamp::new(100)));
        let log = InMemoryCommitLog::new(store.clone(), Arc::new(LogicalClock::starting_at(100)));
        log.append(
            NewCommit::new(BranchPath::main(), "a", "before fork")
                .with_detail(CommitDetail::added("Concept", ["OLD"])),
        )
        .unwrap();
        store.create(&BranchPath::main(), "task").unwrap();
        let task = BranchPath::parse("MAIN/task").unwrap();
        log.append(
            NewCommit::new(task.clone(), "a", "on task")
                .with_detail(CommitDetail::added("Concept", ["T1"])),
        )
        .unwrap();
        log.append(
            NewCommit::new(BranchPath::main(), "b", "on main")
                .with_detail(CommitDetail::added("Concept", ["M1"])),
        )
        .unwrap();

        let (source, target) = branch_deltas(store.as_ref(), &log, &task, &BranchPath::main()).unwrap();
        assert!(source.is_added("T1"));
        assert_eq!(source.len(), 1);
        assert!(target.is_added("M1"));
        assert!(target.get("OLD").is_none());
    }
}
