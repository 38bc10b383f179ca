//! Three-way conflict classification.
//!
//! | source                         | target                         | conflict                   |
//! |--------------------------------|--------------------------------|----------------------------|
//! | changed attribute `a` to `x`   | changed attribute `a` to `y`   | `CONFLICTING_CHANGE`       |
//! | changed                        | removed                        | `DELETED_WHILE_CHANGED`    |
//! | removed                        | changed                        | `CHANGED_WHILE_DELETED`    |
//! | added component of container   | removed container              | `CAUSES_MISSING_REFERENCE` |
//! | removed container              | added component of container   | `HAS_MISSING_REFERENCE`    |
//! | added                          | added                          | `CONFLICTING_CHANGE`       |
//!
//! Changes to different attributes of the same object merge cleanly.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::conflict::{ConflictKind, MergeConflict, UNKNOWN_TYPE};
use crate::delta::{Delta, ObjectDelta};

/// Looks up the type of an object the deltas do not describe.
///
/// Returning `None` is expected for objects deleted concurrently.
pub trait TypeResolver: Send + Sync {
    fn resolve(&self, object_id: &str) -> Option<String>;
}

/// Reporting options.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorOptions {
    /// Report `name=value` (the source's value) instead of just `name` for
    /// attributes whose value is a scalar.
    pub attribute_values: bool,
}

/// Compares two deltas and reports conflicts. Never mutates anything.
#[derive(Clone, Default)]
pub struct ConflictDetector {
    options: DetectorOptions,
    resolver: Option<Arc<dyn TypeResolver>>,
}

impl ConflictDetector {
    pub fn new(options: DetectorOptions) -> Self {
        Self {
            options,
            resolver: None,
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn TypeResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn options(&self) -> DetectorOptions {
        self.options
    }

    /// All conflicts between `source` and `target`, sorted by artefact id,
    /// kind and artefact type.
    pub fn detect(&self, source: &Delta, target: &Delta) -> Vec<MergeConflict> {
        let mut conflicts = Vec::new();

        for (id, theirs) in target.iter() {
            let Some(ours) = source.get(id) else {
                continue;
            };
            if ours.added && theirs.added {
                conflicts.push(self.conflict(id, ours, theirs, ConflictKind::ConflictingChange, Vec::new()));
            } else if ours.is_changed() && theirs.is_changed() {
                let attributes: Vec<String> = ours
                    .properties
                    .iter()
                    .filter(|(name, value)| {
                        theirs
                            .properties
                            .get(*name)
                            .is_some_and(|other| other != *value)
                    })
                    .map(|(name, value)| self.attribute(name, value))
                    .collect();
                if !attributes.is_empty() {
                    conflicts.push(self.conflict(id, ours, theirs, ConflictKind::ConflictingChange, attributes));
                }
            } else if ours.is_changed() && theirs.removed {
                let attributes = self.attributes(ours);
                conflicts.push(self.conflict(id, ours, theirs, ConflictKind::DeletedWhileChanged, attributes));
            } else if ours.removed && theirs.is_changed() {
                let attributes = self.attributes(theirs);
                conflicts.push(self.conflict(id, theirs, ours, ConflictKind::ChangedWhileDeleted, attributes));
            }
        }

        conflicts.extend(self.missing_references(source, target, ConflictKind::CausesMissingReference));
        conflicts.extend(self.missing_references(target, source, ConflictKind::HasMissingReference));

        conflicts.sort_by(|a, b| {
            a.artefact_id
                .cmp(&b.artefact_id)
                .then(a.kind.cmp(&b.kind))
                .then_with(|| a.artefact_type.cmp(&b.artefact_type))
        });
        conflicts.dedup();
        debug!(conflicts = conflicts.len(), "conflict detection finished");
        conflicts
    }

    /// Components `adding` added to containers that `removing` deleted.
    fn missing_references(
        &self,
        adding: &Delta,
        removing: &Delta,
        kind: ConflictKind,
    ) -> Vec<MergeConflict> {
        adding
            .iter()
            .filter(|(_, object)| object.added)
            .filter_map(|(id, object)| {
                let container = object.container.as_deref()?;
                removing.is_removed(container).then(|| MergeConflict {
                    artefact_id: id.to_string(),
                    artefact_type: self.artefact_type(id, object, None),
                    kind,
                    conflicting_attributes: vec![format!("container={container}")],
                })
            })
            .collect()
    }

    fn conflict(
        &self,
        id: &str,
        reported: &ObjectDelta,
        other: &ObjectDelta,
        kind: ConflictKind,
        attributes: Vec<String>,
    ) -> MergeConflict {
        let attributes: BTreeSet<String> = attributes.into_iter().collect();
        MergeConflict {
            artefact_id: id.to_string(),
            artefact_type: self.artefact_type(id, reported, Some(other)),
            kind,
            conflicting_attributes: attributes.into_iter().collect(),
        }
    }

    fn attributes(&self, object: &ObjectDelta) -> Vec<String> {
        object
            .properties
            .iter()
            .map(|(name, value)| self.attribute(name, value))
            .collect()
    }

    fn attribute(&self, name: &str, value: &Value) -> String {
        if !self.options.attribute_values {
            return name.to_string();
        }
        match value {
            Value::String(s) => format!("{name}={s}"),
            Value::Number(n) => format!("{name}={n}"),
            Value::Bool(b) => format!("{name}={b}"),
            Value::Null => format!("{name}=null"),
            Value::Array(_) | Value::Object(_) => name.to_string(),
        }
    }

    fn artefact_type(&self, id: &str, object: &ObjectDelta, other: Option<&ObjectDelta>) -> String {
        object
            .object_type
            .clone()
            .or_else(|| other.and_then(|o| o.object_type.clone()))
            .or_else(|| self.resolver.as_ref().and_then(|r| r.resolve(id)))
            .unwrap_or_else(|| UNKNOWN_TYPE.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashMap};

    use arbor_commit::{Commit, CommitDetail};
    use arbor_types::{BranchPath, CommitId, Timestamp};
    use proptest::prelude::*;
    use serde_json::json;

    fn delta(details: Vec<CommitDetail>) -> Delta {
        Delta::from_commits(&[Commit {
            id: CommitId::new(),
            branch: BranchPath::main(),
            author: "alice".into(),
            comment: String::new(),
            timestamp: Timestamp::new(1),
            group_id: String::new(),
            details,
        }])
    }

    fn set(object: &str, property: &str, to: Value) -> CommitDetail {
        CommitDetail::changed("Concept", object, property, json!("Foo"), to)
    }

    fn components(container: &str, component: &str) -> BTreeMap<String, BTreeSet<String>> {
        let mut map = BTreeMap::new();
        map.insert(container.to_string(), BTreeSet::from([component.to_string()]));
        map
    }

    fn kinds(conflicts: &[MergeConflict]) -> Vec<(&str, ConflictKind)> {
        conflicts.iter().map(|c| (c.artefact_id.as_str(), c.kind)).collect()
    }

    #[test]
    fn same_attribute_different_values_conflict() {
        let source = delta(vec![set("C1", "name", json!("Bar"))]);
        let target = delta(vec![set("C1", "name", json!("Baz"))]);

        let conflicts = ConflictDetector::default().detect(&source, &target);
        assert_eq!(
            conflicts,
            vec![MergeConflict {
                artefact_id: "C1".into(),
                artefact_type: "Concept".into(),
                kind: ConflictKind::ConflictingChange,
                conflicting_attributes: vec!["name".into()],
            }]
        );
    }

    #[test]
    fn attribute_values_option_reports_source_value() {
        let source = delta(vec![set("C1", "name", json!("Bar")), set("C1", "rank", json!(3))]);
        let target = delta(vec![set("C1", "name", json!("Baz")), set("C1", "rank", json!(4))]);

        let detector = ConflictDetector::new(DetectorOptions {
            attribute_values: true,
        });
        let conflicts = detector.detect(&source, &target);
        assert_eq!(conflicts[0].conflicting_attributes, vec!["name=Bar", "rank=3"]);
    }

    #[test]
    fn different_attributes_merge_cleanly() {
        let source = delta(vec![set("C1", "name", json!("Bar"))]);
        let target = delta(vec![set("C1", "status", json!("inactive"))]);
        assert!(ConflictDetector::default().detect(&source, &target).is_empty());
    }

    #[test]
    fn same_value_on_both_sides_is_not_a_conflict() {
        let source = delta(vec![set("C1", "name", json!("Bar"))]);
        let target = delta(vec![set("C1", "name", json!("Bar"))]);
        assert!(ConflictDetector::default().detect(&source, &target).is_empty());
    }

    #[test]
    fn change_against_delete_in_both_directions() {
        let changed = delta(vec![set("C1", "name", json!("Bar"))]);
        let removed = delta(vec![CommitDetail::removed("Concept", ["C1"])]);
        let detector = ConflictDetector::default();

        let conflicts = detector.detect(&changed, &removed);
        assert_eq!(kinds(&conflicts), vec![("C1", ConflictKind::DeletedWhileChanged)]);
        assert_eq!(conflicts[0].conflicting_attributes, vec!["name"]);

        let conflicts = detector.detect(&removed, &changed);
        assert_eq!(kinds(&conflicts), vec![("C1", ConflictKind::ChangedWhileDeleted)]);
    }

    #[test]
    fn propertyless_change_against_delete_conflicts() {
        let mut touch = set("C1", "name", json!("Bar"));
        touch.property = None;
        let changed = delta(vec![touch]);
        let removed = delta(vec![CommitDetail::removed("Concept", ["C1"])]);
        let detector = ConflictDetector::default();

        let conflicts = detector.detect(&changed, &removed);
        assert_eq!(kinds(&conflicts), vec![("C1", ConflictKind::DeletedWhileChanged)]);
        assert!(conflicts[0].conflicting_attributes.is_empty());

        let conflicts = detector.detect(&removed, &changed);
        assert_eq!(kinds(&conflicts), vec![("C1", ConflictKind::ChangedWhileDeleted)]);
    }

    #[test]
    fn recreated_object_against_delete_conflicts() {
        let recreated = delta(vec![
            CommitDetail::removed("Concept", ["C1"]),
            CommitDetail::added("Concept", ["C1"]),
        ]);
        let removed = delta(vec![CommitDetail::removed("Concept", ["C1"])]);
        let detector = ConflictDetector::default();

        assert_eq!(
            kinds(&detector.detect(&recreated, &removed)),
            vec![("C1", ConflictKind::DeletedWhileChanged)]
        );
        assert_eq!(
            kinds(&detector.detect(&removed, &recreated)),
            vec![("C1", ConflictKind::ChangedWhileDeleted)]
        );
    }

    #[test]
    fn added_on_both_sides_conflicts() {
        let source = delta(vec![CommitDetail::added("Concept", ["N1"])]);
        let target = delta(vec![CommitDetail::added("Concept", ["N1"])]);
        let conflicts = ConflictDetector::default().detect(&source, &target);
        assert_eq!(kinds(&conflicts), vec![("N1", ConflictKind::ConflictingChange)]);
        assert!(conflicts[0].conflicting_attributes.is_empty());
    }

    #[test]
    fn component_added_under_container_removed_elsewhere() {
        let adds = delta(vec![CommitDetail::components_added(
            "Concept",
            "Description",
            components("C1", "D1"),
        )]);
        let removes = delta(vec![CommitDetail::removed("Concept", ["C1"])]);
        let detector = ConflictDetector::default();

        let conflicts = detector.detect(&adds, &removes);
        assert_eq!(kinds(&conflicts), vec![("D1", ConflictKind::CausesMissingReference)]);
        assert_eq!(conflicts[0].artefact_type, "Description");
        assert_eq!(conflicts[0].conflicting_attributes, vec!["container=C1"]);

        let conflicts = detector.detect(&removes, &adds);
        assert_eq!(kinds(&conflicts), vec![("D1", ConflictKind::HasMissingReference)]);
    }

    struct Types(HashMap<String, String>);

    impl TypeResolver for Types {
        fn resolve(&self, object_id: &str) -> Option<String> {
            self.0.get(object_id).cloned()
        }
    }

    #[test]
    fn unknown_types_fall_back_to_resolver_then_unknown() {
        let untyped = |id: &str, to: &str| CommitDetail::changed("", id, "name", json!("a"), json!(to));
        let source = delta(vec![untyped("X1", "b"), untyped("X2", "b")]);
        let target = delta(vec![untyped("X1", "c"), untyped("X2", "c")]);

        let conflicts = ConflictDetector::default().detect(&source, &target);
        assert!(conflicts.iter().all(|c| c.artefact_type == UNKNOWN_TYPE));

        let resolver = Types(HashMap::from([("X1".to_string(), "Relationship".to_string())]));
        let conflicts = ConflictDetector::default()
            .with_resolver(Arc::new(resolver))
            .detect(&source, &target);
        assert_eq!(conflicts[0].artefact_type, "Relationship");
        assert_eq!(conflicts[1].artefact_type, UNKNOWN_TYPE);
        assert_eq!(conflicts[1].artefact_id, "X2");
    }

    #[test]
    fn output_is_sorted_by_artefact() {
        let source = delta(vec![
            set("C3", "name", json!("x")),
            set("C1", "name", json!("x")),
            CommitDetail::removed("Concept", ["C2"]),
        ]);
        let target = delta(vec![
            set("C1", "name", json!("y")),
            set("C2", "name", json!("y")),
            set("C3", "name", json!("y")),
        ]);
        let ids: Vec<_> = ConflictDetector::default()
            .detect(&source, &target)
            .into_iter()
            .map(|c| c.artefact_id)
            .collect();
        assert_eq!(ids, vec!["C1", "C2", "C3"]);
    }

    fn arb_detail() -> impl Strategy<Value = CommitDetail> {
        let id = prop::sample::select(vec!["A", "B", "C", "D"]);
        let property = prop::sample::select(vec!["name", "status"]);
        prop_oneof![
            (id.clone(), property, 0..3i64).prop_map(|(id, p, v)| set(id, p, json!(v))),
            id.clone().prop_map(|id| CommitDetail::added("Concept", [id])),
            id.clone().prop_map(|id| CommitDetail::removed("Concept", [id])),
            (id.clone(), id).prop_map(|(container, component)| {
                CommitDetail::components_added("Concept", "Description", components(container, &format!("{component}-d")))
            }),
        ]
    }

    proptest! {
        #[test]
        fn detection_is_deterministic_and_sorted(
            source in prop::collection::vec(arb_detail(), 0..12),
            target in prop::collection::vec(arb_detail(), 0..12),
        ) {
            let source = delta(source);
            let target = delta(target);
            let detector = ConflictDetector::default();

            let first = detector.detect(&source, &target);
            let second = detector.detect(&source, &target);
            prop_assert_eq!(&first, &second);

            for pair in first.windows(2) {
                prop_assert!(
                    (&pair[0].artefact_id, pair[0].kind) <= (&pair[1].artefact_id, pair[1].kind)
                );
            }
            for conflict in &first {
                let mut sorted = conflict.conflicting_attributes.clone();
                sorted.sort();
                sorted.dedup();
                prop_assert_eq!(&sorted, &conflict.conflicting_attributes);
            }
        }

        #[test]
        fn a_delta_never_contradicts_its_own_changes(
            details in prop::collection::vec(arb_detail(), 0..12),
        ) {
            let side = delta(details);
            let conflicts = ConflictDetector::default().detect(&side, &side);
            for conflict in &conflicts {
                let attribute_conflict = conflict.kind == ConflictKind::ConflictingChange
                    && !conflict.conflicting_attributes.is_empty();
                prop_assert!(!attribute_conflict);
                prop_assert!(!matches!(
                    conflict.kind,
                    ConflictKind::DeletedWhileChanged | ConflictKind::ChangedWhileDeleted
                ));
            }
        }
    }
}
