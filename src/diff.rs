//! Field-by-field classification of a (before, after) snapshot pair.
//!
//! The diff is a pure function of its inputs plus the static per-field
//! defaults of the handler. Nothing here touches a transport.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::model::{Entity, Value};

/// How one leaf field moved between the two snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeKind {
    Unchanged,
    Set { new: Value },
    Cleared { old: Value },
    Changed { old: Value, new: Value },
}

impl ChangeKind {
    pub fn is_change(&self) -> bool {
        !matches!(self, ChangeKind::Unchanged)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    pub field: String,
    pub kind: ChangeKind,
}

/// A sub-list whose sequence differs. Lists carry no stable member keys, so
/// they are replaced as a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListChange {
    pub list: String,
    pub before: Vec<Entity>,
    pub after: Vec<Entity>,
}

/// Result of [`diff`]: every field in the union of both snapshots, in name
/// order, plus the lists that changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EntityDiff {
    pub fields: Vec<FieldChange>,
    pub lists: Vec<ListChange>,
}

impl EntityDiff {
    /// `true` when nothing needs to be sent.
    pub fn is_empty(&self) -> bool {
        self.lists.is_empty() && self.fields.iter().all(|f| !f.kind.is_change())
    }

    pub fn field(&self, name: &str) -> Option<&ChangeKind> {
        self.fields.iter().find(|f| f.field == name).map(|f| &f.kind)
    }

    pub fn changed_fields(&self) -> impl Iterator<Item = &FieldChange> {
        self.fields.iter().filter(|f| f.kind.is_change())
    }

    pub fn list(&self, name: &str) -> Option<&ListChange> {
        self.lists.iter().find(|l| l.list == name)
    }
}

/// Classifies every field and list of the pair.
///
/// `before == None` is a create and `after == None` is a delete. A field whose
/// value equals its entry in `defaults` is treated as absent.
pub fn diff(
    before: Option<&Entity>,
    after: Option<&Entity>,
    defaults: &BTreeMap<String, Value>,
) -> EntityDiff {
    let empty = Entity::new();
    let before = before.unwrap_or(&empty);
    let after = after.unwrap_or(&empty);

    let names = before
        .fields()
        .keys()
        .chain(after.fields().keys())
        .collect::<BTreeSet<_>>();

    let fields = names
        .into_iter()
        .map(|name| {
            let old = effective(before.field(name), defaults.get(name));
            let new = effective(after.field(name), defaults.get(name));
            let kind = match (old, new) {
                (None, None) => ChangeKind::Unchanged,
                (None, Some(new)) => ChangeKind::Set { new: new.clone() },
                (Some(old), None) => ChangeKind::Cleared { old: old.clone() },
                (Some(old), Some(new)) if old == new => ChangeKind::Unchanged,
                (Some(old), Some(new)) => ChangeKind::Changed {
                    old: old.clone(),
                    new: new.clone(),
                },
            };
            FieldChange {
                field: name.clone(),
                kind,
            }
        })
        .collect();

    let list_names = before
        .lists()
        .keys()
        .chain(after.lists().keys())
        .collect::<BTreeSet<_>>();

    let lists = list_names
        .into_iter()
        .filter_map(|name| {
            let old = before.list(name);
            let new = after.list(name);
            (old != new).then(|| ListChange {
                list: name.clone(),
                before: old.to_vec(),
                after: new.to_vec(),
            })
        })
        .collect();

    EntityDiff { fields, lists }
}

fn effective<'a>(value: Option<&'a Value>, default: Option<&Value>) -> Option<&'a Value> {
    match (value, default) {
        (Some(v), _) if v.is_null() => None,
        (Some(v), Some(d)) if v == d => None,
        (v, _) => v,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_defaults() -> BTreeMap<String, Value> {
        BTreeMap::new()
    }

    #[test]
    fn flipping_a_flag_is_a_change() {
        let before = Entity::new().with_field("enabled", true);
        let after = Entity::new().with_field("enabled", false);
        let diff = diff(Some(&before), Some(&after), &no_defaults());
        assert_eq!(
            diff.field("enabled"),
            Some(&ChangeKind::Changed {
                old: Value::Bool(true),
                new: Value::Bool(false)
            })
        );
    }

    #[test]
    fn every_field_of_the_union_is_classified() {
        let before = Entity::new()
            .with_field("description", "uplink")
            .with_field("mtu", 1500)
            .with_field("cost", 10);
        let after = Entity::new()
            .with_field("mtu", 1500)
            .with_field("cost", 20)
            .with_field("enabled", true);
        let diff = diff(Some(&before), Some(&after), &no_defaults());

        let names = diff.fields.iter().map(|f| f.field.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["cost", "description", "enabled", "mtu"]);
        assert!(matches!(diff.field("cost"), Some(ChangeKind::Changed { .. })));
        assert!(matches!(diff.field("description"), Some(ChangeKind::Cleared { .. })));
        assert!(matches!(diff.field("enabled"), Some(ChangeKind::Set { .. })));
        assert_eq!(diff.field("mtu"), Some(&ChangeKind::Unchanged));
    }

    #[test]
    fn identical_snapshots_produce_empty_diff() {
        let entity = Entity::new()
            .with_field("mtu", 9000)
            .with_list("entries", vec![Entity::new().with_field("iuc", "request")]);
        let diff = diff(Some(&entity), Some(&entity.clone()), &no_defaults());
        assert!(diff.is_empty());
        assert_eq!(diff.changed_fields().count(), 0);
    }

    #[test]
    fn value_equal_to_default_counts_as_absent() {
        let defaults = BTreeMap::from([("mtu".to_string(), Value::Int(1500))]);
        let before = Entity::new();
        let after = Entity::new().with_field("mtu", 1500);
        assert!(diff(Some(&before), Some(&after), &defaults).is_empty());

        let before = Entity::new().with_field("mtu", 9000);
        let diff = diff(Some(&before), Some(&after), &defaults);
        assert!(matches!(diff.field("mtu"), Some(ChangeKind::Cleared { .. })));
    }

    #[test]
    fn create_and_delete_diff_against_nothing() {
        let entity = Entity::new().with_field("cable_mac", "7");
        let create = diff(None, Some(&entity), &no_defaults());
        assert!(matches!(create.field("cable_mac"), Some(ChangeKind::Set { .. })));
        let delete = diff(Some(&entity), None, &no_defaults());
        assert!(matches!(delete.field("cable_mac"), Some(ChangeKind::Cleared { .. })));
    }

    #[test]
    fn lists_are_compared_as_whole_sequences() {
        let a = Entity::new().with_field("name", "A");
        let b = Entity::new().with_field("name", "B");
        let c = Entity::new().with_field("name", "C");
        let before = Entity::new().with_list("members", vec![a.clone(), b.clone()]);
        let after = Entity::new().with_list("members", vec![a.clone(), c.clone()]);

        let diff = diff(Some(&before), Some(&after), &no_defaults());
        let change = diff.list("members").expect("list should be reported");
        assert_eq!(change.before, vec![a.clone(), b]);
        assert_eq!(change.after, vec![a, c]);
    }

    #[test]
    fn reordered_list_is_a_change() {
        let a = Entity::new().with_field("name", "A");
        let b = Entity::new().with_field("name", "B");
        let before = Entity::new().with_list("members", vec![a.clone(), b.clone()]);
        let after = Entity::new().with_list("members", vec![b, a]);
        assert!(!diff(Some(&before), Some(&after), &no_defaults()).is_empty());
    }

    #[test]
    fn empty_list_equals_absent_list() {
        let before = Entity::new().with_list("members", vec![]);
        let after = Entity::new();
        assert!(diff(Some(&before), Some(&after), &no_defaults()).is_empty());
    }
}
