//! Structured configuration values and entities.
//!
//! An [`Entity`] is a bag of named leaf [`Value`]s plus named ordered sub-lists
//! of entities. A field that is not present in the map is absent; there is no
//! separate "unset" marker.

use std::collections::BTreeMap;
use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A leaf value of the configuration model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<Value>),
    Record(BTreeMap<String, Value>),
}

impl Value {
    /// Truthiness used by skeleton conditionals.
    ///
    /// Present values are true except `false`, `""` and the empty list.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(_) => true,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Record(map) => !map.is_empty(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Looks up a field of a record value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Record(map) => map.get(name),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Str(s) => f.write_str(s),
            Value::List(items) => write_joined(f, items.iter()),
            Value::Record(map) => write_joined(f, map.values()),
        }
    }
}

fn write_joined<'a>(
    f: &mut fmt::Formatter<'_>,
    items: impl Iterator<Item = &'a Value>,
) -> fmt::Result {
    let mut first = true;
    for item in items {
        if !first {
            f.write_str(" ")?;
        }
        first = false;
        write!(f, "{item}")?;
    }
    Ok(())
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// One node of the configuration model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Entity {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    fields: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    lists: BTreeMap<String, Vec<Entity>>,
}

impl Entity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field. Setting `Value::Null` leaves the field absent.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = value.into();
        if !value.is_null() {
            self.fields.insert(name.into(), value);
        }
        self
    }

    /// Sets an ordered sub-list.
    pub fn with_list(mut self, name: impl Into<String>, items: Vec<Entity>) -> Self {
        self.lists.insert(name.into(), items);
        self
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// An absent list and an empty list are the same thing.
    pub fn list(&self, name: &str) -> &[Entity] {
        self.lists.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn lists(&self) -> &BTreeMap<String, Vec<Entity>> {
        &self.lists
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.lists.values().all(Vec::is_empty)
    }

    /// Record view used when binding an entity into a command skeleton.
    ///
    /// Lists become `List` values of records.
    pub fn to_value(&self) -> Value {
        let mut map = self.fields.clone();
        for (name, items) in &self.lists {
            map.insert(
                name.clone(),
                Value::List(items.iter().map(Entity::to_value).collect()),
            );
        }
        Value::Record(map)
    }
}

/// Mutable accumulator used while one read call populates an entity.
///
/// Scalars follow first-match-wins. Positional columns are kept apart until
/// [`EntityBuilder::finish`] zips them into list records by index.
#[derive(Debug, Default)]
pub struct EntityBuilder {
    fields: BTreeMap<String, Value>,
    columns: BTreeMap<String, BTreeMap<String, Vec<Value>>>,
    lists: BTreeMap<String, Vec<Entity>>,
}

impl EntityBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field unless an earlier match already set it.
    pub fn set_if_absent(&mut self, name: &str, value: Value) {
        self.fields.entry(name.to_string()).or_insert(value);
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Appends values to a positional column of a list.
    pub fn extend_column(&mut self, list: &str, column: &str, values: Vec<Value>) {
        self.columns
            .entry(list.to_string())
            .or_default()
            .entry(column.to_string())
            .or_default()
            .extend(values);
    }

    /// Extends a `List` field with more values, creating it on first use.
    ///
    /// A non-list value already stored under `name` becomes the first element.
    pub fn append_values(&mut self, name: &str, values: Vec<Value>) {
        match self.fields.remove(name) {
            Some(Value::List(mut items)) => {
                items.extend(values);
                self.fields.insert(name.to_string(), Value::List(items));
            }
            Some(other) => {
                let mut items = vec![other];
                items.extend(values);
                self.fields.insert(name.to_string(), Value::List(items));
            }
            None => {
                self.fields.insert(name.to_string(), Value::List(values));
            }
        }
    }

    /// Freezes the accumulated state.
    ///
    /// Columns of one list are zipped by index. Columns of unequal length are
    /// not an error: the list is as long as the longest column and shorter
    /// columns leave the trailing records without that field.
    pub fn finish(self) -> Entity {
        let mut lists = self.lists;
        for (list, columns) in self.columns {
            let len = columns.values().map(Vec::len).max().unwrap_or(0);
            if columns.values().any(|c| c.len() != len) {
                log::warn!(
                    "zipped columns of list '{}' have unequal lengths: {:?}",
                    list,
                    columns
                        .iter()
                        .map(|(name, values)| (name.as_str(), values.len()))
                        .collect::<Vec<_>>()
                );
            }
            let mut records = vec![Entity::new(); len];
            for (column, values) in columns {
                for (record, value) in records.iter_mut().zip(values) {
                    if !value.is_null() {
                        record.fields.insert(column.clone(), value);
                    }
                }
            }
            lists.entry(list).or_default().extend(records);
        }
        Entity {
            fields: self.fields,
            lists,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_fields_stay_absent() {
        let entity = Entity::new()
            .with_field("mtu", 1500)
            .with_field("description", Option::<String>::None);
        assert_eq!(entity.field("mtu"), Some(&Value::Int(1500)));
        assert_eq!(entity.field("description"), None);
    }

    #[test]
    fn absent_and_empty_lists_compare_as_empty_slices() {
        let entity = Entity::new().with_list("entries", vec![]);
        assert!(entity.list("entries").is_empty());
        assert!(entity.list("missing").is_empty());
        assert!(entity.is_empty());
    }

    #[test]
    fn display_joins_lists_with_spaces() {
        let value = Value::from(vec!["qpsk", "16qam"]);
        assert_eq!(value.to_string(), "qpsk 16qam");
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::Bool(false).to_string(), "false");
    }

    #[test]
    fn truthiness_treats_present_numbers_as_true() {
        assert!(Value::Int(0).is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::Str(String::new()).is_truthy());
        assert!(!Value::List(vec![]).is_truthy());
        assert!(!Value::Null.is_truthy());
    }

    #[test]
    fn builder_keeps_first_scalar_match() {
        let mut builder = EntityBuilder::new();
        builder.set_if_absent("description", Value::from("first"));
        builder.set_if_absent("description", Value::from("second"));
        let entity = builder.finish();
        assert_eq!(entity.field("description"), Some(&Value::from("first")));
    }

    #[test]
    fn append_values_extends_existing_list() {
        let mut builder = EntityBuilder::new();
        builder.append_values("helpers", vec!["10.0.0.1".into()]);
        builder.append_values("helpers", vec!["10.0.0.2".into(), "10.0.0.3".into()]);
        let entity = builder.finish();
        assert_eq!(
            entity.field("helpers"),
            Some(&Value::from(vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]))
        );
    }

    #[test]
    fn builder_zips_columns_by_index() {
        let mut builder = EntityBuilder::new();
        builder.extend_column("entries", "iuc", vec!["request".into(), "short".into()]);
        builder.extend_column("entries", "modulation", vec!["qpsk".into(), "64qam".into()]);
        let entity = builder.finish();

        let entries = entity.list("entries");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].field("iuc"), Some(&Value::from("short")));
        assert_eq!(entries[1].field("modulation"), Some(&Value::from("64qam")));
    }

    #[test]
    fn builder_pads_short_columns_instead_of_dropping_records() {
        let mut builder = EntityBuilder::new();
        builder.extend_column("entries", "iuc", vec!["request".into(), "short".into()]);
        builder.extend_column("entries", "modulation", vec!["qpsk".into()]);
        let entity = builder.finish();

        let entries = entity.list("entries");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].field("modulation"), None);
    }

    #[test]
    fn entity_round_trips_through_json() {
        let entity = Entity::new()
            .with_field("enabled", true)
            .with_field("mtu", 9000)
            .with_list(
                "entries",
                vec![Entity::new().with_field("iuc", "request")],
            );
        let json = serde_json::to_string(&entity).expect("encode entity");
        let decoded: Entity = serde_json::from_str(&json).expect("decode entity");
        assert_eq!(decoded, entity);
    }
}
