//! Declarative, regex-driven field extraction from raw CLI output.
//!
//! Text is scanned line by line, top to bottom. A [`Pattern`] pairs a trigger
//! regex with an [`Extractor`] that turns the captured text into a [`Value`].
//! A [`PatternTable`] applies many patterns to the same text and writes the
//! results into an [`EntityBuilder`].

use std::collections::HashMap;

use log::trace;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ReconcileError;
use crate::model::{EntityBuilder, Value};

/// Conversion applied to a captured substring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Extractor {
    /// The capture as a trimmed string.
    #[default]
    Text,
    /// The capture parsed as a signed integer.
    Integer,
    /// A match yields `true`.
    Flag,
    /// A match yields `false` (e.g. `shutdown` for an `enabled` field).
    NegatedFlag,
    /// Vendor spelling to canonical value. Unknown spellings are malformed.
    Enum { values: Vec<(String, String)> },
    /// The capture split on whitespace.
    Words,
}

impl Extractor {
    /// Converts a captured substring into a value for `field`.
    pub fn convert(&self, field: &str, raw: &str) -> Result<Value, ReconcileError> {
        let trimmed = raw.trim();
        match self {
            Extractor::Text => Ok(Value::Str(trimmed.to_string())),
            Extractor::Integer => {
                trimmed
                    .parse::<i64>()
                    .map(Value::Int)
                    .map_err(|err| ReconcileError::MalformedValue {
                        field: field.to_string(),
                        raw: raw.to_string(),
                        reason: format!("not an integer: {err}"),
                    })
            }
            Extractor::Flag => Ok(Value::Bool(true)),
            Extractor::NegatedFlag => Ok(Value::Bool(false)),
            Extractor::Enum { values } => values
                .iter()
                .find(|(spelling, _)| spelling.eq_ignore_ascii_case(trimmed))
                .map(|(_, canonical)| Value::Str(canonical.clone()))
                .ok_or_else(|| ReconcileError::MalformedValue {
                    field: field.to_string(),
                    raw: raw.to_string(),
                    reason: format!(
                        "unknown spelling, expected one of [{}]",
                        values
                            .iter()
                            .map(|(spelling, _)| spelling.as_str())
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                }),
            Extractor::Words => Ok(Value::List(
                trimmed
                    .split_whitespace()
                    .map(|w| Value::Str(w.to_string()))
                    .collect(),
            )),
        }
    }
}

/// A compiled trigger plus its extractor.
#[derive(Debug, Clone)]
pub struct Pattern {
    field: String,
    trigger: Regex,
    extractor: Extractor,
}

impl Pattern {
    /// Compiles a trigger regex. `field` names the target in error messages.
    pub fn new(
        field: impl Into<String>,
        trigger: &str,
        extractor: Extractor,
    ) -> Result<Self, ReconcileError> {
        let field = field.into();
        let trigger = Regex::new(trigger).map_err(|err| {
            ReconcileError::InvalidPattern(format!("trigger for field '{field}': {err}"))
        })?;
        Ok(Self {
            field,
            trigger,
            extractor,
        })
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn trigger(&self) -> &str {
        self.trigger.as_str()
    }

    /// Captured text of one line, if the trigger matches it.
    ///
    /// The named group `value` wins over group 1, which wins over the whole match.
    fn capture<'t>(&self, line: &'t str) -> Option<&'t str> {
        let caps = self.trigger.captures(line)?;
        caps.name("value")
            .or_else(|| caps.get(1))
            .or_else(|| caps.get(0))
            .map(|m| m.as_str())
    }

    fn matches<'a>(
        &'a self,
        text: &'a str,
    ) -> impl Iterator<Item = Result<Value, ReconcileError>> + 'a {
        let lines = text.lines().map(|line| line.trim_end_matches('\r'));
        lines
            .filter_map(move |line| self.capture(line).map(|raw| (line, raw)))
            .map(move |(line, raw)| {
                trace!("field '{}' matched line '{:?}'", self.field, line);
                self.extractor.convert(&self.field, raw)
            })
    }

    /// First matching line's value, or `None` if nothing matches.
    pub fn extract_first(&self, text: &str) -> Result<Option<Value>, ReconcileError> {
        self.matches(text).next().transpose()
    }

    /// Every matching line's value grouped by `key_fn`.
    ///
    /// Groups are ordered by the first occurrence of their key.
    pub fn extract_all<K, F>(
        &self,
        text: &str,
        key_fn: F,
    ) -> Result<Vec<(K, Vec<Value>)>, ReconcileError>
    where
        K: Clone + Eq + std::hash::Hash,
        F: Fn(&Value) -> K,
    {
        let mut groups: Vec<(K, Vec<Value>)> = Vec::new();
        let mut index: HashMap<K, usize> = HashMap::new();
        for value in self.matches(text) {
            let value = value?;
            let key = key_fn(&value);
            match index.get(&key) {
                Some(&pos) => groups[pos].1.push(value),
                None => {
                    index.insert(key.clone(), groups.len());
                    groups.push((key, vec![value]));
                }
            }
        }
        Ok(groups)
    }

    /// Every matching line's value in document order, duplicates preserved.
    pub fn extract_positional(&self, text: &str) -> Result<Vec<Value>, ReconcileError> {
        self.matches(text).collect()
    }

    /// Distinct keys mentioned in `text`, in first-seen order.
    pub fn extract_keys(&self, text: &str) -> Result<Vec<String>, ReconcileError> {
        Ok(self
            .extract_all(text, |value| value.to_string())?
            .into_iter()
            .map(|(key, _)| key)
            .collect())
    }
}

/// Where an extracted value lands in the entity being built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Target {
    /// A scalar field; the first matching line wins.
    Field { name: String },
    /// One column of a positionally-zipped list.
    Column { list: String, column: String },
    /// All matches collected into one `List` field, across every entry and
    /// read step that targets it.
    Append { name: String },
}

impl Target {
    pub fn field(name: impl Into<String>) -> Self {
        Target::Field { name: name.into() }
    }

    pub fn column(list: impl Into<String>, column: impl Into<String>) -> Self {
        Target::Column {
            list: list.into(),
            column: column.into(),
        }
    }

    /// Name used in error messages and diagnostics.
    pub fn label(&self) -> String {
        match self {
            Target::Field { name } | Target::Append { name } => name.clone(),
            Target::Column { list, column } => format!("{list}.{column}"),
        }
    }
}

/// Pattern table entry: trigger, extractor and setter.
#[derive(Debug, Clone)]
pub struct PatternEntry {
    pub pattern: Pattern,
    pub target: Target,
}

impl PatternEntry {
    pub fn new(trigger: &str, extractor: Extractor, target: Target) -> Result<Self, ReconcileError> {
        Ok(Self {
            pattern: Pattern::new(target.label(), trigger, extractor)?,
            target,
        })
    }
}

/// Declarative set of extraction rules applied to one command's output.
#[derive(Debug, Clone, Default)]
pub struct PatternTable {
    entries: Vec<PatternEntry>,
}

impl PatternTable {
    pub fn new(entries: Vec<PatternEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[PatternEntry] {
        &self.entries
    }

    /// Runs every entry over `text`.
    ///
    /// Entries are independent; an entry without a match leaves its target
    /// untouched. A conversion failure aborts the whole table.
    pub fn apply(&self, text: &str, builder: &mut EntityBuilder) -> Result<(), ReconcileError> {
        for entry in &self.entries {
            match &entry.target {
                Target::Field { name } => {
                    if builder.has_field(name) {
                        continue;
                    }
                    if let Some(value) = entry.pattern.extract_first(text)? {
                        builder.set_if_absent(name, value);
                    }
                }
                Target::Column { list, column } => {
                    let values = entry.pattern.extract_positional(text)?;
                    if !values.is_empty() {
                        builder.extend_column(list, column, values);
                    }
                }
                Target::Append { name } => {
                    let values = entry.pattern.extract_positional(text)?;
                    if !values.is_empty() {
                        builder.append_values(name, values);
                    }
                }
            }
        }
        Ok(())
    }
}
