//! Serializable vendor profiles.
//!
//! A [`ProfileSpec`] is plain data: trigger regexes, extractors, targets and
//! command skeleton sources for every handled entity type. It can be loaded
//! from JSON, described by a JSON Schema, and compiled once into a
//! [`HandlerRegistry`]. Compilation validates every regex and skeleton up
//! front so that a broken profile never reaches a device.

use std::collections::{BTreeSet, HashSet};

use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ReconcileError;
use crate::extract::{Extractor, Pattern, PatternEntry, PatternTable, Target};
use crate::handler::{EntityHandler, HandlerRegistry};
use crate::model::Value;
use crate::reader::{EntityReader, ListReader, ReadStep};
use crate::skeleton::Skeleton;
use crate::writer::{EntityWriter, FieldForm, ListForm};

/// Every handler of one vendor family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ProfileSpec {
    pub name: String,
    pub handlers: Vec<HandlerSpec>,
}

/// Read and write definition of one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct HandlerSpec {
    pub entity_type: String,
    /// Commands issued to read one entity, each with its pattern table.
    pub read: Vec<ReadStepSpec>,
    /// Trigger that must match some read output for the entity to exist.
    #[serde(default)]
    pub presence: Option<String>,
    /// How to list the keys of the collection, if the type is keyed.
    #[serde(default)]
    pub list: Option<ListSpec>,
    /// Command forms; a handler without them is read-only.
    #[serde(default)]
    pub write: Option<WriterSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ReadStepSpec {
    /// Command skeleton, rendered with the path keys.
    pub command: String,
    #[serde(default)]
    pub patterns: Vec<PatternSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PatternSpec {
    pub trigger: String,
    #[serde(default)]
    pub extractor: Extractor,
    pub target: Target,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ListSpec {
    pub command: String,
    /// Trigger whose capture is a member key.
    pub trigger: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct WriterSpec {
    #[serde(default)]
    pub enter: Option<String>,
    #[serde(default)]
    pub exit: Option<String>,
    #[serde(default)]
    pub delete: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldFormSpec>,
    #[serde(default)]
    pub lists: Vec<ListFormSpec>,
    /// Fields and lists allowed to change without commands.
    #[serde(default)]
    pub ignored: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FieldFormSpec {
    pub field: String,
    pub positive: String,
    #[serde(default)]
    pub negative: Option<String>,
    #[serde(default)]
    pub in_place: bool,
    #[serde(default = "default_incremental")]
    pub incremental: bool,
    #[serde(default)]
    pub default: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ListFormSpec {
    pub list: String,
    pub add: String,
    #[serde(default)]
    pub remove: Option<String>,
    #[serde(default = "default_incremental")]
    pub incremental: bool,
}

fn default_incremental() -> bool {
    true
}

/// Consistency report for one handler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct HandlerDiagnostics {
    pub entity_type: String,
    /// Fields the reader fills that have no command form and are not ignored.
    pub unwritable_fields: Vec<String>,
    /// Fields with a command form that no pattern ever reads.
    pub unread_fields: Vec<String>,
    /// Zipped lists the reader fills that have no list form and are not ignored.
    pub lists_without_form: Vec<String>,
    /// A collection reader without a presence pattern cannot detect
    /// inconsistent keys.
    pub list_without_presence: bool,
}

impl HandlerDiagnostics {
    pub fn has_issues(&self) -> bool {
        !self.unwritable_fields.is_empty()
            || !self.unread_fields.is_empty()
            || !self.lists_without_form.is_empty()
            || self.list_without_presence
    }
}

/// Consistency report for a whole profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ProfileDiagnostics {
    pub profile: String,
    pub handlers: Vec<HandlerDiagnostics>,
}

impl ProfileDiagnostics {
    /// Returns true if any handler reports a potential profile issue.
    pub fn has_issues(&self) -> bool {
        self.handlers.iter().any(HandlerDiagnostics::has_issues)
    }
}

impl ProfileSpec {
    pub fn from_json(json: &str) -> Result<Self, ReconcileError> {
        serde_json::from_str(json)
            .map_err(|e| ReconcileError::InvalidProfile(format!("decode profile json: {e}")))
    }

    pub fn to_json(&self) -> Result<String, ReconcileError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ReconcileError::InternalError(format!("encode profile json: {e}")))
    }

    /// Validates and compiles every handler into a registry.
    pub fn compile(&self) -> Result<HandlerRegistry, ReconcileError> {
        let mut seen = HashSet::new();
        let mut registry = HandlerRegistry::new();
        for spec in &self.handlers {
            if !seen.insert(spec.entity_type.as_str()) {
                return Err(ReconcileError::InvalidProfile(format!(
                    "profile '{}' defines entity type '{}' twice",
                    self.name, spec.entity_type
                )));
            }
            registry.register(spec.compile()?);
        }
        debug!(
            "compiled profile '{}' with {} handlers",
            self.name,
            registry.len()
        );
        Ok(registry)
    }

    pub fn diagnose(&self) -> ProfileDiagnostics {
        ProfileDiagnostics {
            profile: self.name.clone(),
            handlers: self.handlers.iter().map(HandlerSpec::diagnose).collect(),
        }
    }
}

impl HandlerSpec {
    pub fn compile(&self) -> Result<EntityHandler, ReconcileError> {
        if self.entity_type.trim().is_empty() {
            return Err(ReconcileError::InvalidProfile(
                "handler with empty entity type".to_string(),
            ));
        }
        if self.read.is_empty() {
            return Err(ReconcileError::InvalidProfile(format!(
                "handler '{}' has no read steps",
                self.entity_type
            )));
        }

        let steps = self
            .read
            .iter()
            .map(|step| {
                let entries = step
                    .patterns
                    .iter()
                    .map(|p| PatternEntry::new(&p.trigger, p.extractor.clone(), p.target.clone()))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ReadStep::new(
                    Skeleton::parse(&step.command)?,
                    PatternTable::new(entries),
                ))
            })
            .collect::<Result<Vec<_>, ReconcileError>>()?;

        let mut reader = EntityReader::new(steps);
        if let Some(presence) = &self.presence {
            reader = reader.with_presence(Pattern::new("presence", presence, Extractor::Flag)?);
        }

        let mut handler = EntityHandler::new(&self.entity_type, reader);
        if let Some(list) = &self.list {
            handler = handler.with_list(ListReader::new(
                Skeleton::parse(&list.command)?,
                Pattern::new(&self.entity_type, &list.trigger, Extractor::Text)?,
            ));
        }
        if let Some(write) = &self.write {
            handler = handler.with_writer(write.compile()?);
        }
        Ok(handler)
    }

    pub fn diagnose(&self) -> HandlerDiagnostics {
        let mut read_fields = BTreeSet::new();
        let mut read_lists = BTreeSet::new();
        for pattern in self.read.iter().flat_map(|step| &step.patterns) {
            match &pattern.target {
                Target::Field { name } | Target::Append { name } => {
                    read_fields.insert(name.as_str());
                }
                Target::Column { list, .. } => {
                    read_lists.insert(list.as_str());
                }
            }
        }

        let mut report = HandlerDiagnostics {
            entity_type: self.entity_type.clone(),
            list_without_presence: self.list.is_some() && self.presence.is_none(),
            ..HandlerDiagnostics::default()
        };

        if let Some(write) = &self.write {
            let ignored = |name: &str| write.ignored.iter().any(|i| i == name);
            let written = write
                .fields
                .iter()
                .map(|f| f.field.as_str())
                .collect::<BTreeSet<_>>();
            let listed = write
                .lists
                .iter()
                .map(|l| l.list.as_str())
                .collect::<BTreeSet<_>>();

            report.unwritable_fields = read_fields
                .iter()
                .filter(|f| !written.contains(*f) && !ignored(f))
                .map(|f| f.to_string())
                .collect();
            report.unread_fields = written
                .iter()
                .filter(|f| !read_fields.contains(*f))
                .map(|f| f.to_string())
                .collect();
            report.lists_without_form = read_lists
                .iter()
                .filter(|l| !listed.contains(*l) && !ignored(l))
                .map(|l| l.to_string())
                .collect();
        }
        report
    }
}

impl WriterSpec {
    pub fn compile(&self) -> Result<EntityWriter, ReconcileError> {
        let mut writer = EntityWriter::new();
        if let Some(enter) = &self.enter {
            writer = writer.with_enter(Skeleton::parse(enter)?);
        }
        if let Some(exit) = &self.exit {
            writer = writer.with_exit(Skeleton::parse(exit)?);
        }
        if let Some(delete) = &self.delete {
            writer = writer.with_delete(Skeleton::parse(delete)?);
        }
        for spec in &self.fields {
            let mut form = FieldForm::new(&spec.field, Skeleton::parse(&spec.positive)?);
            if let Some(negative) = &spec.negative {
                form = form.with_negative(Skeleton::parse(negative)?);
            }
            if spec.in_place {
                form = form.in_place();
            }
            if !spec.incremental {
                form = form.non_incremental();
            }
            if let Some(default) = &spec.default {
                form = form.with_default(default.clone());
            }
            writer = writer.with_field(form);
        }
        for spec in &self.lists {
            let mut form = ListForm::new(&spec.list, Skeleton::parse(&spec.add)?);
            if let Some(remove) = &spec.remove {
                form = form.with_remove(Skeleton::parse(remove)?);
            }
            if !spec.incremental {
                form = form.non_incremental();
            }
            writer = writer.with_list(form);
        }
        for name in &self.ignored {
            writer = writer.ignore(name);
        }
        Ok(writer)
    }
}

/// JSON Schema of [`ProfileSpec`], pretty-printed.
pub fn profile_schema_json() -> Result<String, ReconcileError> {
    let schema = schemars::schema_for!(ProfileSpec);
    serde_json::to_string_pretty(&schema)
        .map_err(|e| ReconcileError::InternalError(format!("encode profile schema: {e}")))
}
