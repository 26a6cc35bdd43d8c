//! Planning and sending configuration batches.
//!
//! Planning is pure: a diff of the snapshot pair is walked field by field and
//! each change renders the field's command form. Only [`EntityWriter::execute`]
//! touches the transport, once per non-empty batch.

use std::collections::BTreeMap;

use log::{debug, trace};
use serde::Serialize;

use crate::diff::{ChangeKind, EntityDiff, diff};
use crate::error::ReconcileError;
use crate::model::{Entity, Value};
use crate::path::Path;
use crate::skeleton::{Bindings, Skeleton};
use crate::transport::Transport;

/// Command forms of one leaf field.
#[derive(Debug, Clone)]
pub struct FieldForm {
    field: String,
    positive: Skeleton,
    negative: Option<Skeleton>,
    in_place: bool,
    incremental: bool,
    default: Option<Value>,
}

impl FieldForm {
    /// `positive` is rendered with `value` bound to the new value.
    pub fn new(field: impl Into<String>, positive: Skeleton) -> Self {
        Self {
            field: field.into(),
            positive,
            negative: None,
            in_place: false,
            incremental: true,
            default: None,
        }
    }

    /// `negative` is rendered with `value` bound to the old value.
    pub fn with_negative(mut self, negative: Skeleton) -> Self {
        self.negative = Some(negative);
        self
    }

    /// The positive form overwrites the old value, so a change skips the negative form.
    pub fn in_place(mut self) -> Self {
        self.in_place = true;
        self
    }

    /// A change to this field forces the entity to be recreated.
    pub fn non_incremental(mut self) -> Self {
        self.incremental = false;
        self
    }

    /// Value the device assumes when the field is not configured.
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn field(&self) -> &str {
        &self.field
    }
}

/// Command forms of an ordered sub-list, replaced as a unit.
///
/// Both skeletons render once per change, with `items` bound to the list
/// members and `columns.<name>` to each member field as a sequence.
#[derive(Debug, Clone)]
pub struct ListForm {
    list: String,
    add: Skeleton,
    remove: Option<Skeleton>,
    incremental: bool,
}

impl ListForm {
    pub fn new(list: impl Into<String>, add: Skeleton) -> Self {
        Self {
            list: list.into(),
            add,
            remove: None,
            incremental: true,
        }
    }

    pub fn with_remove(mut self, remove: Skeleton) -> Self {
        self.remove = Some(remove);
        self
    }

    pub fn non_incremental(mut self) -> Self {
        self.incremental = false;
        self
    }

    pub fn list(&self) -> &str {
        &self.list
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteKind {
    Create,
    Update,
    Delete,
}

/// The exact lines sent (or to be sent) for one entity operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandBatch {
    pub kind: WriteKind,
    /// An update that fell back to delete-then-create.
    pub recreated: bool,
    pub lines: Vec<String>,
}

impl CommandBatch {
    fn new(kind: WriteKind, lines: Vec<String>) -> Self {
        Self {
            kind,
            recreated: false,
            lines,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Read-only view of sibling entities a write may consult, plus named
/// caller scalars.
///
/// Each entity and each scalar is bound into skeletons as `ctx.<alias>`.
#[derive(Debug, Clone, Default)]
pub struct ContextSnapshot {
    entries: Vec<(String, Path, Entity)>,
    values: BTreeMap<String, Value>,
}

impl ContextSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, alias: impl Into<String>, path: Path, entity: Entity) -> Self {
        self.entries.push((alias.into(), path, entity));
        self
    }

    /// Binds a caller-supplied scalar, e.g. a VRF name shared by a batch.
    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// The snapshot of `path`. Any path not captured is a scope violation.
    pub fn get(&self, path: &Path) -> Result<&Entity, ReconcileError> {
        self.entries
            .iter()
            .find(|(_, p, _)| p == path)
            .map(|(_, _, entity)| entity)
            .ok_or_else(|| ReconcileError::ScopeViolation(path.clone()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.values.is_empty()
    }

    fn to_value(&self) -> Value {
        let mut record = self.values.clone();
        for (alias, _, entity) in &self.entries {
            record.insert(alias.clone(), entity.to_value());
        }
        Value::Record(record)
    }
}

/// Transport handle for one write operation, plus the sibling snapshot.
pub struct WriteContext<'a, T: Transport> {
    transport: &'a mut T,
    snapshot: ContextSnapshot,
}

impl<'a, T: Transport> WriteContext<'a, T> {
    pub fn new(transport: &'a mut T) -> Self {
        Self {
            transport,
            snapshot: ContextSnapshot::new(),
        }
    }

    pub fn with_snapshot(mut self, snapshot: ContextSnapshot) -> Self {
        self.snapshot = snapshot;
        self
    }

    pub fn snapshot(&self) -> &ContextSnapshot {
        &self.snapshot
    }
}

/// Renders create, update and delete batches for one entity type.
#[derive(Debug, Clone, Default)]
pub struct EntityWriter {
    enter: Option<Skeleton>,
    exit: Option<Skeleton>,
    delete: Option<Skeleton>,
    fields: Vec<FieldForm>,
    lists: Vec<ListForm>,
    ignored: Vec<String>,
}

impl EntityWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines that open the entity's configuration block.
    pub fn with_enter(mut self, enter: Skeleton) -> Self {
        self.enter = Some(enter);
        self
    }

    /// Lines that close the entity's configuration block.
    pub fn with_exit(mut self, exit: Skeleton) -> Self {
        self.exit = Some(exit);
        self
    }

    /// Removal of the whole entity, rendered with `before` bound.
    pub fn with_delete(mut self, delete: Skeleton) -> Self {
        self.delete = Some(delete);
        self
    }

    pub fn with_field(mut self, form: FieldForm) -> Self {
        self.fields.push(form);
        self
    }

    pub fn with_list(mut self, form: ListForm) -> Self {
        self.lists.push(form);
        self
    }

    /// Fields that may change without producing commands.
    pub fn ignore(mut self, field: impl Into<String>) -> Self {
        self.ignored.push(field.into());
        self
    }

    pub fn field_forms(&self) -> &[FieldForm] {
        &self.fields
    }

    pub fn list_forms(&self) -> &[ListForm] {
        &self.lists
    }

    pub fn ignored(&self) -> &[String] {
        &self.ignored
    }

    /// Declared per-field defaults, used by the diff.
    pub fn defaults(&self) -> BTreeMap<String, Value> {
        self.fields
            .iter()
            .filter_map(|f| f.default.clone().map(|d| (f.field.clone(), d)))
            .collect()
    }

    pub fn diff(&self, before: Option<&Entity>, after: Option<&Entity>) -> EntityDiff {
        diff(before, after, &self.defaults())
    }

    /// Enter, body, exit for an entity that does not exist yet.
    pub fn plan_create(
        &self,
        path: &Path,
        after: &Entity,
        snapshot: &ContextSnapshot,
    ) -> Result<CommandBatch, ReconcileError> {
        let changes = self.diff(None, Some(after));
        let bindings = base_bindings(path, None, Some(after), &changes, snapshot);
        let lines = self.wrap(&bindings, self.body(path, &changes, &bindings)?)?;
        Ok(CommandBatch::new(WriteKind::Create, lines))
    }

    /// The minimal batch moving `before` to `after`, or delete-then-create
    /// when a change has no incremental form. Empty when nothing changed.
    pub fn plan_update(
        &self,
        path: &Path,
        before: &Entity,
        after: &Entity,
        snapshot: &ContextSnapshot,
    ) -> Result<CommandBatch, ReconcileError> {
        let changes = self.diff(Some(before), Some(after));
        if changes.is_empty() {
            trace!("{} unchanged", path);
            return Ok(CommandBatch::new(WriteKind::Update, Vec::new()));
        }

        if self.needs_recreate(&changes) {
            debug!("{} has non-incremental changes, recreating", path);
            let mut lines = self.plan_delete(path, before, snapshot)?.lines;
            lines.extend(self.plan_create(path, after, snapshot)?.lines);
            return Ok(CommandBatch {
                kind: WriteKind::Update,
                recreated: true,
                lines,
            });
        }

        let bindings = base_bindings(path, Some(before), Some(after), &changes, snapshot);
        let body = self.body(path, &changes, &bindings)?;
        let lines = if body.is_empty() {
            body
        } else {
            self.wrap(&bindings, body)?
        };
        Ok(CommandBatch::new(WriteKind::Update, lines))
    }

    /// The vendor's removal command for the entity as a unit.
    pub fn plan_delete(
        &self,
        path: &Path,
        before: &Entity,
        snapshot: &ContextSnapshot,
    ) -> Result<CommandBatch, ReconcileError> {
        let Some(delete) = &self.delete else {
            return Err(ReconcileError::UnsupportedOperation {
                entity_type: path.entity_type().unwrap_or_default().to_string(),
                operation: "delete",
            });
        };
        let changes = self.diff(Some(before), None);
        let bindings = base_bindings(path, Some(before), None, &changes, snapshot);
        Ok(CommandBatch::new(
            WriteKind::Delete,
            delete.render_lines(&bindings)?,
        ))
    }

    /// Sends a planned batch. An empty batch never reaches the transport.
    pub async fn execute<T: Transport>(
        &self,
        path: &Path,
        batch: &CommandBatch,
        ctx: &mut WriteContext<'_, T>,
    ) -> Result<(), ReconcileError> {
        if batch.is_empty() {
            return Ok(());
        }
        debug!("{:?} {} with {} lines", batch.kind, path, batch.lines.len());
        let output = ctx
            .transport
            .write_and_read(&batch.lines)
            .await
            .map_err(|reason| ReconcileError::WriteFailed {
                path: path.clone(),
                commands: batch.lines.clone(),
                reason,
            })?;
        trace!("{} write output: {:?}", path, output);
        Ok(())
    }

    pub async fn create<T: Transport>(
        &self,
        path: &Path,
        after: &Entity,
        ctx: &mut WriteContext<'_, T>,
    ) -> Result<CommandBatch, ReconcileError> {
        let batch = self.plan_create(path, after, ctx.snapshot())?;
        self.execute(path, &batch, ctx).await?;
        Ok(batch)
    }

    pub async fn update<T: Transport>(
        &self,
        path: &Path,
        before: &Entity,
        after: &Entity,
        ctx: &mut WriteContext<'_, T>,
    ) -> Result<CommandBatch, ReconcileError> {
        let batch = self.plan_update(path, before, after, ctx.snapshot())?;
        self.execute(path, &batch, ctx).await?;
        Ok(batch)
    }

    pub async fn delete<T: Transport>(
        &self,
        path: &Path,
        before: &Entity,
        ctx: &mut WriteContext<'_, T>,
    ) -> Result<CommandBatch, ReconcileError> {
        let batch = self.plan_delete(path, before, ctx.snapshot())?;
        self.execute(path, &batch, ctx).await?;
        Ok(batch)
    }

    fn field_form(&self, field: &str) -> Option<&FieldForm> {
        self.fields.iter().find(|f| f.field == field)
    }

    fn list_form(&self, list: &str) -> Option<&ListForm> {
        self.lists.iter().find(|l| l.list == list)
    }

    fn is_ignored(&self, name: &str) -> bool {
        self.ignored.iter().any(|i| i == name)
    }

    fn needs_recreate(&self, changes: &EntityDiff) -> bool {
        let field = changes
            .changed_fields()
            .any(|c| self.field_form(&c.field).is_some_and(|f| !f.incremental));
        let list = changes
            .lists
            .iter()
            .any(|c| self.list_form(&c.list).is_some_and(|l| !l.incremental));
        field || list
    }

    fn wrap(&self, bindings: &Bindings, body: Vec<String>) -> Result<Vec<String>, ReconcileError> {
        let mut lines = Vec::new();
        if let Some(enter) = &self.enter {
            lines.extend(enter.render_lines(bindings)?);
        }
        lines.extend(body);
        if let Some(exit) = &self.exit {
            lines.extend(exit.render_lines(bindings)?);
        }
        Ok(lines)
    }

    fn body(
        &self,
        path: &Path,
        changes: &EntityDiff,
        bindings: &Bindings,
    ) -> Result<Vec<String>, ReconcileError> {
        let mut lines = Vec::new();

        for change in changes.changed_fields() {
            let Some(form) = self.field_form(&change.field) else {
                if self.is_ignored(&change.field) {
                    continue;
                }
                return Err(ReconcileError::UnsupportedField {
                    path: path.clone(),
                    field: change.field.clone(),
                });
            };
            let (old, new) = match &change.kind {
                ChangeKind::Unchanged => continue,
                ChangeKind::Set { new } => (None, Some(new)),
                ChangeKind::Cleared { old } => (Some(old), None),
                ChangeKind::Changed { new, .. } if form.in_place => (None, Some(new)),
                ChangeKind::Changed { old, new } => (Some(old), Some(new)),
            };
            // Without a negative form a clear is omitted.
            if let Some(old) = old
                && let Some(negative) = &form.negative
            {
                lines.extend(render_with_value(negative, bindings, old)?);
            }
            if let Some(new) = new {
                lines.extend(render_with_value(&form.positive, bindings, new)?);
            }
        }

        for change in &changes.lists {
            let Some(form) = self.list_form(&change.list) else {
                if self.is_ignored(&change.list) {
                    continue;
                }
                return Err(ReconcileError::UnsupportedField {
                    path: path.clone(),
                    field: change.list.clone(),
                });
            };
            if !change.before.is_empty()
                && let Some(remove) = &form.remove
            {
                lines.extend(remove.render_lines(&list_bindings(bindings, &change.before))?);
            }
            if !change.after.is_empty() {
                lines.extend(form.add.render_lines(&list_bindings(bindings, &change.after))?);
            }
        }

        Ok(lines)
    }
}

fn base_bindings(
    path: &Path,
    before: Option<&Entity>,
    after: Option<&Entity>,
    changes: &EntityDiff,
    snapshot: &ContextSnapshot,
) -> Bindings {
    let mut bindings = Bindings::from_path(path);
    bindings.insert_entity("before", before);
    bindings.insert_entity("after", after);
    let changed = changes
        .fields
        .iter()
        .map(|c| (c.field.clone(), Value::Bool(c.kind.is_change())))
        .chain(
            changes
                .lists
                .iter()
                .map(|c| (c.list.clone(), Value::Bool(true))),
        )
        .collect::<BTreeMap<_, _>>();
    bindings.insert("changed", Value::Record(changed));
    if !snapshot.is_empty() {
        bindings.insert("ctx", snapshot.to_value());
    }
    bindings
}

fn list_bindings(base: &Bindings, items: &[Entity]) -> Bindings {
    let names = items
        .iter()
        .flat_map(|item| item.fields().keys())
        .collect::<std::collections::BTreeSet<_>>();
    let columns = names
        .into_iter()
        .map(|name| {
            let column = items
                .iter()
                .map(|item| item.field(name).cloned().unwrap_or(Value::Null))
                .collect();
            (name.clone(), Value::List(column))
        })
        .collect();
    base.clone()
        .with(
            "items",
            Value::List(items.iter().map(Entity::to_value).collect()),
        )
        .with("columns", Value::Record(columns))
}

fn render_with_value(
    skeleton: &Skeleton,
    bindings: &Bindings,
    value: &Value,
) -> Result<Vec<String>, ReconcileError> {
    skeleton.render_lines(&bindings.clone().with("value", value.clone()))
}
