//! Turning device output into entities.
//!
//! Reads never change device state. Every command issued goes through a
//! [`ReadContext`], which memoises identical commands for its lifetime.

use std::collections::HashMap;

use log::{debug, trace};

use crate::error::ReconcileError;
use crate::extract::{Pattern, PatternTable};
use crate::model::{Entity, EntityBuilder};
use crate::path::Path;
use crate::skeleton::{Bindings, Skeleton};
use crate::transport::Transport;

/// Transport handle for one read operation.
pub struct ReadContext<'a, T: Transport> {
    transport: &'a mut T,
    cache: HashMap<String, String>,
    issued: usize,
}

impl<'a, T: Transport> ReadContext<'a, T> {
    pub fn new(transport: &'a mut T) -> Self {
        Self {
            transport,
            cache: HashMap::new(),
            issued: 0,
        }
    }

    /// Runs a read command, answering repeats from the memo.
    pub async fn run(&mut self, path: &Path, command: &str) -> Result<String, ReconcileError> {
        if let Some(output) = self.cache.get(command) {
            trace!("memoised read '{}' for {}", command, path);
            return Ok(output.clone());
        }
        debug!("read {} with '{}'", path, command);
        let output = self
            .transport
            .read(command)
            .await
            .map_err(|reason| ReconcileError::ReadFailed {
                path: path.clone(),
                command: command.to_string(),
                reason,
            })?;
        self.issued += 1;
        self.cache.insert(command.to_string(), output.clone());
        Ok(output)
    }

    /// Commands actually sent to the transport.
    pub fn issued(&self) -> usize {
        self.issued
    }
}

/// One read command and the table applied to its output.
#[derive(Debug, Clone)]
pub struct ReadStep {
    command: Skeleton,
    table: PatternTable,
}

impl ReadStep {
    pub fn new(command: Skeleton, table: PatternTable) -> Self {
        Self { command, table }
    }

    pub fn command(&self) -> &Skeleton {
        &self.command
    }

    pub fn table(&self) -> &PatternTable {
        &self.table
    }
}

/// Reads one fully keyed entity.
#[derive(Debug, Clone, Default)]
pub struct EntityReader {
    steps: Vec<ReadStep>,
    presence: Option<Pattern>,
}

impl EntityReader {
    pub fn new(steps: Vec<ReadStep>) -> Self {
        Self {
            steps,
            presence: None,
        }
    }

    /// Marks the entity as existing only if `presence` matches some output.
    pub fn with_presence(mut self, presence: Pattern) -> Self {
        self.presence = Some(presence);
        self
    }

    pub fn steps(&self) -> &[ReadStep] {
        &self.steps
    }

    pub fn presence(&self) -> Option<&Pattern> {
        self.presence.as_ref()
    }

    /// Issues every read step for `path` and builds the entity.
    ///
    /// Fields no pattern matched stay absent. When a presence pattern is
    /// configured and matches none of the outputs the result is
    /// [`ReconcileError::EntityNotFound`].
    pub async fn read<T: Transport>(
        &self,
        path: &Path,
        ctx: &mut ReadContext<'_, T>,
    ) -> Result<Entity, ReconcileError> {
        let bindings = Bindings::from_path(path);
        let mut builder = EntityBuilder::new();
        let mut present = self.presence.is_none();

        for step in &self.steps {
            let command = render_command(&step.command, &bindings)?;
            let output = ctx.run(path, &command).await?;
            if !present
                && let Some(presence) = &self.presence
                && presence.extract_first(&output)?.is_some()
            {
                present = true;
            }
            step.table.apply(&output, &mut builder)?;
        }

        if !present {
            return Err(ReconcileError::EntityNotFound(path.clone()));
        }
        Ok(builder.finish())
    }
}

/// Lists the member keys of a collection.
#[derive(Debug, Clone)]
pub struct ListReader {
    command: Skeleton,
    key: Pattern,
}

impl ListReader {
    pub fn new(command: Skeleton, key: Pattern) -> Self {
        Self { command, key }
    }

    pub fn command(&self) -> &Skeleton {
        &self.command
    }

    pub fn key(&self) -> &Pattern {
        &self.key
    }

    /// Keys of the collection at `collection`, in first-seen order.
    pub async fn list_keys<T: Transport>(
        &self,
        collection: &Path,
        ctx: &mut ReadContext<'_, T>,
    ) -> Result<Vec<String>, ReconcileError> {
        let command = render_command(&self.command, &Bindings::from_path(collection))?;
        let output = ctx.run(collection, &command).await?;
        let keys = self.key.extract_keys(&output)?;
        debug!("{} lists {} keys", collection, keys.len());
        Ok(keys)
    }

    /// Lists the collection and reads every member.
    ///
    /// A listed key whose member cannot be found is an
    /// [`ReconcileError::InconsistentKeys`] error, never a dropped key.
    pub async fn read_all<T: Transport>(
        &self,
        reader: &EntityReader,
        collection: &Path,
        ctx: &mut ReadContext<'_, T>,
    ) -> Result<Vec<(String, Entity)>, ReconcileError> {
        let keys = self.list_keys(collection, ctx).await?;
        let mut members = Vec::with_capacity(keys.len());
        for key in keys {
            let path = collection.with_key(key.clone());
            match reader.read(&path, ctx).await {
                Ok(entity) => members.push((key, entity)),
                Err(ReconcileError::EntityNotFound(_)) => {
                    return Err(ReconcileError::InconsistentKeys {
                        path: collection.clone(),
                        key,
                    });
                }
                Err(err) => return Err(err),
            }
        }
        Ok(members)
    }
}

fn render_command(skeleton: &Skeleton, bindings: &Bindings) -> Result<String, ReconcileError> {
    Ok(skeleton.render_lines(bindings)?.join(" "))
}
