//! Per-entity-type dispatch.
//!
//! An [`EntityHandler`] bundles the reader, the optional collection reader and
//! the optional writer of one entity type. A [`HandlerRegistry`] is built once
//! per profile and resolves paths to handlers by their last segment's type.

use std::collections::HashMap;

use log::debug;

use crate::error::ReconcileError;
use crate::model::Entity;
use crate::path::Path;
use crate::reader::{EntityReader, ListReader, ReadContext};
use crate::transport::Transport;
use crate::writer::{CommandBatch, EntityWriter, WriteContext};

/// Read and write behaviour of one entity type.
#[derive(Debug, Clone)]
pub struct EntityHandler {
    entity_type: String,
    reader: EntityReader,
    list: Option<ListReader>,
    writer: Option<EntityWriter>,
}

impl EntityHandler {
    pub fn new(entity_type: impl Into<String>, reader: EntityReader) -> Self {
        Self {
            entity_type: entity_type.into(),
            reader,
            list: None,
            writer: None,
        }
    }

    pub fn with_list(mut self, list: ListReader) -> Self {
        self.list = Some(list);
        self
    }

    pub fn with_writer(mut self, writer: EntityWriter) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn reader(&self) -> &EntityReader {
        &self.reader
    }

    pub fn list_reader(&self) -> Option<&ListReader> {
        self.list.as_ref()
    }

    pub fn writer(&self) -> Option<&EntityWriter> {
        self.writer.as_ref()
    }

    /// Reads the entity at a fully keyed path.
    pub async fn read_entity<T: Transport>(
        &self,
        path: &Path,
        ctx: &mut ReadContext<'_, T>,
    ) -> Result<Entity, ReconcileError> {
        self.reader.read(path, ctx).await
    }

    /// Keys of the collection at `collection`.
    pub async fn list_keys<T: Transport>(
        &self,
        collection: &Path,
        ctx: &mut ReadContext<'_, T>,
    ) -> Result<Vec<String>, ReconcileError> {
        self.list_or_err()?.list_keys(collection, ctx).await
    }

    /// Every member of the collection at `collection`, keyed.
    pub async fn read_all<T: Transport>(
        &self,
        collection: &Path,
        ctx: &mut ReadContext<'_, T>,
    ) -> Result<Vec<(String, Entity)>, ReconcileError> {
        self.list_or_err()?
            .read_all(&self.reader, collection, ctx)
            .await
    }

    /// Creates the entity. Returns the batch that was sent.
    pub async fn write_entity<T: Transport>(
        &self,
        path: &Path,
        after: &Entity,
        ctx: &mut WriteContext<'_, T>,
    ) -> Result<CommandBatch, ReconcileError> {
        self.writer_or_err("write")?.create(path, after, ctx).await
    }

    /// Moves the entity from `before` to `after`. The batch is empty when
    /// nothing changed, in which case nothing was sent.
    pub async fn update_entity<T: Transport>(
        &self,
        path: &Path,
        before: &Entity,
        after: &Entity,
        ctx: &mut WriteContext<'_, T>,
    ) -> Result<CommandBatch, ReconcileError> {
        self.writer_or_err("update")?
            .update(path, before, after, ctx)
            .await
    }

    /// Removes the entity as a unit.
    pub async fn delete_entity<T: Transport>(
        &self,
        path: &Path,
        before: &Entity,
        ctx: &mut WriteContext<'_, T>,
    ) -> Result<CommandBatch, ReconcileError> {
        self.writer_or_err("delete")?.delete(path, before, ctx).await
    }

    fn list_or_err(&self) -> Result<&ListReader, ReconcileError> {
        self.list
            .as_ref()
            .ok_or_else(|| ReconcileError::UnsupportedOperation {
                entity_type: self.entity_type.clone(),
                operation: "list",
            })
    }

    fn writer_or_err(&self, operation: &'static str) -> Result<&EntityWriter, ReconcileError> {
        self.writer
            .as_ref()
            .ok_or_else(|| ReconcileError::UnsupportedOperation {
                entity_type: self.entity_type.clone(),
                operation,
            })
    }
}

/// Entity type to handler map, built once per profile.
#[derive(Debug, Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, EntityHandler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler, replacing any previous one for the same type.
    pub fn register(&mut self, handler: EntityHandler) {
        debug!("registering handler for '{}'", handler.entity_type);
        self.handlers.insert(handler.entity_type.clone(), handler);
    }

    pub fn with(mut self, handler: EntityHandler) -> Self {
        self.register(handler);
        self
    }

    pub fn get(&self, entity_type: &str) -> Option<&EntityHandler> {
        self.handlers.get(entity_type)
    }

    /// The handler for the entity type of the last segment of `path`.
    pub fn resolve(&self, path: &Path) -> Result<&EntityHandler, ReconcileError> {
        let entity_type = path.entity_type().unwrap_or_default();
        self.get(entity_type)
            .ok_or_else(|| ReconcileError::HandlerNotFound(entity_type.to_string()))
    }

    /// Registered entity types, sorted.
    pub fn entity_types(&self) -> Vec<&str> {
        let mut types = self.handlers.keys().map(String::as_str).collect::<Vec<_>>();
        types.sort_unstable();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ReplayTransport, TransportRecorder};

    fn registry() -> HandlerRegistry {
        HandlerRegistry::new()
            .with(EntityHandler::new("interface", EntityReader::default()))
            .with(EntityHandler::new("upstream", EntityReader::default()))
    }

    #[test]
    fn resolve_uses_last_segment_type() {
        let registry = registry();
        let path = Path::root()
            .child("interface", "Gi0/1")
            .child("upstream", "1/0.0");
        let handler = registry.resolve(&path).expect("resolve");
        assert_eq!(handler.entity_type(), "upstream");
        assert_eq!(registry.entity_types(), vec!["interface", "upstream"]);
    }

    #[test]
    fn unknown_type_is_handler_not_found() {
        let err = registry()
            .resolve(&Path::root().child("vlan", "10"))
            .expect_err("no vlan handler");
        assert!(matches!(err, ReconcileError::HandlerNotFound(ref t) if t == "vlan"));
    }

    #[tokio::test]
    async fn read_only_handler_rejects_writes() {
        let handler = EntityHandler::new("interface", EntityReader::default());
        let mut transport = ReplayTransport::from_recorder(&TransportRecorder::new());
        let mut ctx = WriteContext::new(&mut transport);
        let err = handler
            .delete_entity(&Path::root().child("interface", "Gi0/1"), &Entity::new(), &mut ctx)
            .await
            .expect_err("read-only");
        assert!(matches!(
            err,
            ReconcileError::UnsupportedOperation {
                operation: "delete",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn handler_without_list_reader_cannot_list() {
        let handler = EntityHandler::new("interface", EntityReader::default());
        let mut transport = ReplayTransport::from_recorder(&TransportRecorder::new());
        let mut ctx = ReadContext::new(&mut transport);
        let err = handler
            .list_keys(&Path::root().container("interface"), &mut ctx)
            .await
            .expect_err("no list reader");
        assert!(matches!(
            err,
            ReconcileError::UnsupportedOperation {
                operation: "list",
                ..
            }
        ));
    }
}
