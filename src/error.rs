//! Error types for extraction, templating, reconciliation and transport failures.
//!
//! Every variant aborts the entity operation in progress. Nothing in this crate
//! coerces a failure into a default value, since that would risk pushing a wrong
//! configuration to a live device.

use thiserror::Error;

use crate::path::Path;

/// Failures reported by a [`crate::transport::Transport`] implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The device answered, but flagged the command as failed.
    #[error("command '{command}' rejected: {output}")]
    CommandRejected { command: String, output: String },

    /// The command did not complete in time. Carries the command.
    #[error("exec command timeout: {0}")]
    Timeout(String),

    /// The session worker behind the transport went away.
    #[error("session channel closed")]
    ChannelClosed,

    /// An offline replay had no recorded exchange for the command.
    #[error("replay mismatch: {0}")]
    ReplayMismatch(String),
}

/// Errors raised by the parse / diff / template engine.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// A pattern matched, but the captured text could not be converted.
    #[error("malformed value for field '{field}': {reason} (raw: '{raw}')")]
    MalformedValue {
        field: String,
        raw: String,
        reason: String,
    },

    /// A skeleton needed a binding that was absent and not guarded by a conditional.
    #[error("skeleton '{skeleton}' requires unbound value '{binding}'")]
    TemplateBindingError { skeleton: String, binding: String },

    /// A command skeleton could not be parsed.
    #[error("invalid command skeleton: {0}")]
    InvalidSkeleton(String),

    /// A trigger regex could not be compiled.
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    /// A profile definition is structurally inconsistent.
    #[error("invalid profile: {0}")]
    InvalidProfile(String),

    /// The transport failed while executing a read command.
    #[error("read failed at {path} for command '{command}': {reason}")]
    ReadFailed {
        path: Path,
        command: String,
        reason: TransportError,
    },

    /// The transport failed while executing a write batch.
    #[error("write failed at {path} ({} commands): {reason}", commands.len())]
    WriteFailed {
        path: Path,
        commands: Vec<String>,
        reason: TransportError,
    },

    /// The device output does not contain the entity addressed by the path.
    #[error("entity {0} not found on device")]
    EntityNotFound(Path),

    /// A collection listed a key that the per-key reader could not find.
    #[error("collection {path} listed key '{key}' that could not be read back")]
    InconsistentKeys { path: Path, key: String },

    /// A changed field has no command form and is not declared ignored.
    #[error("field '{field}' of {path} changed but has no command form")]
    UnsupportedField { path: Path, field: String },

    /// A write tried to consult a path outside its context snapshot.
    #[error("path {0} is outside the write context scope")]
    ScopeViolation(Path),

    /// No handler is registered for the entity type.
    #[error("no handler registered for entity type '{0}'")]
    HandlerNotFound(String),

    /// The requested built-in profile does not exist.
    #[error("profile not found: {0}")]
    ProfileNotFound(String),

    /// The operation is not supported by the handler (e.g. a read-only entity).
    #[error("{entity_type} does not support {operation}")]
    UnsupportedOperation {
        entity_type: String,
        operation: &'static str,
    },

    #[error("internal error: {0}")]
    InternalError(String),
}

impl ReconcileError {
    /// Returns the transport failure wrapped by a read or write error, if any.
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            ReconcileError::ReadFailed { reason, .. } | ReconcileError::WriteFailed { reason, .. } => {
                Some(reason)
            }
            _ => None,
        }
    }
}
