//! The seam between the reconciliation core and a device session.
//!
//! The core only ever needs two operations from a session: run one read
//! command and return its output, or push a batch of configuration lines and
//! return what the device printed. Connection setup, prompt handling and mode
//! switching live behind this trait.
//!
//! # Main Components
//!
//! - [`Transport`] - The trait the core is written against
//! - [`ChannelTransport`] - Forwards commands as [`CmdJob`]s to a session worker
//! - [`RecordingTransport`] / [`TransportRecorder`] - Capture exchanges as JSONL
//! - [`ReplayTransport`] - Offline transport replaying a capture

use std::future::Future;
use std::time::Duration;

use log::{debug, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::error::{ReconcileError, TransportError};

pub use channel::ChannelTransport;
pub use recording::{
    NormalizeOptions, RecordingTransport, ReplayTransport, TransportEvent, TransportRecordEntry,
    TransportRecorder,
};

/// A device session able to run read commands and apply configuration lines.
///
/// Methods take `&mut self`: one session carries at most one in-flight
/// operation. Distinct transports may be driven concurrently.
pub trait Transport: Send {
    /// Runs one read-only command and returns its output.
    fn read(
        &mut self,
        command: &str,
    ) -> impl Future<Output = Result<String, TransportError>> + Send;

    /// Applies configuration lines in order and returns the combined output.
    fn write_and_read(
        &mut self,
        lines: &[String],
    ) -> impl Future<Output = Result<String, TransportError>> + Send;
}

/// Configuration for a command to execute on a device.
#[derive(Default, Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Command {
    /// Device mode the command runs in, e.g. "Enable" or "Config".
    pub mode: String,

    /// The command line sent to the device.
    pub command: String,

    /// Single command timeout (seconds). If None the worker picks its own.
    pub timeout: Option<u64>,
}

/// A job representing a command execution request.
pub struct CmdJob {
    pub data: Command,
    /// Oneshot channel sender for returning the execution result
    pub responder: oneshot::Sender<Result<Output, TransportError>>,
}

/// The output result of a command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    pub success: bool,
    pub content: String,
}

mod channel;
mod recording;
