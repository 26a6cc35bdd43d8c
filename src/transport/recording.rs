use super::*;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

/// A single recorded transport exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportEvent {
    Read {
        command: String,
        success: bool,
        output: String,
    },
    Write {
        lines: Vec<String>,
        success: bool,
        output: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TransportRecordEntry {
    pub ts_ms: u128,
    pub event: TransportEvent,
}

/// Options for normalizing JSONL recordings into stable fixtures.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeOptions {
    /// Keep write events (drop them to get a read-only fixture).
    pub keep_writes: bool,
    /// Keep exchanges that failed.
    pub keep_failures: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            keep_writes: true,
            keep_failures: true,
        }
    }
}

/// In-memory transport recorder. Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct TransportRecorder {
    entries: Arc<Mutex<Vec<TransportRecordEntry>>>,
}

impl TransportRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_event(&self, event: TransportEvent) -> Result<(), ReconcileError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| ReconcileError::InternalError(format!("record lock error: {e}")))?;
        guard.push(TransportRecordEntry {
            ts_ms: now_ms(),
            event,
        });
        Ok(())
    }

    /// Snapshot all records.
    pub fn entries(&self) -> Result<Vec<TransportRecordEntry>, ReconcileError> {
        let guard = self
            .entries
            .lock()
            .map_err(|e| ReconcileError::InternalError(format!("record lock error: {e}")))?;
        Ok(guard.clone())
    }

    pub fn clear(&self) -> Result<(), ReconcileError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| ReconcileError::InternalError(format!("record lock error: {e}")))?;
        guard.clear();
        Ok(())
    }

    /// Export records as JSONL.
    pub fn to_jsonl(&self) -> Result<String, ReconcileError> {
        let entries = self.entries()?;
        let mut lines = Vec::with_capacity(entries.len());
        for entry in entries {
            let line = serde_json::to_string(&entry).map_err(|e| {
                ReconcileError::InternalError(format!("record encode error: {e}"))
            })?;
            lines.push(line);
        }
        Ok(lines.join("\n"))
    }

    /// Restore a recorder from JSONL lines. Blank lines are skipped.
    pub fn from_jsonl(jsonl: &str) -> Result<Self, ReconcileError> {
        let mut parsed = Vec::new();
        for line in jsonl.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let entry: TransportRecordEntry = serde_json::from_str(line).map_err(|e| {
                ReconcileError::InternalError(format!("record decode error: {e}"))
            })?;
            parsed.push(entry);
        }
        Ok(Self {
            entries: Arc::new(Mutex::new(parsed)),
        })
    }

    /// Normalize JSONL recording content into a stable fixture representation.
    ///
    /// Events are sorted by timestamp (ties keep file order) and filtered
    /// according to `options`.
    pub fn normalize_jsonl(jsonl: &str, options: NormalizeOptions) -> Result<String, ReconcileError> {
        let recorder = Self::from_jsonl(jsonl)?;
        let mut indexed = recorder
            .entries()?
            .into_iter()
            .enumerate()
            .collect::<Vec<(usize, TransportRecordEntry)>>();

        indexed
            .sort_by(|(idx_a, a), (idx_b, b)| a.ts_ms.cmp(&b.ts_ms).then_with(|| idx_a.cmp(idx_b)));

        let filtered = indexed
            .into_iter()
            .filter_map(|(_, entry)| {
                let keep = match &entry.event {
                    TransportEvent::Write { .. } if !options.keep_writes => false,
                    TransportEvent::Read { success, .. } | TransportEvent::Write { success, .. } => {
                        *success || options.keep_failures
                    }
                };
                keep.then_some(entry)
            })
            .collect::<Vec<_>>();

        let normalized = TransportRecorder {
            entries: Arc::new(Mutex::new(filtered)),
        };
        normalized.to_jsonl()
    }

    fn record_quietly(&self, event: TransportEvent) {
        if let Err(err) = self.record_event(event) {
            warn!("failed to record transport event: {err}");
        }
    }
}

/// Wraps a transport and records every exchange it performs.
#[derive(Debug)]
pub struct RecordingTransport<T> {
    inner: T,
    recorder: TransportRecorder,
}

impl<T: Transport> RecordingTransport<T> {
    pub fn new(inner: T, recorder: TransportRecorder) -> Self {
        Self { inner, recorder }
    }

    pub fn recorder(&self) -> &TransportRecorder {
        &self.recorder
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Transport> Transport for RecordingTransport<T> {
    async fn read(&mut self, command: &str) -> Result<String, TransportError> {
        let result = self.inner.read(command).await;
        let (success, output) = outcome(&result);
        self.recorder.record_quietly(TransportEvent::Read {
            command: command.to_string(),
            success,
            output,
        });
        result
    }

    async fn write_and_read(&mut self, lines: &[String]) -> Result<String, TransportError> {
        let result = self.inner.write_and_read(lines).await;
        let (success, output) = outcome(&result);
        self.recorder.record_quietly(TransportEvent::Write {
            lines: lines.to_vec(),
            success,
            output,
        });
        result
    }
}

fn outcome(result: &Result<String, TransportError>) -> (bool, String) {
    match result {
        Ok(output) => (true, output.clone()),
        Err(TransportError::CommandRejected { output, .. }) => (false, output.clone()),
        Err(err) => (false, err.to_string()),
    }
}

/// Offline transport backed by recording data.
///
/// Each call consumes the next recorded exchange of the same kind and
/// command, skipping unrelated entries. A recorded failure replays as
/// [`TransportError::CommandRejected`].
#[derive(Debug, Clone)]
pub struct ReplayTransport {
    entries: Vec<TransportRecordEntry>,
    cursor: usize,
}

impl ReplayTransport {
    /// Build a replayer from a recorder snapshot.
    pub fn from_recorder(recorder: &TransportRecorder) -> Self {
        let entries = recorder.entries().unwrap_or_default();
        Self { entries, cursor: 0 }
    }

    /// Build a replayer from JSONL recording data.
    pub fn from_jsonl(jsonl: &str) -> Result<Self, ReconcileError> {
        let recorder = TransportRecorder::from_jsonl(jsonl)?;
        Ok(Self::from_recorder(&recorder))
    }

    /// Recorded exchanges not yet consumed.
    pub fn remaining(&self) -> usize {
        self.entries.len() - self.cursor
    }

    fn replay_read(&mut self, command: &str) -> Result<String, TransportError> {
        while self.cursor < self.entries.len() {
            let entry = &self.entries[self.cursor];
            self.cursor += 1;
            if let TransportEvent::Read {
                command: recorded,
                success,
                output,
            } = &entry.event
                && recorded == command
            {
                return replayed(command, *success, output);
            }
        }
        Err(TransportError::ReplayMismatch(format!(
            "no replayable output found for command '{command}'"
        )))
    }

    fn replay_write(&mut self, lines: &[String]) -> Result<String, TransportError> {
        while self.cursor < self.entries.len() {
            let entry = &self.entries[self.cursor];
            self.cursor += 1;
            if let TransportEvent::Write {
                lines: recorded,
                success,
                output,
            } = &entry.event
                && recorded.as_slice() == lines
            {
                return replayed(&lines.join("\n"), *success, output);
            }
        }
        Err(TransportError::ReplayMismatch(format!(
            "no replayable write found for {} lines starting with '{}'",
            lines.len(),
            lines.first().map(String::as_str).unwrap_or_default()
        )))
    }
}

fn replayed(command: &str, success: bool, output: &str) -> Result<String, TransportError> {
    if success {
        Ok(output.to_string())
    } else {
        Err(TransportError::CommandRejected {
            command: command.to_string(),
            output: output.to_string(),
        })
    }
}

impl Transport for ReplayTransport {
    async fn read(&mut self, command: &str) -> Result<String, TransportError> {
        debug!("replaying read '{}'", command);
        self.replay_read(command)
    }

    async fn write_and_read(&mut self, lines: &[String]) -> Result<String, TransportError> {
        debug!("replaying write of {} lines", lines.len());
        self.replay_write(lines)
    }
}

fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}
