use super::*;

/// Transport that hands every command to a session worker over a channel.
///
/// The worker owns the actual connection and answers each [`CmdJob`] through
/// its oneshot responder. Reads run in `read_mode`, configuration lines in
/// `config_mode`.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    sender: mpsc::Sender<CmdJob>,
    read_mode: String,
    config_mode: String,
    timeout: Duration,
}

impl ChannelTransport {
    pub fn new(sender: mpsc::Sender<CmdJob>) -> Self {
        Self {
            sender,
            read_mode: "Enable".to_string(),
            config_mode: "Config".to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_modes(mut self, read_mode: impl Into<String>, config_mode: impl Into<String>) -> Self {
        self.read_mode = read_mode.into();
        self.config_mode = config_mode.into();
        self
    }

    /// Per-command timeout, applied both to the worker and to the wait here.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The worker takes whole seconds; partial seconds round up so a short
    /// timeout never reaches it as zero.
    fn worker_timeout_secs(&self) -> u64 {
        self.timeout.as_secs() + u64::from(self.timeout.subsec_nanos() > 0)
    }

    async fn execute(&self, mode: &str, command: &str) -> Result<Output, TransportError> {
        let (responder, rx) = oneshot::channel();
        let job = CmdJob {
            data: Command {
                mode: mode.to_string(),
                command: command.to_string(),
                timeout: Some(self.worker_timeout_secs()),
            },
            responder,
        };
        debug!("sending '{}' in mode '{}'", command, mode);
        self.sender
            .send(job)
            .await
            .map_err(|_| TransportError::ChannelClosed)?;

        let output = match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(result)) => result?,
            Ok(Err(_)) => return Err(TransportError::ChannelClosed),
            Err(_) => return Err(TransportError::Timeout(command.to_string())),
        };
        if !output.success {
            return Err(TransportError::CommandRejected {
                command: command.to_string(),
                output: output.content,
            });
        }
        Ok(output)
    }
}

impl Transport for ChannelTransport {
    async fn read(&mut self, command: &str) -> Result<String, TransportError> {
        let output = self.execute(&self.read_mode, command).await?;
        Ok(output.content)
    }

    async fn write_and_read(&mut self, lines: &[String]) -> Result<String, TransportError> {
        let mut combined = Vec::with_capacity(lines.len());
        for line in lines {
            let output = self.execute(&self.config_mode, line).await?;
            if !output.content.is_empty() {
                combined.push(output.content);
            }
        }
        Ok(combined.join("\n"))
    }
}
