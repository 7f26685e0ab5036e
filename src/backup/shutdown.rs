use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use super::BackupError;
use crate::utils::sink::SharedSink;

const SHUTDOWN_COMMAND: &str = "shutdown";

/// Issues the OS-level delayed shutdown after a completed run, and the
/// matching cancellation while the delay is still pending. Fire and
/// forget: the OS is never asked whether it honored the request.
pub struct ShutdownScheduler {
    command: String,
    log: SharedSink,
}

impl ShutdownScheduler {
    pub fn new(log: SharedSink) -> Self {
        Self {
            command: SHUTDOWN_COMMAND.to_string(),
            log,
        }
    }

    /// Use a different executable in place of `shutdown`.
    pub fn with_command(command: impl Into<String>, log: SharedSink) -> Self {
        Self {
            command: command.into(),
            log,
        }
    }

    pub async fn schedule(&self, delay_secs: u64) -> Result<(), BackupError> {
        self.log
            .write_line(&format!("Shutting down in {} seconds...", delay_secs));
        self.issue(&["/s", "/t", &delay_secs.to_string()]).await
    }

    pub async fn cancel(&self) -> Result<(), BackupError> {
        self.log.write_line("Shutdown cancelled.");
        self.issue(&["/a"]).await
    }

    // only launch failures surface; the exit status is not checked
    async fn issue(&self, args: &[&str]) -> Result<(), BackupError> {
        debug!("issuing {} {:?}", self.command, args);
        let _ = Command::new(&self.command)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;
        Ok(())
    }
}
