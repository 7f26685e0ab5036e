use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::BackupError;
use crate::utils::sink::SharedSink;

/// Fixed robocopy argument set: recurse (skipping empty subdirectories),
/// no progress percentages, no hidden/system files, three retries ten
/// seconds apart, no per-file name listing.
pub const ROBOCOPY_FLAGS: [&str; 6] = ["/S", "/NP", "/XA:HS", "/R:3", "/W:10", "/NFL"];

/// Classification token for error lines. Exact, case-sensitive substring
/// match including the surrounding spaces.
pub const ERROR_TOKEN: &str = " ERROR ";

pub fn is_error_line(line: &str) -> bool {
    line.contains(ERROR_TOKEN)
}

/// Locate robocopy under the Windows system directory.
pub fn find_copy_tool() -> Result<PathBuf, BackupError> {
    let windows = std::env::var_os("WINDIR").unwrap_or_else(|| "C:\\Windows".into());
    let path = PathBuf::from(windows).join("system32").join("robocopy.exe");
    if !path.is_file() {
        return Err(BackupError::Config(format!("{} not found", path.display())));
    }
    Ok(path)
}

/// Map a source folder onto its subdirectory under the target: the portion
/// of the source below its filesystem root, replicated under the target.
pub fn target_subdir(source: &Path, target: &Path) -> PathBuf {
    let stem: PathBuf = source
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect();
    target.join(stem)
}

/// Launches and supervises one external copy process per (source, target)
/// pair, multiplexing its output into the shared log and error sinks.
pub struct CopySupervisor {
    tool: Option<PathBuf>,
    log: SharedSink,
    errors: SharedSink,
}

impl CopySupervisor {
    /// `tool` overrides the default robocopy resolution; `None` looks the
    /// binary up in the Windows system directory on every run.
    pub fn new(tool: Option<PathBuf>, log: SharedSink, errors: SharedSink) -> Self {
        Self { tool, log, errors }
    }

    fn resolve_tool(&self) -> Result<PathBuf, BackupError> {
        match &self.tool {
            Some(path) if path.is_file() => Ok(path.clone()),
            Some(path) => Err(BackupError::Config(format!("{} not found", path.display()))),
            None => find_copy_tool(),
        }
    }

    /// Run the copy tool for one pair and supervise it to completion.
    /// Returns the tool's exit code on natural exit; the code is advisory,
    /// copy problems are reported through the error sink instead.
    pub async fn run_copy(
        &self,
        source: &Path,
        target: &Path,
        cancel: &CancellationToken,
    ) -> Result<i32, BackupError> {
        if !source.is_dir() {
            return Err(BackupError::Config(format!(
                "Source folder {} not found",
                source.display()
            )));
        }
        let tool = self.resolve_tool()?;

        let dest = target_subdir(source, target);
        tokio::fs::create_dir_all(&dest).await?;

        debug!(
            "spawning {} {} -> {}",
            tool.display(),
            source.display(),
            dest.display()
        );
        let mut child = Command::new(&tool)
            .arg(source)
            .arg(&dest)
            .args(ROBOCOPY_FLAGS)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let complete = Arc::new(AtomicBool::new(false));
        let stdout = child.stdout.take().unwrap();
        let stderr = child.stderr.take().unwrap();
        let out_reader = tokio::spawn(forward_lines(
            stdout,
            self.log.clone(),
            self.errors.clone(),
            complete.clone(),
        ));
        let err_reader = tokio::spawn(forward_lines(
            stderr,
            self.log.clone(),
            self.errors.clone(),
            complete.clone(),
        ));

        let waited = tokio::select! {
            status = child.wait() => Some(status),
            _ = cancel.cancelled() => None,
        };

        complete.store(true, Ordering::SeqCst);
        let status = match waited {
            Some(status) => status,
            None => {
                let _ = child.kill().await;
                let _ = out_reader.await;
                let _ = err_reader.await;
                return Err(BackupError::Cancelled);
            }
        }?;
        let _ = out_reader.await;
        let _ = err_reader.await;

        let code = status.code().unwrap_or(-1);
        self.log.write_line(&format!("Robocopy returned {}", code));
        Ok(code)
    }
}

/// Forward one output stream line by line. Stops forwarding the moment the
/// job is marked complete, even if more output is still buffered.
async fn forward_lines<R>(stream: R, log: SharedSink, errors: SharedSink, complete: Arc<AtomicBool>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if complete.load(Ordering::SeqCst) {
            break;
        }
        log.write_line(&line);
        if is_error_line(&line) {
            errors.write_line(&line);
        }
    }
}
