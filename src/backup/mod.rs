pub mod coordinator;
pub mod drives;
pub mod robocopy;
pub mod shutdown;

pub use coordinator::Coordinator;
pub use drives::{AvailableDrives, DriveMonitor, SystemVolumes, VolumeSource};
pub use robocopy::CopySupervisor;
pub use shutdown::ShutdownScheduler;

use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// One configured backup source. The placeholder entry is the settings
/// layer's "add new" slot and is never treated as a real source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceFolder {
    pub path: String,
}

impl SourceFolder {
    pub const PLACEHOLDER: &'static str = "<add folder>";

    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn is_placeholder(&self) -> bool {
        self.path == Self::PLACEHOLDER
    }
}

/// A configured backup destination plus the drive root it lives on.
/// Several targets may share one drive root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetPath {
    pub path: PathBuf,

    /// Filesystem root of `path`; derived when the settings file does not
    /// spell it out.
    #[serde(default)]
    pub drive_root: String,
}

impl TargetPath {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let drive_root = drives::drive_root(&path);
        Self { path, drive_root }
    }

    pub fn root(&self) -> &str {
        &self.drive_root
    }
}

/// Why a backup run stopped early.
#[derive(Debug, Error)]
pub enum BackupError {
    /// Invalid or incomplete configuration. Fatal to the current run,
    /// never retried automatically.
    #[error("{0}")]
    Config(String),

    /// User-requested abort; a clean stop, not an error.
    #[error("Backup was cancelled")]
    Cancelled,

    /// Unexpected failure while supervising a copy job.
    #[error(transparent)]
    Process(#[from] io::Error),
}

/// Outcome of one backup run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Number of (source, target) pairs copied to completion.
    pub pairs_copied: usize,

    /// Set when a copy job failed and the rest of the run was abandoned.
    pub error: Option<String>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}
