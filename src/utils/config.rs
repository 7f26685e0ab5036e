use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::backup::{drives, SourceFolder, TargetPath};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Folders to back up, in list order.
    pub source_folders: Vec<SourceFolder>,

    /// Backup destinations, in list order.
    pub target_paths: Vec<TargetPath>,

    /// Copy tool override; robocopy is resolved from the Windows system
    /// directory when unset.
    pub copy_tool: Option<PathBuf>,

    /// Drive poll interval in seconds.
    pub poll_interval_secs: u64,

    /// Delay handed to the OS shutdown command after a completed run.
    pub shutdown_delay_secs: u64,

    /// Schedule a machine shutdown once the run completes cleanly.
    pub shutdown_on_complete: bool,

    /// Backup output log; defaults to log.txt under the platform data dir.
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_folders: Vec::new(),
            target_paths: Vec::new(),
            copy_tool: None,
            poll_interval_secs: 2,
            shutdown_delay_secs: 60,
            shutdown_on_complete: false,
            log_file: None,
        }
    }
}

impl Config {
    /// Load the settings file, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = match std::env::var_os("ROBOBACKUP_CONFIG") {
            Some(p) => PathBuf::from(p),
            None => settings_dir().join("settings.json"),
        };
        let mut config = if path.is_file() {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        } else {
            Config::default()
        };

        if let Some(tool) = std::env::var_os("ROBOBACKUP_COPY_TOOL") {
            config.copy_tool = Some(PathBuf::from(tool));
        }
        if let Some(log) = std::env::var_os("ROBOBACKUP_LOG") {
            config.log_file = Some(PathBuf::from(log));
        }
        if std::env::var_os("ROBOBACKUP_SHUTDOWN").is_some() {
            config.shutdown_on_complete = true;
        }

        config.normalize();
        Ok(config)
    }

    /// Fill in derived target drive roots and drop duplicate source
    /// folders (case-insensitive, first spelling wins).
    pub fn normalize(&mut self) {
        for target in &mut self.target_paths {
            if target.drive_root.is_empty() {
                target.drive_root = drives::drive_root(&target.path);
            }
        }
        let mut seen: Vec<String> = Vec::new();
        self.source_folders.retain(|folder| {
            let key = folder.path.to_lowercase();
            if seen.contains(&key) {
                false
            } else {
                seen.push(key);
                true
            }
        });
    }

    /// Sources that are real folders, not the placeholder slot.
    pub fn real_sources(&self) -> impl Iterator<Item = &SourceFolder> {
        self.source_folders.iter().filter(|s| !s.is_placeholder())
    }

    /// Distinct drive roots referenced by the configured targets.
    pub fn target_drive_roots(&self) -> Vec<String> {
        let mut roots: Vec<String> = Vec::new();
        for target in &self.target_paths {
            if !roots.iter().any(|r| r.to_lowercase() == target.root().to_lowercase()) {
                roots.push(target.root().to_string());
            }
        }
        roots
    }

    pub fn log_path(&self) -> PathBuf {
        self.log_file
            .clone()
            .unwrap_or_else(|| data_dir().join("log.txt"))
    }
}

pub fn settings_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("robobackup")
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("robobackup")
}

pub fn load_config() -> Result<Config> {
    Config::load()
}
