use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::drives::AvailableDrives;
use super::robocopy::CopySupervisor;
use super::{BackupError, RunReport, SourceFolder, TargetPath};
use crate::utils::config::Config;
use crate::utils::sink::SharedSink;

/// Drives one backup run: validates the configuration snapshot against the
/// live drive set, then copies every real source folder to every available
/// target, one pair at a time.
pub struct Coordinator {
    log: SharedSink,
    errors: SharedSink,
}

impl Coordinator {
    pub fn new(log: SharedSink, errors: SharedSink) -> Self {
        Self { log, errors }
    }

    /// Run the whole backup. Configuration errors and cancellation
    /// propagate to the caller; a failure inside a copy job is logged,
    /// recorded on the report, and abandons the remaining pairs.
    pub async fn run_backup(
        &self,
        config: &Config,
        drives: &AvailableDrives,
        cancel: &CancellationToken,
    ) -> Result<RunReport, BackupError> {
        let mut report = RunReport::default();
        match self.run_pairs(config, drives, cancel, &mut report).await {
            Ok(()) => Ok(report),
            Err(BackupError::Process(e)) => {
                let message = format!("Backup failed: {}", e);
                self.log.write_line(&message);
                warn!("{message}");
                report.error = Some(message);
                Ok(report)
            }
            Err(e) => Err(e),
        }
    }

    async fn run_pairs(
        &self,
        config: &Config,
        drives: &AvailableDrives,
        cancel: &CancellationToken,
        report: &mut RunReport,
    ) -> Result<(), BackupError> {
        if config.target_paths.is_empty() {
            return Err(BackupError::Config("Missing target path".into()));
        }

        let online: Vec<&TargetPath> = config
            .target_paths
            .iter()
            .filter(|target| drives.contains(target.root()))
            .collect();
        if online.is_empty() {
            let missing = config.target_drive_roots().join(", ");
            return Err(BackupError::Config(format!(
                "Target drive(s) not available: {missing}"
            )));
        }

        let supervisor =
            CopySupervisor::new(config.copy_tool.clone(), self.log.clone(), self.errors.clone());

        for target in online {
            let sources: Vec<&SourceFolder> = config.real_sources().collect();
            if sources.is_empty() {
                return Err(BackupError::Config("No source folders configured".into()));
            }
            tokio::fs::create_dir_all(&target.path).await?;

            for source in sources {
                if cancel.is_cancelled() {
                    return Err(BackupError::Cancelled);
                }
                info!("copying {} -> {}", source.path, target.path.display());
                supervisor
                    .run_copy(Path::new(&source.path), &target.path, cancel)
                    .await?;
                report.pairs_copied += 1;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::sink::{MemorySink, SharedSink};
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    fn sinks() -> (SharedSink, MemorySink, SharedSink, MemorySink) {
        let log_lines = MemorySink::new(1024);
        let error_lines = MemorySink::new(1024);
        (
            SharedSink::new(log_lines.clone()),
            log_lines,
            SharedSink::new(error_lines.clone()),
            error_lines,
        )
    }

    fn coordinator() -> (Coordinator, MemorySink, MemorySink) {
        let (log, log_lines, errors, error_lines) = sinks();
        (Coordinator::new(log, errors), log_lines, error_lines)
    }

    fn drives_with(roots: &[&str]) -> AvailableDrives {
        let drives = AvailableDrives::new();
        drives.sync_to(&roots.iter().map(|r| r.to_string()).collect::<Vec<_>>());
        drives
    }

    #[cfg(unix)]
    fn write_tool(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-robocopy.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn fails_without_configured_targets() {
        let (coordinator, _, _) = coordinator();
        let config = Config::default();
        let result = coordinator
            .run_backup(&config, &drives_with(&[]), &CancellationToken::new())
            .await;
        match result {
            Err(BackupError::Config(message)) => assert_eq!(message, "Missing target path"),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fails_naming_offline_drives_before_touching_disk() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("dest");
        let (coordinator, _, _) = coordinator();

        let mut config = Config::default();
        config.source_folders = vec![SourceFolder::new("/tmp")];
        config.target_paths = vec![
            TargetPath {
                path: dest.clone(),
                drive_root: "X:\\".to_string(),
            },
            TargetPath {
                path: tmp.path().join("more"),
                drive_root: "Y:\\".to_string(),
            },
        ];

        let result = coordinator
            .run_backup(&config, &drives_with(&[]), &CancellationToken::new())
            .await;
        match result {
            Err(BackupError::Config(message)) => {
                assert!(message.contains("X:\\"));
                assert!(message.contains("Y:\\"));
            }
            other => panic!("expected config error, got {other:?}"),
        }
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn placeholder_only_sources_launch_nothing() {
        let tmp = TempDir::new().unwrap();
        let (coordinator, _, _) = coordinator();

        let mut config = Config::default();
        config.source_folders = vec![SourceFolder::new(SourceFolder::PLACEHOLDER)];
        config.target_paths = vec![TargetPath {
            path: tmp.path().join("dest"),
            drive_root: "E:\\".to_string(),
        }];
        // the tool does not exist; the source check must fire first
        config.copy_tool = Some(PathBuf::from("/nonexistent/robocopy"));

        let result = coordinator
            .run_backup(&config, &drives_with(&["E:\\"]), &CancellationToken::new())
            .await;
        match result {
            Err(BackupError::Config(message)) => {
                assert_eq!(message, "No source folders configured");
            }
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn copies_only_to_targets_on_available_drives() {
        let tmp = TempDir::new().unwrap();
        let first = tmp.path().join("First");
        let second = tmp.path().join("Second");
        std::fs::create_dir(&first).unwrap();
        std::fs::create_dir(&second).unwrap();

        let invocations = tmp.path().join("invocations.txt");
        let tool = write_tool(
            tmp.path(),
            &format!("echo \"$1|$2\" >> {}", invocations.display()),
        );

        let online_dest = tmp.path().join("online");
        let offline_dest = tmp.path().join("offline");
        let mut config = Config::default();
        config.copy_tool = Some(tool);
        config.source_folders = vec![
            SourceFolder::new(first.to_string_lossy()),
            SourceFolder::new(second.to_string_lossy()),
            SourceFolder::new(SourceFolder::PLACEHOLDER),
        ];
        config.target_paths = vec![
            TargetPath {
                path: offline_dest.clone(),
                drive_root: "X:\\".to_string(),
            },
            TargetPath {
                path: online_dest.clone(),
                drive_root: "E:\\".to_string(),
            },
        ];

        let (coordinator, _, _) = coordinator();
        // availability check is case-insensitive
        let report = coordinator
            .run_backup(&config, &drives_with(&["e:\\"]), &CancellationToken::new())
            .await
            .unwrap();

        assert!(report.succeeded());
        assert_eq!(report.pairs_copied, 2);
        assert!(online_dest.is_dir());
        assert!(!offline_dest.exists());

        let recorded = std::fs::read_to_string(&invocations).unwrap();
        assert_eq!(recorded.lines().count(), 2);
        assert!(recorded.contains("First"));
        assert!(recorded.contains("Second"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn single_pair_run_end_to_end() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("Docs");
        std::fs::create_dir(&source).unwrap();
        std::fs::write(source.join("notes.txt"), "hello").unwrap();
        let dest = tmp.path().join("Backup");

        let mut config = Config::default();
        config.copy_tool = Some(write_tool(tmp.path(), "exit 0"));
        config.source_folders = vec![SourceFolder::new(source.to_string_lossy())];
        config.target_paths = vec![TargetPath::new(&dest)];

        let (coordinator, log_lines, error_lines) = coordinator();
        let report = coordinator
            .run_backup(&config, &drives_with(&["/"]), &CancellationToken::new())
            .await
            .unwrap();

        assert!(report.succeeded());
        assert_eq!(report.pairs_copied, 1);
        assert!(crate::backup::robocopy::target_subdir(&source, &dest).is_dir());
        assert!(log_lines
            .lines()
            .iter()
            .any(|line| line.contains("Robocopy returned 0")));
        assert!(error_lines.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cancellation_aborts_the_run() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("Docs");
        std::fs::create_dir(&source).unwrap();

        let mut config = Config::default();
        config.copy_tool = Some(write_tool(tmp.path(), "exec sleep 30"));
        config.source_folders = vec![SourceFolder::new(source.to_string_lossy())];
        config.target_paths = vec![TargetPath {
            path: tmp.path().join("Backup"),
            drive_root: "E:\\".to_string(),
        }];

        let (coordinator, _, _) = coordinator();
        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            coordinator.run_backup(&config, &drives_with(&["E:\\"]), &cancel),
        )
        .await
        .expect("run did not stop after cancellation");

        assert!(matches!(result, Err(BackupError::Cancelled)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn copy_failure_is_caught_and_recorded() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("Docs");
        std::fs::create_dir(&source).unwrap();

        // a plain file without the execute bit: spawning it fails after
        // validation has passed
        let tool = tmp.path().join("not-executable");
        std::fs::write(&tool, "#!/bin/sh\n").unwrap();

        let mut config = Config::default();
        config.copy_tool = Some(tool);
        config.source_folders = vec![SourceFolder::new(source.to_string_lossy())];
        config.target_paths = vec![TargetPath {
            path: tmp.path().join("Backup"),
            drive_root: "E:\\".to_string(),
        }];

        let (coordinator, log_lines, _) = coordinator();
        let report = coordinator
            .run_backup(&config, &drives_with(&["E:\\"]), &CancellationToken::new())
            .await
            .unwrap();

        assert!(!report.succeeded());
        let message = report.error.unwrap();
        assert!(message.starts_with("Backup failed:"));
        assert!(log_lines.lines().iter().any(|line| line.starts_with("Backup failed:")));
    }
}
