use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod backup;
mod utils;

use crate::backup::shutdown::ShutdownScheduler;
use crate::backup::{Coordinator, DriveMonitor, SystemVolumes};
use crate::utils::sink::{ConsoleSink, FanoutSink, FileSink, MemorySink, SharedSink};

#[tokio::main]
async fn main() -> Result<()> {
    utils::logging::init_tracing();

    let config = utils::config::load_config()?;
    info!("Starting robobackup v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "{} source folder(s), {} target path(s)",
        config.source_folders.len(),
        config.target_paths.len()
    );

    // Backup output goes to the console and, when writable, the log file;
    // error-classified lines are held back for the end-of-run summary.
    let mut fanout = FanoutSink::new().with(ConsoleSink);
    match FileSink::create(&config.log_path()) {
        Ok(file) => fanout = fanout.with(file),
        Err(e) => warn!("log file {} unavailable: {}", config.log_path().display(), e),
    }
    let log = SharedSink::new(fanout);
    let error_lines = MemorySink::new(1024);
    let errors = SharedSink::new(error_lines.clone());

    let cancel = CancellationToken::new();
    let monitor = Arc::new(
        DriveMonitor::new(config.target_drive_roots(), Arc::new(SystemVolumes))
            .with_poll_interval(Duration::from_secs(config.poll_interval_secs.max(1))),
    );
    let drives = monitor.available();
    // seed availability before validation; the loop keeps it fresh
    monitor.poll_once();
    info!("Available target drives: {:?}", drives.snapshot());
    let monitor_task = {
        let monitor = monitor.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { monitor.run(cancel).await })
    };

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            info!("Cancellation requested");
            cancel.cancel();
        });
    }

    let coordinator = Coordinator::new(log.clone(), errors);
    let outcome = coordinator.run_backup(&config, &drives, &cancel).await;

    let run_ok = match &outcome {
        Ok(report) => {
            if report.succeeded() {
                info!("Backed up {} source/target pair(s)", report.pairs_copied);
            }
            report.succeeded()
        }
        Err(e) => {
            log.write_line(&e.to_string());
            error!("{e}");
            false
        }
    };

    // Flush the aggregated error summary, then the completion banner.
    let collected = error_lines.lines();
    if !collected.is_empty() {
        log.write_line("Errors reported during this run:");
        for line in &collected {
            log.write_line(line);
        }
        error_lines.clear();
    }
    log.write_line("===========================================================");
    log.write_line("BACKUP COMPLETE ");
    log.write_line("===========================================================");

    if run_ok && config.shutdown_on_complete {
        let scheduler = ShutdownScheduler::new(log.clone());
        scheduler.schedule(config.shutdown_delay_secs).await?;
        info!(
            "Press Ctrl+C within {}s to cancel the shutdown",
            config.shutdown_delay_secs
        );
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(config.shutdown_delay_secs)) => {}
            _ = tokio::signal::ctrl_c() => {
                scheduler.cancel().await?;
            }
        }
    }

    cancel.cancel();
    let _ = monitor_task.await;
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
