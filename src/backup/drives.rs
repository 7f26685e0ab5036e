use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use parking_lot::Mutex;
use sysinfo::Disks;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Enumerates the roots of the currently mounted filesystem volumes.
pub trait VolumeSource: Send + Sync {
    fn mount_roots(&self) -> Result<Vec<String>>;
}

/// Live volume list from the operating system.
pub struct SystemVolumes;

impl VolumeSource for SystemVolumes {
    fn mount_roots(&self) -> Result<Vec<String>> {
        let disks = Disks::new_with_refreshed_list();
        Ok(disks
            .iter()
            .map(|disk| disk.mount_point().to_string_lossy().into_owned())
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriveEvent {
    Added(String),
    Removed(String),
}

/// The configured target drive roots that are currently mounted.
/// Mutated one entry at a time, never replaced wholesale, so subscribers
/// diffing on events see minimal deltas.
#[derive(Clone)]
pub struct AvailableDrives {
    // keyed by the case-folded root, value keeps the spelling the volume
    // source reported
    drives: Arc<Mutex<BTreeMap<String, String>>>,
    event_tx: broadcast::Sender<DriveEvent>,
}

impl AvailableDrives {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            drives: Arc::new(Mutex::new(BTreeMap::new())),
            event_tx,
        }
    }

    pub fn contains(&self, root: &str) -> bool {
        self.drives.lock().contains_key(&fold(root))
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.drives.lock().values().cloned().collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DriveEvent> {
        self.event_tx.subscribe()
    }

    /// Sync the set to the given mounted roots: removals first, then
    /// additions, all under one critical section. A no-op when nothing
    /// changed.
    pub(crate) fn sync_to(&self, mounted: &[String]) {
        let mut drives = self.drives.lock();
        let now: BTreeMap<String, &String> =
            mounted.iter().map(|root| (fold(root), root)).collect();

        let stale: Vec<String> = drives
            .keys()
            .filter(|key| !now.contains_key(*key))
            .cloned()
            .collect();
        for key in stale {
            if let Some(root) = drives.remove(&key) {
                let _ = self.event_tx.send(DriveEvent::Removed(root));
            }
        }
        for (key, root) in now {
            if !drives.contains_key(&key) {
                drives.insert(key, root.clone());
                let _ = self.event_tx.send(DriveEvent::Added(root.clone()));
            }
        }
    }
}

impl Default for AvailableDrives {
    fn default() -> Self {
        Self::new()
    }
}

fn fold(root: &str) -> String {
    root.to_lowercase()
}

/// Derive the filesystem root of a path: the drive prefix plus the root
/// separator, e.g. `C:\` for `C:\Docs`. Relative paths have no root and
/// yield an empty string.
pub fn drive_root(path: &Path) -> String {
    let mut root = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => root.push(component.as_os_str()),
            _ => break,
        }
    }
    root.to_string_lossy().into_owned()
}

/// Polls the live volume list and keeps an [`AvailableDrives`] set in sync
/// with the subset of configured target drive roots that are actually
/// mounted.
pub struct DriveMonitor {
    configured: Vec<String>,
    available: AvailableDrives,
    source: Arc<dyn VolumeSource>,
    poll_interval: Duration,
}

impl DriveMonitor {
    pub fn new(configured_roots: Vec<String>, source: Arc<dyn VolumeSource>) -> Self {
        Self {
            configured: configured_roots,
            available: AvailableDrives::new(),
            source,
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Handle to the shared availability set.
    pub fn available(&self) -> AvailableDrives {
        self.available.clone()
    }

    /// One poll cycle. An enumeration failure (a drive vanishing mid-scan)
    /// is swallowed; the next tick retries.
    pub fn poll_once(&self) {
        let mounted = match self.source.mount_roots() {
            Ok(roots) => roots,
            Err(e) => {
                debug!("volume enumeration failed: {e:#}");
                return;
            }
        };
        let now: Vec<String> = mounted
            .into_iter()
            .filter(|root| {
                let key = fold(root);
                self.configured.iter().any(|c| fold(c) == key)
            })
            .collect();
        self.available.sync_to(&now);
    }

    /// Poll until the token fires. Only cancellation stops this loop.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut tick = tokio::time::interval(self.poll_interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tick.tick() => self.poll_once(),
            }
        }
        debug!("drive monitor stopped");
    }
}
