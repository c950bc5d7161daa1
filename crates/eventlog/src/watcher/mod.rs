//! Change notification bridge for the schedule log.
//!
//! Native filesystem events (via `notify`) and a fixed-rate metadata poll both
//! feed one debounced signal. A burst of writes, such as this process's own
//! appends, is reported as a single [`LogChange::Modified`]. The poll doubles
//! as the fallback when native events are unavailable or late.

mod events;


use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use cadence_core::EngineConfig;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use self::events::is_log_event;

/// What the bridge observed about the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogChange {
    /// The log was written (by this process or another) and should be reconciled again.
    Modified,
    /// The log has been inaccessible for `failures` consecutive checks.
    Unavailable { reason: String, failures: u32 },
    /// The log is reachable again after being reported unavailable.
    Restored,
}

/// Timing knobs for [`LogWatcher`].
#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub poll_interval: Duration,
    pub debounce: Duration,
    /// Consecutive failed checks before [`LogChange::Unavailable`] is raised.
    pub failure_limit: u32,
    /// Subscribe to native filesystem events in addition to polling.
    pub native_events: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            debounce: Duration::from_millis(500),
            failure_limit: 3,
            native_events: true,
        }
    }
}

/// The engine timer already reconciles every `poll_interval`; the bridge poll
/// only backs up native events and tracks accessibility, so it runs slower.
const ENGINE_POLL_FACTOR: u32 = 3;

impl From<&EngineConfig> for WatchConfig {
    fn from(cfg: &EngineConfig) -> Self {
        Self {
            poll_interval: cfg.poll_interval() * ENGINE_POLL_FACTOR,
            debounce: cfg.debounce(),
            failure_limit: cfg.watch_failure_limit.max(1),
            native_events: true,
        }
    }
}

/// Watches one log file and reports changes through a callback.
pub struct LogWatcher {
    path: PathBuf,
    config: WatchConfig,
}

/// Keeps the watcher alive; dropping it stops the bridge.
pub struct WatchHandle {
    task: JoinHandle<()>,
    _watcher: Option<RecommendedWatcher>,
}

impl WatchHandle {
    /// Whether native filesystem events are being received (otherwise polling only).
    pub fn is_native(&self) -> bool {
        self._watcher.is_some()
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Size and modification time, compared between polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    len: u64,
    modified: Option<SystemTime>,
}

struct BridgeState {
    last_stamp: Option<FileStamp>,
    failures: u32,
    reported: bool,
}

impl LogWatcher {
    pub fn new(path: impl Into<PathBuf>, config: WatchConfig) -> Self {
        Self {
            path: path.into(),
            config,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start the bridge on the current tokio runtime.
    ///
    /// `callback` runs on the bridge task, one call at a time.
    pub fn on_change<F>(self, callback: F) -> WatchHandle
    where
        F: Fn(LogChange) + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::channel::<()>(64);
        let watcher = if self.config.native_events {
            self.start_native(tx.clone())
        } else {
            None
        };

        info!(
            path = %self.path.display(),
            native = watcher.is_some(),
            poll_secs = self.config.poll_interval.as_secs_f64(),
            "watching schedule log"
        );

        let task = tokio::spawn(run_bridge(self.path, self.config, rx, tx, Arc::new(callback)));
        WatchHandle {
            task,
            _watcher: watcher,
        }
    }

    fn start_native(&self, tx: mpsc::Sender<()>) -> Option<RecommendedWatcher> {
        let dir = match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(d) => d.to_path_buf(),
            None => PathBuf::from("."),
        };
        let file_name = self.path.file_name()?.to_os_string();

        let watcher = notify::recommended_watcher(move |res: std::result::Result<notify::Event, notify::Error>| {
            match res {
                Ok(event) => {
                    if is_log_event(&event, &file_name) {
                        // A full channel already holds a pending signal.
                        let _ = tx.try_send(());
                    }
                }
                Err(e) => warn!(error = %e, "schedule log watcher error"),
            }
        });

        let mut watcher = match watcher {
            Ok(w) => w,
            Err(e) => {
                warn!(error = %e, "native file watching unavailable, polling only");
                return None;
            }
        };

        // The directory is watched so atomic replacement (rename over the file) is seen.
        if let Err(e) = watcher.watch(&dir, RecursiveMode::NonRecursive) {
            warn!(path = %dir.display(), error = %e, "cannot watch schedule log directory, polling only");
            return None;
        }
        Some(watcher)
    }
}

async fn run_bridge<F>(
    path: PathBuf,
    config: WatchConfig,
    mut rx: mpsc::Receiver<()>,
    // Held so `recv` never reports a closed channel when running poll-only.
    _keepalive: mpsc::Sender<()>,
    callback: Arc<F>,
) where
    F: Fn(LogChange) + Send + Sync + 'static,
{
    let mut state = BridgeState {
        last_stamp: stamp(&path).await.ok(),
        failures: 0,
        reported: false,
    };

    let mut poll = tokio::time::interval(config.poll_interval);
    poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately; the initial stamp was just taken.
    poll.tick().await;

    loop {
        tokio::select! {
            Some(()) = rx.recv() => {
                // Wait for the writes to go quiet before reporting once.
                while let Ok(Some(())) = tokio::time::timeout(config.debounce, rx.recv()).await {}
                check(&path, &config, &mut state, true, callback.as_ref()).await;
            }
            _ = poll.tick() => {
                check(&path, &config, &mut state, false, callback.as_ref()).await;
            }
        }
    }
}

async fn check<F>(path: &Path, config: &WatchConfig, state: &mut BridgeState, notified: bool, callback: &F)
where
    F: Fn(LogChange),
{
    match stamp(path).await {
        Ok(current) => {
            if state.reported {
                info!(path = %path.display(), "schedule log is accessible again");
                callback(LogChange::Restored);
            }
            state.failures = 0;
            state.reported = false;

            if notified || state.last_stamp != Some(current) {
                debug!(path = %path.display(), notified, "schedule log changed");
                state.last_stamp = Some(current);
                callback(LogChange::Modified);
            }
        }
        Err(e) => {
            state.failures = state.failures.saturating_add(1);
            state.last_stamp = None;
            warn!(path = %path.display(), failures = state.failures, error = %e, "schedule log inaccessible");

            if !state.reported && state.failures >= config.failure_limit {
                state.reported = true;
                callback(LogChange::Unavailable {
                    reason: e.to_string(),
                    failures: state.failures,
                });
            }
        }
    }
}

async fn stamp(path: &Path) -> std::io::Result<FileStamp> {
    let meta = tokio::fs::metadata(path).await?;
    Ok(FileStamp {
        len: meta.len(),
        modified: meta.modified().ok(),
    })
}
