//! Background drivers: the fixed-rate timer and the log change bridge.
//!
//! Both only call into [`ScheduleEngine`], whose reconciliation lock
//! serializes them.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use cadence_eventlog::{LogChange, LogWatcher, WatchConfig, WatchHandle};

use crate::engine::ScheduleEngine;

/// Owns the background tasks. Dropping it stops them.
pub struct BackgroundHandle {
    tasks: Vec<JoinHandle<()>>,
    watch: Option<WatchHandle>,
}

impl BackgroundHandle {
    /// Whether the log is watched for changes (in-memory logs are not).
    pub fn is_watching(&self) -> bool {
        self.watch.is_some()
    }

    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for BackgroundHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Start the timer and, for file-backed logs, the change bridge.
///
/// Must be called from within a tokio runtime.
pub fn spawn_background(engine: Arc<ScheduleEngine>) -> BackgroundHandle {
    let mut tasks = Vec::new();

    let period = engine.config().poll_interval();
    let timer_engine = Arc::clone(&engine);
    tasks.push(tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            timer_engine.tick().await;
        }
    }));

    let watch = match engine.log_location() {
        Some(path) => {
            let (tx, mut rx) = mpsc::unbounded_channel::<LogChange>();
            let change_engine = Arc::clone(&engine);
            tasks.push(tokio::spawn(async move {
                while let Some(change) = rx.recv().await {
                    debug!(?change, "schedule log change");
                    match change {
                        LogChange::Modified => {
                            if let Err(e) = change_engine.refresh().await {
                                debug!(error = %e, "reconciliation after log change failed");
                            }
                        }
                        LogChange::Unavailable { reason, failures } => {
                            change_engine.log_unavailable(&reason, failures).await;
                        }
                        LogChange::Restored => change_engine.log_restored().await,
                    }
                }
            }));

            let watcher = LogWatcher::new(path, WatchConfig::from(engine.config()));
            Some(watcher.on_change(move |change| {
                // The receiver only goes away when the handle is dropped.
                let _ = tx.send(change);
            }))
        }
        None => None,
    };

    info!(
        poll_secs = period.as_secs(),
        watching = watch.is_some(),
        "schedule engine background tasks started"
    );
    BackgroundHandle { tasks, watch }
}
