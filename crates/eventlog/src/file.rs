//! [`JsonFileLog`]: the schedule log as one JSON array on disk.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use cadence_core::ScheduleEvent;
use tracing::{debug, info};

use crate::error::{EventLogError, Result};
use crate::log::{parse_events, EventLog};

/// Filesystem-backed schedule log.
///
/// The whole array is rewritten on every append: serialized to a dotfile next
/// to the log, flushed, then renamed over the original. Loads and appends made
/// through one instance are serialized, so a load issued after an append
/// returns sees that append.
pub struct JsonFileLog {
    path: PathBuf,
    /// Readers share, the single writer excludes them for the read-modify-write.
    gate: RwLock<()>,
}

impl JsonFileLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            gate: RwLock::new(()),
        }
    }

    /// Open the log at `path`, creating it with `initial` events if it does not exist yet.
    pub fn create_if_missing(path: impl Into<PathBuf>, initial: &[ScheduleEvent]) -> Result<Self> {
        let log = Self::new(path);
        if !log.path.exists() {
            if let Some(parent) = log.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(|source| EventLogError::LogWriteFailed {
                    path: log.path.clone(),
                    source,
                })?;
            }
            log.write_atomic(initial)?;
            info!(path = %log.path.display(), events = initial.len(), "created schedule log");
        }
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "schedule".to_string());
        self.path.with_file_name(format!(".{name}.tmp"))
    }

    fn read_events(&self) -> Result<Vec<ScheduleEvent>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(EventLogError::LogMissing {
                    path: self.path.clone(),
                })
            }
            Err(source) => {
                return Err(EventLogError::LogUnreadable {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        parse_events(&contents).map_err(|e| match e {
            EventLogError::LogCorrupt { reason } => EventLogError::LogCorrupt {
                reason: format!("{}: {reason}", self.path.display()),
            },
            other => other,
        })
    }

    fn write_atomic(&self, events: &[ScheduleEvent]) -> Result<()> {
        let failed = |source: io::Error| EventLogError::LogWriteFailed {
            path: self.path.clone(),
            source,
        };

        let json = serde_json::to_vec_pretty(events)
            .map_err(|e| failed(io::Error::new(io::ErrorKind::InvalidData, e)))?;

        let tmp = self.tmp_path();
        let result = (|| {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&json)?;
            file.sync_all()?;
            fs::rename(&tmp, &self.path)
        })();

        if let Err(e) = result {
            let _ = fs::remove_file(&tmp);
            return Err(failed(e));
        }
        Ok(())
    }
}

impl EventLog for JsonFileLog {
    fn load(&self) -> Result<Vec<ScheduleEvent>> {
        let _guard = self.gate.read().unwrap_or_else(|e| e.into_inner());
        self.read_events()
    }

    fn append(&self, events: &[ScheduleEvent]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        let _guard = self.gate.write().unwrap_or_else(|e| e.into_inner());

        // A corrupt log is left untouched for manual repair; a missing one starts empty.
        let mut all = match self.read_events() {
            Ok(existing) => existing,
            Err(EventLogError::LogMissing { .. }) => Vec::new(),
            Err(e) => return Err(e),
        };
        all.extend_from_slice(events);
        self.write_atomic(&all)?;

        debug!(
            path = %self.path.display(),
            appended = events.len(),
            total = all.len(),
            "appended schedule events"
        );
        Ok(())
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.path)
    }
}
