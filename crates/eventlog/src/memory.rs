//! [`MemoryLog`]: a schedule log held in process memory.

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use cadence_core::ScheduleEvent;

use crate::error::{EventLogError, Result};
use crate::log::EventLog;

/// In-memory schedule log for embedding and tests.
///
/// A read-only log rejects appends with [`EventLogError::LogWriteFailed`],
/// which is how a full or write-protected disk looks to the engine.
#[derive(Default)]
pub struct MemoryLog {
    events: RwLock<Vec<ScheduleEvent>>,
    read_only: AtomicBool,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(events: Vec<ScheduleEvent>) -> Self {
        Self {
            events: RwLock::new(events),
            read_only: AtomicBool::new(false),
        }
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Number of stored events.
    pub fn len(&self) -> usize {
        self.events.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventLog for MemoryLog {
    fn load(&self) -> Result<Vec<ScheduleEvent>> {
        Ok(self.events.read().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn append(&self, events: &[ScheduleEvent]) -> Result<()> {
        if self.read_only.load(Ordering::SeqCst) {
            return Err(EventLogError::LogWriteFailed {
                path: PathBuf::from("<memory>"),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "log is read-only"),
            });
        }
        self.events
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(events);
        Ok(())
    }
}
