//! Error types for schedule log access.

use std::path::PathBuf;

/// Errors that can occur while loading or appending to the schedule log.
#[derive(Debug, thiserror::Error)]
pub enum EventLogError {
    /// The log source does not exist.
    #[error("schedule log not found: {path}")]
    LogMissing { path: PathBuf },

    /// The log exists but is not a list of well-formed events.
    #[error("schedule log is corrupt: {reason}")]
    LogCorrupt { reason: String },

    /// The log exists but could not be read (permissions, device errors).
    #[error("failed to read schedule log {path}: {source}")]
    LogUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing the log failed; the previous contents are still in place.
    #[error("failed to write schedule log {path}: {source}")]
    LogWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl EventLogError {
    pub(crate) fn corrupt(reason: impl Into<String>) -> Self {
        Self::LogCorrupt {
            reason: reason.into(),
        }
    }
}

/// Result alias for schedule log operations.
pub type Result<T> = std::result::Result<T, EventLogError>;
