//! Engine error taxonomy.

use chrono::{DateTime, Utc};

use cadence_core::{Participant, RunId};
use cadence_eventlog::EventLogError;
use cadence_schedule::ReconcileError;

use crate::device::DeviceError;

/// Errors returned by engine operations. None of them are fatal to the host.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Loading or appending to the schedule log failed.
    #[error(transparent)]
    Log(#[from] EventLogError),

    /// The history is corrupt or holds no schedule.
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error("a measurement run ({run_id}) is already in progress")]
    PeriodAlreadyRunning { run_id: RunId },

    #[error("measurement period ended at {expiry}")]
    PeriodAlreadyLapsed { expiry: DateTime<Utc> },

    /// Only a future schedule exists; nothing can be started before it begins.
    #[error("schedule does not start until {starts_at}")]
    ScheduleNotStarted { starts_at: DateTime<Utc> },

    #[error("participant {participant:?} has no device data source")]
    ParticipantUnknown { participant: Participant },

    #[error("no measurement run is in progress")]
    NoActiveRun,

    #[error("run {got} is not the active run ({expected})")]
    RunMismatch { expected: RunId, got: RunId },

    /// Navigation named a participant other than the one at the cursor.
    #[error("current participant is {expected:?}, not {got:?}")]
    OutOfOrder { expected: Participant, got: Participant },

    #[error("measuring {participant:?} failed: {source}")]
    MeasurementFailed {
        participant: Participant,
        #[source]
        source: DeviceError,
    },

    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("new schedule starting {requested} would begin before the current period ({period_start})")]
    ScheduleBeforeCurrentPeriod {
        requested: DateTime<Utc>,
        period_start: DateTime<Utc>,
    },
}

impl EngineError {
    /// The log itself is unusable until fixed externally; starting runs stays disabled.
    pub fn is_setup_error(&self) -> bool {
        match self {
            EngineError::Log(e) => matches!(
                e,
                EventLogError::LogMissing { .. }
                    | EventLogError::LogCorrupt { .. }
                    | EventLogError::LogUnreadable { .. }
            ),
            EngineError::Reconcile(_) => true,
            _ => false,
        }
    }

    /// Appending `TRANSMITTED` or `SCHEDULED` failed; the caller may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Log(EventLogError::LogWriteFailed { .. }))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn setup_errors_are_classified() {
        let missing = EngineError::Log(EventLogError::LogMissing {
            path: PathBuf::from("schedule.json"),
        });
        assert!(missing.is_setup_error());
        assert!(EngineError::Reconcile(ReconcileError::NoScheduleConfigured).is_setup_error());
        assert!(!EngineError::NoActiveRun.is_setup_error());

        let write = EngineError::Log(EventLogError::LogWriteFailed {
            path: PathBuf::from("schedule.json"),
            source: std::io::Error::other("disk full"),
        });
        assert!(!write.is_setup_error());
        assert!(write.is_retryable());
    }
}
