use cadence_core::{Period, RunId};
use cadence_schedule::Reconciliation;

/// Published to subscribers of [`crate::ScheduleEngine::subscribe`].
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A reconciliation completed; carries the new result.
    Refreshed(Reconciliation),
    ReconcileFailed { reason: String },
    /// The window the engine last reported has ended.
    PeriodExpired {
        previous: Period,
        current: Option<Period>,
    },
    RunStarted { run_id: RunId },
    /// The run's window ended before transmission; its data was discarded.
    RunLapsed { run_id: RunId, period: Period },
    RunCompleted { run_id: RunId },
    RunCancelled { run_id: RunId },
    LogUnavailable { reason: String },
    LogRestored,
}
