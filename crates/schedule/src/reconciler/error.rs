use cadence_core::EventError;

/// Reasons reconciliation produces no result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    /// A history entry breaks the record invariants; nothing is guessed.
    #[error("schedule history is corrupt: {0}")]
    LogCorrupt(#[from] EventError),

    /// Neither a current nor a future `SCHEDULED` event exists.
    #[error("no schedule configured")]
    NoScheduleConfigured,
}
