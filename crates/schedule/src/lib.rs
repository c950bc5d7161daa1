//! Schedule reconciliation: derives the current measurement period, missed
//! periods and audit history from the append-only schedule log.
//!
//! The reconciler is a pure function of `(history, now)`. It never touches the
//! log itself, so any number of callers may reconcile the same snapshot.

pub mod reconciler;

pub use reconciler::{
    reconcile, FutureSchedule, HistoryItem, HistoryKind, ReconcileError, Reconciler,
    Reconciliation,
};
