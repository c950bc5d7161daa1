//! Schedule reconciler and its derived result types.
//!
//! Given the whole history and an instant `now`, the reconciler:
//! - picks the latest `SCHEDULED` event at or before `now` (later log entry wins a tie)
//! - finds the half-open window of that schedule containing `now`
//! - counts earlier windows with no `TRANSMITTED` event since the latest satisfied one
//! - materializes transmissions and missed windows within the lookback horizon

mod core;
mod error;
mod result;
mod windows;


pub use self::core::{reconcile, Reconciler};
pub use self::error::ReconcileError;
pub use self::result::{FutureSchedule, HistoryItem, HistoryKind, Reconciliation};
