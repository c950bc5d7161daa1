//! Derived reconciliation state. Recomputed on demand, never persisted.

use chrono::{DateTime, Utc};
use serde::Serialize;

use cadence_core::{Participant, Period, RunId, ScheduleEvent};

/// Kind of an entry in the reconciled history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryKind {
    /// Readings were transmitted at this time.
    Transmitted,
    /// A past window ended with no transmission.
    Missing,
    /// Readings are next due at this time (only shown when nothing is missed).
    DueAt,
}

/// One line of the audit/display history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryItem {
    pub kind: HistoryKind,
    pub time: DateTime<Utc>,
    pub participants: Vec<Participant>,
    /// Run that produced a transmission; synthesized entries carry none.
    pub run_id: Option<RunId>,
}

/// A schedule that only starts after `now`. The engine stays inert until then.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FutureSchedule {
    pub scheduled: ScheduleEvent,
    pub period: Period,
}

/// Scheduling state derived from the history at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    /// The `now` this result was computed for.
    pub evaluated_at: DateTime<Utc>,
    /// Latest schedule definition at or before `now`.
    pub active_scheduled: Option<ScheduleEvent>,
    /// Window of the active schedule containing `now`.
    pub period: Option<Period>,
    /// Earlier windows without a transmission, after the latest window that has one.
    pub missed_count: u64,
    /// Whether the current window already holds a transmission.
    pub current_period_transmitted: bool,
    /// Newest first.
    pub history: Vec<HistoryItem>,
    /// Set only when there is no active schedule but one starts later.
    pub future_scheduled: Option<FutureSchedule>,
}

impl Reconciliation {
    /// A period may be started only inside an active, unexpired window.
    pub fn can_start_period(&self) -> bool {
        self.active_scheduled.is_some()
            && self
                .period
                .map(|p| p.contains(self.evaluated_at))
                .unwrap_or(false)
    }

    /// Missed readings are outstanding.
    pub fn alert(&self) -> bool {
        self.missed_count > 0
    }

    /// When readings are (or were) next due.
    ///
    /// The current window's start while it has no transmission, otherwise its
    /// expiry. For a future schedule, its first start.
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        match (self.period, &self.future_scheduled) {
            (Some(p), _) if self.current_period_transmitted => Some(p.expiry),
            (Some(p), _) => Some(p.start),
            (None, Some(f)) => Some(f.period.start),
            (None, None) => None,
        }
    }

    /// Participants of the active schedule, in run order.
    pub fn participants(&self) -> &[Participant] {
        self.active_scheduled
            .as_ref()
            .map(|s| s.participants.as_slice())
            .unwrap_or(&[])
    }

    pub fn repeat_minutes(&self) -> Option<i64> {
        self.active_scheduled.as_ref().map(|s| s.repeat_minutes)
    }

    /// Whether both results describe the same active window of the same schedule.
    pub fn same_period(&self, other: &Reconciliation) -> bool {
        self.period == other.period
            && self.active_scheduled.as_ref().map(|s| s.id) == other.active_scheduled.as_ref().map(|s| s.id)
    }
}
