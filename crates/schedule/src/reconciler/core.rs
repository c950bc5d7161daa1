use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use cadence_core::{EngineConfig, EventError, EventKind, ScheduleEvent};

use super::error::ReconcileError;
use super::result::{FutureSchedule, HistoryItem, HistoryKind, Reconciliation};
use super::windows::WindowGrid;

/// Reconciles histories with a fixed lookback horizon.
#[derive(Debug, Clone, Copy)]
pub struct Reconciler {
    horizon: Duration,
}

impl Reconciler {
    pub fn new(horizon: Duration) -> Self {
        Self { horizon }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.history_horizon())
    }

    pub fn horizon(&self) -> Duration {
        self.horizon
    }

    pub fn reconcile(
        &self,
        history: &[ScheduleEvent],
        now: DateTime<Utc>,
    ) -> Result<Reconciliation, ReconcileError> {
        let result = reconcile(history, now, self.horizon);
        match &result {
            Ok(r) => debug!(
                events = history.len(),
                missed = r.missed_count,
                active = r.active_scheduled.is_some(),
                "reconciled schedule history"
            ),
            Err(e) => debug!(events = history.len(), error = %e, "reconciliation produced no result"),
        }
        result
    }
}

/// Derive the scheduling state at `now` from the full event history.
///
/// Pure: the same history and instant always give the same result.
pub fn reconcile(
    history: &[ScheduleEvent],
    now: DateTime<Utc>,
    horizon: Duration,
) -> Result<Reconciliation, ReconcileError> {
    let events: Vec<&ScheduleEvent> = history.iter().filter(|e| !e.is_sentinel()).collect();
    for event in &events {
        event.validate()?;
    }

    let horizon_start = now.checked_sub_signed(horizon).unwrap_or(DateTime::<Utc>::MIN_UTC);
    let transmitted: Vec<&ScheduleEvent> = events
        .iter()
        .copied()
        .filter(|e| e.kind == EventKind::Transmitted)
        .collect();

    let mut history_items: Vec<HistoryItem> = transmitted
        .iter()
        .filter(|e| e.time >= horizon_start)
        .map(|e| HistoryItem {
            kind: HistoryKind::Transmitted,
            time: e.time,
            participants: e.participants.clone(),
            run_id: Some(e.id),
        })
        .collect();

    let Some(active) = latest_scheduled_at_or_before(&events, now) else {
        let Some(future) = earliest_future_scheduled(&events, now) else {
            return Err(ReconcileError::NoScheduleConfigured);
        };
        sort_newest_first(&mut history_items);
        return Ok(Reconciliation {
            evaluated_at: now,
            active_scheduled: None,
            period: None,
            missed_count: 0,
            current_period_transmitted: false,
            history: history_items,
            future_scheduled: Some(FutureSchedule {
                period: WindowGrid::new(future.time, future.repeat_minutes)
                    .and_then(|grid| grid.window(0))
                    .ok_or_else(|| out_of_range(future))?,
                scheduled: future.clone(),
            }),
        });
    };

    let grid =
        WindowGrid::new(active.time, active.repeat_minutes).ok_or_else(|| out_of_range(active))?;
    let current_index = grid.index_of(now).unwrap_or(0);
    let period = grid.window(current_index).ok_or_else(|| out_of_range(active))?;

    let satisfied: BTreeSet<u64> = transmitted
        .iter()
        .filter_map(|e| grid.index_of(e.time))
        .filter(|i| *i <= current_index)
        .collect();
    let current_period_transmitted = satisfied.contains(&current_index);

    // Only windows after the latest satisfied one count as missed.
    let missed_count = match satisfied.last() {
        Some(latest) => current_index.saturating_sub(latest + 1),
        None => current_index,
    };

    let first_shown = grid.first_starting_at_or_after(horizon_start);
    for index in first_shown..current_index {
        if satisfied.contains(&index) {
            continue;
        }
        let Some(window) = grid.window(index) else {
            continue;
        };
        history_items.push(HistoryItem {
            kind: HistoryKind::Missing,
            time: window.start,
            participants: active.participants.clone(),
            run_id: None,
        });
    }

    if missed_count == 0 {
        history_items.push(HistoryItem {
            kind: HistoryKind::DueAt,
            time: period.expiry,
            participants: active.participants.clone(),
            run_id: None,
        });
    }

    sort_newest_first(&mut history_items);

    Ok(Reconciliation {
        evaluated_at: now,
        active_scheduled: Some(active.clone()),
        period: Some(period),
        missed_count,
        current_period_transmitted,
        history: history_items,
        future_scheduled: None,
    })
}

fn out_of_range(event: &ScheduleEvent) -> ReconcileError {
    ReconcileError::LogCorrupt(EventError::RepeatOutOfRange {
        id: event.id,
        repeat: event.repeat_minutes,
    })
}

/// Greatest `time <= now`; on equal times the later log entry wins.
fn latest_scheduled_at_or_before<'a>(
    events: &[&'a ScheduleEvent],
    now: DateTime<Utc>,
) -> Option<&'a ScheduleEvent> {
    let mut best: Option<&ScheduleEvent> = None;
    for event in events.iter().copied() {
        if event.kind != EventKind::Scheduled || event.time > now {
            continue;
        }
        if best.map_or(true, |b| event.time >= b.time) {
            best = Some(event);
        }
    }
    best
}

/// Smallest `time > now`; on equal times the later log entry wins.
fn earliest_future_scheduled<'a>(
    events: &[&'a ScheduleEvent],
    now: DateTime<Utc>,
) -> Option<&'a ScheduleEvent> {
    let mut best: Option<&ScheduleEvent> = None;
    for event in events.iter().copied() {
        if event.kind != EventKind::Scheduled || event.time <= now {
            continue;
        }
        if best.map_or(true, |b| event.time <= b.time) {
            best = Some(event);
        }
    }
    best
}

fn sort_newest_first(items: &mut [HistoryItem]) {
    items.sort_by(|a, b| b.time.cmp(&a.time));
}
