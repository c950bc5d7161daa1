//! Period execution controller.
//!
//! A state machine over at most one measurement run:
//! `Idle -> Collecting <-> AwaitingTransmission -> Idle`.
//! Every transition, including lapse detection, happens under one mutex, and
//! the log lines a transition decides are appended before the lock is released
//! so the log order matches the decision order. Device I/O never happens here.

mod run;


use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use cadence_core::{EventKind, Participant, Period, RunId, ScheduleEvent};
use cadence_eventlog::EventLog;
use cadence_schedule::Reconciliation;

use crate::device::Reading;
use crate::error::{EngineError, Result};

pub use self::run::{Direction, MeasurementOutcome, RunHandle, RunReport, RunStatus};
use self::run::{Phase, Run};

/// A run the controller cancelled because its window ended.
#[derive(Debug, Clone)]
pub struct LapsedRun {
    pub run_id: RunId,
    pub period: Period,
    pub participants: Vec<Participant>,
    /// Readings that were collected and are now discarded.
    pub discarded: usize,
}

/// Result of a transmission request.
#[derive(Debug, Clone)]
pub enum Completion {
    Recorded(RunReport),
    /// The run's `TRANSMITTED` line is already in the log; nothing was appended.
    AlreadyRecorded,
}

#[derive(Default)]
struct ControllerState {
    run: Option<Run>,
    last_report: Option<RunReport>,
}

pub struct PeriodController {
    log: Arc<dyn EventLog>,
    record_run_events: bool,
    max_clock_skew: Duration,
    state: Mutex<ControllerState>,
}

impl PeriodController {
    pub fn new(log: Arc<dyn EventLog>, record_run_events: bool, max_clock_skew: Duration) -> Self {
        Self {
            log,
            record_run_events,
            max_clock_skew,
            state: Mutex::new(ControllerState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> RunStatus {
        self.lock().run.as_ref().map(Run::status).unwrap_or(RunStatus::Idle)
    }

    pub fn active_run(&self) -> Option<RunHandle> {
        self.lock().run.as_ref().map(Run::handle)
    }

    /// `Idle -> Collecting`. `reconciliation` must be fresh for `now`.
    pub fn start(&self, reconciliation: &Reconciliation, now: DateTime<Utc>) -> Result<RunHandle> {
        let mut state = self.lock();
        if let Some(run) = &state.run {
            return Err(EngineError::PeriodAlreadyRunning { run_id: run.id });
        }

        let Some(scheduled) = &reconciliation.active_scheduled else {
            return Err(match &reconciliation.future_scheduled {
                Some(f) => EngineError::ScheduleNotStarted {
                    starts_at: f.period.start,
                },
                None => cadence_schedule::ReconcileError::NoScheduleConfigured.into(),
            });
        };
        let Some(period) = reconciliation.period else {
            return Err(cadence_schedule::ReconcileError::NoScheduleConfigured.into());
        };
        if period.has_lapsed(now) {
            return Err(EngineError::PeriodAlreadyLapsed { expiry: period.expiry });
        }

        let mut run = Run::new(scheduled.id, period, scheduled.participants.clone(), now);
        let started = ScheduleEvent::started(run.id, now, run.participants.clone());
        self.append_audit(&started);
        run.events.push(started);

        info!(
            run_id = %run.id,
            period_start = %period.start,
            period_expiry = %period.expiry,
            participants = run.participants.len(),
            "measurement run started"
        );
        let handle = run.handle();
        state.run = Some(run);
        Ok(handle)
    }

    /// Move the cursor away from `participant`, which must be the current one.
    ///
    /// `Next` from the last participant moves to awaiting transmission; `Back`
    /// from there returns to the last participant. `Back` on the first
    /// participant stays put.
    pub fn advance(&self, direction: Direction, participant: &str, now: DateTime<Utc>) -> Result<RunStatus> {
        let mut state = self.lock();
        let run = state.run.as_mut().ok_or(EngineError::NoActiveRun)?;
        if run.period.has_lapsed(now) {
            return Err(EngineError::PeriodAlreadyLapsed { expiry: run.period.expiry });
        }
        if !run.includes(participant) {
            return Err(EngineError::ParticipantUnknown {
                participant: participant.to_string(),
            });
        }
        let current = run.current().cloned().unwrap_or_default();
        if current != participant {
            return Err(EngineError::OutOfOrder {
                expected: current,
                got: participant.to_string(),
            });
        }

        match (direction, run.phase) {
            (Direction::Next, Phase::Collecting) => {
                if run.cursor + 1 < run.participants.len() {
                    run.cursor += 1;
                } else {
                    run.phase = Phase::AwaitingTransmission;
                }
            }
            (Direction::Next, Phase::AwaitingTransmission) => {}
            (Direction::Back, Phase::AwaitingTransmission) => run.phase = Phase::Collecting,
            (Direction::Back, Phase::Collecting) => run.cursor = run.cursor.saturating_sub(1),
        }

        debug!(run_id = %run.id, ?direction, from = participant, "cursor moved");
        Ok(run.status())
    }

    /// The run id and participant a measurement should be taken for.
    pub fn current_step(&self) -> Result<(RunId, Participant)> {
        let state = self.lock();
        let run = state.run.as_ref().ok_or(EngineError::NoActiveRun)?;
        let participant = run.current().cloned().ok_or(EngineError::NoActiveRun)?;
        Ok((run.id, participant))
    }

    /// Hold a reading for `participant`, appending `MEASURED` the first time.
    pub fn record(
        &self,
        run_id: RunId,
        participant: &str,
        reading: Reading,
        now: DateTime<Utc>,
    ) -> Result<MeasurementOutcome> {
        let mut state = self.lock();
        let run = Self::matching_run(&mut state, run_id)?;
        if run.period.has_lapsed(now) {
            return Err(EngineError::PeriodAlreadyLapsed { expiry: run.period.expiry });
        }
        if !run.includes(participant) {
            return Err(EngineError::ParticipantUnknown {
                participant: participant.to_string(),
            });
        }

        let skew = (reading.timestamp - now).abs();
        if skew > self.max_clock_skew {
            warn!(
                run_id = %run_id,
                participant,
                device_time = %reading.timestamp,
                engine_time = %now,
                skew_secs = skew.num_seconds(),
                "device clock disagrees with engine clock"
            );
            run.skewed.insert(participant.to_string());
        } else {
            run.skewed.remove(participant);
        }

        if run.readings.insert(participant.to_string(), reading).is_some() {
            debug!(run_id = %run_id, participant, "duplicate measurement replaced held value");
            return Ok(MeasurementOutcome::Duplicate);
        }

        let measured = ScheduleEvent::measured(run_id, now, participant.to_string());
        self.append_audit(&measured);
        run.events.push(measured);
        debug!(run_id = %run_id, participant, "measurement recorded");
        Ok(MeasurementOutcome::Recorded)
    }

    /// Append `TRANSMITTED` for `sent` and return to `Idle`.
    ///
    /// A failed append leaves the run and its readings in place for a retry.
    pub fn complete(&self, run_id: RunId, sent: &[Participant], now: DateTime<Utc>) -> Result<Completion> {
        let mut state = self.lock();

        if state.run.as_ref().map(|r| r.id) != Some(run_id) {
            let reported = state
                .last_report
                .as_ref()
                .is_some_and(|r| r.run_id == run_id && r.transmitted_at.is_some());
            if reported || self.transmission_logged(run_id)? {
                debug!(run_id = %run_id, "transmission already recorded");
                return Ok(Completion::AlreadyRecorded);
            }
        }

        let run = Self::matching_run(&mut state, run_id)?;
        if run.period.has_lapsed(now) {
            return Err(EngineError::PeriodAlreadyLapsed { expiry: run.period.expiry });
        }
        if sent.is_empty() {
            return Err(EngineError::InvalidSchedule(
                "a transmission must cover at least one participant".to_string(),
            ));
        }
        if let Some(unknown) = sent.iter().find(|p| !run.includes(p)) {
            return Err(EngineError::ParticipantUnknown {
                participant: unknown.clone(),
            });
        }

        let transmitted = ScheduleEvent::transmitted(run_id, now, sent.to_vec());
        self.log.append(std::slice::from_ref(&transmitted))?;
        run.events.push(transmitted);

        let report = run.report(Some(now));
        info!(run_id = %run_id, sent = sent.len(), "readings transmitted");
        state.run = None;
        state.last_report = Some(report.clone());
        Ok(Completion::Recorded(report))
    }

    /// User abandonment: discard the run without notifying anyone.
    pub fn cancel(&self, run_id: RunId) -> Result<LapsedRun> {
        let mut state = self.lock();
        Self::matching_run(&mut state, run_id)?;
        let run = state.run.take().ok_or(EngineError::NoActiveRun)?;
        info!(run_id = %run_id, discarded = run.readings.len(), "measurement run cancelled");
        Ok(LapsedRun {
            run_id,
            period: run.period,
            participants: run.participants,
            discarded: run.readings.len(),
        })
    }

    /// Force `Idle` if the running period has ended at `now`.
    pub fn lapse_if_expired(&self, now: DateTime<Utc>) -> Option<LapsedRun> {
        let mut state = self.lock();
        if !state.run.as_ref().is_some_and(|r| r.period.has_lapsed(now)) {
            return None;
        }
        let run = state.run.take()?;
        warn!(
            run_id = %run.id,
            expiry = %run.period.expiry,
            discarded = run.readings.len(),
            "measurement period lapsed during run"
        );
        Some(LapsedRun {
            run_id: run.id,
            period: run.period,
            participants: run.participants,
            discarded: run.readings.len(),
        })
    }

    /// Participants of the running run without a reading yet.
    pub fn missing_participants(&self) -> Result<Vec<Participant>> {
        let state = self.lock();
        let run = state.run.as_ref().ok_or(EngineError::NoActiveRun)?;
        Ok(run.missing())
    }

    /// The running run's report, or else the last transmitted one.
    pub fn report(&self) -> Option<RunReport> {
        let state = self.lock();
        match &state.run {
            Some(run) => Some(run.report(None)),
            None => state.last_report.clone(),
        }
    }

    fn matching_run(state: &mut ControllerState, run_id: RunId) -> Result<&mut Run> {
        let run = state.run.as_mut().ok_or(EngineError::NoActiveRun)?;
        if run.id != run_id {
            return Err(EngineError::RunMismatch {
                expected: run.id,
                got: run_id,
            });
        }
        Ok(run)
    }

    fn transmission_logged(&self, run_id: RunId) -> Result<bool> {
        Ok(self
            .log
            .load()?
            .iter()
            .any(|e| e.kind == EventKind::Transmitted && e.id == run_id))
    }

    /// `STARTED`/`MEASURED` lines are audit only; losing one never stops a run.
    fn append_audit(&self, event: &ScheduleEvent) {
        if !self.record_run_events {
            return;
        }
        if let Err(e) = self.log.append(std::slice::from_ref(event)) {
            warn!(run_id = %event.id, kind = %event.kind, error = %e, "failed to record run event, continuing");
        }
    }
}
