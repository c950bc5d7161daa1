//! One measurement run and the types callers see of it.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use cadence_core::{Participant, Period, RunId, ScheduleEvent};

use crate::device::Reading;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Back,
}

/// A re-delivered reading for an already measured participant is a
/// `Duplicate`: it replaces the held value but is not logged again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementOutcome {
    Recorded,
    Duplicate,
}

/// Returned by a successful start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunHandle {
    pub run_id: RunId,
    pub period: Period,
    pub participants: Vec<Participant>,
}

/// Externally visible controller state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Idle,
    Collecting {
        run_id: RunId,
        participant: Participant,
        /// Zero-based position of `participant` in the run order.
        position: usize,
        total: usize,
    },
    AwaitingTransmission { run_id: RunId },
}

/// Summary of a run, attached to transmissions as metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub schedule_id: Uuid,
    pub period: Period,
    pub started_at: DateTime<Utc>,
    pub participants: Vec<Participant>,
    pub readings: BTreeMap<Participant, Reading>,
    /// Participants whose device clock disagreed with the engine clock.
    pub clock_skew: Vec<Participant>,
    /// Log lines this run produced, in order.
    pub events: Vec<ScheduleEvent>,
    pub transmitted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Collecting,
    AwaitingTransmission,
}

#[derive(Debug, Clone)]
pub(crate) struct Run {
    pub(crate) id: RunId,
    pub(crate) schedule_id: Uuid,
    pub(crate) period: Period,
    pub(crate) participants: Vec<Participant>,
    pub(crate) cursor: usize,
    pub(crate) phase: Phase,
    pub(crate) readings: BTreeMap<Participant, Reading>,
    pub(crate) skewed: BTreeSet<Participant>,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) events: Vec<ScheduleEvent>,
}

impl Run {
    pub(crate) fn new(
        schedule_id: Uuid,
        period: Period,
        participants: Vec<Participant>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            schedule_id,
            period,
            participants,
            cursor: 0,
            phase: Phase::Collecting,
            readings: BTreeMap::new(),
            skewed: BTreeSet::new(),
            started_at,
            events: Vec::new(),
        }
    }

    pub(crate) fn current(&self) -> Option<&Participant> {
        self.participants.get(self.cursor)
    }

    pub(crate) fn includes(&self, participant: &str) -> bool {
        self.participants.iter().any(|p| p == participant)
    }

    pub(crate) fn missing(&self) -> Vec<Participant> {
        self.participants
            .iter()
            .filter(|p| !self.readings.contains_key(*p))
            .cloned()
            .collect()
    }

    pub(crate) fn status(&self) -> RunStatus {
        match (self.phase, self.current()) {
            (Phase::Collecting, Some(p)) => RunStatus::Collecting {
                run_id: self.id,
                participant: p.clone(),
                position: self.cursor,
                total: self.participants.len(),
            },
            _ => RunStatus::AwaitingTransmission { run_id: self.id },
        }
    }

    pub(crate) fn handle(&self) -> RunHandle {
        RunHandle {
            run_id: self.id,
            period: self.period,
            participants: self.participants.clone(),
        }
    }

    pub(crate) fn report(&self, transmitted_at: Option<DateTime<Utc>>) -> RunReport {
        RunReport {
            run_id: self.id,
            schedule_id: self.schedule_id,
            period: self.period,
            started_at: self.started_at,
            participants: self.participants.clone(),
            readings: self.readings.clone(),
            clock_skew: self.skewed.iter().cloned().collect(),
            events: self.events.clone(),
            transmitted_at,
        }
    }
}
