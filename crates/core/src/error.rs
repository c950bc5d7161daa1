use thiserror::Error;
use uuid::Uuid;

use crate::event::EventKind;

/// A schedule event that breaks one of the record invariants.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    #[error("scheduled event {id} has a non-positive repeat period ({repeat} minutes)")]
    NonPositiveRepeat { id: Uuid, repeat: i64 },

    #[error("scheduled event {id} has a repeat period of {repeat} minutes, beyond the representable time range")]
    RepeatOutOfRange { id: Uuid, repeat: i64 },

    #[error("{kind} event {id} lists no participants")]
    NoParticipants { id: Uuid, kind: EventKind },

    #[error("measured event {id} must name exactly one participant, found {count}")]
    MeasuredArity { id: Uuid, count: usize },

    #[error("{kind} event {id} has an empty participant token")]
    BlankParticipant { id: Uuid, kind: EventKind },
}
