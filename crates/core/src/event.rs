use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::EventError;

/// Identifier shared by every event of one run (and by a `Scheduled` event itself).
pub type RunId = Uuid;

/// Stable token naming one schedulable device or task.
pub type Participant = String;

/// Kind of a schedule log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// A schedule definition: start time, repeat period and participants.
    Scheduled,
    /// A run was started against the active period.
    Started,
    /// One participant produced a reading during a run.
    Measured,
    /// Collected readings were transmitted.
    Transmitted,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Scheduled => write!(f, "SCHEDULED"),
            EventKind::Started => write!(f, "STARTED"),
            EventKind::Measured => write!(f, "MEASURED"),
            EventKind::Transmitted => write!(f, "TRANSMITTED"),
        }
    }
}

/// One immutable record of the schedule log.
///
/// The on-disk field names (`id`, `eventType`, `time`, `repeat`, `deviceSched`)
/// are part of the persisted format. Older logs that name the id `uuid` or
/// store `time` as epoch seconds are still accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEvent {
    #[serde(alias = "uuid")]
    pub id: RunId,
    #[serde(rename = "eventType")]
    pub kind: EventKind,
    #[serde(deserialize_with = "deserialize_instant")]
    pub time: DateTime<Utc>,
    /// Repeat period in minutes. Only meaningful on `Scheduled` events.
    #[serde(rename = "repeat", default)]
    pub repeat_minutes: i64,
    #[serde(rename = "deviceSched", default)]
    pub participants: Vec<Participant>,
}

impl ScheduleEvent {
    /// A new schedule definition with a fresh id.
    pub fn scheduled(time: DateTime<Utc>, repeat_minutes: i64, participants: Vec<Participant>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: EventKind::Scheduled,
            time,
            repeat_minutes,
            participants,
        }
    }

    pub fn started(run_id: RunId, time: DateTime<Utc>, participants: Vec<Participant>) -> Self {
        Self {
            id: run_id,
            kind: EventKind::Started,
            time,
            repeat_minutes: 0,
            participants,
        }
    }

    pub fn measured(run_id: RunId, time: DateTime<Utc>, participant: Participant) -> Self {
        Self {
            id: run_id,
            kind: EventKind::Measured,
            time,
            repeat_minutes: 0,
            participants: vec![participant],
        }
    }

    pub fn transmitted(run_id: RunId, time: DateTime<Utc>, participants: Vec<Participant>) -> Self {
        Self {
            id: run_id,
            kind: EventKind::Transmitted,
            time,
            repeat_minutes: 0,
            participants,
        }
    }

    /// Epoch timestamps mark something that never happened.
    pub fn is_sentinel(&self) -> bool {
        self.time == DateTime::<Utc>::UNIX_EPOCH
    }

    /// End of the first window of a schedule, if it is representable.
    fn first_expiry(&self) -> Option<DateTime<Utc>> {
        Duration::try_minutes(self.repeat_minutes).and_then(|d| self.time.checked_add_signed(d))
    }

    /// Check the per-kind record invariants.
    pub fn validate(&self) -> Result<(), EventError> {
        if self.kind == EventKind::Scheduled && self.repeat_minutes <= 0 {
            return Err(EventError::NonPositiveRepeat {
                id: self.id,
                repeat: self.repeat_minutes,
            });
        }
        if self.kind == EventKind::Scheduled && self.first_expiry().is_none() {
            return Err(EventError::RepeatOutOfRange {
                id: self.id,
                repeat: self.repeat_minutes,
            });
        }

        if self.participants.iter().any(|p| p.trim().is_empty()) {
            return Err(EventError::BlankParticipant {
                id: self.id,
                kind: self.kind,
            });
        }

        match self.kind {
            EventKind::Measured if self.participants.len() != 1 => Err(EventError::MeasuredArity {
                id: self.id,
                count: self.participants.len(),
            }),
            EventKind::Scheduled | EventKind::Started | EventKind::Transmitted
                if self.participants.is_empty() =>
            {
                Err(EventError::NoParticipants {
                    id: self.id,
                    kind: self.kind,
                })
            }
            _ => Ok(()),
        }
    }
}

/// Accepts an RFC 3339 string or a (possibly fractional) count of epoch seconds.
fn deserialize_instant<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawInstant {
        Text(String),
        Seconds(f64),
    }

    match RawInstant::deserialize(deserializer)? {
        RawInstant::Text(s) => DateTime::parse_from_rfc3339(&s)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| serde::de::Error::custom(format!("invalid instant '{s}': {e}"))),
        RawInstant::Seconds(secs) => {
            if !secs.is_finite() {
                return Err(serde::de::Error::custom("instant must be a finite number of seconds"));
            }
            let whole = secs.floor();
            let nanos = ((secs - whole) * 1_000_000_000.0).round().min(999_999_999.0) as u32;
            Utc.timestamp_opt(whole as i64, nanos)
                .single()
                .ok_or_else(|| serde::de::Error::custom(format!("instant out of range: {secs}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_iso_and_epoch_seconds() {
        let json = r#"[
            {"id":"7d3c4c52-96c5-4b8a-9f5e-0f3f4d1b2a10","eventType":"SCHEDULED","time":"2016-10-11T08:00:00Z","repeat":1440,"deviceSched":["Scale","Oximeter"]},
            {"uuid":"7d3c4c52-96c5-4b8a-9f5e-0f3f4d1b2a11","eventType":"TRANSMITTED","time":1476176400.5,"repeat":0,"deviceSched":["Scale"]}
        ]"#;
        let events: Vec<ScheduleEvent> = serde_json::from_str(json).unwrap();

        assert_eq!(events[0].kind, EventKind::Scheduled);
        assert_eq!(events[0].repeat_minutes, 1440);
        assert_eq!(events[0].participants, vec!["Scale", "Oximeter"]);
        assert_eq!(events[1].kind, EventKind::Transmitted);
        assert_eq!(events[1].time.timestamp(), 1_476_176_400);
        assert_eq!(events[1].time.timestamp_subsec_millis(), 500);
    }

    #[test]
    fn writes_iso_instants_and_log_field_names() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        let event = ScheduleEvent::measured(Uuid::nil(), t, "Scale".to_string());
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["eventType"], "MEASURED");
        assert_eq!(value["time"], "2024-03-01T09:30:00Z");
        assert_eq!(value["repeat"], 0);
        assert_eq!(value["deviceSched"][0], "Scale");
        assert!(value.get("id").is_some());
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        let json = r#"{"id":"7d3c4c52-96c5-4b8a-9f5e-0f3f4d1b2a10","eventType":"PAUSED","time":"2016-10-11T08:00:00Z","repeat":0,"deviceSched":["Scale"]}"#;
        assert!(serde_json::from_str::<ScheduleEvent>(json).is_err());
    }

    #[test]
    fn validate_rejects_bad_records() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let bad_repeat = ScheduleEvent::scheduled(t, 0, vec!["Scale".into()]);
        assert!(matches!(bad_repeat.validate(), Err(EventError::NonPositiveRepeat { repeat: 0, .. })));

        let no_devices = ScheduleEvent::started(Uuid::new_v4(), t, vec![]);
        assert!(matches!(no_devices.validate(), Err(EventError::NoParticipants { .. })));

        let mut two = ScheduleEvent::measured(Uuid::new_v4(), t, "Scale".into());
        two.participants.push("Oximeter".into());
        assert!(matches!(two.validate(), Err(EventError::MeasuredArity { count: 2, .. })));

        let huge = ScheduleEvent::scheduled(t, 10_000_000_000_000, vec!["Scale".into()]);
        assert!(matches!(huge.validate(), Err(EventError::RepeatOutOfRange { .. })));

        let max = ScheduleEvent::scheduled(t, i64::MAX, vec!["Scale".into()]);
        assert!(matches!(max.validate(), Err(EventError::RepeatOutOfRange { .. })));

        let ok = ScheduleEvent::scheduled(t, 60, vec!["Scale".into()]);
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn epoch_is_sentinel() {
        let e = ScheduleEvent::transmitted(Uuid::new_v4(), DateTime::<Utc>::UNIX_EPOCH, vec!["Scale".into()]);
        assert!(e.is_sentinel());
    }
}
