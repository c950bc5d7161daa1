use std::path::Path;

use cadence_core::ScheduleEvent;

use crate::error::{EventLogError, Result};

/// Append-only store of schedule events.
///
/// Implementations must make `append` atomic: after an error the caller may
/// assume the log is unchanged, and a concurrent `load` never observes a
/// partially written log.
pub trait EventLog: Send + Sync {
    /// Read the whole history in insertion order.
    fn load(&self) -> Result<Vec<ScheduleEvent>>;

    /// Persist `events` after everything already stored, preserving their order.
    fn append(&self, events: &[ScheduleEvent]) -> Result<()>;

    /// Filesystem location backing this log, if any.
    fn location(&self) -> Option<&Path> {
        None
    }
}

/// Parse and validate a serialized history.
///
/// An empty array is a valid (empty) history. Epoch-timestamped sentinels are
/// kept but not validated.
pub fn parse_events(contents: &str) -> Result<Vec<ScheduleEvent>> {
    let events: Vec<ScheduleEvent> = serde_json::from_str(contents)
        .map_err(|e| EventLogError::corrupt(format!("not a list of schedule events: {e}")))?;

    for (index, event) in events.iter().enumerate().filter(|(_, e)| !e.is_sentinel()) {
        event
            .validate()
            .map_err(|e| EventLogError::corrupt(format!("entry {index}: {e}")))?;
    }

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_array_is_valid() {
        assert!(parse_events("[]").unwrap().is_empty());
    }

    #[test]
    fn garbage_is_corrupt() {
        assert!(matches!(parse_events("{not json"), Err(EventLogError::LogCorrupt { .. })));
        assert!(matches!(parse_events(""), Err(EventLogError::LogCorrupt { .. })));
        assert!(matches!(parse_events(r#"{"id":1}"#), Err(EventLogError::LogCorrupt { .. })));
    }

    #[test]
    fn sentinel_records_are_not_validated() {
        let json = r#"[
            {"id":"7d3c4c52-96c5-4b8a-9f5e-0f3f4d1b2a10","eventType":"SCHEDULED","time":0,"repeat":0,"deviceSched":[]}
        ]"#;
        let events = parse_events(json).unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].is_sentinel());
    }

    #[test]
    fn oversized_repeat_is_corrupt() {
        let json = r#"[
            {"id":"7d3c4c52-96c5-4b8a-9f5e-0f3f4d1b2a10","eventType":"SCHEDULED","time":"2024-01-01T00:00:00Z","repeat":10000000000000,"deviceSched":["Scale"]}
        ]"#;
        let err = parse_events(json).unwrap_err();
        assert!(matches!(err, EventLogError::LogCorrupt { .. }));
        assert!(err.to_string().contains("representable"));
    }

    #[test]
    fn invalid_record_names_its_position() {
        let json = r#"[
            {"id":"7d3c4c52-96c5-4b8a-9f5e-0f3f4d1b2a10","eventType":"SCHEDULED","time":"2024-01-01T00:00:00Z","repeat":60,"deviceSched":["Scale"]},
            {"id":"7d3c4c52-96c5-4b8a-9f5e-0f3f4d1b2a11","eventType":"SCHEDULED","time":"2024-01-02T00:00:00Z","repeat":-5,"deviceSched":["Scale"]}
        ]"#;
        match parse_events(json) {
            Err(EventLogError::LogCorrupt { reason }) => assert!(reason.starts_with("entry 1:"), "{reason}"),
            other => panic!("expected LogCorrupt, got {other:?}"),
        }
    }
}
