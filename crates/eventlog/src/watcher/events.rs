//! Filtering of raw `notify` events down to ones that touch the schedule log.

use std::ffi::OsStr;

use notify::{Event, EventKind};

/// Whether `event` creates, modifies, renames onto, or removes the log file.
///
/// Events on the temporary dotfile used for atomic writes are ignored; the
/// rename that publishes it carries the log's own name.
pub(super) fn is_log_event(event: &Event, file_name: &OsStr) -> bool {
    let relevant_kind = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) | EventKind::Any
    );
    relevant_kind
        && event
            .paths
            .iter()
            .any(|p| p.file_name().map(|n| n == file_name).unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use notify::event::{AccessKind, CreateKind, ModifyKind, RenameMode};

    use super::*;

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut e = Event::new(kind);
        for p in paths {
            e = e.add_path(PathBuf::from(p));
        }
        e
    }

    #[test]
    fn rename_onto_log_counts() {
        let e = event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/data/.schedule.json.tmp", "/data/schedule.json"],
        );
        assert!(is_log_event(&e, OsStr::new("schedule.json")));
    }

    #[test]
    fn temp_file_and_siblings_are_ignored() {
        let tmp = event(EventKind::Create(CreateKind::File), &["/data/.schedule.json.tmp"]);
        let other = event(EventKind::Modify(ModifyKind::Any), &["/data/messages.json"]);
        assert!(!is_log_event(&tmp, OsStr::new("schedule.json")));
        assert!(!is_log_event(&other, OsStr::new("schedule.json")));
    }

    #[test]
    fn reads_are_ignored() {
        let read = event(EventKind::Access(AccessKind::Any), &["/data/schedule.json"]);
        assert!(!is_log_event(&read, OsStr::new("schedule.json")));
    }
}
