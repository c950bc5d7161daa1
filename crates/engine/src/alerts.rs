//! Banner bookkeeping: one raise per transition, one clear per resolution.

use std::collections::BTreeMap;

use cadence_notify::{AlertKey, Notification, Outbound};

#[derive(Debug, Default)]
pub(crate) struct AlertTracker {
    active: BTreeMap<AlertKey, Notification>,
}

impl AlertTracker {
    /// `Some` when the banner is new or its text changed.
    pub(crate) fn raise(&mut self, key: AlertKey, notification: Notification) -> Option<Outbound> {
        if self.active.get(&key) == Some(&notification) {
            return None;
        }
        self.active.insert(key, notification.clone());
        Some(Outbound::RaiseAlert { key, notification })
    }

    /// `Some` only if the banner was showing.
    pub(crate) fn clear(&mut self, key: AlertKey) -> Option<Outbound> {
        self.active.remove(&key).map(|_| Outbound::ClearAlert(key))
    }

    #[cfg(test)]
    fn is_active(&self, key: AlertKey) -> bool {
        self.active.contains_key(&key)
    }
}

#[cfg(test)]
mod tests {
    use cadence_notify::Severity;

    use super::*;

    fn banner(body: &str) -> Notification {
        Notification::new(Severity::Warning, "Missed readings", body)
    }

    #[test]
    fn repeated_raise_is_suppressed() {
        let mut alerts = AlertTracker::default();
        assert!(alerts.raise(AlertKey::MissedReadings, banner("2 missed")).is_some());
        assert!(alerts.raise(AlertKey::MissedReadings, banner("2 missed")).is_none());
        assert!(alerts.raise(AlertKey::MissedReadings, banner("3 missed")).is_some());
        assert!(alerts.is_active(AlertKey::MissedReadings));
    }

    #[test]
    fn clear_only_when_showing() {
        let mut alerts = AlertTracker::default();
        assert!(alerts.clear(AlertKey::LogUnavailable).is_none());
        alerts.raise(AlertKey::LogUnavailable, banner("gone"));
        assert_eq!(
            alerts.clear(AlertKey::LogUnavailable),
            Some(Outbound::ClearAlert(AlertKey::LogUnavailable))
        );
        assert!(!alerts.is_active(AlertKey::LogUnavailable));
    }
}
