//! Sink that writes notifications to the `tracing` subscriber.

use crate::traits::{AlertKey, Notification, NotificationSink, NotifyError, Severity};

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait::async_trait]
impl NotificationSink for TracingSink {
    async fn notify(&self, n: &Notification) -> Result<(), NotifyError> {
        match n.severity {
            Severity::Info => tracing::info!(subject = %n.subject, meta = ?n.metadata, "{}", n.body),
            Severity::Warning => tracing::warn!(subject = %n.subject, meta = ?n.metadata, "{}", n.body),
            Severity::Error => tracing::error!(subject = %n.subject, meta = ?n.metadata, "{}", n.body),
        }
        Ok(())
    }

    async fn notify_error(&self, n: &Notification, cause: &str) -> Result<(), NotifyError> {
        tracing::error!(subject = %n.subject, cause, meta = ?n.metadata, "{}", n.body);
        Ok(())
    }

    async fn raise_alert(&self, key: AlertKey, n: &Notification) -> Result<(), NotifyError> {
        tracing::warn!(alert = %key, subject = %n.subject, "{}", n.body);
        Ok(())
    }

    async fn clear_alert(&self, key: AlertKey) -> Result<(), NotifyError> {
        tracing::info!(alert = %key, "alert cleared");
        Ok(())
    }

    fn sink_name(&self) -> &str {
        "tracing"
    }
}
