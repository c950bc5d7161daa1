//! Notification sink trait and shared types.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// Errors that can occur while preparing or delivering a notification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
    #[error("template rendering failed: {0}")]
    Template(String),

    #[error("delivery through {sink} failed: {reason}")]
    Delivery { sink: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Persistent banner-style conditions. At most one banner per key is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKey {
    MissedReadings,
    Reconciliation,
    LogUnavailable,
}

impl AlertKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKey::MissedReadings => "missed_readings",
            AlertKey::Reconciliation => "reconciliation",
            AlertKey::LogUnavailable => "log_unavailable",
        }
    }
}

impl fmt::Display for AlertKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rendered notification ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub subject: String,
    pub body: String,
    pub severity: Severity,
    /// Extra fields such as `run_id` or `period_expiry`.
    pub metadata: BTreeMap<String, String>,
}

impl Notification {
    pub fn new(severity: Severity, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            severity,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.metadata.insert(key.into(), value.to_string());
        self
    }
}

/// Where user-facing messages go: a UI, a log, a paging system.
///
/// Sinks are fire-and-forget from the engine's point of view: failures are
/// logged by the dispatcher and never change engine state.
#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    /// One-time informational message.
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;

    /// An error the user should see, with its underlying cause.
    async fn notify_error(&self, notification: &Notification, cause: &str) -> Result<(), NotifyError> {
        let with_cause = notification.clone().with_meta("cause", cause);
        self.notify(&with_cause).await
    }

    /// Show a persistent banner for `key`. Sinks without banners just notify.
    async fn raise_alert(&self, _key: AlertKey, notification: &Notification) -> Result<(), NotifyError> {
        self.notify(notification).await
    }

    /// Remove the banner for `key`, if the sink shows one.
    async fn clear_alert(&self, _key: AlertKey) -> Result<(), NotifyError> {
        Ok(())
    }

    /// Name used in logs (e.g. "tracing", "ui").
    fn sink_name(&self) -> &str;
}

/// One outbound action, collected while engine state is locked and
/// dispatched after the lock is released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Notify(Notification),
    Error { notification: Notification, cause: String },
    RaiseAlert { key: AlertKey, notification: Notification },
    ClearAlert(AlertKey),
}

impl Outbound {
    pub fn label(&self) -> &'static str {
        match self {
            Outbound::Notify(_) => "notify",
            Outbound::Error { .. } => "error",
            Outbound::RaiseAlert { .. } => "raise_alert",
            Outbound::ClearAlert(_) => "clear_alert",
        }
    }
}

/// Result of dispatching one action to a single sink.
#[derive(Debug)]
pub struct DispatchResult {
    pub sink: String,
    pub action: &'static str,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}
