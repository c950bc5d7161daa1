//! Minijinja rendering of user-facing schedule messages.
//!
//! Every [`MessageKind`] has a built-in subject and body template. Hosts can
//! override either with their own wording; overrides are validated when set.
//! Templates are plain strings, so a fresh [`minijinja::Environment`] is
//! created per render call.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use minijinja::Value;
use serde::Serialize;

use crate::traits::{Notification, NotifyError, Severity};

/// Messages the engine knows how to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// A run was cancelled because its window ended first.
    PeriodLapsed,
    /// Earlier windows ended without a transmission.
    MissedReadings,
    /// The only schedule starts later.
    FutureSchedule,
    /// The log holds no schedule at all.
    NoSchedule,
    /// The log could not be read or reconciled.
    ReconcileFailed,
    /// The log file stayed unreachable across several checks.
    LogUnavailable,
}

impl MessageKind {
    pub fn severity(&self) -> Severity {
        match self {
            MessageKind::FutureSchedule => Severity::Info,
            MessageKind::PeriodLapsed | MessageKind::MissedReadings => Severity::Warning,
            MessageKind::NoSchedule | MessageKind::ReconcileFailed | MessageKind::LogUnavailable => {
                Severity::Error
            }
        }
    }

    fn default_templates(&self) -> (&'static str, &'static str) {
        match self {
            MessageKind::PeriodLapsed => (
                "Measurement period lapsed",
                "The measurement period ending {{ period_expiry | datetime }} closed before the readings \
                 were sent. Readings taken in that period were discarded.",
            ),
            MessageKind::MissedReadings => (
                "Missed readings",
                "{{ missed_count | plural('scheduled reading') }} missed. Readings are due {{ repeat }}\
                 {% if next_due %}; next due {{ next_due | datetime }}{% endif %}.",
            ),
            MessageKind::FutureSchedule => (
                "Schedule not started",
                "Readings are scheduled {{ repeat }} starting {{ period_start | datetime }}.",
            ),
            MessageKind::NoSchedule => (
                "No schedule configured",
                "No measurement schedule has been set up yet.",
            ),
            MessageKind::ReconcileFailed => (
                "Schedule unavailable",
                "The measurement schedule could not be read: {{ reason }}",
            ),
            MessageKind::LogUnavailable => (
                "Schedule file unavailable",
                "{{ path }} could not be read after {{ failures }} attempts: {{ reason }}",
            ),
        }
    }
}

/// Values available to message templates. Unset fields are undefined in
/// templates and render as empty.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MessageContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period_start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period_expiry: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_due: Option<String>,
    pub missed_count: u64,
    /// Human description of the repeat interval, e.g. "every 2 hours".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repeat: Option<String>,
    pub participants: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failures: Option<u32>,
}

impl MessageContext {
    pub fn at(instant: DateTime<Utc>) -> String {
        instant.to_rfc3339()
    }
}

#[derive(Debug, Default, Clone)]
pub struct TemplateRenderer {
    overrides: HashMap<MessageKind, (String, String)>,
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    fn build_env() -> minijinja::Environment<'static> {
        let mut env = minijinja::Environment::new();
        env.add_filter("datetime", datetime_filter);
        env.add_filter("plural", plural_filter);
        env
    }

    /// Replace the wording for one message kind.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Template`] if either template has syntax errors.
    pub fn set_override(
        &mut self,
        kind: MessageKind,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Result<(), NotifyError> {
        let (subject, body) = (subject.into(), body.into());
        self.validate(&subject)?;
        self.validate(&body)?;
        self.overrides.insert(kind, (subject, body));
        Ok(())
    }

    /// Render the notification for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Template`] if rendering fails.
    pub fn render(&self, kind: MessageKind, ctx: &MessageContext) -> Result<Notification, NotifyError> {
        let (subject_tpl, body_tpl) = match self.overrides.get(&kind) {
            Some((s, b)) => (s.as_str(), b.as_str()),
            None => kind.default_templates(),
        };
        let mut notification = Notification::new(
            kind.severity(),
            self.render_str(subject_tpl, ctx)?,
            self.render_str(body_tpl, ctx)?,
        );
        if let Some(run_id) = &ctx.run_id {
            notification = notification.with_meta("run_id", run_id);
        }
        if let Some(expiry) = &ctx.period_expiry {
            notification = notification.with_meta("period_expiry", expiry);
        }
        Ok(notification)
    }

    /// Render `kind`, falling back to its plain subject if the template breaks.
    pub fn render_or_fallback(&self, kind: MessageKind, ctx: &MessageContext) -> Notification {
        match self.render(kind, ctx) {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(?kind, error = %e, "Message template failed, using fallback text");
                let (subject, _) = kind.default_templates();
                Notification::new(kind.severity(), subject, subject)
            }
        }
    }

    pub fn render_str(&self, template_str: &str, ctx: &MessageContext) -> Result<String, NotifyError> {
        let env = Self::build_env();
        env.render_str(template_str, ctx)
            .map_err(|e| NotifyError::Template(e.to_string()))
    }

    /// Check syntax only; nothing is evaluated.
    pub fn validate(&self, template_str: &str) -> Result<(), NotifyError> {
        let env = Self::build_env();
        env.template_from_str(template_str)
            .map_err(|e| NotifyError::Template(e.to_string()))?;
        Ok(())
    }
}

/// `"2024-03-04T09:00:00+00:00" | datetime` → `"2024-03-04 09:00 UTC"`.
/// Anything unparseable passes through unchanged.
fn datetime_filter(value: Value) -> String {
    let Some(text) = value.as_str() else {
        return if value.is_undefined() || value.is_none() {
            String::new()
        } else {
            value.to_string()
        };
    };
    match DateTime::parse_from_rfc3339(text) {
        Ok(t) => t.with_timezone(&Utc).format("%Y-%m-%d %H:%M UTC").to_string(),
        Err(_) => text.to_string(),
    }
}

fn plural_filter(count: u64, noun: String) -> String {
    if count == 1 {
        format!("1 {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn ctx() -> MessageContext {
        let start = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
        MessageContext {
            run_id: Some("run-1".to_string()),
            period_start: Some(MessageContext::at(start)),
            period_expiry: Some(MessageContext::at(start + chrono::Duration::hours(1))),
            next_due: Some(MessageContext::at(start)),
            missed_count: 3,
            repeat: Some("every hour".to_string()),
            participants: vec!["Scale".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn lapse_message_names_the_expiry() {
        let n = TemplateRenderer::new().render(MessageKind::PeriodLapsed, &ctx()).unwrap();
        assert_eq!(n.subject, "Measurement period lapsed");
        assert!(n.body.contains("2024-03-04 10:00 UTC"), "{}", n.body);
        assert_eq!(n.severity, Severity::Warning);
        assert_eq!(n.metadata.get("run_id").map(String::as_str), Some("run-1"));
    }

    #[test]
    fn missed_message_pluralizes() {
        let renderer = TemplateRenderer::new();
        let n = renderer.render(MessageKind::MissedReadings, &ctx()).unwrap();
        assert!(n.body.starts_with("3 scheduled readings missed"), "{}", n.body);
        assert!(n.body.contains("every hour"));

        let one = MessageContext { missed_count: 1, next_due: None, ..ctx() };
        let n = renderer.render(MessageKind::MissedReadings, &one).unwrap();
        assert_eq!(n.body, "1 scheduled reading missed. Readings are due every hour.");
    }

    #[test]
    fn unparseable_datetime_passes_through() {
        assert_eq!(datetime_filter(Value::from("soon")), "soon");
        assert_eq!(datetime_filter(Value::UNDEFINED), "");
    }

    #[test]
    fn override_replaces_default_wording() {
        let mut renderer = TemplateRenderer::new();
        renderer
            .set_override(MessageKind::NoSchedule, "Setup needed", "Ask your care team for a schedule.")
            .unwrap();
        let n = renderer.render(MessageKind::NoSchedule, &MessageContext::default()).unwrap();
        assert_eq!(n.subject, "Setup needed");
        assert_eq!(n.severity, Severity::Error);
    }

    #[test]
    fn invalid_override_is_rejected() {
        let mut renderer = TemplateRenderer::new();
        let err = renderer
            .set_override(MessageKind::NoSchedule, "{{ unclosed", "body")
            .unwrap_err();
        assert!(matches!(err, NotifyError::Template(msg) if !msg.is_empty()));
        let n = renderer.render(MessageKind::NoSchedule, &MessageContext::default()).unwrap();
        assert_eq!(n.subject, "No schedule configured");
    }

    #[test]
    fn all_default_templates_render_with_empty_context() {
        let renderer = TemplateRenderer::new();
        for kind in [
            MessageKind::PeriodLapsed,
            MessageKind::MissedReadings,
            MessageKind::FutureSchedule,
            MessageKind::NoSchedule,
            MessageKind::ReconcileFailed,
            MessageKind::LogUnavailable,
        ] {
            assert!(renderer.render(kind, &MessageContext::default()).is_ok(), "{kind:?}");
        }
    }
}
