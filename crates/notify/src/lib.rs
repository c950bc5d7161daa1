//! User-facing notifications for the schedule engine.
//!
//! This crate provides:
//! - `NotificationSink` trait for pluggable destinations (UI banner, log, ...)
//! - `Dispatcher` that fans actions out to every sink
//! - Minijinja templates for the schedule messages
//! - `TracingSink`, which writes everything to `tracing`

pub mod dispatcher;
pub mod templating;
pub mod tracing_sink;
pub mod traits;

pub use dispatcher::Dispatcher;
pub use templating::{MessageContext, MessageKind, TemplateRenderer};
pub use tracing_sink::TracingSink;
pub use traits::{AlertKey, DispatchResult, Notification, NotificationSink, NotifyError, Outbound, Severity};
