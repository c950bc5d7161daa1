//! Shared types for the cadence schedule engine.
//!
//! - [`ScheduleEvent`]: one record of the append-only schedule log
//! - [`Period`]: a half-open measurement window
//! - [`EngineConfig`]: environment-driven engine settings

pub mod config;
pub mod error;
pub mod event;
pub mod period;
pub mod telemetry;

pub use config::EngineConfig;
pub use error::*;
pub use event::*;
pub use period::*;
