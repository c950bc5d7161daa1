//! Schedule reconciliation engine.
//!
//! Ties the schedule log, the reconciler and the period execution controller
//! together behind [`ScheduleEngine`]:
//! - reconciliation on demand, on a fixed-rate timer and on log changes
//! - one measurement run at a time, driven participant by participant
//! - lapse detection that cancels a run whose window has ended
//! - notifications through pluggable sinks, banners raised once per transition
//!
//! The engine has no entry point of its own; hosts build it, call
//! [`spawn_background`] and drive runs from their UI.

mod alerts;
pub mod background;
pub mod clock;
pub mod controller;
pub mod device;
mod engine;
pub mod error;
pub mod events;

pub use background::{spawn_background, BackgroundHandle};
pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::{Direction, MeasurementOutcome, RunHandle, RunReport, RunStatus};
pub use device::{DeviceDataSource, DeviceError, Reading};
pub use engine::{EngineBuilder, ScheduleEngine};
pub use error::{EngineError, Result};
pub use events::EngineEvent;
