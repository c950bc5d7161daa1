//! Device data source seam.
//!
//! Hardware I/O lives behind [`DeviceDataSource`]; the engine only awaits the
//! returned future and never holds its own locks while doing so.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cadence_core::Participant;

/// One reading as produced by a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// The device's own clock, which may disagree with the engine clock.
    pub timestamp: DateTime<Utc>,
    pub value: serde_json::Value,
}

impl Reading {
    pub fn new(timestamp: DateTime<Utc>, value: serde_json::Value) -> Self {
        Self { timestamp, value }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    #[error("device for {0:?} is not connected")]
    Disconnected(Participant),

    #[error("device for {participant:?} failed: {reason}")]
    Failed { participant: Participant, reason: String },
}

/// Produces readings for participant tokens (device names in a schedule).
#[async_trait::async_trait]
pub trait DeviceDataSource: Send + Sync {
    /// Take a reading from the participant's device.
    async fn produce_reading(&self, participant: &str) -> Result<Reading, DeviceError>;

    /// Whether a device exists for this token.
    fn knows(&self, participant: &str) -> bool;

    /// Drop any data the device still holds from an earlier run.
    fn reset(&self, _participant: &str) {}
}
