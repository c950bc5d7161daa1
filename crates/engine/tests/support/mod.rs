//! Shared fakes for engine integration tests.

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;

use cadence_core::EngineConfig;
use cadence_engine::{Clock, DeviceDataSource, DeviceError, ManualClock, Reading, ScheduleEngine};
use cadence_eventlog::EventLog;
use cadence_notify::{AlertKey, Notification, NotificationSink, NotifyError};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 2, 8, 0, 0).unwrap()
}

/// Devices that answer with a fixed value; some can be told to fail.
pub struct FakeDevices {
    clock: Arc<ManualClock>,
    known: BTreeSet<String>,
    failing: Mutex<BTreeSet<String>>,
    pub resets: Mutex<Vec<String>>,
}

impl FakeDevices {
    pub fn new(clock: Arc<ManualClock>, known: &[&str]) -> Self {
        Self {
            clock,
            known: known.iter().map(|s| s.to_string()).collect(),
            failing: Mutex::new(BTreeSet::new()),
            resets: Mutex::new(Vec::new()),
        }
    }

    pub fn fail(&self, participant: &str) {
        self.failing.lock().unwrap().insert(participant.to_string());
    }

    pub fn reset_count(&self) -> usize {
        self.resets.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl DeviceDataSource for FakeDevices {
    async fn produce_reading(&self, participant: &str) -> Result<Reading, DeviceError> {
        if self.failing.lock().unwrap().contains(participant) {
            return Err(DeviceError::Failed {
                participant: participant.to_string(),
                reason: "sensor disconnected".to_string(),
            });
        }
        Ok(Reading::new(self.clock.now(), json!({ "device": participant, "value": 42 })))
    }

    fn knows(&self, participant: &str) -> bool {
        self.known.contains(participant)
    }

    fn reset(&self, participant: &str) {
        self.resets.lock().unwrap().push(participant.to_string());
    }
}

/// Counts every sink call separately.
#[derive(Default)]
pub struct RecordingSink {
    pub notified: AtomicUsize,
    pub errors: AtomicUsize,
    pub messages: Mutex<Vec<Notification>>,
    pub raised: Mutex<Vec<AlertKey>>,
    pub cleared: Mutex<Vec<AlertKey>>,
}

impl RecordingSink {
    pub fn notify_count(&self) -> usize {
        self.notified.load(Ordering::SeqCst)
    }

    pub fn raised(&self) -> Vec<AlertKey> {
        self.raised.lock().unwrap().clone()
    }

    pub fn cleared(&self) -> Vec<AlertKey> {
        self.cleared.lock().unwrap().clone()
    }

    pub fn subjects(&self) -> Vec<String> {
        self.messages.lock().unwrap().iter().map(|n| n.subject.clone()).collect()
    }
}

#[async_trait::async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.notified.fetch_add(1, Ordering::SeqCst);
        self.messages.lock().unwrap().push(notification.clone());
        Ok(())
    }

    async fn notify_error(&self, _notification: &Notification, _cause: &str) -> Result<(), NotifyError> {
        self.errors.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn raise_alert(&self, key: AlertKey, _notification: &Notification) -> Result<(), NotifyError> {
        self.raised.lock().unwrap().push(key);
        Ok(())
    }

    async fn clear_alert(&self, key: AlertKey) -> Result<(), NotifyError> {
        self.cleared.lock().unwrap().push(key);
        Ok(())
    }

    fn sink_name(&self) -> &str {
        "recording"
    }
}

pub struct Harness {
    pub engine: Arc<ScheduleEngine>,
    pub clock: Arc<ManualClock>,
    pub devices: Arc<FakeDevices>,
    pub sink: Arc<RecordingSink>,
}

pub fn harness(log: Arc<dyn EventLog>, start: DateTime<Utc>, config: EngineConfig) -> Harness {
    cadence_core::telemetry::init_tracing("warn");
    let clock = Arc::new(ManualClock::new(start));
    let devices = Arc::new(FakeDevices::new(clock.clone(), &["Scale", "Oximeter", "Thermometer"]));
    let sink = Arc::new(RecordingSink::default());
    let engine = ScheduleEngine::builder(log, devices.clone())
        .config(config)
        .clock(clock.clone())
        .sink(sink.clone())
        .build();
    Harness {
        engine: Arc::new(engine),
        clock,
        devices,
        sink,
    }
}

pub fn kinds_in(log: &dyn EventLog) -> HashMap<&'static str, usize> {
    let mut counts = HashMap::new();
    for event in log.load().unwrap() {
        let key = match event.kind {
            cadence_core::EventKind::Scheduled => "scheduled",
            cadence_core::EventKind::Started => "started",
            cadence_core::EventKind::Measured => "measured",
            cadence_core::EventKind::Transmitted => "transmitted",
        };
        *counts.entry(key).or_insert(0) += 1;
    }
    counts
}
