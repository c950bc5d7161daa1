//! The engine facade wiring log, reconciler, controller, devices and sinks.

use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use cadence_core::config::load_dotenv;
use cadence_core::{describe_repeat, EngineConfig, Participant, Period, RunId, ScheduleEvent};
use cadence_eventlog::{EventLog, JsonFileLog};
use cadence_notify::{
    AlertKey, Dispatcher, MessageContext, MessageKind, NotificationSink, Outbound, TemplateRenderer,
    TracingSink,
};
use cadence_schedule::{ReconcileError, Reconciler, Reconciliation};

use crate::alerts::AlertTracker;
use crate::clock::{Clock, SystemClock};
use crate::controller::{
    Completion, Direction, LapsedRun, MeasurementOutcome, PeriodController, RunHandle, RunReport,
    RunStatus,
};
use crate::device::{DeviceDataSource, Reading};
use crate::error::{EngineError, Result};
use crate::events::EngineEvent;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// State owned by the reconciliation critical section.
#[derive(Default)]
struct ReconcileState {
    alerts: AlertTracker,
    last_period: Option<(Uuid, Period)>,
    announced_future: Option<Uuid>,
}

pub struct EngineBuilder {
    log: Arc<dyn EventLog>,
    devices: Arc<dyn DeviceDataSource>,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    sinks: Vec<Arc<dyn NotificationSink>>,
    renderer: TemplateRenderer,
}

impl EngineBuilder {
    pub fn new(log: Arc<dyn EventLog>, devices: Arc<dyn DeviceDataSource>) -> Self {
        Self {
            log,
            devices,
            config: EngineConfig::default(),
            clock: Arc::new(SystemClock),
            sinks: Vec::new(),
            renderer: TemplateRenderer::new(),
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn renderer(mut self, renderer: TemplateRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn build(self) -> ScheduleEngine {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        ScheduleEngine {
            reconciler: Reconciler::from_config(&self.config),
            controller: PeriodController::new(
                Arc::clone(&self.log),
                self.config.record_run_events,
                self.config.max_clock_skew(),
            ),
            config: self.config,
            log: self.log,
            devices: self.devices,
            clock: self.clock,
            dispatcher: Dispatcher::new(self.sinks),
            renderer: self.renderer,
            gate: Mutex::new(ReconcileState::default()),
            latest: RwLock::new(None),
            events,
        }
    }
}

/// Schedule reconciliation engine.
///
/// Reconciliations are serialized behind one async mutex; run transitions are
/// serialized inside the [`PeriodController`]. Notifications are dispatched
/// only after controller state has been updated.
pub struct ScheduleEngine {
    config: EngineConfig,
    log: Arc<dyn EventLog>,
    reconciler: Reconciler,
    controller: PeriodController,
    devices: Arc<dyn DeviceDataSource>,
    clock: Arc<dyn Clock>,
    dispatcher: Dispatcher,
    renderer: TemplateRenderer,
    gate: Mutex<ReconcileState>,
    latest: RwLock<Option<Reconciliation>>,
    events: broadcast::Sender<EngineEvent>,
}

impl ScheduleEngine {
    pub fn builder(log: Arc<dyn EventLog>, devices: Arc<dyn DeviceDataSource>) -> EngineBuilder {
        EngineBuilder::new(log, devices)
    }

    /// Engine over the JSON log at `config.log_path`, reporting to `tracing`.
    pub fn open(config: EngineConfig, devices: Arc<dyn DeviceDataSource>) -> Self {
        config.log_summary();
        let log = Arc::new(JsonFileLog::new(config.log_path.clone()));
        EngineBuilder::new(log, devices)
            .config(config)
            .sink(Arc::new(TracingSink))
            .build()
    }

    /// [`ScheduleEngine::open`] with settings from `.env` and the environment.
    pub fn from_env(devices: Arc<dyn DeviceDataSource>) -> Self {
        load_dotenv();
        Self::open(EngineConfig::from_env(), devices)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn log_location(&self) -> Option<&Path> {
        self.log.location()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Result of the last successful reconciliation, if the last one succeeded.
    pub fn latest(&self) -> Option<Reconciliation> {
        self.latest.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn status(&self) -> RunStatus {
        self.controller.status()
    }

    pub fn run_report(&self) -> Option<RunReport> {
        self.controller.report()
    }

    pub fn missing_participants(&self) -> Result<Vec<Participant>> {
        self.controller.missing_participants()
    }

    /// Reconcile the current log at `now` without publishing anything.
    pub fn get_reconciliation(&self, now: DateTime<Utc>) -> Result<Reconciliation> {
        let history = self.log.load()?;
        Ok(self.reconciler.reconcile(&history, now)?)
    }

    /// Reconcile at the clock's `now`, update alerts and publish the result.
    pub async fn refresh(&self) -> Result<Reconciliation> {
        let mut gate = self.gate.lock().await;
        let now = self.clock.now();
        let outcome = self.get_reconciliation(now);

        let mut outbound = Vec::new();
        match &outcome {
            Ok(current) => self.on_reconciled(&mut gate, current, now, &mut outbound),
            Err(e) => self.on_reconcile_failed(&mut gate, e, &mut outbound),
        }
        // Dispatched inside the critical section so banners arrive in order.
        self.dispatcher.dispatch_all(outbound).await;
        outcome
    }

    /// One background timer step: enforce lapse, then reconcile.
    pub async fn tick(&self) {
        self.enforce_lapse().await;
        if let Err(e) = self.refresh().await {
            debug!(error = %e, "timer reconciliation failed");
        }
    }

    pub async fn start_period(&self) -> Result<RunHandle> {
        self.enforce_lapse().await;
        let current = self.refresh().await?;

        if let Some(unknown) = current.participants().iter().find(|p| !self.devices.knows(p)) {
            return Err(EngineError::ParticipantUnknown {
                participant: unknown.clone(),
            });
        }

        let handle = self.controller.start(&current, self.clock.now())?;
        for participant in &handle.participants {
            self.devices.reset(participant);
        }
        self.publish(EngineEvent::RunStarted { run_id: handle.run_id });
        Ok(handle)
    }

    /// Move the run cursor away from `participant`.
    pub async fn advance(&self, direction: Direction, participant: &str) -> Result<RunStatus> {
        let outcome = self.controller.advance(direction, participant, self.clock.now());
        self.after_run_op(outcome).await
    }

    /// Take a reading from the current participant's device and record it.
    ///
    /// A device failure aborts only this step; the run continues.
    pub async fn measure_current(&self) -> Result<MeasurementOutcome> {
        let (run_id, participant) = self.controller.current_step()?;
        let reading = match self.devices.produce_reading(&participant).await {
            Ok(r) => r,
            Err(source) => {
                warn!(run_id = %run_id, participant = %participant, error = %source, "measurement failed");
                return Err(EngineError::MeasurementFailed { participant, source });
            }
        };
        let outcome = self.controller.record(run_id, &participant, reading, self.clock.now());
        self.after_run_op(outcome).await
    }

    /// Record a reading delivered by the host. Re-delivery for the same
    /// participant in the same run is [`MeasurementOutcome::Duplicate`].
    pub async fn record_measurement(
        &self,
        run_id: RunId,
        participant: &str,
        value: serde_json::Value,
        timestamp: DateTime<Utc>,
    ) -> Result<MeasurementOutcome> {
        let reading = Reading::new(timestamp, value);
        let outcome = self.controller.record(run_id, participant, reading, self.clock.now());
        self.after_run_op(outcome).await
    }

    /// Log the transmission of `sent` and end the run.
    ///
    /// Returns `None` when this run's transmission was already recorded.
    pub async fn complete_transmission(
        &self,
        run_id: RunId,
        sent: Vec<Participant>,
    ) -> Result<Option<RunReport>> {
        let outcome = self.controller.complete(run_id, &sent, self.clock.now());
        match self.after_run_op(outcome).await? {
            Completion::Recorded(report) => {
                for participant in &sent {
                    self.devices.reset(participant);
                }
                self.publish(EngineEvent::RunCompleted { run_id });
                self.refresh_quietly().await;
                Ok(Some(report))
            }
            Completion::AlreadyRecorded => Ok(None),
        }
    }

    /// Abandon the run. Data is discarded and no notification is sent.
    pub async fn cancel_period(&self, run_id: RunId) -> Result<()> {
        let cancelled = self.controller.cancel(run_id)?;
        for participant in &cancelled.participants {
            self.devices.reset(participant);
        }
        self.publish(EngineEvent::RunCancelled { run_id });
        self.refresh_quietly().await;
        Ok(())
    }

    /// Administrative action: append a new `SCHEDULED` definition.
    pub async fn add_scheduled_event(
        &self,
        time: DateTime<Utc>,
        repeat_minutes: i64,
        participants: Vec<Participant>,
    ) -> Result<ScheduleEvent> {
        if repeat_minutes <= 0 {
            return Err(EngineError::InvalidSchedule(format!(
                "repeat must be a positive number of minutes, got {repeat_minutes}"
            )));
        }
        if participants.is_empty() {
            return Err(EngineError::InvalidSchedule(
                "at least one participant is required".to_string(),
            ));
        }
        if participants.iter().any(|p| p.trim().is_empty()) {
            return Err(EngineError::InvalidSchedule(
                "participant names must not be blank".to_string(),
            ));
        }
        if let Some(unknown) = participants.iter().find(|p| !self.devices.knows(p)) {
            return Err(EngineError::ParticipantUnknown {
                participant: unknown.clone(),
            });
        }

        let event = ScheduleEvent::scheduled(time, repeat_minutes, participants);
        event
            .validate()
            .map_err(|e| EngineError::InvalidSchedule(e.to_string()))?;

        let now = self.clock.now();
        if let Ok(Some(period)) = self.get_reconciliation(now).map(|r| r.period) {
            if period.start < now && time < period.start {
                return Err(EngineError::ScheduleBeforeCurrentPeriod {
                    requested: time,
                    period_start: period.start,
                });
            }
        }

        self.log.append(std::slice::from_ref(&event))?;
        info!(
            schedule_id = %event.id,
            start = %event.time,
            repeat = %describe_repeat(repeat_minutes),
            participants = event.participants.len(),
            "schedule added"
        );
        self.refresh_quietly().await;
        Ok(event)
    }

    pub(crate) async fn log_unavailable(&self, reason: &str, failures: u32) {
        let mut gate = self.gate.lock().await;
        let ctx = MessageContext {
            path: self.log.location().map(|p| p.display().to_string()),
            failures: Some(failures),
            reason: Some(reason.to_string()),
            ..Default::default()
        };
        let notification = self.renderer.render_or_fallback(MessageKind::LogUnavailable, &ctx);
        let outbound: Vec<_> = gate.alerts.raise(AlertKey::LogUnavailable, notification).into_iter().collect();
        self.publish(EngineEvent::LogUnavailable {
            reason: reason.to_string(),
        });
        self.dispatcher.dispatch_all(outbound).await;
    }

    pub(crate) async fn log_restored(&self) {
        let mut gate = self.gate.lock().await;
        let outbound: Vec<_> = gate.alerts.clear(AlertKey::LogUnavailable).into_iter().collect();
        self.publish(EngineEvent::LogRestored);
        self.dispatcher.dispatch_all(outbound).await;
    }

    async fn refresh_quietly(&self) {
        if let Err(e) = self.refresh().await {
            debug!(error = %e, "reconciliation after state change failed");
        }
    }

    /// Handles a lapse discovered by a run operation before reporting it.
    async fn after_run_op<T>(&self, outcome: Result<T>) -> Result<T> {
        if let Err(EngineError::PeriodAlreadyLapsed { .. }) = &outcome {
            if self.enforce_lapse().await.is_some() {
                self.refresh_quietly().await;
            }
        }
        outcome
    }

    /// Cancel a run whose window has ended: one message, data discarded.
    async fn enforce_lapse(&self) -> Option<LapsedRun> {
        let lapsed = self.controller.lapse_if_expired(self.clock.now())?;
        for participant in &lapsed.participants {
            self.devices.reset(participant);
        }

        let ctx = MessageContext {
            run_id: Some(lapsed.run_id.to_string()),
            period_start: Some(MessageContext::at(lapsed.period.start)),
            period_expiry: Some(MessageContext::at(lapsed.period.expiry)),
            participants: lapsed.participants.clone(),
            ..Default::default()
        };
        let notification = self.renderer.render_or_fallback(MessageKind::PeriodLapsed, &ctx);
        self.dispatcher.dispatch(&Outbound::Notify(notification)).await;
        self.publish(EngineEvent::RunLapsed {
            run_id: lapsed.run_id,
            period: lapsed.period,
        });
        Some(lapsed)
    }

    fn on_reconciled(
        &self,
        gate: &mut ReconcileState,
        current: &Reconciliation,
        now: DateTime<Utc>,
        outbound: &mut Vec<Outbound>,
    ) {
        outbound.extend(gate.alerts.clear(AlertKey::Reconciliation));

        if current.alert() {
            let notification = self
                .renderer
                .render_or_fallback(MessageKind::MissedReadings, &message_context(current));
            outbound.extend(gate.alerts.raise(AlertKey::MissedReadings, notification));
        } else {
            outbound.extend(gate.alerts.clear(AlertKey::MissedReadings));
        }

        match &current.future_scheduled {
            Some(future) if gate.announced_future != Some(future.scheduled.id) => {
                gate.announced_future = Some(future.scheduled.id);
                let notification = self
                    .renderer
                    .render_or_fallback(MessageKind::FutureSchedule, &message_context(current));
                outbound.push(Outbound::Notify(notification));
            }
            Some(_) => {}
            None => gate.announced_future = None,
        }

        let key = current
            .active_scheduled
            .as_ref()
            .zip(current.period)
            .map(|(s, p)| (s.id, p));
        if let Some((_, previous)) = gate.last_period {
            if key != gate.last_period && previous.has_lapsed(now) {
                info!(expired = %previous.expiry, "measurement period expired");
                self.publish(EngineEvent::PeriodExpired {
                    previous,
                    current: current.period,
                });
            }
        }
        gate.last_period = key;

        *self.latest.write().unwrap_or_else(PoisonError::into_inner) = Some(current.clone());
        self.publish(EngineEvent::Refreshed(current.clone()));
    }

    fn on_reconcile_failed(&self, gate: &mut ReconcileState, error: &EngineError, outbound: &mut Vec<Outbound>) {
        let kind = match error {
            EngineError::Reconcile(ReconcileError::NoScheduleConfigured) => MessageKind::NoSchedule,
            _ => MessageKind::ReconcileFailed,
        };
        let ctx = MessageContext {
            reason: Some(error.to_string()),
            ..Default::default()
        };
        let notification = self.renderer.render_or_fallback(kind, &ctx);

        if let Some(raise) = gate.alerts.raise(AlertKey::Reconciliation, notification.clone()) {
            warn!(error = %error, "schedule reconciliation failed");
            outbound.push(raise);
            if kind == MessageKind::ReconcileFailed {
                outbound.push(Outbound::Error {
                    notification,
                    cause: error.to_string(),
                });
            }
        }
        outbound.extend(gate.alerts.clear(AlertKey::MissedReadings));
        gate.last_period = None;

        *self.latest.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.publish(EngineEvent::ReconcileFailed {
            reason: error.to_string(),
        });
    }

    fn publish(&self, event: EngineEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

fn message_context(current: &Reconciliation) -> MessageContext {
    let window = current
        .period
        .or_else(|| current.future_scheduled.as_ref().map(|f| f.period));
    let schedule = current
        .active_scheduled
        .as_ref()
        .or_else(|| current.future_scheduled.as_ref().map(|f| &f.scheduled));

    MessageContext {
        period_start: window.map(|p| MessageContext::at(p.start)),
        period_expiry: window.map(|p| MessageContext::at(p.expiry)),
        next_due: current.next_due().map(MessageContext::at),
        missed_count: current.missed_count,
        repeat: schedule.map(|s| describe_repeat(s.repeat_minutes)),
        participants: schedule.map(|s| s.participants.clone()).unwrap_or_default(),
        ..Default::default()
    }
}
