//! Fans outbound actions out to every registered sink.
//!
//! Individual sink failures don't block other sinks and are never
//! propagated to the caller.

use std::sync::Arc;

use crate::traits::{DispatchResult, NotificationSink, Outbound};

#[derive(Clone, Default)]
pub struct Dispatcher {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl Dispatcher {
    pub fn new(sinks: Vec<Arc<dyn NotificationSink>>) -> Self {
        Self { sinks }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn add_sink(&mut self, sink: Arc<dyn NotificationSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Deliver one action to all sinks, in registration order.
    pub async fn dispatch(&self, outbound: &Outbound) -> Vec<DispatchResult> {
        if self.sinks.is_empty() {
            tracing::debug!(action = outbound.label(), "No notification sinks configured");
            return Vec::new();
        }

        let mut results = Vec::with_capacity(self.sinks.len());

        for sink in &self.sinks {
            let start = std::time::Instant::now();
            let result = match outbound {
                Outbound::Notify(n) => sink.notify(n).await,
                Outbound::Error { notification, cause } => sink.notify_error(notification, cause).await,
                Outbound::RaiseAlert { key, notification } => sink.raise_alert(*key, notification).await,
                Outbound::ClearAlert(key) => sink.clear_alert(*key).await,
            };
            let duration_ms = start.elapsed().as_millis() as u64;

            let (success, error) = match result {
                Ok(()) => {
                    tracing::debug!(
                        sink = sink.sink_name(),
                        action = outbound.label(),
                        duration_ms,
                        "Notification delivered"
                    );
                    (true, None)
                }
                Err(e) => {
                    tracing::warn!(
                        sink = sink.sink_name(),
                        action = outbound.label(),
                        error = %e,
                        duration_ms,
                        "Notification delivery failed"
                    );
                    (false, Some(e.to_string()))
                }
            };

            results.push(DispatchResult {
                sink: sink.sink_name().to_string(),
                action: outbound.label(),
                success,
                error,
                duration_ms,
            });
        }

        results
    }

    /// Deliver a batch in order.
    pub async fn dispatch_all(&self, batch: Vec<Outbound>) {
        for outbound in &batch {
            self.dispatch(outbound).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{AlertKey, Notification, NotifyError, Severity};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockSink {
        name: String,
        send_count: Arc<AtomicUsize>,
        cleared: Arc<AtomicUsize>,
        should_fail: bool,
    }

    impl MockSink {
        fn new(name: &str, should_fail: bool) -> (Self, Arc<AtomicUsize>, Arc<AtomicUsize>) {
            let sent = Arc::new(AtomicUsize::new(0));
            let cleared = Arc::new(AtomicUsize::new(0));
            let sink = Self {
                name: name.to_string(),
                send_count: sent.clone(),
                cleared: cleared.clone(),
                should_fail,
            };
            (sink, sent, cleared)
        }
    }

    #[async_trait::async_trait]
    impl NotificationSink for MockSink {
        async fn notify(&self, _notification: &Notification) -> Result<(), NotifyError> {
            self.send_count.fetch_add(1, Ordering::SeqCst);
            if self.should_fail {
                Err(NotifyError::Delivery {
                    sink: self.name.clone(),
                    reason: "mock failure".to_string(),
                })
            } else {
                Ok(())
            }
        }

        async fn clear_alert(&self, _key: AlertKey) -> Result<(), NotifyError> {
            self.cleared.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn sink_name(&self) -> &str {
            &self.name
        }
    }

    fn sample() -> Notification {
        Notification::new(Severity::Info, "test", "test body")
    }

    #[tokio::test]
    async fn dispatch_to_all_sinks() {
        let (a, count_a, _) = MockSink::new("a", false);
        let (b, count_b, _) = MockSink::new("b", false);
        let dispatcher = Dispatcher::new(vec![Arc::new(a), Arc::new(b)]);

        let results = dispatcher.dispatch(&Outbound::Notify(sample())).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.success));
        assert_eq!(count_a.load(Ordering::SeqCst), 1);
        assert_eq!(count_b.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn partial_failure_doesnt_block() {
        let (fail, _, _) = MockSink::new("fail", true);
        let (ok, count, _) = MockSink::new("ok", false);
        let dispatcher = Dispatcher::new(vec![Arc::new(fail), Arc::new(ok)]);

        let results = dispatcher.dispatch(&Outbound::Notify(sample())).await;
        assert_eq!(results.len(), 2);
        assert!(!results[0].success);
        assert!(results[1].success);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn default_alert_methods_fall_back_to_notify() {
        let (sink, sent, cleared) = MockSink::new("plain", false);
        let dispatcher = Dispatcher::new(vec![Arc::new(sink)]);

        dispatcher
            .dispatch_all(vec![
                Outbound::RaiseAlert {
                    key: AlertKey::MissedReadings,
                    notification: sample(),
                },
                Outbound::Error {
                    notification: sample(),
                    cause: "disk".to_string(),
                },
                Outbound::ClearAlert(AlertKey::MissedReadings),
            ])
            .await;

        assert_eq!(sent.load(Ordering::SeqCst), 2);
        assert_eq!(cleared.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_sinks_returns_empty() {
        let dispatcher = Dispatcher::empty();
        assert!(dispatcher.dispatch(&Outbound::Notify(sample())).await.is_empty());
    }
}
