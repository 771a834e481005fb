// ── Notification side effects ──
//
// Fan-out of "a new live alarm arrived" to pluggable sinks (audio cue,
// popup, platform notification). Sinks run on their own task so a slow
// or failing sink never holds up reconciliation, and each sink is tried
// independently of the others.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::model::Alarm;

/// Failure reported by a single sink.
#[derive(Debug, Error)]
#[error("{sink}: {message}")]
pub struct NotifyError {
    pub sink: &'static str,
    pub message: String,
}

impl NotifyError {
    pub fn new(sink: &'static str, message: impl Into<String>) -> Self {
        Self {
            sink,
            message: message.into(),
        }
    }
}

/// One way of telling an operator about a new alarm.
pub trait NotificationSink: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Deliver the notification. Must not block for long.
    fn notify(&self, alarm: &Alarm) -> Result<(), NotifyError>;
}

/// The set of sinks notified for every new live alarm.
#[derive(Clone, Default)]
pub struct NotificationSideEffects {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl NotificationSideEffects {
    /// No sinks: notifications are dropped.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: impl NotificationSink + 'static) -> Self {
        self.sinks.push(Arc::new(sink));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Run every sink. A failing sink is logged and skipped; the
    /// returned count is how many sinks succeeded.
    pub fn notify(&self, alarm: &Alarm) -> usize {
        let mut delivered = 0;
        for sink in &self.sinks {
            match sink.notify(alarm) {
                Ok(()) => delivered += 1,
                Err(e) => warn!(alarm_id = %alarm.id, sink = sink.name(), error = %e, "notification failed"),
            }
        }
        delivered
    }

    /// Spawn the notifier task. Alarms sent on the returned channel are
    /// handed to every sink in arrival order; the task ends when the
    /// sender is dropped.
    pub(crate) fn spawn(self) -> (mpsc::UnboundedSender<Arc<Alarm>>, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Arc<Alarm>>();
        let handle = tokio::spawn(async move {
            while let Some(alarm) = rx.recv().await {
                let delivered = self.notify(&alarm);
                debug!(alarm_id = %alarm.id, delivered, "notified");
            }
        });
        (tx, handle)
    }
}

impl std::fmt::Debug for NotificationSideEffects {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.sinks.iter().map(|s| s.name()).collect();
        f.debug_struct("NotificationSideEffects")
            .field("sinks", &names)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::model::Channel;
    use crate::normalize::normalize;

    struct Recording {
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl NotificationSink for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn notify(&self, alarm: &Alarm) -> Result<(), NotifyError> {
            self.seen.lock().unwrap().push(alarm.id.clone());
            Ok(())
        }
    }

    struct Broken;

    impl NotificationSink for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn notify(&self, _alarm: &Alarm) -> Result<(), NotifyError> {
            Err(NotifyError::new("broken", "autoplay blocked"))
        }
    }

    #[test]
    fn failing_sink_does_not_stop_others() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let effects = NotificationSideEffects::new()
            .with_sink(Broken)
            .with_sink(Recording { seen: Arc::clone(&seen) });

        let alarm = normalize(&serde_json::json!({ "id": "A1" }), Channel::GlobalStream);
        assert_eq!(effects.notify(&alarm), 1);
        assert_eq!(*seen.lock().unwrap(), vec!["A1".to_owned()]);
    }

    #[tokio::test]
    async fn notifier_task_drains_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let effects = NotificationSideEffects::new().with_sink(Recording { seen: Arc::clone(&seen) });
        let (tx, handle) = effects.spawn();

        for id in ["a", "b", "c"] {
            let alarm = normalize(&serde_json::json!({ "id": id }), Channel::Polling);
            tx.send(Arc::new(alarm)).unwrap();
        }
        drop(tx);
        handle.await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec!["a", "b", "c"]);
    }
}
