//! Latency accumulation actor.
//!
//! Histograms are not internally synchronized, so all `add` calls go
//! through a single tokio task that owns the label→histogram map.
//! Load workers hold cloneable [`LatencyRecorder`] handles and push
//! `(label, latency)` events into the actor's channel; the actor is
//! the only writer any histogram ever sees.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::{Histogram, LabelKey, LatencyEvent, Outcome};

/// The load-test controller every raw event is forwarded to, in
/// addition to being folded into the local histograms. The real
/// controller lives in a separate process; this crate only carries
/// the reporting interface.
pub trait LoadController: Send + Sync + 'static {
    fn record_success(
        &self,
        request_type: &str,
        name: &str,
        response_time_ms: i64,
        response_size: i64,
    );

    fn record_failure(&self, request_type: &str, name: &str, response_time_ms: i64, error: &str);
}

/// Controller stand-in used when no load-test master is attached:
/// events only show up in the debug log.
pub struct TracingController;

impl LoadController for TracingController {
    fn record_success(
        &self,
        request_type: &str,
        name: &str,
        response_time_ms: i64,
        response_size: i64,
    ) {
        debug!(request_type, name, response_time_ms, response_size, "success");
    }

    fn record_failure(&self, request_type: &str, name: &str, response_time_ms: i64, error: &str) {
        debug!(request_type, name, response_time_ms, error, "failure");
    }
}

// ─── Producer handle ─────────────────────────────────────────────

/// Cloneable handle through which load workers report request
/// outcomes. Recording never blocks and never fails: after the
/// recorder has stopped, events are silently dropped.
#[derive(Clone)]
pub struct LatencyRecorder {
    tx: Arc<RwLock<Option<mpsc::UnboundedSender<LatencyEvent>>>>,
    controller: Arc<dyn LoadController>,
}

impl LatencyRecorder {
    /// Reports a successful request and queues its latency for the
    /// accumulation task.
    pub fn record_success(
        &self,
        request_type: &str,
        name: &str,
        response_time_ms: i64,
        response_size: i64,
    ) {
        self.controller
            .record_success(request_type, name, response_time_ms, response_size);
        self.enqueue(
            LabelKey::new(request_type, name, Outcome::Success),
            response_time_ms,
        );
    }

    /// Reports a failed request. The latency still goes into its own
    /// `failure` histogram.
    pub fn record_failure(
        &self,
        request_type: &str,
        name: &str,
        response_time_ms: i64,
        error: &str,
    ) {
        self.controller
            .record_failure(request_type, name, response_time_ms, error);
        self.enqueue(
            LabelKey::new(request_type, name, Outcome::Failure),
            response_time_ms,
        );
    }

    fn enqueue(&self, key: LabelKey, elapsed_ms: i64) {
        let guard = self.tx.read();
        if let Some(tx) = guard.as_ref() {
            let _ = tx.send(LatencyEvent { key, elapsed_ms });
        }
    }
}

// ─── Actor ───────────────────────────────────────────────────────

/// Owns the accumulation task. `stop` drains the channel and hands
/// back every histogram for persistence.
pub struct Recorder {
    handle: LatencyRecorder,
    join: JoinHandle<HashMap<LabelKey, Histogram>>,
}

impl Recorder {
    /// Spawns the accumulation task. Histograms are created lazily
    /// with the 60s/1ms default layout the first time a label shows
    /// up.
    pub fn spawn(controller: Arc<dyn LoadController>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<LatencyEvent>();

        let join = tokio::spawn(async move {
            let mut histograms: HashMap<LabelKey, Histogram> = HashMap::new();
            while let Some(event) = rx.recv().await {
                histograms
                    .entry(event.key)
                    .or_default()
                    .add(event.elapsed_ms);
            }
            histograms
        });

        Self {
            handle: LatencyRecorder {
                tx: Arc::new(RwLock::new(Some(tx))),
                controller,
            },
            join,
        }
    }

    pub fn handle(&self) -> LatencyRecorder {
        self.handle.clone()
    }

    /// Closes the channel, waits for the actor to fold in every
    /// queued event, and returns the accumulated histograms. Handles
    /// that record after this point become no-ops.
    pub async fn stop(self) -> HashMap<LabelKey, Histogram> {
        self.handle.tx.write().take();

        match self.join.await {
            Ok(histograms) => histograms,
            Err(e) => {
                error!("latency accumulation task failed: {e}");
                HashMap::new()
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct CapturingController {
        successes: Mutex<Vec<(String, i64)>>,
        failures: Mutex<Vec<(String, String)>>,
    }

    impl LoadController for CapturingController {
        fn record_success(&self, request_type: &str, name: &str, ms: i64, _size: i64) {
            self.successes
                .lock()
                .push((format!("{request_type}.{name}"), ms));
        }

        fn record_failure(&self, request_type: &str, name: &str, _ms: i64, error: &str) {
            self.failures
                .lock()
                .push((format!("{request_type}.{name}"), error.to_owned()));
        }
    }

    #[tokio::test]
    async fn accumulates_per_label_histograms() {
        let recorder = Recorder::spawn(Arc::new(TracingController));
        let handle = recorder.handle();

        for ms in [5, 10, 15] {
            handle.record_success("publish", "fanout", ms, 64);
        }
        handle.record_success("subscribe", "fanout", 42, 64);
        handle.record_failure("publish", "fanout", 1_000, "timed out");

        let histograms = recorder.stop().await;
        assert_eq!(histograms.len(), 3);

        let publish_ok = &histograms[&LabelKey::new("publish", "fanout", Outcome::Success)];
        assert_eq!(publish_ok.total_samples(), 3);
        assert_eq!(publish_ok.sample_min(), 5);
        assert_eq!(publish_ok.sample_max(), 15);

        let publish_err = &histograms[&LabelKey::new("publish", "fanout", Outcome::Failure)];
        assert_eq!(publish_err.total_samples(), 1);
    }

    #[tokio::test]
    async fn forwards_raw_events_to_controller() {
        let controller = Arc::new(CapturingController::default());
        let recorder = Recorder::spawn(controller.clone());
        let handle = recorder.handle();

        handle.record_success("publish", "sharded", 7, 128);
        handle.record_failure("subscribe", "sharded", 3, "connection reset");
        recorder.stop().await;

        assert_eq!(
            controller.successes.lock().as_slice(),
            &[("publish.sharded".to_owned(), 7)]
        );
        assert_eq!(
            controller.failures.lock().as_slice(),
            &[(
                "subscribe.sharded".to_owned(),
                "connection reset".to_owned()
            )]
        );
    }

    #[tokio::test]
    async fn recording_after_stop_is_a_noop() {
        let recorder = Recorder::spawn(Arc::new(TracingController));
        let handle = recorder.handle();

        handle.record_success("publish", "personal-0", 12, 32);
        let histograms = recorder.stop().await;
        assert_eq!(histograms.len(), 1);

        // Late producers must not panic or error.
        handle.record_success("publish", "personal-0", 99, 32);
        handle.record_failure("publish", "personal-0", 99, "late");
    }
}
