//! Synthetic pub/sub load.
//!
//! Spawns `concurrency` worker tasks. Each worker owns a personal
//! channel: a subscriber task records delivery latency from message
//! timestamps while the publish loop records publish latency, until
//! the deadline passes or the running flag is cleared.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;
use tracing::debug;

use crate::config::Config;
use crate::metrics::LatencyRecorder;
use crate::pubsub_client::{Message, PubSubClient, PubSubError, Publisher, Subscriber};

// ─── Public entry point ──────────────────────────────────────────

/// Runs the whole load: all workers until the deadline or until the
/// `running` flag is set to false.
pub async fn run<C: PubSubClient>(
    running: Arc<AtomicBool>,
    recorder: LatencyRecorder,
    client: C,
    config: &Config,
) {
    let deadline = Instant::now() + Duration::from_secs(config.duration_secs);

    let mut handles = Vec::with_capacity(config.concurrency as usize);
    for worker_id in 0..config.concurrency {
        let running = running.clone();
        let recorder = recorder.clone();
        let client = client.clone();
        let interval_ms = config.publish_interval_ms;
        let payload_bytes = config.payload_bytes;

        handles.push(tokio::spawn(async move {
            worker(
                worker_id,
                running,
                recorder,
                client,
                deadline,
                interval_ms,
                payload_bytes,
            )
            .await;
        }));
    }

    for handle in handles {
        let _ = handle.await;
    }

    running.store(false, Ordering::SeqCst);
}

// ─── Worker loop ─────────────────────────────────────────────────

async fn worker<C: PubSubClient>(
    id: u32,
    running: Arc<AtomicBool>,
    recorder: LatencyRecorder,
    client: C,
    deadline: Instant,
    interval_ms: u64,
    payload_bytes: usize,
) {
    let channel = format!("personal-{id}");

    // Subscribe before the first publish so nothing is missed.
    let subscriber = client.subscriber(&channel);
    let sub_task = tokio::spawn(subscribe_loop(subscriber, recorder.clone(), channel.clone()));

    let publisher = client.publisher(&channel);

    // Each worker gets its own deterministic RNG seeded uniquely.
    let mut rng = StdRng::seed_from_u64(1000 + id as u64);
    let mut ticks = IntervalStream::new(tokio::time::interval(Duration::from_millis(interval_ms)));

    while running.load(Ordering::Relaxed) && Instant::now() < deadline {
        ticks.next().await;

        let payload: Vec<u8> = (0..payload_bytes).map(|_| rng.gen()).collect();
        let size = payload.len() as i64;

        let start = Instant::now();
        match publisher.publish(Message::new(payload)).await {
            Ok(()) => recorder.record_success(
                "publish",
                &channel,
                start.elapsed().as_millis() as i64,
                size,
            ),
            Err(e) => recorder.record_failure(
                "publish",
                &channel,
                start.elapsed().as_millis() as i64,
                &e.to_string(),
            ),
        }
    }

    debug!(worker = id, "publish loop finished");
    sub_task.abort();
}

async fn subscribe_loop<S: Subscriber>(
    mut subscriber: S,
    recorder: LatencyRecorder,
    channel: String,
) {
    loop {
        match subscriber.next().await {
            Ok(message) => recorder.record_success(
                "subscribe",
                &channel,
                message.age_ms(),
                message.payload.len() as i64,
            ),
            Err(e @ PubSubError::Lagged(_)) => {
                recorder.record_failure("subscribe", &channel, 0, &e.to_string());
            }
            Err(PubSubError::ChannelClosed(_)) => break,
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::recorder::{Recorder, TracingController};
    use crate::metrics::{LabelKey, Outcome};
    use crate::pubsub_client::LoopbackBus;

    fn test_config(concurrency: u32) -> Config {
        Config {
            histogram_dir: None,
            histogram_bucket: None,
            concurrency,
            duration_secs: 1,
            publish_interval_ms: 5,
            payload_bytes: 32,
        }
    }

    #[tokio::test]
    async fn workers_record_publish_and_subscribe_latency() {
        let recorder = Recorder::spawn(Arc::new(TracingController));
        let running = Arc::new(AtomicBool::new(true));
        let bus = LoopbackBus::new(Duration::ZERO);
        let config = test_config(2);

        run(running.clone(), recorder.handle(), bus, &config).await;
        assert!(!running.load(Ordering::SeqCst));

        let histograms = recorder.stop().await;
        for worker_id in 0..2 {
            let channel = format!("personal-{worker_id}");
            let publish =
                &histograms[&LabelKey::new("publish", &channel, Outcome::Success)];
            let subscribe =
                &histograms[&LabelKey::new("subscribe", &channel, Outcome::Success)];
            assert!(publish.total_samples() > 0);
            // The subscriber task is torn down right after the last
            // publish, so it may miss the tail of the stream but
            // never sees more than was published.
            assert!(subscribe.total_samples() > 0);
            assert!(subscribe.total_samples() <= publish.total_samples());
        }
    }

    #[tokio::test]
    async fn clearing_the_flag_stops_the_load() {
        let recorder = Recorder::spawn(Arc::new(TracingController));
        let running = Arc::new(AtomicBool::new(true));
        let bus = LoopbackBus::new(Duration::ZERO);
        let mut config = test_config(1);
        config.duration_secs = 3_600;

        let handle = {
            let running = running.clone();
            let recorder = recorder.handle();
            tokio::spawn(async move { run(running, recorder, bus, &config).await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        running.store(false, Ordering::SeqCst);
        handle.await.unwrap();

        let histograms = recorder.stop().await;
        assert!(!histograms.is_empty());
    }
}
