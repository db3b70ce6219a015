use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use pubsub_bench::config::Config;
use pubsub_bench::load_generator;
use pubsub_bench::metrics::recorder::{Recorder, TracingController};
use pubsub_bench::pubsub_client::LoopbackBus;
use pubsub_bench::report;
use pubsub_bench::uploader::{DirUploader, ObjectUploader, HIST_KEY_PREFIX};

/// Simulated network transit applied by the loopback bus.
const LOOPBACK_JITTER: Duration = Duration::from_millis(20);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!();
    println!("╔══════════════════════════════════════════════════╗");
    println!("║   📡  PUB/SUB LATENCY LOAD WORKER                ║");
    println!("╚══════════════════════════════════════════════════╝");
    println!();

    // ── 1. Resolve configuration from the environment ────────────
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {e}");
            std::process::exit(1);
        }
    };
    info!(
        concurrency = config.concurrency,
        duration_secs = config.duration_secs,
        publish_interval_ms = config.publish_interval_ms,
        "starting load"
    );

    // ── 2. Spawn the latency accumulation actor ──────────────────
    let recorder = Recorder::spawn(Arc::new(TracingController));

    // ── 3. Drive synthetic traffic over the loopback bus ─────────
    let running = Arc::new(AtomicBool::new(true));
    let bus = LoopbackBus::new(LOOPBACK_JITTER);
    load_generator::run(running, recorder.handle(), bus, &config).await;

    // ── 4. Drain the recorder ────────────────────────────────────
    let histograms = recorder.stop().await;
    info!(labels = histograms.len(), "load finished");

    // ── 5. Persist and optionally upload the histogram file ──────
    // Failures here are logged and never abort the remaining
    // shutdown steps.
    let mut hist_path = None;
    if let Some(dir) = &config.histogram_dir {
        let path = report::hist_file_path(dir);
        match report::write_hist_file(&path, &histograms) {
            Ok(()) => {
                info!(path = %path.display(), "histogram file written");
                hist_path = Some(path);
            }
            Err(e) => error!("error writing histogram file: {e}"),
        }
    }
    if let (Some(path), Some(bucket)) = (&hist_path, &config.histogram_bucket) {
        match DirUploader.upload(path, bucket, HIST_KEY_PREFIX) {
            Ok(()) => info!(bucket = %bucket, "histogram file uploaded"),
            Err(e) => error!("error uploading histogram file: {e}"),
        }
    }

    // ── 6. Print the percentile report ───────────────────────────
    let by_label = histograms
        .iter()
        .map(|(key, hist)| (key.id(), hist.clone()))
        .collect();
    println!();
    report::print_summary(&by_label);
    println!();
}
