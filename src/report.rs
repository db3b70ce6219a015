//! Histogram persistence and the shutdown report.
//!
//! At shutdown every labelled histogram is written to a single
//! `.hist` file; an offline process (or a test) reads the file back
//! and recomputes identical percentiles from the full-fidelity
//! snapshots.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::metrics::{
    DecodeError, EncodeError, Histogram, HistogramReader, HistogramWriter, LabelKey, Percentiles,
};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("error encoding histogram stream: {0}")]
    Encode(#[from] EncodeError),
    #[error("error decoding histogram stream: {0}")]
    Decode(#[from] DecodeError),
    #[error("duplicate label '{0}' in histogram stream")]
    DuplicateLabel(String),
    #[error("error rendering summary: {0}")]
    Json(#[from] serde_json::Error),
    #[error("histogram file error: {0}")]
    Io(#[from] io::Error),
}

/// Replaces everything outside `[A-Za-z0-9._-]` with `_` so labels
/// and prefixes are safe in file names and storage keys.
pub(crate) fn sanitize_component(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Builds the per-run histogram file path:
/// `<dir>/latency-<unix ts>-<run id>.hist`.
pub fn hist_file_path(dir: &Path) -> PathBuf {
    let run_id = Uuid::new_v4().simple().to_string();
    let base = sanitize_component(&format!(
        "latency-{}-{}.hist",
        Utc::now().timestamp(),
        &run_id[..8],
    ));
    dir.join(base)
}

/// Writes every histogram to `path` in sorted label order, then syncs
/// the file to disk.
pub fn write_hist_file(
    path: &Path,
    histograms: &HashMap<LabelKey, Histogram>,
) -> Result<(), ReportError> {
    let sorted: BTreeMap<String, &Histogram> = histograms
        .iter()
        .map(|(key, hist)| (key.id(), hist))
        .collect();

    let mut writer = HistogramWriter::new(BufWriter::new(File::create(path)?));
    for (id, hist) in sorted {
        writer.write(&id, Some(hist))?;
    }

    let mut buf = writer.into_inner();
    buf.flush()?;
    let file = buf.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(())
}

/// Reads a `.hist` file back into a label-sorted map, failing on
/// corrupt records or duplicate labels.
pub fn read_hist_file(path: &Path) -> Result<BTreeMap<String, Histogram>, ReportError> {
    let mut reader = HistogramReader::new(BufReader::new(File::open(path)?));

    let mut histograms = BTreeMap::new();
    loop {
        match reader.read() {
            Ok((id, hist)) => {
                if histograms.insert(id.clone(), hist).is_some() {
                    return Err(ReportError::DuplicateLabel(id));
                }
            }
            Err(DecodeError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(histograms)
}

/// Computes the percentile breakdown for every labelled histogram.
pub fn summarize(histograms: &BTreeMap<String, Histogram>) -> BTreeMap<String, Percentiles> {
    histograms
        .iter()
        .map(|(id, hist)| (id.clone(), hist.percentiles()))
        .collect()
}

/// The machine-readable form of the summary.
pub fn summary_json(histograms: &BTreeMap<String, Histogram>) -> Result<String, ReportError> {
    Ok(serde_json::to_string_pretty(&summarize(histograms))?)
}

/// Prints the human-readable percentile table to stdout.
pub fn print_summary(histograms: &BTreeMap<String, Histogram>) {
    println!(
        "  {:<36} {:>9} {:>7} {:>7} {:>7} {:>7} {:>7} {:>7}",
        "label", "samples", "min", "p50", "p95", "p99", "p999", "max"
    );
    println!("  {}", "─".repeat(94));
    for (id, pct) in summarize(histograms) {
        println!(
            "  {:<36} {:>9} {:>7} {:>7} {:>7} {:>7} {:>7} {:>7}",
            id, pct.total_samples, pct.min, pct.p50, pct.p95, pct.p99, pct.p999, pct.max
        );
    }
}

// ─── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Outcome;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("pubsub_bench_{tag}_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn sample_histograms() -> HashMap<LabelKey, Histogram> {
        let mut rng = StdRng::seed_from_u64(11);
        let mut histograms = HashMap::new();
        for (request_type, name) in [("publish", "personal-0"), ("subscribe", "personal-0")] {
            let mut hist = Histogram::default();
            for _ in 0..50_000 {
                hist.add(rng.gen_range(0..=60_001));
            }
            histograms.insert(LabelKey::new(request_type, name, Outcome::Success), hist);
        }
        histograms
    }

    #[test]
    fn file_round_trip_preserves_histograms_and_percentiles() {
        let path = scratch_dir("report").join("latency-roundtrip.hist");
        let histograms = sample_histograms();

        write_hist_file(&path, &histograms).unwrap();
        let restored = read_hist_file(&path).unwrap();

        assert_eq!(restored.len(), histograms.len());
        for (key, hist) in &histograms {
            let decoded = &restored[&key.id()];
            assert_eq!(decoded, hist);
            assert_eq!(decoded.percentiles(), hist.percentiles());
        }
    }

    #[test]
    fn duplicate_labels_are_rejected_on_read() {
        let path = scratch_dir("report").join("latency-duplicate.hist");
        let hist = Histogram::new(8, 1, 10);

        let mut writer = HistogramWriter::new(BufWriter::new(File::create(&path).unwrap()));
        writer.write("twice.seen.success", Some(&hist)).unwrap();
        writer.write("twice.seen.success", Some(&hist)).unwrap();
        writer.into_inner().flush().unwrap();

        let err = read_hist_file(&path).unwrap_err();
        assert!(matches!(err, ReportError::DuplicateLabel(id) if id == "twice.seen.success"));
    }

    #[test]
    fn hist_file_names_are_sanitized() {
        let path = hist_file_path(Path::new("/tmp"));
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("latency-"));
        assert!(name.ends_with(".hist"));
        assert!(name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')));
    }

    #[test]
    fn sanitize_replaces_unsafe_characters() {
        assert_eq!(sanitize_component("hist"), "hist");
        assert_eq!(sanitize_component("a b/c:d"), "a_b_c_d");
        assert_eq!(sanitize_component("publish.personal-0.success"),
            "publish.personal-0.success");
    }

    #[test]
    fn summary_json_is_stable_and_parseable() {
        let path = scratch_dir("report").join("latency-summary.hist");
        write_hist_file(&path, &sample_histograms()).unwrap();
        let restored = read_hist_file(&path).unwrap();

        let json = summary_json(&restored).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        let publish = &parsed["publish.personal-0.success"];
        assert_eq!(publish["total_samples"], 50_000);
        assert!(publish["p50"].as_i64().unwrap() <= publish["p99"].as_i64().unwrap());
    }
}
