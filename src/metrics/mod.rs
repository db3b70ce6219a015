pub mod codec;
pub mod histogram;
pub mod percentiles;
pub mod recorder;

pub use codec::{DecodeError, EncodeError, HistogramReader, HistogramWriter};
pub use histogram::Histogram;
pub use percentiles::Percentiles;
pub use recorder::{LatencyRecorder, Recorder};

/// Identifies one latency histogram: request type (e.g. "publish"),
/// task name (usually the channel), and whether the request
/// succeeded. The histogram engine itself only ever sees the joined
/// dotted form from [`LabelKey::id`]; it never parses it back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelKey {
    pub request_type: String,
    pub name: String,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failure => "failure",
        }
    }
}

impl LabelKey {
    pub fn new(request_type: &str, name: &str, outcome: Outcome) -> Self {
        Self {
            request_type: request_type.to_owned(),
            name: name.to_owned(),
            outcome,
        }
    }

    /// The opaque string id used in `.hist` files, e.g.
    /// `subscribe.personal-3.success`.
    pub fn id(&self) -> String {
        format!("{}.{}.{}", self.request_type, self.name, self.outcome.as_str())
    }
}

/// A single latency observation on its way to the recorder actor.
/// This is the "write" side — load workers create these and the
/// accumulation task folds them into histograms.
#[derive(Debug, Clone)]
pub struct LatencyEvent {
    pub key: LabelKey,
    pub elapsed_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_id_is_three_dotted_parts() {
        let key = LabelKey::new("subscribe", "personal-3", Outcome::Success);
        assert_eq!(key.id(), "subscribe.personal-3.success");

        let key = LabelKey::new("publish", "fanout", Outcome::Failure);
        assert_eq!(key.id(), "publish.fanout.failure");
    }
}
