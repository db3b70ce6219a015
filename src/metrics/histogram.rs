use super::percentiles::Percentiles;

// ─── Default bucket layout ───────────────────────────────────────

/// Default histogram covers [1, 60000] milliseconds with 1ms buckets
/// (record every ms up to 60s).
const DEFAULT_MIN_TIME: i64 = 1;
const DEFAULT_BUCKET_COUNT: usize = 60_000;
const DEFAULT_BUCKET_WIDTH: i64 = 1;

// ─── Histogram ───────────────────────────────────────────────────

/// A linearly spaced histogram of `i64` samples, with configurable
/// minimum value and bucket width.
///
/// Samples outside `[min, max]` are tallied in separate low/high
/// overflow counters rather than dropped, and the true sample
/// extremes are tracked unclamped so percentile reports can never
/// overstate what was actually observed.
///
/// A histogram is not internally synchronized; it expects a single
/// writer. In this crate all `add` calls are funnelled through the
/// recorder actor (see `metrics::recorder`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Histogram {
    bucket_count: usize,
    buckets: Vec<i64>,
    min: i64,
    max: i64,
    bucket_width: i64,
    sample_min: i64,
    sample_max: i64,
    low_sample_count: i64,
    high_sample_count: i64,
    total_samples: i64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new(DEFAULT_BUCKET_COUNT, DEFAULT_MIN_TIME, DEFAULT_BUCKET_WIDTH)
    }
}

impl Histogram {
    /// Creates a linearly spaced histogram with the given number of
    /// buckets, starting from the provided min value and spread with
    /// the specified bucket width.
    ///
    /// A negative `bucket_width` flips the construction: the width is
    /// made positive and `min_value` is treated as the largest value
    /// in range, with buckets growing downward from it. For example
    /// `new(4, 1, -5)` covers [-18, 1] with four 5-wide buckets.
    pub fn new(bucket_count: usize, min_value: i64, bucket_width: i64) -> Self {
        let (min, width) = if bucket_width < 0 {
            let width = -bucket_width;
            (min_value - width * bucket_count as i64 + 1, width)
        } else {
            (min_value, bucket_width)
        };

        let mut hist = Self {
            bucket_count,
            buckets: vec![0; bucket_count],
            min,
            max: 0,
            bucket_width: width,
            sample_min: 0,
            sample_max: 0,
            low_sample_count: 0,
            high_sample_count: 0,
            total_samples: 0,
        };
        hist.max = hist.max_possible_value();
        hist
    }

    /// Appends a sample. Values out of range are tallied in the
    /// low/high overflow counters; any `i64` is a valid input.
    pub fn add(&mut self, value: i64) {
        if self.total_samples == 0 {
            self.sample_min = value;
            self.sample_max = value;
        } else {
            if value < self.sample_min {
                self.sample_min = value;
            }
            if value > self.sample_max {
                self.sample_max = value;
            }
        }
        self.total_samples += 1;

        if value > self.max {
            self.high_sample_count += 1;
        } else if value < self.min {
            self.low_sample_count += 1;
        } else {
            let bucket = ((value - self.min) / self.bucket_width) as usize;
            self.buckets[bucket] += 1;
        }
    }

    /// Computes the percentile breakdown for the current bucket
    /// state. See `Percentiles` for the exact rank and clamping
    /// semantics.
    pub fn percentiles(&self) -> Percentiles {
        Percentiles::from_histogram(self)
    }

    /// Given a bucket index (with -1 the low-overflow pseudo-bucket
    /// and `bucket_count` the high-overflow pseudo-bucket), compute
    /// the maximum possible value of that bucket, clamped to the
    /// maximum sample actually observed.
    pub(crate) fn bucket_to_max_value(&self, bucket_index: i64) -> i64 {
        if bucket_index < 0 {
            let possible_min = self.min - 1;
            if possible_min > self.sample_max {
                return self.sample_max;
            }
            return possible_min;
        }

        if bucket_index >= self.bucket_count as i64 {
            return self.sample_max;
        }

        let bucket_max = self.min + (1 + bucket_index) * self.bucket_width - 1;
        if self.sample_max < bucket_max {
            self.sample_max
        } else {
            bucket_max
        }
    }

    /// The largest possible value in the last bucket.
    fn max_possible_value(&self) -> i64 {
        self.min + self.bucket_count as i64 * self.bucket_width - 1
    }

    // ── Field access (used by the percentile calculator, the stream
    //    codec and the summary report) ────────────────────────────

    pub fn bucket_count(&self) -> usize {
        self.bucket_count
    }

    pub fn buckets(&self) -> &[i64] {
        &self.buckets
    }

    pub fn min(&self) -> i64 {
        self.min
    }

    pub fn max(&self) -> i64 {
        self.max
    }

    pub fn bucket_width(&self) -> i64 {
        self.bucket_width
    }

    pub fn sample_min(&self) -> i64 {
        self.sample_min
    }

    pub fn sample_max(&self) -> i64 {
        self.sample_max
    }

    pub fn low_sample_count(&self) -> i64 {
        self.low_sample_count
    }

    pub fn high_sample_count(&self) -> i64 {
        self.high_sample_count
    }

    pub fn total_samples(&self) -> i64 {
        self.total_samples
    }

    /// Rebuilds a histogram from its serialized fields without
    /// recomputing anything, so a decoded histogram is field-for-field
    /// identical to the one that was written.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        bucket_count: usize,
        buckets: Vec<i64>,
        min: i64,
        max: i64,
        bucket_width: i64,
        sample_min: i64,
        sample_max: i64,
        low_sample_count: i64,
        high_sample_count: i64,
        total_samples: i64,
    ) -> Self {
        Self {
            bucket_count,
            buckets,
            min,
            max,
            bucket_width,
            sample_min,
            sample_max,
            low_sample_count,
            high_sample_count,
            total_samples,
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────
