use serde::Serialize;

use super::histogram::Histogram;

/// The fixed percentile fractions reported by every histogram, as
/// (numerator, denominator) pairs: 5% to 95% in steps of 5, then 99%,
/// 99.9% and 99.99%.
const FRACTIONS: [(i64, i64); 22] = [
    (5, 100),
    (10, 100),
    (15, 100),
    (20, 100),
    (25, 100),
    (30, 100),
    (35, 100),
    (40, 100),
    (45, 100),
    (50, 100),
    (55, 100),
    (60, 100),
    (65, 100),
    (70, 100),
    (75, 100),
    (80, 100),
    (85, 100),
    (90, 100),
    (95, 100),
    (99, 100),
    (999, 1000),
    (9999, 10_000),
];

/// A complete percentile breakdown of one histogram.
///
/// Each percentile means "x% of samples were this value or less". The
/// value is not interpolated: it is the maximum possible value of the
/// bucket containing the sample that overlaps the percentile line, so
/// the reported number is always a valid upper bound. With 4 buckets
/// of width 5 starting at 1, bucket 0 holds samples 1..=5 and reports
/// the value 5; a midpoint would let some samples within the
/// percentile exceed the report.
///
/// Values are additionally clamped at the maximum sample actually
/// observed: if that same histogram saw a maximum of 17, a bucket max
/// of 20 is capped to 17 as the tighter upper limit.
///
/// `min` and `max` are the true unclamped sample extremes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Percentiles {
    pub min: i64,
    pub p5: i64,
    pub p10: i64,
    pub p15: i64,
    pub p20: i64,
    pub p25: i64,
    pub p30: i64,
    pub p35: i64,
    pub p40: i64,
    pub p45: i64,
    pub p50: i64,
    pub p55: i64,
    pub p60: i64,
    pub p65: i64,
    pub p70: i64,
    pub p75: i64,
    pub p80: i64,
    pub p85: i64,
    pub p90: i64,
    pub p95: i64,
    pub p99: i64,
    pub p999: i64,
    pub p9999: i64,
    pub max: i64,
    pub total_samples: i64,
}

impl Percentiles {
    /// Computes the percentile breakdown from a histogram's bucket
    /// state. When a percentile refers to a fractional sample number
    /// the rank rounds down at exact boundaries (see
    /// [`percentile_rank`]), which keeps every reported value an
    /// upper bound for its percentile.
    pub fn from_histogram(hist: &Histogram) -> Self {
        let total = hist.total_samples();
        if total <= 0 {
            return Self::empty();
        }

        let ranks: Vec<i64> = FRACTIONS
            .iter()
            .map(|&(num, den)| percentile_rank(total, num, den))
            .collect();

        // Walk the buckets once, low-overflow pseudo-bucket first and
        // high-overflow pseudo-bucket last, resolving each rank to the
        // first bucket whose cumulative count reaches it. The ranks
        // are non-decreasing so a single pass suffices.
        let bucket_count = hist.bucket_count() as i64;
        let buckets = hist.buckets();
        let mut bucket_of = vec![0i64; ranks.len()];

        let mut cumulative = 0i64;
        let mut find = 0;
        let mut i = -1i64;
        while i <= bucket_count {
            if i < 0 {
                cumulative += hist.low_sample_count();
            } else if i >= bucket_count {
                cumulative += hist.high_sample_count();
            } else {
                cumulative += buckets[i as usize];
            }

            while find < ranks.len() && ranks[find] <= cumulative {
                bucket_of[find] = i;
                find += 1;
            }
            i += 1;
        }

        let value = |idx: usize| hist.bucket_to_max_value(bucket_of[idx]);

        Self {
            min: hist.sample_min(),
            p5: value(0),
            p10: value(1),
            p15: value(2),
            p20: value(3),
            p25: value(4),
            p30: value(5),
            p35: value(6),
            p40: value(7),
            p45: value(8),
            p50: value(9),
            p55: value(10),
            p60: value(11),
            p65: value(12),
            p70: value(13),
            p75: value(14),
            p80: value(15),
            p85: value(16),
            p90: value(17),
            p95: value(18),
            p99: value(19),
            p999: value(20),
            p9999: value(21),
            max: hist.sample_max(),
            total_samples: total,
        }
    }

    /// The all-zero breakdown reported for an empty histogram.
    pub fn empty() -> Self {
        Self {
            min: 0,
            p5: 0,
            p10: 0,
            p15: 0,
            p20: 0,
            p25: 0,
            p30: 0,
            p35: 0,
            p40: 0,
            p45: 0,
            p50: 0,
            p55: 0,
            p60: 0,
            p65: 0,
            p70: 0,
            p75: 0,
            p80: 0,
            p85: 0,
            p90: 0,
            p95: 0,
            p99: 0,
            p999: 0,
            p9999: 0,
            max: 0,
            total_samples: 0,
        }
    }

    /// Is this breakdown backed by at least one observation?
    pub fn has_data(&self) -> bool {
        self.total_samples > 0
    }
}

/// Given a percentile `numerator/denominator`, returns the 1-indexed
/// sample number that overlaps the percentile line. At exact
/// boundaries the rank rounds down: 50% of 4 samples is sample 2,
/// where the percentile line runs between samples 2 and 3.
pub fn percentile_rank(total_samples: i64, numerator: i64, denominator: i64) -> i64 {
    1 + (total_samples * numerator - 1) / denominator
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_rounds_down_at_exact_boundaries() {
        // 50% of 4 samples lands on sample 2, not 3.
        assert_eq!(percentile_rank(4, 50, 100), 2);
        // 50% of 11 samples is 5.5 -> sample 6.
        assert_eq!(percentile_rank(11, 50, 100), 6);
        // A single sample is every percentile.
        assert_eq!(percentile_rank(1, 5, 100), 1);
        assert_eq!(percentile_rank(1, 9999, 10_000), 1);
        // The top percentile of a large run stays in range.
        assert_eq!(percentile_rank(60_002, 9999, 10_000), 59_996);
    }

    #[test]
    fn ranks_are_non_decreasing() {
        let ranks: Vec<i64> = FRACTIONS
            .iter()
            .map(|&(num, den)| percentile_rank(1_000_000, num, den))
            .collect();
        for pair in ranks.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
    }

    #[test]
    fn empty_has_no_data() {
        assert!(!Percentiles::empty().has_data());
        assert_eq!(Histogram::default().percentiles(), Percentiles::empty());
    }
}
