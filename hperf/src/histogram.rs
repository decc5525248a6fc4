use core::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Lock-free latency histogram with logarithmic buckets.
///
/// Bucket `i` holds values from `[f^i; f^(i+1))` microseconds, where `f` is
/// the growth factor. The first bucket also holds everything below `f`.
#[derive(Debug)]
pub struct LogHistogram {
    buckets: Vec<AtomicU64>,
    factor: f64,
    sum: AtomicU64,
    max: AtomicU64,
}

/// A group of adjacent histogram buckets, prepared for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bin {
    /// Lower bound in microseconds, inclusive.
    pub lower_us: u64,
    /// Upper bound in microseconds, exclusive.
    ///
    /// [`u64::MAX`] for the bin holding the last bucket, which also collects
    /// every value beyond the histogram range.
    pub upper_us: u64,
    pub count: u64,
}

impl Default for LogHistogram {
    fn default() -> Self {
        let mut buckets = Vec::new();
        let max = 60000000.0; // 60s
        let factor = 1.5;
        let mut curr = 1.0;
        while curr < max {
            buckets.push(AtomicU64::new(0));
            curr *= factor;
        }

        Self {
            buckets,
            factor,
            sum: AtomicU64::new(0),
            max: AtomicU64::new(0),
        }
    }
}

impl LogHistogram {
    #[inline]
    pub fn record(&self, us: u64) {
        let idx = (us as f64).log(self.factor) as usize;
        let idx = idx.min(self.buckets.len() - 1);
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
        self.sum.fetch_add(us, Ordering::Relaxed);
        self.max.fetch_max(us, Ordering::Relaxed);
    }

    #[inline]
    fn snapshot(&self) -> Vec<u64> {
        self.buckets.iter().map(|v| v.load(Ordering::Relaxed)).collect()
    }

    /// Returns the number of recorded values.
    #[inline]
    pub fn count(&self) -> u64 {
        self.buckets.iter().map(|v| v.load(Ordering::Relaxed)).sum()
    }

    /// Returns the arithmetic mean of recorded values, in microseconds.
    pub fn mean(&self) -> f64 {
        match self.count() {
            0 => 0.0,
            n => self.sum.load(Ordering::Relaxed) as f64 / n as f64,
        }
    }

    /// Returns the maximum recorded value, in microseconds.
    #[inline]
    pub fn max(&self) -> u64 {
        self.max.load(Ordering::Relaxed)
    }

    /// Calculates the quantile.
    ///
    /// For given quantile "q" have to find the first index "i",
    /// where sum[i] + b[i] >= q * sum[N].
    /// Thus, we can guarantee that sum[i] values are under the given
    /// quantile, so the corresponding bucket upper bound "f^i" is a valid
    /// answer.
    ///
    /// The result is improved by linear interpolation in logarithmic
    /// coordinates by base "f" between (i, sum[i]) and (i+1, sum[i+1]).
    /// Since sum[i+1] = sum[i] + b[i], the slope is "b[i]" and the
    /// pseudo-index is:
    ///
    /// x = (q * sum[N] - (sum[i] - b[i] * i)) / b[i]
    ///
    /// The result is "f^x" after returning to normal coordinates.
    ///
    /// Returns zero for an empty histogram.
    pub fn quantile(&self, q: f64) -> u64 {
        assert!((0.0..=1.0).contains(&q));

        let snapshot = self.snapshot();
        let size: u64 = snapshot.iter().sum();
        if size == 0 {
            return 0;
        }

        let mut sum = 0;
        for (idx, &b) in snapshot.iter().enumerate() {
            if ((sum + b) as f64) >= q * (size as f64) {
                if b == 0 {
                    return 0;
                }

                let idx = idx as f64;
                let b = b as f64;
                let sum = sum as f64;
                let size = size as f64;
                let c_inv = |q: f64| self.factor.powf((q * size - sum) / b + idx);

                return c_inv(q) as u64;
            }
            sum += b;
        }

        u64::MAX
    }

    /// Groups non-empty range of buckets into at most `n` bins of equal
    /// width in buckets.
    pub fn bins(&self, n: usize) -> Vec<Bin> {
        let snapshot = self.snapshot();

        let (Some(first), Some(last)) = (
            snapshot.iter().position(|&v| v > 0),
            snapshot.iter().rposition(|&v| v > 0),
        ) else {
            return Vec::new();
        };
        if n == 0 {
            return Vec::new();
        }

        let width = (last - first + 1).div_ceil(n);

        snapshot[first..=last]
            .chunks(width)
            .enumerate()
            .map(|(idx, chunk)| {
                let lo = first + idx * width;
                let hi = lo + chunk.len();

                Bin {
                    lower_us: self.lower_bound(lo),
                    upper_us: self.upper_bound(hi),
                    count: chunk.iter().sum(),
                }
            })
            .collect()
    }

    #[inline]
    fn upper_bound(&self, idx: usize) -> u64 {
        if idx >= self.buckets.len() {
            u64::MAX
        } else {
            self.lower_bound(idx)
        }
    }

    #[inline]
    fn lower_bound(&self, idx: usize) -> u64 {
        match idx {
            0 => 0,
            idx => self.factor.powi(idx as i32).ceil() as u64,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_zero_quantile() {
        let h = LogHistogram::default();
        h.record(1000);
        assert_eq!(0, h.quantile(0.0));
    }

    #[test]
    fn test_empty() {
        let h = LogHistogram::default();
        assert_eq!(0, h.count());
        assert_eq!(0, h.quantile(0.5));
        assert_eq!(0.0, h.mean());
        assert!(h.bins(15).is_empty());
    }

    #[test]
    fn test_low_bound_quantile() {
        let cases: &[(u64, u64, u64)] = &[(213, 151, 36), (319, 57, 24), (182, 12, 6)];
        for &(a, b, c) in cases {
            let h = LogHistogram::default();
            for _ in 0..a {
                h.record(0);
            }
            for _ in 0..b {
                h.record(1000);
            }
            for _ in 0..c {
                h.record(100000);
            }

            assert_eq!(h.quantile(0.10), 1);
            assert_eq!(h.quantile(0.50), 1);
        }
    }

    #[test]
    fn test_quantile_is_monotonic() {
        let h = LogHistogram::default();
        for us in 1..=10000 {
            h.record(us);
        }

        let p50 = h.quantile(0.5);
        let p90 = h.quantile(0.9);
        let p99 = h.quantile(0.99);
        assert!(p50 <= p90 && p90 <= p99, "{p50} {p90} {p99}");
        assert!((3000..=7500).contains(&p50), "{p50}");
    }

    #[test]
    fn test_mean_and_max() {
        let h = LogHistogram::default();
        h.record(100);
        h.record(300);

        assert_eq!(2, h.count());
        assert_eq!(200.0, h.mean());
        assert_eq!(300, h.max());
    }

    #[test]
    fn test_last_bin_is_open_ended() {
        let h = LogHistogram::default();
        h.record(1000);
        h.record(120_000_000);

        let bins = h.bins(3);
        assert_eq!(2, bins.iter().map(|v| v.count).sum::<u64>());
        assert_eq!(u64::MAX, bins[bins.len() - 1].upper_us);
        assert!(bins[0].upper_us < u64::MAX);
    }

    #[test]
    fn test_bins_cover_all_values() {
        let h = LogHistogram::default();
        for us in [5, 50, 500, 5000, 50000] {
            for _ in 0..3 {
                h.record(us);
            }
        }

        let bins = h.bins(4);
        assert!(!bins.is_empty() && bins.len() <= 4);
        assert_eq!(15, bins.iter().map(|v| v.count).sum::<u64>());
        assert!(bins[0].lower_us <= 5);
        assert!(bins[bins.len() - 1].upper_us > 50000);

        for pair in bins.windows(2) {
            assert_eq!(pair[0].upper_us, pair[1].lower_us);
        }
    }
}
