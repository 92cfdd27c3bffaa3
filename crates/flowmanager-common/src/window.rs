//! Rolling sample window and the IQR jitter statistic.
//!
//! Pre-allocated to its configured capacity at construction — no per-tick
//! allocation on the hot ingestion path (design note: "arena vs.
//! individual allocations").

use std::collections::VecDeque;

/// Minimum sample count before jitter is meaningful (spec §4.3.2);
/// also the threshold a caller must check per-app before a tick's
/// aggregation is allowed to RELEASE or THROTTLE (spec §4.3.7, §8).
pub const MIN_SAMPLES_FOR_JITTER: usize = 5;

/// A bounded FIFO of the most recent latency samples (ms) for one
/// critical application. Oldest sample evicted on overflow.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl RollingWindow {
    /// Creates a window pre-allocated to `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "window capacity must be >= 1");
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a new sample, evicting the oldest if at capacity.
    pub fn push(&mut self, sample_ms: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample_ms);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The interquartile-range jitter statistic, in milliseconds,
    /// rounded to at least three fractional digits.
    ///
    /// Returns 0.0 when fewer than 5 samples have been collected. This
    /// alone cannot distinguish "insufficient data" from "constant
    /// latency over a full window" — callers that need that
    /// distinction should also check `len() >= MIN_SAMPLES_FOR_JITTER`.
    pub fn jitter_iqr(&self) -> f64 {
        let n = self.samples.len();
        if n < MIN_SAMPLES_FOR_JITTER {
            return 0.0;
        }

        let mut sorted: Vec<f64> = self.samples.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).expect("samples must not be NaN"));

        let q1_idx = n / 4;
        let q3_idx = (3 * n) / 4;
        let q1 = sorted[q1_idx];
        let q3 = sorted[q3_idx];

        let iqr = (q3 - q1).max(0.0);
        round_to_millis(iqr)
    }

    /// The most recently pushed sample, if any.
    pub fn latest(&self) -> Option<f64> {
        self.samples.back().copied()
    }
}

/// Round to millisecond precision at >= 3 fractional digits.
fn round_to_millis(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_zero_below_five_samples() {
        let mut w = RollingWindow::new(20);
        for v in [1.0, 2.0, 3.0, 4.0] {
            w.push(v);
        }
        assert_eq!(w.jitter_iqr(), 0.0);
    }

    #[test]
    fn jitter_zero_for_constant_samples() {
        let mut w = RollingWindow::new(20);
        for _ in 0..20 {
            w.push(1.0);
        }
        assert_eq!(w.jitter_iqr(), 0.0);
    }

    #[test]
    fn jitter_matches_manual_iqr() {
        let mut w = RollingWindow::new(8);
        for v in [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0] {
            w.push(v);
        }
        // n=8: q1_idx=2 -> 3.0, q3_idx=6 -> 7.0, iqr=4.0
        assert_eq!(w.jitter_iqr(), 4.0);
    }

    #[test]
    fn jitter_insensitive_to_ordering() {
        let ascending = [1.0, 2.0, 3.0, 9.0, 20.0, 21.0, 22.0];
        let shuffled = [20.0, 1.0, 22.0, 3.0, 9.0, 21.0, 2.0];

        let mut wa = RollingWindow::new(7);
        for v in ascending {
            wa.push(v);
        }
        let mut wb = RollingWindow::new(7);
        for v in shuffled {
            wb.push(v);
        }
        assert_eq!(wa.jitter_iqr(), wb.jitter_iqr());
    }

    #[test]
    fn jitter_robust_to_outliers_in_outer_quartile() {
        let mut w = RollingWindow::new(100);
        for i in 0..100 {
            w.push(10.0 + (i as f64) * 0.01);
        }
        let before = w.jitter_iqr();

        // Push an arbitrarily large outlier; it evicts the smallest
        // sample and only shifts Q3 by at most one sample position.
        w.push(1_000_000.0);
        let after = w.jitter_iqr();

        assert!((after - before).abs() < 0.1, "before={before} after={after}");
    }

    #[test]
    fn window_evicts_oldest_on_overflow() {
        let mut w = RollingWindow::new(3);
        w.push(1.0);
        w.push(2.0);
        w.push(3.0);
        w.push(4.0);
        assert_eq!(w.len(), 3);
        assert_eq!(w.latest(), Some(4.0));
    }

    #[test]
    fn window_length_never_exceeds_capacity() {
        let mut w = RollingWindow::new(5);
        for i in 0..50 {
            w.push(i as f64);
            assert!(w.len() <= w.capacity());
        }
    }
}
