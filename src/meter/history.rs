//! Fixed-cadence history trace
//!
//! Decimates the per-tick level stream into one entry every `interval_ms`,
//! keeping at most `capacity` entries. The trace therefore always spans
//! `capacity × interval_ms` regardless of how fast the update loop runs.

use std::collections::VecDeque;

/// Fixed-length FIFO of sampled levels
#[derive(Debug, Clone)]
pub struct HistorySampler {
    trace: VecDeque<f64>,
    capacity: usize,
    interval_ms: u64,

    /// Time of the last append, or of the last reset
    last_sampled_at: u64,
}

impl HistorySampler {
    /// Create an empty trace whose first entry is due `interval_ms` after `now`
    pub fn new(capacity: usize, interval_ms: u64, now: u64) -> Self {
        Self {
            trace: VecDeque::with_capacity(capacity),
            capacity,
            interval_ms,
            last_sampled_at: now,
        }
    }

    /// Append `level` if at least one interval passed since the last append
    ///
    /// Returns whether the level was recorded.
    pub fn maybe_sample(&mut self, level: f64, now: u64) -> bool {
        if now.saturating_sub(self.last_sampled_at) < self.interval_ms {
            return false;
        }

        self.trace.push_back(level);
        while self.trace.len() > self.capacity {
            self.trace.pop_front();
        }
        self.last_sampled_at = now;
        true
    }

    /// Copy of the trace, oldest first
    pub fn trace(&self) -> Vec<f64> {
        self.trace.iter().copied().collect()
    }

    /// Empty the trace and restart the cadence at `now`
    pub fn reset(&mut self, now: u64) {
        self.trace.clear();
        self.last_sampled_at = now;
    }

    pub fn len(&self) -> usize {
        self.trace.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trace.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Time span covered by a full trace
    pub fn span_ms(&self) -> u64 {
        self.capacity as u64 * self.interval_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sixty_hz_ticks_for_31_seconds() {
        let mut history = HistorySampler::new(60, 500, 0);
        let mut last_append = 0u64;
        let mut now = 0u64;

        while now <= 31_000 {
            let before = history.len();
            let appended = history.maybe_sample(42.0, now);

            if appended {
                assert!(now - last_append >= 500);
                last_append = now;
            } else {
                assert_eq!(history.len(), before);
            }
            assert!(history.len() <= 60);
            now += 16;
        }

        assert_eq!(history.len(), 60);

        // Stays at capacity from here on
        for _ in 0..200 {
            history.maybe_sample(43.0, now);
            now += 16;
        }
        assert_eq!(history.len(), 60);
    }

    #[test]
    fn test_first_sample_waits_one_interval() {
        let mut history = HistorySampler::new(60, 500, 1_000);
        assert!(!history.maybe_sample(50.0, 1_000));
        assert!(!history.maybe_sample(50.0, 1_499));
        assert!(history.maybe_sample(51.0, 1_500));
        assert_eq!(history.trace(), vec![51.0]);
    }

    #[test]
    fn test_fifo_drops_oldest() {
        let mut history = HistorySampler::new(3, 10, 0);
        for (i, level) in [1.0, 2.0, 3.0, 4.0, 5.0].into_iter().enumerate() {
            history.maybe_sample(level, (i as u64 + 1) * 10);
        }
        assert_eq!(history.trace(), vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_independent_of_tick_rate() {
        let mut fast = HistorySampler::new(60, 500, 0);
        let mut slow = HistorySampler::new(60, 500, 0);

        for t in (0..=10_000).step_by(5) {
            fast.maybe_sample(60.0, t);
        }
        for t in (0..=10_000).step_by(100) {
            slow.maybe_sample(60.0, t);
        }

        assert_eq!(fast.len(), 20);
        assert_eq!(slow.len(), 20);
    }

    #[test]
    fn test_reset_restarts_cadence() {
        let mut history = HistorySampler::new(60, 500, 0);
        history.maybe_sample(70.0, 500);
        history.reset(2_000);

        assert!(history.is_empty());
        assert!(!history.maybe_sample(70.0, 2_100));
        assert!(history.maybe_sample(70.0, 2_500));
        assert_eq!(history.span_ms(), 30_000);
    }
}
