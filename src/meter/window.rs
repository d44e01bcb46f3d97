//! Rolling window statistics
//!
//! Keeps the measurements of the last `window_ms` milliseconds and derives
//! max/min/avg over them. Entries are evicted from the front on every push,
//! so the window is only as fresh as the latest push.
//!
//! The window covers `(now - window_ms, now]`: a measurement exactly
//! `window_ms` old is already gone. With one push per second and a 10 s
//! window this keeps exactly ten measurements.
//!
//! Timestamps are expected to be non-decreasing. If a clock steps backwards,
//! eviction still only looks at the front, so older entries pushed after a
//! newer one can linger until everything in front of them expires.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::audio::level::round_to_tenth;

/// One level reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    /// Milliseconds on the session clock
    pub timestamp: u64,
    /// Level in `[0, 120]`
    pub level: f64,
}

/// Summary of the window contents
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowStats {
    pub max: f64,
    pub min: f64,
    pub avg: f64,
}

impl WindowStats {
    /// Copy with every value rounded to one decimal
    pub fn rounded(&self) -> Self {
        Self {
            max: round_to_tenth(self.max),
            min: round_to_tenth(self.min),
            avg: round_to_tenth(self.avg),
        }
    }
}

/// Time-bounded buffer of recent measurements
#[derive(Debug, Clone)]
pub struct RollingWindow {
    entries: VecDeque<Measurement>,
    window_ms: u64,
}

impl RollingWindow {
    pub fn new(window_ms: u64) -> Self {
        Self {
            entries: VecDeque::new(),
            window_ms,
        }
    }

    /// Record a level and drop everything that fell out of the window
    pub fn push(&mut self, level: f64, now: u64) {
        self.entries.push_back(Measurement { timestamp: now, level });
        self.evict(now);
    }

    fn evict(&mut self, now: u64) {
        // Nothing can be old enough before the clock has run a full window
        let Some(cutoff) = now.checked_sub(self.window_ms) else {
            return;
        };

        while let Some(front) = self.entries.front() {
            if front.timestamp > cutoff {
                break;
            }
            self.entries.pop_front();
        }
    }

    /// Raw max/min/avg over the current contents, zeros when empty
    pub fn stats(&self) -> WindowStats {
        if self.entries.is_empty() {
            return WindowStats::default();
        }

        let mut max = f64::MIN;
        let mut min = f64::MAX;
        let mut sum = 0.0;
        for m in &self.entries {
            max = max.max(m.level);
            min = min.min(m.level);
            sum += m.level;
        }

        WindowStats {
            max,
            min,
            avg: sum / self.entries.len() as f64,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Measurement> {
        self.entries.iter()
    }

    /// Most recent measurement
    pub fn latest(&self) -> Option<&Measurement> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_eleven_pushes_keep_ten() {
        let mut window = RollingWindow::new(10_000);
        for i in 0..=10u64 {
            window.push(50.0, i * 1_000);
        }

        assert_eq!(window.len(), 10);
        assert_eq!(window.iter().next().unwrap().timestamp, 1_000);
        assert_eq!(window.latest().unwrap().timestamp, 10_000);
    }

    #[test]
    fn test_no_eviction_before_first_full_window() {
        let mut window = RollingWindow::new(10_000);
        window.push(40.0, 0);
        window.push(41.0, 9_999);
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn test_stats_over_three_levels() {
        let mut window = RollingWindow::new(10_000);
        window.push(40.0, 100);
        window.push(60.0, 200);
        window.push(80.0, 300);

        let stats = window.stats().rounded();
        assert_eq!(stats.max, 80.0);
        assert_eq!(stats.min, 40.0);
        assert_eq!(stats.avg, 60.0);
    }

    #[test]
    fn test_empty_stats_are_zero() {
        let window = RollingWindow::new(10_000);
        assert_eq!(window.stats(), WindowStats { max: 0.0, min: 0.0, avg: 0.0 });
    }

    #[test]
    fn test_rounding_only_on_publication() {
        let mut window = RollingWindow::new(10_000);
        window.push(60.04, 0);
        window.push(60.04, 1);
        window.push(60.07, 2);

        // Raw avg is 60.05, not the avg of rounded values (60.033)
        let raw = window.stats();
        assert!((raw.avg - 60.05).abs() < 1e-9);
        assert_eq!(raw.rounded().max, 60.1);
        assert_eq!(raw.rounded().min, 60.0);
    }

    #[test]
    fn test_single_push_after_gap_evicts_everything_else() {
        let mut window = RollingWindow::new(10_000);
        window.push(30.0, 0);
        window.push(35.0, 500);
        window.push(90.0, 60_000);

        assert_eq!(window.len(), 1);
        let stats = window.stats();
        assert_eq!(stats.max, 90.0);
        assert_eq!(stats.min, 90.0);
    }

    #[test]
    fn test_clear() {
        let mut window = RollingWindow::new(10_000);
        window.push(70.0, 10);
        window.clear();
        assert!(window.is_empty());
        assert_eq!(window.stats(), WindowStats::default());
    }

    proptest! {
        #[test]
        fn prop_window_holds_only_recent(steps in prop::collection::vec((0u64..3_000, 0.0f64..120.0), 1..200)) {
            let mut window = RollingWindow::new(10_000);
            let mut now = 0u64;
            for (dt, level) in steps {
                now += dt;
                window.push(level, now);

                let latest = window.latest().unwrap().timestamp;
                prop_assert_eq!(latest, now);
                for m in window.iter() {
                    prop_assert!(m.timestamp + 10_000 > now || now < 10_000);
                }

                let stats = window.stats();
                prop_assert!(stats.min <= stats.avg + 1e-9);
                prop_assert!(stats.avg <= stats.max + 1e-9);
            }
        }
    }
}
