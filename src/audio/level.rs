//! Level estimation
//!
//! Turns one frame of time-domain samples into a single decibel-like value:
//!
//! ```text
//! rms   = sqrt(mean(x²))
//! level = clamp(20 · log10(rms + ε) + C, 0, 120)
//! ```
//!
//! `C` is a fixed calibration offset (94 by default) that lifts dBFS onto a
//! scale resembling sound pressure level. It is not a true SPL calibration:
//! the result depends on the microphone gain. `ε` keeps silent frames finite,
//! which makes [`LevelEstimator::estimate`] total over every input.

use crate::constants::{CALIBRATION_OFFSET_DB, LEVEL_EPSILON, LEVEL_MAX_DB, LEVEL_MIN_DB};

/// Frame-to-level converter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelEstimator {
    /// Offset added to the dBFS value
    pub calibration_offset_db: f64,

    /// Guard added to the RMS before the logarithm
    pub epsilon: f64,
}

impl Default for LevelEstimator {
    fn default() -> Self {
        Self::new(CALIBRATION_OFFSET_DB)
    }
}

impl LevelEstimator {
    /// Create an estimator with the given calibration offset
    pub fn new(calibration_offset_db: f64) -> Self {
        Self {
            calibration_offset_db,
            epsilon: LEVEL_EPSILON,
        }
    }

    /// Estimate the level of one frame, always within `[0, 120]`
    pub fn estimate(&self, frame: &[f32]) -> f64 {
        self.level_from_rms(rms(frame))
    }

    /// Convert an RMS amplitude to the clamped level scale
    pub fn level_from_rms(&self, rms: f64) -> f64 {
        let level = 20.0 * (rms + self.epsilon).log10() + self.calibration_offset_db;

        // NaN only appears for non-finite samples; treat those as the floor
        if level.is_nan() {
            return LEVEL_MIN_DB;
        }
        level.clamp(LEVEL_MIN_DB, LEVEL_MAX_DB)
    }
}

/// Root-mean-square amplitude of a frame, 0 for an empty frame
#[inline]
pub fn rms(frame: &[f32]) -> f64 {
    if frame.is_empty() {
        return 0.0;
    }

    let energy: f64 = frame.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    (energy / frame.len() as f64).sqrt()
}

/// Round to one decimal place for publication
#[inline]
pub fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
