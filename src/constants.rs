//! Default values shared by the engine and the configuration layer

use std::time::Duration;

/// Samples per analysis frame
pub const DEFAULT_FRAME_SIZE: usize = 2048;

/// Offset added to dBFS to get a reading on an SPL-like scale
pub const CALIBRATION_OFFSET_DB: f64 = 94.0;

/// Added to the RMS before taking the logarithm so silence stays finite
pub const LEVEL_EPSILON: f64 = 1e-10;

/// Lowest reported level
pub const LEVEL_MIN_DB: f64 = 0.0;

/// Highest reported level
pub const LEVEL_MAX_DB: f64 = 120.0;

/// Length of the rolling statistics window in milliseconds
pub const WINDOW_MS: u64 = 10_000;

/// Minimum spacing between two history entries in milliseconds
pub const HISTORY_INTERVAL_MS: u64 = 500;

/// Number of entries kept in the history trace (30 s at 500 ms)
pub const HISTORY_LENGTH: usize = 60;

/// Update loop rate
pub const TICK_RATE_HZ: u32 = 60;

/// How long to wait for the capture thread to open the input stream
pub const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Capacity of the stream error queue between the audio callback and the engine
pub const CAPTURE_ERROR_QUEUE: usize = 16;

/// Console refresh interval of the binary in milliseconds
pub const DEFAULT_PRINT_INTERVAL_MS: u64 = 250;
