//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::clock::ClockKind;
use crate::constants::*;
use crate::session::EngineSettings;

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    /// Audio input configuration
    pub audio: AudioConfig,

    /// Measurement configuration
    pub meter: MeasurementConfig,

    /// Console output configuration
    pub display: DisplayConfig,
}

/// Audio input configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Input device name (default input when unset)
    pub device: Option<String>,

    /// Samples per analysis frame
    pub frame_size: usize,

    /// Offset added to dBFS
    pub calibration_offset_db: f64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            frame_size: DEFAULT_FRAME_SIZE,
            calibration_offset_db: CALIBRATION_OFFSET_DB,
        }
    }
}

/// Measurement configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementConfig {
    /// Rolling statistics window in milliseconds
    pub window_ms: u64,

    /// Spacing between history entries in milliseconds
    pub history_interval_ms: u64,

    /// Number of history entries
    pub history_length: usize,

    /// Update loop rate
    pub tick_rate_hz: u32,

    /// Timestamp source
    pub clock: ClockKind,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            window_ms: WINDOW_MS,
            history_interval_ms: HISTORY_INTERVAL_MS,
            history_length: HISTORY_LENGTH,
            tick_rate_hz: TICK_RATE_HZ,
            clock: ClockKind::Monotonic,
        }
    }
}

/// Console output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Print snapshots as JSON lines instead of a readout
    pub json: bool,

    /// Minimum time between two printed lines
    pub print_interval_ms: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            json: false,
            print_interval_ms: DEFAULT_PRINT_INTERVAL_MS,
        }
    }
}

impl MeterConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise return defaults
    pub fn load_or_default(path: &Path) -> crate::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "sound-level-meter", "sound-meter")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.audio.frame_size == 0 {
            return Err(crate::Error::Config("audio.frame_size must be greater than 0".into()));
        }
        if !self.audio.calibration_offset_db.is_finite() {
            return Err(crate::Error::Config("audio.calibration_offset_db must be finite".into()));
        }
        if self.meter.window_ms == 0 {
            return Err(crate::Error::Config("meter.window_ms must be greater than 0".into()));
        }
        if self.meter.history_interval_ms == 0 || self.meter.history_length == 0 {
            return Err(crate::Error::Config(
                "meter.history_interval_ms and meter.history_length must be greater than 0".into(),
            ));
        }
        if !(1..=1000).contains(&self.meter.tick_rate_hz) {
            return Err(crate::Error::Config(format!(
                "meter.tick_rate_hz must be between 1 and 1000, got {}",
                self.meter.tick_rate_hz
            )));
        }
        Ok(())
    }

    /// Engine tunables derived from this configuration
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            frame_size: self.audio.frame_size,
            calibration_offset_db: self.audio.calibration_offset_db,
            window_ms: self.meter.window_ms,
            history_interval_ms: self.meter.history_interval_ms,
            history_length: self.meter.history_length,
        }
    }
}
