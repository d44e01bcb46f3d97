//! Published meter state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::meter::WindowStats;

/// Window statistics plus the elapsed session time
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub max: f64,
    pub min: f64,
    pub avg: f64,
    /// Whole seconds since the session started or was last reset
    pub duration_seconds: u64,
}

impl SessionStats {
    pub fn new(window: WindowStats, duration_seconds: u64) -> Self {
        Self {
            max: window.max,
            min: window.min,
            avg: window.avg,
            duration_seconds,
        }
    }
}

/// Immutable view of the engine after an update
///
/// Statistics are rounded to one decimal; `level` is the raw estimate of the
/// latest frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterSnapshot {
    /// Level of the most recent frame
    pub level: f64,

    /// Whether a session is running
    pub active: bool,

    /// Message of the last acquisition or device error
    pub error: Option<String>,

    /// Sampled levels of the last 30 seconds, oldest first
    pub trace: Vec<f64>,

    /// Rolling window statistics with the session duration
    pub stats: SessionStats,

    /// Rolling window statistics
    pub recent_stats: WindowStats,

    /// Identifier of the current or last session
    pub session_id: Option<Uuid>,

    /// Wall-clock time the current or last session started
    pub started_at: Option<DateTime<Utc>>,
}
