//! Session state machine
//!
//! [`MeterEngine`] owns the input device and every piece of mutable session
//! state. It is synchronous: the caller decides when to tick. Each tick reads
//! one frame, estimates its level, feeds the rolling window and the history
//! sampler, and rebuilds the published snapshot.
//!
//! Ticks carry a ticket issued by [`MeterEngine::start`]. Stopping (or losing
//! the device) revokes the ticket, so a tick scheduled before the stop can no
//! longer touch the session once `stop` has returned.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::audio::level::LevelEstimator;
use crate::audio::source::{AudioSource, InputHandle};
use crate::clock::Clock;
use crate::constants::*;
use crate::error::AudioError;
use crate::meter::{HistorySampler, RollingWindow};
use crate::session::snapshot::{MeterSnapshot, SessionStats};

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No device held, no ticks
    Idle,
    /// Device open, ticking
    Active,
}

/// Tunables of the measurement pipeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    /// Samples per analysis frame
    pub frame_size: usize,

    /// Offset added to dBFS
    pub calibration_offset_db: f64,

    /// Rolling window length
    pub window_ms: u64,

    /// History cadence
    pub history_interval_ms: u64,

    /// History capacity
    pub history_length: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            frame_size: DEFAULT_FRAME_SIZE,
            calibration_offset_db: CALIBRATION_OFFSET_DB,
            window_ms: WINDOW_MS,
            history_interval_ms: HISTORY_INTERVAL_MS,
            history_length: HISTORY_LENGTH,
        }
    }
}

/// Sampling and aggregation engine for one input source
pub struct MeterEngine<S: AudioSource> {
    /// Input capability
    source: S,

    /// Open device while active
    handle: Option<S::Handle>,

    /// Timestamp source
    clock: Arc<dyn Clock>,

    /// Frame-to-level conversion
    estimator: LevelEstimator,

    /// Reused frame storage
    frame: Vec<f32>,

    /// Last `window_ms` of measurements
    window: RollingWindow,

    /// 30 s history
    history: HistorySampler,

    /// Current state
    state: SessionState,

    /// Duration baseline (clock ms)
    started_at: u64,

    /// Elapsed whole seconds as of the last tick
    duration_seconds: u64,

    /// Level of the latest frame
    last_level: f64,

    /// Ticket of the current run; bumped on start, stop and device loss
    ticket: u64,

    /// Session identifier for logs and consumers
    session_id: Option<Uuid>,

    /// Wall-clock session start
    started_wall: Option<DateTime<Utc>>,

    /// Last user-visible error
    error: Option<String>,

    /// Latest published state
    snapshot: MeterSnapshot,
}

impl<S: AudioSource> MeterEngine<S> {
    /// Create an idle engine
    pub fn new(source: S, clock: Arc<dyn Clock>, settings: EngineSettings) -> Self {
        let now = clock.now_ms();

        Self {
            source,
            handle: None,
            clock,
            estimator: LevelEstimator::new(settings.calibration_offset_db),
            frame: vec![0.0; settings.frame_size.max(1)],
            window: RollingWindow::new(settings.window_ms),
            history: HistorySampler::new(settings.history_length, settings.history_interval_ms, now),
            state: SessionState::Idle,
            started_at: now,
            duration_seconds: 0,
            last_level: 0.0,
            ticket: 0,
            session_id: None,
            started_wall: None,
            error: None,
            snapshot: MeterSnapshot::default(),
        }
    }

    /// Acquire the device and begin a fresh session
    ///
    /// Returns the ticket that [`tick`](Self::tick) must be called with. Starting
    /// an active engine is a no-op that returns the current ticket. On failure
    /// the engine stays idle, the error message lands on the snapshot and
    /// nothing else changes.
    pub fn start(&mut self) -> Result<u64, AudioError> {
        if self.state == SessionState::Active {
            return Ok(self.ticket);
        }

        let handle = match self.source.acquire() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!("Failed to acquire {}: {}", self.source.describe(), e);
                self.error = Some(e.to_string());
                self.refresh_snapshot();
                return Err(e);
            }
        };

        let now = self.clock.now_ms();
        self.handle = Some(handle);
        self.clear_measurements(now);
        self.error = None;
        self.session_id = Some(Uuid::new_v4());
        self.started_wall = Some(Utc::now());
        self.ticket = self.ticket.wrapping_add(1);
        self.state = SessionState::Active;

        tracing::info!(
            session = %self.session_id.unwrap_or_default(),
            "Session started on {}",
            self.source.describe()
        );

        self.refresh_snapshot();
        Ok(self.ticket)
    }

    /// Run one measurement step
    ///
    /// Returns `None` when idle or when `ticket` has been revoked; the caller
    /// should stop ticking. A device failure ends the session and returns the
    /// resulting idle snapshot.
    pub fn tick(&mut self, ticket: u64) -> Option<&MeterSnapshot> {
        if self.state != SessionState::Active || ticket != self.ticket {
            return None;
        }

        let read = match self.handle.as_mut() {
            Some(handle) => handle.read_frame(&mut self.frame),
            None => Err(AudioError::DeviceUnavailable("no open input handle".into())),
        };

        if let Err(e) = read {
            self.on_device_lost(e);
            return Some(&self.snapshot);
        }

        let level = self.estimator.estimate(&self.frame);
        let now = self.clock.now_ms();

        self.window.push(level, now);
        self.history.maybe_sample(level, now);
        self.last_level = level;
        self.duration_seconds = now.saturating_sub(self.started_at) / 1000;

        self.refresh_snapshot();
        Some(&self.snapshot)
    }

    /// Stop ticking and release the device
    ///
    /// Safe to call repeatedly. The last numbers stay on the snapshot with
    /// `active = false`. Returns whether a session was actually stopped.
    pub fn stop(&mut self) -> bool {
        self.ticket = self.ticket.wrapping_add(1);

        if let Some(mut handle) = self.handle.take() {
            handle.release();
        }

        let was_active = self.state == SessionState::Active;
        self.state = SessionState::Idle;

        if was_active {
            tracing::info!(
                session = %self.session_id.unwrap_or_default(),
                "Session stopped after {}s",
                self.duration_seconds
            );
        }

        self.refresh_snapshot();
        was_active
    }

    /// Clear statistics, trace and duration without touching the device
    pub fn reset(&mut self) {
        let now = self.clock.now_ms();
        self.clear_measurements(now);

        let active = self.state == SessionState::Active;
        tracing::info!(active, "Measurements reset");
        self.refresh_snapshot();
    }

    fn clear_measurements(&mut self, now: u64) {
        self.window.clear();
        self.history.reset(now);
        self.started_at = now;
        self.duration_seconds = 0;
    }

    fn on_device_lost(&mut self, err: AudioError) {
        tracing::warn!(
            session = %self.session_id.unwrap_or_default(),
            "Input lost mid-session: {}",
            err
        );

        self.ticket = self.ticket.wrapping_add(1);
        if let Some(mut handle) = self.handle.take() {
            handle.release();
        }
        self.state = SessionState::Idle;
        self.error = Some(err.to_string());
        self.refresh_snapshot();
    }

    fn refresh_snapshot(&mut self) {
        let recent = self.window.stats().rounded();

        self.snapshot = MeterSnapshot {
            level: self.last_level,
            active: self.state == SessionState::Active,
            error: self.error.clone(),
            trace: self.history.trace(),
            stats: SessionStats::new(recent, self.duration_seconds),
            recent_stats: recent,
            session_id: self.session_id,
            started_at: self.started_wall,
        };
    }

    /// Latest published state
    pub fn snapshot(&self) -> &MeterSnapshot {
        &self.snapshot
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Ticket of the current run
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    /// Get the input source
    pub fn source(&self) -> &S {
        &self.source
    }
}

impl<S: AudioSource> Drop for MeterEngine<S> {
    fn drop(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::level::round_to_tenth;
    use crate::audio::synthetic::{SyntheticAccess, SyntheticSignal, SyntheticSource};
    use crate::clock::ManualClock;
    use crate::meter::WindowStats;
    use std::sync::atomic::Ordering;

    fn engine_with(source: SyntheticSource) -> (MeterEngine<SyntheticSource>, ManualClock) {
        let clock = ManualClock::new(0);
        let engine = MeterEngine::new(source, Arc::new(clock.clone()), EngineSettings::default());
        (engine, clock)
    }

    fn expected_level(rms: f64) -> f64 {
        (20.0 * (rms + LEVEL_EPSILON).log10() + CALIBRATION_OFFSET_DB).clamp(0.0, 120.0)
    }

    #[test]
    fn test_one_tick_end_to_end() {
        let source = SyntheticSource::new(SyntheticSignal::Constant(0.05));
        let (mut engine, clock) = engine_with(source);

        let ticket = engine.start().unwrap();
        clock.advance(16);
        let snapshot = engine.tick(ticket).unwrap().clone();

        let expected = expected_level(f64::from(0.05f32));
        assert!((snapshot.level - expected).abs() < 1e-9);
        assert_eq!(snapshot.recent_stats.avg, round_to_tenth(expected));
        assert_eq!(snapshot.recent_stats.max, round_to_tenth(expected));
        assert!(snapshot.active);
        assert!(snapshot.error.is_none());
        assert!(snapshot.session_id.is_some());
    }

    #[test]
    fn test_start_resets_previous_session() {
        let source = SyntheticSource::new(SyntheticSignal::Constant(0.1));
        let (mut engine, clock) = engine_with(source);

        let ticket = engine.start().unwrap();
        for _ in 0..40 {
            clock.advance(16);
            engine.tick(ticket);
        }
        assert!(!engine.snapshot().trace.is_empty());
        engine.stop();

        clock.advance(5_000);
        engine.start().unwrap();
        let snapshot = engine.snapshot();
        assert!(snapshot.trace.is_empty());
        assert_eq!(snapshot.recent_stats, WindowStats::default());
        assert_eq!(snapshot.stats.duration_seconds, 0);
    }

    #[test]
    fn test_start_while_active_is_noop() {
        let source = SyntheticSource::new(SyntheticSignal::Silence);
        let (mut engine, _clock) = engine_with(source);

        let first = engine.start().unwrap();
        let second = engine.start().unwrap();
        assert_eq!(first, second);
        assert_eq!(engine.source().acquisitions(), 1);
    }

    #[test]
    fn test_stop_twice_is_noop() {
        let source = SyntheticSource::new(SyntheticSignal::Constant(0.1));
        let open = source.open_counter();
        let (mut engine, clock) = engine_with(source);

        let ticket = engine.start().unwrap();
        clock.advance(16);
        engine.tick(ticket);

        assert!(engine.stop());
        let after_first = engine.snapshot().clone();
        assert!(!engine.stop());

        assert_eq!(engine.snapshot(), &after_first);
        assert_eq!(open.load(Ordering::SeqCst), 0);
        assert_eq!(engine.state(), SessionState::Idle);
    }

    #[test]
    fn test_stop_keeps_last_numbers_visible() {
        let source = SyntheticSource::new(SyntheticSignal::Constant(0.1));
        let (mut engine, clock) = engine_with(source);

        let ticket = engine.start().unwrap();
        clock.advance(1_200);
        let level = engine.tick(ticket).unwrap().level;
        engine.stop();

        let snapshot = engine.snapshot();
        assert!(!snapshot.active);
        assert_eq!(snapshot.level, level);
        assert_eq!(snapshot.recent_stats.avg, 74.0);
        assert_eq!(snapshot.stats.duration_seconds, 1);
    }

    #[test]
    fn test_revoked_ticket_cannot_tick() {
        let source = SyntheticSource::new(SyntheticSignal::Constant(0.1));
        let reads = source.read_counter();
        let (mut engine, _clock) = engine_with(source);

        let old_ticket = engine.start().unwrap();
        engine.stop();
        assert!(engine.tick(old_ticket).is_none());

        // A new session does not honour the previous run's ticket either
        let new_ticket = engine.start().unwrap();
        assert_ne!(old_ticket, new_ticket);
        assert!(engine.tick(old_ticket).is_none());
        assert!(engine.tick(new_ticket).is_some());
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reset_while_idle() {
        let source = SyntheticSource::new(SyntheticSignal::Constant(0.1));
        let (mut engine, clock) = engine_with(source);

        let ticket = engine.start().unwrap();
        for _ in 0..100 {
            clock.advance(16);
            engine.tick(ticket);
        }
        engine.stop();

        engine.reset();
        let snapshot = engine.snapshot();
        assert!(!snapshot.active);
        assert!(snapshot.trace.is_empty());
        assert_eq!(snapshot.stats, SessionStats::default());
        assert_eq!(snapshot.recent_stats, WindowStats::default());
    }

    #[test]
    fn test_reset_while_active_keeps_device() {
        let source = SyntheticSource::new(SyntheticSignal::Constant(0.1));
        let open = source.open_counter();
        let (mut engine, clock) = engine_with(source);

        let ticket = engine.start().unwrap();
        clock.advance(3_000);
        engine.tick(ticket);
        assert_eq!(engine.snapshot().stats.duration_seconds, 3);

        engine.reset();
        assert!(engine.is_active());
        assert_eq!(open.load(Ordering::SeqCst), 1);
        assert_eq!(engine.snapshot().stats.duration_seconds, 0);

        // Same ticket keeps working and the duration restarts from the reset
        clock.advance(2_500);
        let snapshot = engine.tick(ticket).unwrap();
        assert_eq!(snapshot.stats.duration_seconds, 2);
        assert_eq!(snapshot.trace.len(), 1);
    }

    #[test]
    fn test_permission_denied_stays_idle() {
        let source = SyntheticSource::new(SyntheticSignal::Silence).with_access(SyntheticAccess::Denied);
        let (mut engine, _clock) = engine_with(source);

        let err = engine.start().unwrap_err();
        assert!(matches!(err, AudioError::PermissionDenied(_)));
        assert_eq!(engine.state(), SessionState::Idle);

        let snapshot = engine.snapshot();
        assert!(!snapshot.active);
        assert_eq!(snapshot.error.as_deref(), Some(err.to_string().as_str()));
        assert!(snapshot.session_id.is_none());
    }

    #[test]
    fn test_successful_start_clears_previous_error() {
        let source = SyntheticSource::new(SyntheticSignal::Silence).with_access(SyntheticAccess::Unavailable);
        let (mut engine, _clock) = engine_with(source);

        assert!(engine.start().is_err());
        assert!(engine.snapshot().error.is_some());

        engine.source = engine.source.clone().with_access(SyntheticAccess::Granted);
        engine.start().unwrap();
        assert!(engine.snapshot().error.is_none());
    }

    #[test]
    fn test_device_loss_mid_session() {
        let source = SyntheticSource::new(SyntheticSignal::Constant(0.1)).lose_device_after(3);
        let open = source.open_counter();
        let (mut engine, clock) = engine_with(source);

        let ticket = engine.start().unwrap();
        for _ in 0..3 {
            clock.advance(16);
            assert!(engine.tick(ticket).unwrap().active);
        }

        clock.advance(16);
        let snapshot = engine.tick(ticket).unwrap().clone();
        assert!(!snapshot.active);
        assert!(snapshot.error.unwrap().contains("unavailable"));
        assert_eq!(snapshot.recent_stats.avg, 74.0);

        assert_eq!(engine.state(), SessionState::Idle);
        assert_eq!(open.load(Ordering::SeqCst), 0);
        assert!(engine.tick(ticket).is_none());
    }

    #[test]
    fn test_thirty_one_seconds_of_ticks() {
        let source = SyntheticSource::new(SyntheticSignal::Constant(0.1));
        let (mut engine, clock) = engine_with(source);

        let ticket = engine.start().unwrap();
        while clock.now_ms() < 31_000 {
            clock.advance(16);
            let snapshot = engine.tick(ticket).unwrap();
            assert!(snapshot.trace.len() <= 60);
        }

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.trace.len(), 60);
        assert_eq!(snapshot.stats.duration_seconds, 31);
        assert_eq!(snapshot.stats.avg, snapshot.recent_stats.avg);
    }
}
