//! Async session controller
//!
//! Wraps a [`MeterEngine`] in a fixed-rate tokio timer task and publishes
//! every snapshot on a `watch` channel. Consumers only ever read snapshots;
//! all mutation goes through [`SessionController::start`],
//! [`SessionController::stop`] and [`SessionController::reset`].
//!
//! Every tick runs and publishes while holding the engine lock, and `stop`
//! revokes the engine's ticket under the same lock. Once `stop` returns, no
//! tick can run or publish for the stopped session.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::audio::source::AudioSource;
use crate::clock::Clock;
use crate::error::AudioError;
use crate::session::engine::{EngineSettings, MeterEngine};
use crate::session::snapshot::MeterSnapshot;

/// Owner of one metering session and its update loop
pub struct SessionController<S: AudioSource + 'static> {
    /// Shared with the tick task
    engine: Arc<Mutex<MeterEngine<S>>>,

    /// Snapshot publication
    snapshot_tx: watch::Sender<MeterSnapshot>,

    /// Time between ticks
    tick_interval: Duration,

    /// Running tick task
    ticker: Option<JoinHandle<()>>,
}

impl<S: AudioSource + 'static> SessionController<S> {
    /// Create an idle controller ticking at `tick_rate_hz` once started
    pub fn new(source: S, clock: Arc<dyn Clock>, settings: EngineSettings, tick_rate_hz: u32) -> Self {
        let engine = MeterEngine::new(source, clock, settings);
        let (snapshot_tx, _) = watch::channel(engine.snapshot().clone());

        Self {
            engine: Arc::new(Mutex::new(engine)),
            snapshot_tx,
            tick_interval: Duration::from_secs_f64(1.0 / f64::from(tick_rate_hz.max(1))),
            ticker: None,
        }
    }

    /// Subscribe to published snapshots
    pub fn subscribe(&self) -> watch::Receiver<MeterSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> MeterSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    pub fn is_active(&self) -> bool {
        self.snapshot_tx.borrow().active
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Acquire the input and start the update loop
    ///
    /// Device acquisition runs on the blocking pool and is awaited before the
    /// first tick. On failure the controller stays idle and the error is also
    /// visible on the published snapshot.
    pub async fn start(&mut self) -> Result<(), AudioError> {
        if self.ticker.as_ref().is_some_and(|t| !t.is_finished()) && self.engine.lock().is_active() {
            return Ok(());
        }

        let engine = self.engine.clone();
        let tx = self.snapshot_tx.clone();

        let ticket = tokio::task::spawn_blocking(move || {
            let mut engine = engine.lock();
            let result = engine.start();
            tx.send_replace(engine.snapshot().clone());
            result
        })
        .await
        .map_err(|e| AudioError::DeviceUnavailable(format!("device acquisition task failed: {}", e)))??;

        self.spawn_ticker(ticket);
        Ok(())
    }

    fn spawn_ticker(&mut self, ticket: u64) {
        if let Some(old) = self.ticker.take() {
            old.abort();
        }

        let engine = self.engine.clone();
        let tx = self.snapshot_tx.clone();
        let period = self.tick_interval;

        self.ticker = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                interval.tick().await;

                let keep_ticking = {
                    let mut engine = engine.lock();
                    match engine.tick(ticket) {
                        Some(snapshot) => {
                            let active = snapshot.active;
                            tx.send_replace(snapshot.clone());
                            active
                        }
                        None => false,
                    }
                };

                if !keep_ticking {
                    break;
                }
            }

            tracing::debug!(ticket, "Tick loop finished");
        }));
    }

    /// Stop the update loop and release the input
    ///
    /// Idempotent. The last numbers stay on the snapshot with `active = false`.
    pub fn stop(&mut self) {
        {
            let mut engine = self.engine.lock();
            engine.stop();
            self.snapshot_tx.send_replace(engine.snapshot().clone());
        }

        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }

    /// Clear statistics, trace and duration; the session keeps running if active
    pub fn reset(&self) {
        let mut engine = self.engine.lock();
        engine.reset();
        self.snapshot_tx.send_replace(engine.snapshot().clone());
    }
}

impl<S: AudioSource + 'static> Drop for SessionController<S> {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        self.engine.lock().stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::level::round_to_tenth;
    use crate::audio::synthetic::{SyntheticAccess, SyntheticSignal, SyntheticSource};
    use crate::clock::MonotonicClock;
    use crate::constants::{CALIBRATION_OFFSET_DB, LEVEL_EPSILON};
    use std::sync::atomic::Ordering;

    fn controller(source: SyntheticSource) -> SessionController<SyntheticSource> {
        SessionController::new(source, Arc::new(MonotonicClock::new()), EngineSettings::default(), 200)
    }

    async fn wait_for<F>(rx: &mut watch::Receiver<MeterSnapshot>, mut pred: F) -> MeterSnapshot
    where
        F: FnMut(&MeterSnapshot) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if pred(&rx.borrow_and_update()) {
                    return rx.borrow().clone();
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .expect("snapshot condition not reached in time")
    }

    #[tokio::test]
    async fn test_start_publishes_level() {
        let signal = SyntheticSignal::Constant(0.2);
        let mut controller = controller(SyntheticSource::new(signal));
        let mut rx = controller.subscribe();

        controller.start().await.unwrap();
        let snapshot = wait_for(&mut rx, |s| s.level > 0.0).await;

        let expected = (20.0 * (signal.rms() + LEVEL_EPSILON).log10() + CALIBRATION_OFFSET_DB).clamp(0.0, 120.0);
        assert!((snapshot.level - expected).abs() < 1e-6);
        assert_eq!(snapshot.recent_stats.avg, round_to_tenth(snapshot.level));
        assert!(snapshot.active);

        controller.stop();
    }

    #[tokio::test]
    async fn test_no_ticks_after_stop() {
        let source = SyntheticSource::new(SyntheticSignal::Constant(0.1));
        let reads = source.read_counter();
        let open = source.open_counter();
        let mut controller = controller(source);
        let mut rx = controller.subscribe();

        controller.start().await.unwrap();
        wait_for(&mut rx, |s| s.level > 0.0).await;

        controller.stop();
        let reads_at_stop = reads.load(Ordering::SeqCst);
        let snapshot_at_stop = controller.snapshot();
        assert!(!snapshot_at_stop.active);
        assert_eq!(open.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(reads.load(Ordering::SeqCst), reads_at_stop);
        assert_eq!(controller.snapshot(), snapshot_at_stop);

        // Second stop is a no-op
        controller.stop();
        assert_eq!(controller.snapshot(), snapshot_at_stop);
    }

    #[tokio::test]
    async fn test_denied_start_surfaces_error() {
        let source = SyntheticSource::new(SyntheticSignal::Silence).with_access(SyntheticAccess::Denied);
        let mut controller = controller(source);

        let err = controller.start().await.unwrap_err();
        assert!(matches!(err, AudioError::PermissionDenied(_)));

        let snapshot = controller.snapshot();
        assert!(!snapshot.active);
        assert_eq!(snapshot.error, Some(err.to_string()));
    }

    #[tokio::test]
    async fn test_device_loss_ends_loop() {
        let source = SyntheticSource::new(SyntheticSignal::Constant(0.1)).lose_device_after(5);
        let mut controller = controller(source);
        let mut rx = controller.subscribe();

        controller.start().await.unwrap();
        let snapshot = wait_for(&mut rx, |s| s.error.is_some()).await;

        assert!(!snapshot.active);
        assert!(!controller.is_active());
        assert_eq!(snapshot.recent_stats.avg, 74.0);

        // Stop after a loss is a plain no-op
        controller.stop();
        assert_eq!(controller.snapshot().error, snapshot.error);
    }

    #[tokio::test]
    async fn test_reset_while_idle_keeps_inactive() {
        let mut controller = controller(SyntheticSource::new(SyntheticSignal::Constant(0.1)));
        let mut rx = controller.subscribe();

        controller.start().await.unwrap();
        wait_for(&mut rx, |s| s.recent_stats.avg > 0.0).await;
        controller.stop();

        controller.reset();
        let snapshot = controller.snapshot();
        assert!(!snapshot.active);
        assert_eq!(snapshot.recent_stats.avg, 0.0);
        assert_eq!(snapshot.stats.duration_seconds, 0);
        assert!(snapshot.trace.is_empty());
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let source = SyntheticSource::new(SyntheticSignal::Constant(0.1));
        let reads = source.read_counter();
        let mut controller = controller(source);
        let mut rx = controller.subscribe();

        controller.start().await.unwrap();
        let first = wait_for(&mut rx, |s| s.level > 0.0).await.session_id;
        controller.stop();

        controller.start().await.unwrap();
        let before = reads.load(Ordering::SeqCst);
        let second = wait_for(&mut rx, |s| s.active && s.session_id != first).await;
        assert!(second.session_id.is_some());

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(reads.load(Ordering::SeqCst) > before);
        controller.stop();
    }
}
