//! Synthetic audio input
//!
//! Generates a known signal instead of reading a microphone. Used by the
//! tests and by `sound-meter --synthetic` on machines without an input device.

use std::f64::consts::TAU;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::audio::source::{AudioSource, InputHandle};
use crate::error::AudioError;

/// Signal produced by the synthetic input
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyntheticSignal {
    /// All zeros
    Silence,
    /// Every sample equals the amplitude (RMS = |amplitude|)
    Constant(f32),
    /// Continuous sine (RMS = amplitude / √2)
    Sine {
        amplitude: f32,
        frequency_hz: f32,
        sample_rate: u32,
    },
}

impl SyntheticSignal {
    /// RMS of the generated signal over whole periods
    pub fn rms(&self) -> f64 {
        match *self {
            SyntheticSignal::Silence => 0.0,
            SyntheticSignal::Constant(amplitude) => f64::from(amplitude).abs(),
            SyntheticSignal::Sine { amplitude, .. } => f64::from(amplitude).abs() / 2f64.sqrt(),
        }
    }
}

/// Outcome of an access request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntheticAccess {
    Granted,
    Denied,
    Unavailable,
}

/// Synthetic [`AudioSource`]
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    signal: SyntheticSignal,
    access: SyntheticAccess,

    /// Number of successful reads after which the device is "unplugged"
    lose_after: Option<usize>,

    /// Frames read across all handles
    reads: Arc<AtomicUsize>,

    /// Handles acquired so far
    acquisitions: Arc<AtomicUsize>,

    /// Handles currently open
    open_handles: Arc<AtomicUsize>,
}

impl SyntheticSource {
    pub fn new(signal: SyntheticSignal) -> Self {
        Self {
            signal,
            access: SyntheticAccess::Granted,
            lose_after: None,
            reads: Arc::new(AtomicUsize::new(0)),
            acquisitions: Arc::new(AtomicUsize::new(0)),
            open_handles: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Respond to `acquire` with the given outcome
    pub fn with_access(mut self, access: SyntheticAccess) -> Self {
        self.access = access;
        self
    }

    /// Report the device as lost after `reads` frames
    pub fn lose_device_after(mut self, reads: usize) -> Self {
        self.lose_after = Some(reads);
        self
    }

    /// Shared counter of frames read
    pub fn read_counter(&self) -> Arc<AtomicUsize> {
        self.reads.clone()
    }

    /// Shared counter of handles currently open
    pub fn open_counter(&self) -> Arc<AtomicUsize> {
        self.open_handles.clone()
    }

    /// Number of successful acquisitions
    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    pub fn signal(&self) -> SyntheticSignal {
        self.signal
    }
}

impl AudioSource for SyntheticSource {
    type Handle = SyntheticHandle;

    fn acquire(&mut self) -> Result<SyntheticHandle, AudioError> {
        match self.access {
            SyntheticAccess::Granted => {}
            SyntheticAccess::Denied => {
                return Err(AudioError::PermissionDenied("synthetic input refused access".into()));
            }
            SyntheticAccess::Unavailable => {
                return Err(AudioError::DeviceUnavailable("synthetic input has no device".into()));
            }
        }

        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        self.open_handles.fetch_add(1, Ordering::SeqCst);

        Ok(SyntheticHandle {
            signal: self.signal,
            phase: 0,
            remaining: self.lose_after,
            reads: self.reads.clone(),
            open_handles: self.open_handles.clone(),
            open: true,
        })
    }

    fn describe(&self) -> String {
        format!("synthetic input ({:?})", self.signal)
    }
}

/// Open synthetic input
pub struct SyntheticHandle {
    signal: SyntheticSignal,

    /// Sample index of the next generated sample
    phase: u64,

    /// Reads left before simulated device loss
    remaining: Option<usize>,

    reads: Arc<AtomicUsize>,
    open_handles: Arc<AtomicUsize>,
    open: bool,
}

impl InputHandle for SyntheticHandle {
    fn read_frame(&mut self, frame: &mut [f32]) -> Result<(), AudioError> {
        if !self.open {
            return Err(AudioError::DeviceUnavailable("synthetic input is closed".into()));
        }

        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return Err(AudioError::DeviceUnavailable("synthetic input was disconnected".into()));
            }
            *remaining -= 1;
        }

        match self.signal {
            SyntheticSignal::Silence => frame.fill(0.0),
            SyntheticSignal::Constant(amplitude) => frame.fill(amplitude),
            SyntheticSignal::Sine {
                amplitude,
                frequency_hz,
                sample_rate,
            } => {
                let step = TAU * f64::from(frequency_hz) / f64::from(sample_rate.max(1));
                for (i, sample) in frame.iter_mut().enumerate() {
                    let n = (self.phase + i as u64) as f64;
                    *sample = amplitude * (step * n).sin() as f32;
                }
            }
        }

        self.phase += frame.len() as u64;
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn release(&mut self) {
        if self.open {
            self.open = false;
            self.open_handles.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for SyntheticHandle {
    fn drop(&mut self) {
        self.release();
    }
}
