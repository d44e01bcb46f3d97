//! Microphone capture through cpal
//!
//! The input stream is built and kept alive on a dedicated thread, because
//! cpal streams are not `Send` on every backend. The audio callback downmixes
//! to mono and writes into a [`FrameBuffer`](crate::audio::FrameBuffer) that
//! the meter reads on demand.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::buffer::{append_downmixed_samples, create_shared_buffer, SharedFrameBuffer};
use crate::audio::device::find_input_device;
use crate::audio::source::{AudioSource, InputHandle};
use crate::constants::{ACQUIRE_TIMEOUT, CAPTURE_ERROR_QUEUE};
use crate::error::AudioError;

/// Stream parameters negotiated with the device
#[derive(Debug, Clone)]
pub struct CaptureInfo {
    pub device_name: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_format: String,
}

/// [`AudioSource`] backed by a real input device
#[derive(Debug, Clone)]
pub struct DeviceSource {
    /// Device name, `None` for the host default
    device_name: Option<String>,

    /// Samples kept for reading (at least one frame)
    buffer_capacity: usize,
}

impl DeviceSource {
    pub fn new(device_name: Option<String>, frame_size: usize) -> Self {
        Self {
            device_name,
            buffer_capacity: frame_size.max(1),
        }
    }
}

impl AudioSource for DeviceSource {
    type Handle = DeviceCapture;

    fn acquire(&mut self) -> Result<DeviceCapture, AudioError> {
        DeviceCapture::open(self.device_name.clone(), self.buffer_capacity)
    }

    fn describe(&self) -> String {
        match &self.device_name {
            Some(name) => format!("input device '{}'", name),
            None => "default input device".to_string(),
        }
    }
}

/// Open microphone stream
pub struct DeviceCapture {
    /// Negotiated stream parameters
    info: CaptureInfo,

    /// Latest mono samples
    buffer: SharedFrameBuffer,

    /// Keeps the capture thread (and its stream) alive
    running: Arc<AtomicBool>,

    /// Capture thread handle
    thread_handle: Option<JoinHandle<()>>,

    /// Errors reported by the stream callback
    error_rx: Receiver<AudioError>,

    /// First error seen; the handle stays failed afterwards
    failed: Option<AudioError>,
}

impl DeviceCapture {
    /// Open the device and start streaming
    ///
    /// Blocks until the capture thread reports that the stream is playing or
    /// [`ACQUIRE_TIMEOUT`] passes.
    pub fn open(device_name: Option<String>, buffer_capacity: usize) -> Result<Self, AudioError> {
        let buffer = create_shared_buffer(buffer_capacity);
        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = bounded::<Result<CaptureInfo, AudioError>>(1);
        let (error_tx, error_rx) = bounded::<AudioError>(CAPTURE_ERROR_QUEUE);

        let thread_buffer = buffer.clone();
        let thread_running = running.clone();

        let handle = thread::Builder::new()
            .name("meter-capture".to_string())
            .spawn(move || {
                let (stream, info) = match build_stream(device_name.as_deref(), thread_buffer, error_tx) {
                    Ok(built) => built,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                if let Err(e) = stream.play() {
                    tracing::error!("Failed to start capture stream: {}", e);
                    let _ = ready_tx.send(Err(e.into()));
                    return;
                }

                let _ = ready_tx.send(Ok(info));

                // Keep thread alive while running
                while thread_running.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(10));
                }

                if let Err(e) = stream.pause() {
                    tracing::debug!("Failed to pause capture stream: {}", e);
                }
            })
            .map_err(|e| AudioError::DeviceUnavailable(format!("failed to spawn capture thread: {}", e)))?;

        match ready_rx.recv_timeout(ACQUIRE_TIMEOUT) {
            Ok(Ok(info)) => {
                tracing::info!(
                    "Capturing from '{}': {}Hz, {} channels, {}",
                    info.device_name,
                    info.sample_rate,
                    info.channels,
                    info.sample_format
                );
                Ok(Self {
                    info,
                    buffer,
                    running,
                    thread_handle: Some(handle),
                    error_rx,
                    failed: None,
                })
            }
            Ok(Err(e)) => {
                running.store(false, Ordering::SeqCst);
                let _ = handle.join();
                Err(e)
            }
            Err(RecvTimeoutError::Timeout) => {
                // The thread may still be stuck in the backend; let it wind down on its own
                running.store(false, Ordering::SeqCst);
                Err(AudioError::DeviceUnavailable(format!(
                    "input stream did not start within {:?}",
                    ACQUIRE_TIMEOUT
                )))
            }
            Err(RecvTimeoutError::Disconnected) => {
                running.store(false, Ordering::SeqCst);
                let _ = handle.join();
                Err(AudioError::DeviceUnavailable("capture thread exited during start-up".into()))
            }
        }
    }

    /// Get the negotiated stream parameters
    pub fn info(&self) -> &CaptureInfo {
        &self.info
    }

    /// Samples received so far
    pub fn samples_captured(&self) -> u64 {
        self.buffer.lock().total_written()
    }

    /// Check if the stream is still open
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && self.failed.is_none()
    }
}

impl InputHandle for DeviceCapture {
    fn read_frame(&mut self, frame: &mut [f32]) -> Result<(), AudioError> {
        if let Some(err) = &self.failed {
            return Err(err.clone());
        }

        if !self.running.load(Ordering::SeqCst) {
            return Err(AudioError::DeviceUnavailable("capture has been released".into()));
        }

        if let Ok(err) = self.error_rx.try_recv() {
            tracing::warn!("Capture stream error on '{}': {}", self.info.device_name, err);
            self.failed = Some(err.clone());
            return Err(err);
        }

        let thread_gone = self.thread_handle.as_ref().map_or(true, |h| h.is_finished());
        if thread_gone {
            let err = AudioError::DeviceUnavailable("capture thread stopped unexpectedly".into());
            self.failed = Some(err.clone());
            return Err(err);
        }

        self.buffer.lock().copy_latest(frame);
        Ok(())
    }

    fn release(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
            tracing::debug!("Released input device '{}'", self.info.device_name);
        }
    }
}

impl Drop for DeviceCapture {
    fn drop(&mut self) {
        self.release();
    }
}

/// Build (but do not start) the input stream; runs on the capture thread
fn build_stream(
    device_name: Option<&str>,
    buffer: SharedFrameBuffer,
    error_tx: Sender<AudioError>,
) -> Result<(cpal::Stream, CaptureInfo), AudioError> {
    let device = find_input_device(device_name)?;
    let name = device.name().unwrap_or_else(|_| "unknown input device".to_string());

    let default_config = device.default_input_config()?;
    let format = default_config.sample_format();
    let config: StreamConfig = default_config.config();
    let channels = usize::from(config.channels.max(1));

    tracing::debug!(
        "Input config for '{}': format={:?} sample_rate={}Hz channels={}",
        name,
        format,
        config.sample_rate.0,
        channels
    );

    let info = CaptureInfo {
        device_name: name,
        sample_rate: config.sample_rate.0,
        channels: config.channels,
        sample_format: format!("{:?}", format),
    };

    let err_fn = move |err: cpal::StreamError| {
        let _ = error_tx.try_send(err.into());
    };

    let stream = match format {
        SampleFormat::F32 => {
            let mut scratch = Vec::new();
            device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    scratch.clear();
                    append_downmixed_samples(&mut scratch, data, channels, |s| s);
                    buffer.lock().push_samples(&scratch);
                },
                err_fn,
                None,
            )?
        }
        SampleFormat::I16 => {
            let mut scratch = Vec::new();
            device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    scratch.clear();
                    append_downmixed_samples(&mut scratch, data, channels, |s| s as f32 / 32_768.0);
                    buffer.lock().push_samples(&scratch);
                },
                err_fn,
                None,
            )?
        }
        SampleFormat::U16 => {
            let mut scratch = Vec::new();
            device.build_input_stream(
                &config,
                move |data: &[u16], _: &cpal::InputCallbackInfo| {
                    scratch.clear();
                    append_downmixed_samples(&mut scratch, data, channels, |s| {
                        (s as f32 - 32_768.0) / 32_768.0
                    });
                    buffer.lock().push_samples(&scratch);
                },
                err_fn,
                None,
            )?
        }
        other => {
            return Err(AudioError::DeviceUnavailable(format!(
                "unsupported sample format: {:?}",
                other
            )))
        }
    };

    Ok((stream, info))
}
