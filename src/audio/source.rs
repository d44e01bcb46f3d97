//! Input capability traits
//!
//! The session engine never talks to an audio backend directly. It asks an
//! [`AudioSource`] for a handle once per session and then pulls frames from
//! the [`InputHandle`] on every tick, which lets tests and simulations swap in
//! a synthetic input without touching the aggregation logic.

use crate::error::AudioError;

/// Something that can open an input device
pub trait AudioSource: Send {
    /// Open device handle
    type Handle: InputHandle;

    /// Request access to the input and open it
    ///
    /// This may block (permission prompts, backend start-up) and is called
    /// exactly once per session start.
    fn acquire(&mut self) -> Result<Self::Handle, AudioError>;

    /// Human-readable description for logs
    fn describe(&self) -> String;
}

/// An open input delivering the most recent audio on demand
pub trait InputHandle: Send {
    /// Fill `frame` with the latest `frame.len()` mono samples in `[-1, 1]`
    ///
    /// Returns [`AudioError::DeviceUnavailable`] once the device is closed or
    /// has been lost.
    fn read_frame(&mut self, frame: &mut [f32]) -> Result<(), AudioError>;

    /// Close the device; calling it again is a no-op
    fn release(&mut self);
}
