//! Error types

use thiserror::Error;

/// Crate-level error
#[derive(Debug, Error)]
pub enum Error {
    #[error("audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised at the audio input boundary
///
/// The session engine converts both variants into the `error` message of the
/// published snapshot, so the `Display` text is what the user sees.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AudioError {
    /// Access to the microphone was refused by the user or the OS
    #[error("microphone access was denied: {0}")]
    PermissionDenied(String),

    /// No usable input device, or the device went away mid-session
    #[error("audio input device unavailable: {0}")]
    DeviceUnavailable(String),
}

impl AudioError {
    /// Short machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            AudioError::PermissionDenied(_) => "permission_denied",
            AudioError::DeviceUnavailable(_) => "device_unavailable",
        }
    }
}

impl AudioError {
    /// Classify a backend error message
    ///
    /// Backends do not expose a dedicated permission error, so messages that
    /// talk about permissions or authorization are reported as a denial and
    /// everything else as an unavailable device.
    pub fn from_backend(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("permission") || lower.contains("denied") || lower.contains("authoriz") {
            AudioError::PermissionDenied(message)
        } else {
            AudioError::DeviceUnavailable(message)
        }
    }
}

impl From<cpal::DefaultStreamConfigError> for AudioError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        match err {
            cpal::DefaultStreamConfigError::BackendSpecific { err } => Self::from_backend(err.description),
            other => AudioError::DeviceUnavailable(other.to_string()),
        }
    }
}

impl From<cpal::BuildStreamError> for AudioError {
    fn from(err: cpal::BuildStreamError) -> Self {
        match err {
            cpal::BuildStreamError::BackendSpecific { err } => Self::from_backend(err.description),
            other => AudioError::DeviceUnavailable(other.to_string()),
        }
    }
}

impl From<cpal::PlayStreamError> for AudioError {
    fn from(err: cpal::PlayStreamError) -> Self {
        match err {
            cpal::PlayStreamError::BackendSpecific { err } => Self::from_backend(err.description),
            other => AudioError::DeviceUnavailable(other.to_string()),
        }
    }
}

impl From<cpal::StreamError> for AudioError {
    fn from(err: cpal::StreamError) -> Self {
        match err {
            cpal::StreamError::BackendSpecific { err } => Self::from_backend(err.description),
            cpal::StreamError::DeviceNotAvailable => {
                AudioError::DeviceUnavailable("input device was disconnected".into())
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
