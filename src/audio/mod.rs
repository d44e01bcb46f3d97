//! Audio input subsystem
//!
//! Capture, frame buffering and level estimation.

pub mod buffer;
pub mod capture;
pub mod device;
pub mod level;
pub mod source;
pub mod synthetic;

pub use buffer::{FrameBuffer, SharedFrameBuffer};
pub use capture::{CaptureInfo, DeviceCapture, DeviceSource};
pub use device::{find_input_device, list_input_devices, AudioDevice};
pub use level::{round_to_tenth, LevelEstimator};
pub use source::{AudioSource, InputHandle};
pub use synthetic::{SyntheticAccess, SyntheticSignal, SyntheticSource};
