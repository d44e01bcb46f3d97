//! Measurement aggregation
//!
//! Rolling window statistics and the decimated history trace.

pub mod history;
pub mod window;

pub use history::HistorySampler;
pub use window::{Measurement, RollingWindow, WindowStats};
