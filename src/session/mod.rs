//! Session control
//!
//! The synchronous [`MeterEngine`] state machine, the tokio-driven
//! [`SessionController`] around it, and the [`MeterSnapshot`] they publish.

pub mod controller;
pub mod engine;
pub mod snapshot;

pub use controller::SessionController;
pub use engine::{EngineSettings, MeterEngine, SessionState};
pub use snapshot::{MeterSnapshot, SessionStats};
