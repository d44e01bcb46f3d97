//! Real-time sound level meter
//!
//! Samples microphone audio, converts each frame into a decibel-like level and
//! keeps a rolling 10 second summary plus a 30 second history trace. The
//! [`session::SessionController`] drives the whole pipeline on a fixed-rate
//! tick and publishes an immutable [`session::MeterSnapshot`] after every tick.
//!
//! ```text
//!  AudioSource ──acquire──▶ InputHandle ──read_frame──▶ LevelEstimator
//!                                                            │
//!                                  ┌─────────────────────────┤
//!                                  ▼                         ▼
//!                           RollingWindow             HistorySampler
//!                                  └───────────┬─────────────┘
//!                                              ▼
//!                                        MeterSnapshot ──watch──▶ consumers
//! ```

pub mod audio;
pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod meter;
pub mod session;

pub use error::{AudioError, Error, Result};
