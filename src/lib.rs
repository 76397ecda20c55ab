//! Raster fly-scan orchestration for the LIX beamline.
//!
//! A raster sweeps a fast axis continuously under a trajectory controller
//! while detectors free-run, stepping a slow axis between lines in a
//! serpentine pattern. The crate drives that sequence against hardware
//! capability traits and emits the result as run documents.
//!
//! - [`config`]: figment-loaded settings
//! - [`hardware`]: capability traits, registry, simulated devices
//! - [`experiment`]: plan, line driver, orchestrator, documents
//! - [`data`]: readback buffers and collected values
//! - [`telemetry`]: tracing setup

pub mod config;
pub mod data;
pub mod error;
pub mod experiment;
pub mod hardware;
pub mod telemetry;

pub use error::{AppResult, DaqError};
