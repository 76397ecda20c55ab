//! Custom error types for the fly-scan layer.
//!
//! `DaqError` is the single error type surfaced to callers of a raster run.
//! Device drivers are heterogeneous and report failures as `anyhow::Error`;
//! the orchestrator wraps those into [`DaqError::Device`] together with the
//! device id and the operation that failed, so a caller can tell which
//! participant aborted the scan.
//!
//! ## Error Hierarchy
//!
//! - **`Configuration`**: semantic validation failures. Detected before any
//!   hardware is touched (bad point counts, unknown devices, a fast axis with
//!   no trajectory generator, a channel that cannot be flown).
//! - **`Config`**: the configuration file or environment could not be parsed.
//! - **`Device`**: a configure/start/complete/collect/move/stop command failed.
//! - **`Busy`** / **`Cancelled`**: run-level lifecycle errors.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Errors produced while configuring or running a raster fly scan.
#[derive(Error, Debug)]
pub enum DaqError {
    /// Configuration file or environment could not be loaded.
    #[error("Configuration load error: {0}")]
    Config(#[from] figment::Error),

    /// Semantic configuration error, raised before any device call.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// A command issued to a device failed.
    #[error("Device '{device}' failed during {operation}: {source}")]
    Device {
        /// Registry id of the failing device.
        device: String,
        /// Operation that was being issued or awaited.
        operation: &'static str,
        /// Driver-level cause.
        #[source]
        source: anyhow::Error,
    },

    /// Another raster is already running against these devices.
    #[error("A raster scan is already in progress")]
    Busy,

    /// The run was aborted through its abort handle.
    #[error("Raster scan cancelled")]
    Cancelled,
}

impl DaqError {
    /// True for errors detected before any hardware was commanded.
    pub fn is_configuration(&self) -> bool {
        matches!(self, DaqError::Configuration(_) | DaqError::Config(_))
    }
}

/// Attaches device context to driver results.
pub trait DeviceContext<T> {
    /// Converts a driver error into [`DaqError::Device`].
    fn device_context(self, device: &str, operation: &'static str) -> AppResult<T>;
}

impl<T> DeviceContext<T> for anyhow::Result<T> {
    fn device_context(self, device: &str, operation: &'static str) -> AppResult<T> {
        self.map_err(|source| DaqError::Device {
            device: device.to_string(),
            operation,
            source,
        })
    }
}
