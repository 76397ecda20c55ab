//! Tracing subscriber setup.
//!
//! `RUST_LOG` takes precedence over the configured level so a single run can
//! be made verbose without editing the config file.

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::ApplicationConfig;
use crate::error::{AppResult, DaqError};

/// Install the global subscriber described by `config`.
///
/// Returns `Ok(false)` if a subscriber was already installed.
pub fn init_tracing(config: &ApplicationConfig) -> AppResult<bool> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| DaqError::Configuration(format!("invalid log filter: {}", e)))?;

    let installed = match config.log_format.as_str() {
        "json" => fmt().with_env_filter(filter).json().try_init().is_ok(),
        _ => fmt().with_env_filter(filter).with_target(false).try_init().is_ok(),
    };

    if installed {
        tracing::debug!(app = %config.name, level = %config.log_level, "tracing initialised");
    }
    Ok(installed)
}
