//! Raster configuration using Figment
//!
//! Configuration is loaded from (lowest to highest precedence):
//! 1. Built-in defaults
//! 2. config/raster.toml (or an explicit path)
//! 3. Environment variables prefixed with `LIXDAQ_`, nested keys split on `__`
//!
//! # Environment Variable Overrides
//!
//! ```text
//! LIXDAQ_APPLICATION__LOG_LEVEL=debug
//! LIXDAQ_RASTER__RAMP_UP_TIME_S=0.3
//! LIXDAQ_RASTER__READOUT_OVERHEAD_S__AREA_DETECTOR=0.004
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{AppResult, DaqError};
use crate::hardware::capabilities::DetectorFamily;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/raster.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RasterConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Fly-scan settings
    #[serde(default)]
    pub raster: RasterSettings,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format (pretty, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

/// Settings consumed by the raster orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterSettings {
    /// Acceleration time used to size the ramp-up distance, in seconds
    #[serde(default = "default_ramp_up_time")]
    pub ramp_up_time_s: f64,
    /// Upper bound on dwell windows per line
    #[serde(default = "default_max_points_per_line")]
    pub max_points_per_line: usize,
    /// Upper bound on lines per raster
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,
    /// Per-point readout overhead per detector family, in seconds
    #[serde(default)]
    pub readout_overhead_s: ReadoutOverhead,
}

impl Default for RasterSettings {
    fn default() -> Self {
        Self {
            ramp_up_time_s: default_ramp_up_time(),
            max_points_per_line: default_max_points_per_line(),
            max_lines: default_max_lines(),
            readout_overhead_s: ReadoutOverhead::default(),
        }
    }
}

/// Dead time added to the exposure to form the dwell, per detector family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadoutOverhead {
    /// Circular-buffer monitors
    #[serde(default)]
    pub monitor: f64,
    /// Frame-counted area detectors
    #[serde(default = "default_area_detector_overhead")]
    pub area_detector: f64,
}

impl Default for ReadoutOverhead {
    fn default() -> Self {
        Self {
            monitor: 0.0,
            area_detector: default_area_detector_overhead(),
        }
    }
}

impl ReadoutOverhead {
    /// Overhead for `family`.
    pub fn for_family(&self, family: DetectorFamily) -> f64 {
        match family {
            DetectorFamily::Monitor => self.monitor,
            DetectorFamily::AreaDetector => self.area_detector,
        }
    }
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_name() -> String {
    "LIX fly-scan".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_ramp_up_time() -> f64 {
    0.2
}

fn default_max_points_per_line() -> usize {
    10_000
}

fn default_max_lines() -> usize {
    1_000
}

fn default_area_detector_overhead() -> f64 {
    0.005
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl RasterConfig {
    /// Load from [`DEFAULT_CONFIG_PATH`] and the environment.
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file path and the environment.
    ///
    /// A missing file leaves the defaults in place. The result is validated.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config: Self = Figment::new()
            .merge(Serialized::defaults(RasterConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("LIXDAQ_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    ///
    /// Checks:
    /// - Log level is valid (trace, debug, info, warn, error)
    /// - Log format is valid (pretty, json)
    /// - Ramp-up time and readout overheads are finite and non-negative
    /// - Point and line limits are non-zero
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "json"];
        if !valid_formats.contains(&self.application.log_format.as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            )));
        }

        let raster = &self.raster;
        if !(raster.ramp_up_time_s.is_finite() && raster.ramp_up_time_s >= 0.0) {
            return Err(DaqError::Configuration(format!(
                "Invalid ramp_up_time_s {}. Must be >= 0",
                raster.ramp_up_time_s
            )));
        }
        if raster.max_points_per_line == 0 || raster.max_lines == 0 {
            return Err(DaqError::Configuration(
                "max_points_per_line and max_lines must be > 0".to_string(),
            ));
        }
        for (family, overhead) in [
            ("monitor", raster.readout_overhead_s.monitor),
            ("area_detector", raster.readout_overhead_s.area_detector),
        ] {
            if !(overhead.is_finite() && overhead >= 0.0) {
                return Err(DaqError::Configuration(format!(
                    "Invalid readout overhead {} for '{}'. Must be >= 0",
                    overhead, family
                )));
            }
        }

        Ok(())
    }
}
