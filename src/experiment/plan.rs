//! Raster plan definition and the Configuring step.
//!
//! A [`RasterScan`] names its devices by registry id and describes the
//! fast-axis sweep, the optional slow axis and the exposure. [`RasterScan::resolve`]
//! performs every check that can be made without touching hardware and
//! produces a [`ResolvedRaster`]: the devices, the immutable
//! [`TrajectoryParameters`] and one [`AcquisitionConfig`] per channel,
//! chosen from each channel's registered descriptor.
//!
//! # Example
//!
//! ```rust,ignore
//! let plan = RasterScan::new("ss_x", 0.0, 10.0, 5)
//!     .with_slow_axis("ss_y", 0.0, 4.0, 3)
//!     .with_exposure(0.1)
//!     .with_detectors(&["em1", "pil1M"]);
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::config::RasterSettings;
use crate::error::{AppResult, DaqError};
use crate::experiment::document::{ScanHeader, SERPENTINE};
use crate::hardware::capabilities::{
    AcquisitionConfig, ChannelDescriptor, Movable, TrajectoryGenerator, TrajectoryParameters,
};
use crate::hardware::registry::{DeviceRegistry, RegisteredChannel};

/// Plan type recorded in start documents.
pub const PLAN_TYPE: &str = "raster";

#[derive(Debug, Clone, PartialEq)]
struct SlowAxis {
    axis: String,
    start: f64,
    end: f64,
}

/// Two-dimensional fly scan: continuous fast axis, stepped slow axis.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterScan {
    fast_axis: String,
    fast_start: f64,
    fast_end: f64,
    fast_points: usize,
    slow: Option<SlowAxis>,
    lines: usize,
    exposure: f64,
    detectors: Vec<String>,
    metadata: HashMap<String, String>,
}

impl RasterScan {
    /// Single-line fly scan of `fast_axis` from `start` to `end` in `points` dwell windows.
    pub fn new(fast_axis: &str, start: f64, end: f64, points: usize) -> Self {
        Self {
            fast_axis: fast_axis.to_string(),
            fast_start: start,
            fast_end: end,
            fast_points: points,
            slow: None,
            lines: 1,
            exposure: 0.1,
            detectors: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// Step `axis` over `lines` positions from `start` to `end`, one line each.
    pub fn with_slow_axis(mut self, axis: &str, start: f64, end: f64, lines: usize) -> Self {
        self.slow = Some(SlowAxis {
            axis: axis.to_string(),
            start,
            end,
        });
        self.lines = lines;
        self
    }

    /// Override the line count. Without a slow axis only 1 is valid.
    pub fn with_lines(mut self, lines: usize) -> Self {
        self.lines = lines;
        self
    }

    /// Exposure per point in seconds.
    pub fn with_exposure(mut self, seconds: f64) -> Self {
        self.exposure = seconds;
        self
    }

    /// Add a detector to the scan
    pub fn with_detector(mut self, detector: &str) -> Self {
        self.detectors.push(detector.to_string());
        self
    }

    /// Add multiple detectors to the scan
    pub fn with_detectors(mut self, detectors: &[&str]) -> Self {
        self.detectors
            .extend(detectors.iter().map(|s| s.to_string()));
        self
    }

    /// Attach user metadata to the start document.
    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    /// Fast-axis id.
    pub fn fast_axis(&self) -> &str {
        &self.fast_axis
    }

    /// Slow-axis id, if any.
    pub fn slow_axis(&self) -> Option<&str> {
        self.slow.as_ref().map(|s| s.axis.as_str())
    }

    /// Dwell windows per line.
    pub fn fast_points(&self) -> usize {
        self.fast_points
    }

    /// Number of lines.
    pub fn lines(&self) -> usize {
        self.lines
    }

    /// User metadata.
    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    /// |end - start| / (points - 1).
    pub fn step_size(&self) -> f64 {
        (self.fast_end - self.fast_start).abs() / (self.fast_points.max(2) - 1) as f64
    }

    /// Slow-axis targets, linearly spaced. `[0.0]` when there is no slow axis.
    pub fn slow_positions(&self) -> Vec<f64> {
        match &self.slow {
            None => vec![0.0],
            Some(slow) if self.lines <= 1 => vec![slow.start],
            Some(slow) => {
                let step = (slow.end - slow.start) / (self.lines - 1) as f64;
                (0..self.lines)
                    .map(|i| slow.start + step * i as f64)
                    .collect()
            }
        }
    }

    /// Shape-and-metadata header.
    pub fn header(&self) -> ScanHeader {
        let mut motors = Vec::new();
        if let Some(slow) = &self.slow {
            motors.push(slow.axis.clone());
        }
        motors.push(self.fast_axis.clone());
        ScanHeader {
            shape: (self.lines, self.fast_points),
            motors,
            pattern: SERPENTINE.to_string(),
            detectors: self.detectors.clone(),
        }
    }

    /// Plan arguments for documentation
    pub fn plan_args(&self) -> HashMap<String, String> {
        let mut args = HashMap::new();
        args.insert("fast_axis".to_string(), self.fast_axis.clone());
        args.insert("fast_start".to_string(), self.fast_start.to_string());
        args.insert("fast_end".to_string(), self.fast_end.to_string());
        args.insert("fast_points".to_string(), self.fast_points.to_string());
        if let Some(slow) = &self.slow {
            args.insert("slow_axis".to_string(), slow.axis.clone());
            args.insert("slow_start".to_string(), slow.start.to_string());
            args.insert("slow_end".to_string(), slow.end.to_string());
        }
        args.insert("lines".to_string(), self.lines.to_string());
        args.insert("exposure".to_string(), self.exposure.to_string());
        args.insert("detectors".to_string(), self.detectors.join(","));
        args
    }

    /// Checks that need no device: point counts, limits, axis/line pairing.
    pub fn validate(&self, settings: &RasterSettings) -> AppResult<()> {
        let invalid = |msg: String| Err(DaqError::Configuration(msg));

        if !(self.fast_start.is_finite() && self.fast_end.is_finite()) {
            return invalid("fast-axis range must be finite".to_string());
        }
        if self.fast_points < 2 {
            return invalid(format!(
                "fast axis needs at least 2 points, got {}",
                self.fast_points
            ));
        }
        if self.fast_start == self.fast_end {
            return invalid(format!(
                "fast-axis start and end are both {}",
                self.fast_start
            ));
        }
        if !(self.exposure.is_finite() && self.exposure > 0.0) {
            return invalid(format!("exposure must be > 0, got {}", self.exposure));
        }
        match &self.slow {
            None if self.lines != 1 => {
                return invalid(format!(
                    "{} lines requested without a slow axis; only 1 is allowed",
                    self.lines
                ));
            }
            Some(slow) => {
                if self.lines == 0 {
                    return invalid("slow axis needs at least 1 line".to_string());
                }
                if slow.axis == self.fast_axis {
                    return invalid(format!(
                        "'{}' cannot be both fast and slow axis",
                        slow.axis
                    ));
                }
                if !(slow.start.is_finite() && slow.end.is_finite()) {
                    return invalid("slow-axis range must be finite".to_string());
                }
            }
            None => {}
        }
        if self.fast_points > settings.max_points_per_line {
            return invalid(format!(
                "{} points per line exceeds the limit of {}",
                self.fast_points, settings.max_points_per_line
            ));
        }
        if self.lines > settings.max_lines {
            return invalid(format!(
                "{} lines exceeds the limit of {}",
                self.lines, settings.max_lines
            ));
        }

        let mut seen = HashSet::new();
        for detector in &self.detectors {
            if !seen.insert(detector) {
                return invalid(format!("detector '{}' listed twice", detector));
            }
        }
        Ok(())
    }

    /// Dwell per point: exposure plus the largest readout overhead among `channels`.
    pub fn dwell_time(&self, settings: &RasterSettings, channels: &[RegisteredChannel]) -> f64 {
        let overhead = channels
            .iter()
            .map(|c| settings.readout_overhead_s.for_family(c.descriptor.family))
            .fold(0.0, f64::max);
        self.exposure + overhead
    }

    /// Acquisition settings for a channel with `descriptor`.
    pub fn acquisition_config(&self, descriptor: &ChannelDescriptor, dwell: f64) -> AcquisitionConfig {
        if descriptor.per_line_completion {
            AcquisitionConfig::PerLine {
                exposure: self.exposure,
                dwell,
                points_per_line: self.fast_points,
                lines: self.lines,
            }
        } else {
            AcquisitionConfig::PerRaster {
                exposure: self.exposure,
                dwell,
                total_frames: self.lines * self.fast_points,
            }
        }
    }

    /// Validate, look up every device and compute the trajectory and channel settings.
    ///
    /// Issues no device command.
    pub fn resolve(
        &self,
        registry: &DeviceRegistry,
        settings: &RasterSettings,
    ) -> AppResult<ResolvedRaster> {
        self.validate(settings)?;

        let fast_motor = registry.motor(&self.fast_axis)?;
        let (trajectory_id, trajectory) = registry.trajectory_for(&self.fast_axis)?;
        let slow_motor = match &self.slow {
            Some(slow) => Some((slow.axis.clone(), registry.motor(&slow.axis)?)),
            None => None,
        };

        let mut channels = Vec::with_capacity(self.detectors.len());
        for id in &self.detectors {
            let channel = registry.channel(id)?;
            if !channel.descriptor.supports_kickoff {
                return Err(DaqError::Configuration(format!(
                    "detector '{}' cannot be used in a fly scan",
                    id
                )));
            }
            if let Some(capacity) = channel.descriptor.max_points_per_line {
                if channel.descriptor.per_line_completion && self.fast_points > capacity {
                    return Err(DaqError::Configuration(format!(
                        "detector '{}' buffers at most {} points per line, plan needs {}",
                        id, capacity, self.fast_points
                    )));
                }
            }
            channels.push(channel);
        }

        let dwell = self.dwell_time(settings, &channels);
        let step_size = self.step_size();
        let forward_first = (self.fast_end - self.fast_start) * fast_motor.direction_sign() > 0.0;
        let params = TrajectoryParameters {
            fast_axis: self.fast_axis.clone(),
            fast_start: self.fast_start,
            fast_end: self.fast_end,
            fast_points: self.fast_points,
            step_size,
            dwell_time: dwell,
            slow_axis: self.slow.as_ref().map(|s| s.axis.clone()),
            slow_points: self.lines,
            ramp_up_distance: step_size / dwell * settings.ramp_up_time_s,
            forward_first,
        };

        let channels = channels
            .into_iter()
            .map(|c| {
                let config = self.acquisition_config(&c.descriptor, dwell);
                (c, config)
            })
            .collect();

        Ok(ResolvedRaster {
            fast_motor,
            trajectory_id,
            trajectory,
            slow_motor,
            slow_positions: self.slow_positions(),
            channels,
            params,
        })
    }
}

/// Everything a run needs, checked and computed before any hardware call.
pub struct ResolvedRaster {
    /// Fast-axis motor.
    pub fast_motor: Arc<dyn Movable>,
    /// Trajectory generator id.
    pub trajectory_id: String,
    /// Trajectory generator paired with the fast axis.
    pub trajectory: Arc<dyn TrajectoryGenerator>,
    /// Slow-axis id and motor, if any.
    pub slow_motor: Option<(String, Arc<dyn Movable>)>,
    /// Slow-axis target per line.
    pub slow_positions: Vec<f64>,
    /// Channels with the settings they will be configured with.
    pub channels: Vec<(RegisteredChannel, AcquisitionConfig)>,
    /// Motion profile.
    pub params: TrajectoryParameters,
}

impl std::fmt::Debug for ResolvedRaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedRaster")
            .field("trajectory_id", &self.trajectory_id)
            .field("slow_axis", &self.slow_motor.as_ref().map(|(id, _)| id))
            .field("slow_positions", &self.slow_positions)
            .field("channels", &self.channels)
            .field("params", &self.params)
            .finish()
    }
}

impl ResolvedRaster {
    /// Channels completed after every line.
    pub fn per_line_channels(&self) -> impl Iterator<Item = &RegisteredChannel> {
        self.channels
            .iter()
            .map(|(c, _)| c)
            .filter(|c| c.descriptor.per_line_completion)
    }

    /// Channels completed once after the last line.
    pub fn per_raster_channels(&self) -> impl Iterator<Item = &RegisteredChannel> {
        self.channels
            .iter()
            .map(|(c, _)| c)
            .filter(|c| !c.descriptor.per_line_completion)
    }
}
