//! Hardware capabilities consumed by the fly-scan orchestrator.
//!
//! The orchestrator never talks to a concrete driver. It sees four small
//! async capability traits:
//!
//! - [`Movable`] - a motor with a readable position and a blocking move
//! - [`TrajectoryGenerator`] - a controller executing a precomputed fast-axis
//!   motion profile and emitting one trigger per dwell window
//! - [`AcquisitionChannel`] - a flyable data source (beam-intensity monitor,
//!   area detector)
//! - [`Shutter`] - a fast shutter opened around a whole raster
//!
//! Each capability trait:
//! - Is async (uses #[async_trait])
//! - Is thread-safe (requires Send + Sync)
//! - Uses anyhow::Result for errors
//!
//! `start`/`complete` are non-blocking: they return once the command is
//! issued and hand back a [`Status`] for the physical action.
//!
//! How a channel is driven is not inferred from its type. Each channel is
//! registered with a [`ChannelDescriptor`] and the orchestrator dispatches on
//! that tag alone.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::status::Status;
use crate::data::readback::Collected;

/// Capability for positioners.
#[async_trait]
pub trait Movable: Send + Sync {
    /// Move to an absolute position and wait until the move is done.
    async fn move_abs(&self, position: f64) -> Result<()>;

    /// Current position in user units.
    async fn position(&self) -> Result<f64>;

    /// +1.0 when positive motor motion increases the user coordinate, -1.0 otherwise.
    fn direction_sign(&self) -> f64 {
        1.0
    }

    /// Stop any motion in progress.
    async fn stop(&self) -> Result<()> {
        Ok(())
    }
}

/// Motion profile parameters for one raster call.
///
/// Computed once before the first line and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryParameters {
    /// Fast-axis device id.
    pub fast_axis: String,
    /// Fast-axis start position.
    pub fast_start: f64,
    /// Fast-axis end position.
    pub fast_end: f64,
    /// Dwell windows per line.
    pub fast_points: usize,
    /// Distance between dwell window centres, always positive.
    pub step_size: f64,
    /// Dwell per point in seconds (exposure plus readout overhead).
    pub dwell_time: f64,
    /// Slow-axis device id, if any.
    pub slow_axis: Option<String>,
    /// Number of lines.
    pub slow_points: usize,
    /// Distance travelled while accelerating to scan velocity.
    pub ramp_up_distance: f64,
    /// Direction of the first line (`true` = positive motor motion), chosen
    /// so that it runs from `fast_start` to `fast_end`.
    pub forward_first: bool,
}

impl TrajectoryParameters {
    /// Constant scan velocity in user units per second.
    pub fn velocity(&self) -> f64 {
        self.step_size / self.dwell_time
    }

    /// Fast-axis positions of the dwell windows for a line run in `forward` direction.
    ///
    /// A line run in the `forward_first` direction goes from `fast_start` to
    /// `fast_end`; the other direction retraces it.
    pub fn line_positions(&self, forward: bool) -> Vec<f64> {
        let sign = if self.fast_end >= self.fast_start {
            1.0
        } else {
            -1.0
        };
        let mut positions: Vec<f64> = (0..self.fast_points)
            .map(|i| self.fast_start + sign * self.step_size * i as f64)
            .collect();
        if forward != self.forward_first {
            positions.reverse();
        }
        positions
    }
}

/// Trajectory controller driving the fast axis.
#[async_trait]
pub trait TrajectoryGenerator: Send + Sync {
    /// Load a motion profile. Fails if fewer than 2 points or a non-positive step.
    async fn configure(&self, params: &TrajectoryParameters) -> Result<()>;

    /// Reset accumulated position/time readback.
    async fn clear_readback(&self) -> Result<()>;

    /// Choose the sweep for the next line: `true` for positive motor motion.
    async fn select_direction(&self, forward: bool) -> Result<()>;

    /// Begin executing one line. Non-blocking.
    async fn start(&self) -> Result<Status>;

    /// Fence on the current line. The status resolves when the profile finishes.
    async fn complete(&self) -> Result<Status>;

    /// Accumulated positions for the whole raster.
    async fn collect(&self) -> Result<Collected>;

    /// Abort motion.
    async fn stop(&self) -> Result<()>;
}

/// Detector family, used to look up the per-point readout overhead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorFamily {
    /// Continuous beam-intensity monitor with a circular buffer.
    Monitor,
    /// Frame-counted area detector.
    AreaDetector,
}

impl DetectorFamily {
    /// Configuration key for this family.
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorFamily::Monitor => "monitor",
            DetectorFamily::AreaDetector => "area_detector",
        }
    }
}

/// Capability tag attached to a channel when it is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    /// Detector family.
    pub family: DetectorFamily,
    /// `complete` after every line (true) or once after the last line (false).
    pub per_line_completion: bool,
    /// Whether the channel can be flown at all.
    pub supports_kickoff: bool,
    /// Hardware buffer capacity per line, if bounded.
    pub max_points_per_line: Option<usize>,
}

impl ChannelDescriptor {
    /// Per-line circular-buffer monitor (electrometer style).
    pub fn monitor() -> Self {
        Self {
            family: DetectorFamily::Monitor,
            per_line_completion: true,
            supports_kickoff: true,
            max_points_per_line: None,
        }
    }

    /// Frame-counted area detector completed once per raster.
    pub fn area_detector() -> Self {
        Self {
            family: DetectorFamily::AreaDetector,
            per_line_completion: false,
            supports_kickoff: true,
            max_points_per_line: None,
        }
    }

    /// Bounds the points per line the hardware buffer can hold.
    pub fn with_capacity(mut self, points: usize) -> Self {
        self.max_points_per_line = Some(points);
        self
    }

    /// Marks the channel as not flyable (step-scan only).
    pub fn step_only(mut self) -> Self {
        self.supports_kickoff = false;
        self
    }
}

/// Acquisition settings for one raster call, shaped by the channel's completion style.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AcquisitionConfig {
    /// Buffered per line: triggers per line, repeated once per line.
    PerLine {
        /// Exposure in seconds.
        exposure: f64,
        /// Dwell per point in seconds.
        dwell: f64,
        /// Triggers expected per line.
        points_per_line: usize,
        /// Repeat count (number of lines).
        lines: usize,
    },
    /// One frame stream for the whole raster.
    PerRaster {
        /// Exposure in seconds.
        exposure: f64,
        /// Frame period in seconds.
        dwell: f64,
        /// Frames expected across all lines.
        total_frames: usize,
    },
}

impl AcquisitionConfig {
    /// Samples the channel will hold once the raster completes.
    pub fn expected_samples(&self) -> usize {
        match self {
            AcquisitionConfig::PerLine {
                points_per_line,
                lines,
                ..
            } => points_per_line * lines,
            AcquisitionConfig::PerRaster { total_frames, .. } => *total_frames,
        }
    }

    /// Dwell per point in seconds.
    pub fn dwell(&self) -> f64 {
        match self {
            AcquisitionConfig::PerLine { dwell, .. } | AcquisitionConfig::PerRaster { dwell, .. } => {
                *dwell
            }
        }
    }
}

/// Flyable data source.
#[async_trait]
pub trait AcquisitionChannel: Send + Sync {
    /// Apply acquisition settings for the coming raster.
    async fn configure(&self, config: &AcquisitionConfig) -> Result<()>;

    /// Drop the readback buffer of the previous raster.
    async fn clear_readback(&self) -> Result<()>;

    /// Begin buffered acquisition (per-line) or arm for the raster (per-raster). Non-blocking.
    async fn start(&self) -> Result<Status>;

    /// Per-line: read back and reset the hardware buffer. Per-raster: finalize the stream.
    async fn complete(&self) -> Result<Status>;

    /// Everything acquired during the raster.
    async fn collect(&self) -> Result<Collected>;

    /// Abort acquisition.
    async fn stop(&self) -> Result<()>;
}

/// Fast shutter.
#[async_trait]
pub trait Shutter: Send + Sync {
    /// Open and wait until open.
    async fn open(&self) -> Result<()>;
    /// Close and wait until closed.
    async fn close(&self) -> Result<()>;
}
