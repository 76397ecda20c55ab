//! Mock Hardware Implementations
//!
//! Simulated flyable devices for testing without a beamline.
//! All mock devices use async-safe operations (tokio::time::sleep, not std::thread::sleep)
//! and must be created inside a Tokio runtime: the flyable ones execute their
//! physical actions on a [`CommandQueue`], so `start`/`complete` return as
//! soon as the command is queued.
//!
//! # Available Mocks
//!
//! - `MockStage` - positioner with distance-proportional move time
//! - `MockTrajectory` - trajectory controller (ramp-up + N dwell windows per line)
//! - `MockMonitor` - beam-intensity monitor with a circular hardware buffer, completed per line
//! - `MockAreaDetector` - frame-counted detector completed once per raster
//! - `MockShutter` - fast shutter
//!
//! # Test support
//!
//! Every mock can share a [`CallJournal`] recording the order in which
//! commands were *issued*, and can be told to fail the Nth call of an
//! operation with `fail_on`.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use ringbuf::{HeapRb, Rb};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

use super::capabilities::{
    AcquisitionChannel, AcquisitionConfig, Movable, Shutter, TrajectoryGenerator,
    TrajectoryParameters,
};
use super::queue::CommandQueue;
use super::status::Status;
use crate::data::readback::{Collected, DataValue, ReadbackBuffer};
use crate::experiment::document::{new_uid, now_secs};

// =============================================================================
// Shared test support
// =============================================================================

/// One issued command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// Device id.
    pub device: String,
    /// Operation name.
    pub operation: &'static str,
}

/// Shared, ordered log of issued commands across devices.
#[derive(Debug, Clone, Default)]
pub struct CallJournal {
    calls: Arc<Mutex<Vec<Call>>>,
}

impl CallJournal {
    /// Empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, device: &str, operation: &'static str) {
        self.calls.lock().push(Call {
            device: device.to_string(),
            operation,
        });
    }

    /// Snapshot of all calls.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Operations issued to `device`, in order.
    pub fn operations(&self, device: &str) -> Vec<&'static str> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.device == device)
            .map(|c| c.operation)
            .collect()
    }

    /// Number of times `device` received `operation`.
    pub fn count(&self, device: &str, operation: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.device == device && c.operation == operation)
            .count()
    }

    /// Journal positions of every `operation` issued to `device`.
    pub fn positions(&self, device: &str, operation: &str) -> Vec<usize> {
        self.calls
            .lock()
            .iter()
            .enumerate()
            .filter(|(_, c)| c.device == device && c.operation == operation)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Identity, journal, fault plan and time scale shared by every mock.
#[derive(Debug, Clone)]
struct MockCore {
    id: String,
    journal: Option<CallJournal>,
    faults: Arc<Mutex<Vec<(&'static str, usize)>>>,
    counts: Arc<Mutex<HashMap<&'static str, usize>>>,
    time_scale: f64,
}

impl MockCore {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            journal: None,
            faults: Arc::new(Mutex::new(Vec::new())),
            counts: Arc::new(Mutex::new(HashMap::new())),
            time_scale: 1.0,
        }
    }

    /// Journals the call, then applies any injected fault.
    fn issue(&self, operation: &'static str) -> Result<()> {
        if let Some(journal) = &self.journal {
            journal.record(&self.id, operation);
        }
        let nth = {
            let mut counts = self.counts.lock();
            let count = counts.entry(operation).or_insert(0);
            *count += 1;
            *count
        };
        if self
            .faults
            .lock()
            .iter()
            .any(|(op, n)| *op == operation && *n == nth)
        {
            bail!("{}: injected fault on {} #{}", self.id, operation, nth);
        }
        Ok(())
    }

    fn scaled(&self, seconds: f64) -> Duration {
        Duration::from_secs_f64((seconds * self.time_scale).max(0.0))
    }
}

macro_rules! mock_builders {
    ($ty:ty) => {
        impl $ty {
            /// Record issued commands in `journal`.
            pub fn with_journal(mut self, journal: CallJournal) -> Self {
                self.core.journal = Some(journal);
                self
            }

            /// Fail the `nth` (1-based) call of `operation`.
            pub fn fail_on(self, operation: &'static str, nth: usize) -> Self {
                self.core.faults.lock().push((operation, nth));
                self
            }

            /// Multiply simulated durations by `scale`.
            pub fn with_time_scale(mut self, scale: f64) -> Self {
                self.core.time_scale = scale;
                self
            }

            /// Registry id of this device.
            pub fn id(&self) -> &str {
                &self.core.id
            }
        }
    };
}

// =============================================================================
// MockStage - Simulated Motion Stage
// =============================================================================

/// Mock motion stage with realistic timing
///
/// Simulates a linear stage with:
/// - 10mm/sec motion speed
/// - Thread-safe position tracking
///
/// # Example
///
/// ```rust,ignore
/// let stage = MockStage::new();
/// stage.move_abs(10.0).await?; // Takes ~1 second
/// assert_eq!(stage.position().await?, 10.0);
/// ```
pub struct MockStage {
    core: MockCore,
    position: Arc<Mutex<f64>>,
    visited: Arc<Mutex<Vec<f64>>>,
    speed_mm_per_sec: f64,
    direction_sign: f64,
}

mock_builders!(MockStage);

impl MockStage {
    /// Create new mock stage at position 0.0mm
    pub fn new() -> Self {
        Self::named("stage")
    }

    /// Create a stage with a registry id.
    pub fn named(id: &str) -> Self {
        Self {
            core: MockCore::new(id),
            position: Arc::new(Mutex::new(0.0)),
            visited: Arc::new(Mutex::new(Vec::new())),
            speed_mm_per_sec: 10.0, // 10mm/sec
            direction_sign: 1.0,
        }
    }

    /// Create mock stage with custom speed
    ///
    /// # Arguments
    /// * `speed_mm_per_sec` - Motion speed in mm/sec
    pub fn with_speed(mut self, speed_mm_per_sec: f64) -> Self {
        self.speed_mm_per_sec = speed_mm_per_sec;
        self
    }

    /// Invert the motor's sense relative to the user coordinate.
    pub fn reversed(mut self) -> Self {
        self.direction_sign = -1.0;
        self
    }

    /// Every target reached by `move_abs`, in order.
    pub fn visited(&self) -> Vec<f64> {
        self.visited.lock().clone()
    }
}

impl Default for MockStage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Movable for MockStage {
    async fn move_abs(&self, target: f64) -> Result<()> {
        self.core.issue("move")?;
        let current = *self.position.lock();
        let distance = (target - current).abs();
        let delay = self.core.scaled(distance / self.speed_mm_per_sec);

        tracing::debug!(
            stage = %self.core.id,
            from = current,
            to = target,
            "MockStage: moving ({:?})",
            delay
        );

        // CRITICAL: Use tokio::time::sleep, NOT std::thread::sleep
        sleep(delay).await;

        *self.position.lock() = target;
        self.visited.lock().push(target);
        Ok(())
    }

    async fn position(&self) -> Result<f64> {
        Ok(*self.position.lock())
    }

    fn direction_sign(&self) -> f64 {
        self.direction_sign
    }

    async fn stop(&self) -> Result<()> {
        self.core.issue("stop")
    }
}

// =============================================================================
// MockTrajectory - Simulated trajectory controller
// =============================================================================

#[derive(Default)]
struct TrajectoryState {
    params: Option<TrajectoryParameters>,
    forward: bool,
    line_open: bool,
    epoch: u64,
    lines_run: usize,
    directions: Vec<bool>,
    positions: Vec<f64>,
    line_times: Vec<f64>,
}

/// Mock trajectory controller.
///
/// Each line takes the ramp-up time plus one dwell per point, then appends
/// the dwell-window positions of that line to its readback.
pub struct MockTrajectory {
    core: MockCore,
    ramp_time: f64,
    queue: CommandQueue,
    state: Arc<Mutex<TrajectoryState>>,
}

mock_builders!(MockTrajectory);

impl MockTrajectory {
    /// Create a controller with a 50 ms ramp.
    pub fn new(id: &str) -> Self {
        Self {
            core: MockCore::new(id),
            ramp_time: 0.05,
            queue: CommandQueue::spawn(id),
            state: Arc::new(Mutex::new(TrajectoryState::default())),
        }
    }

    /// Directions of the lines started so far (true = forward).
    pub fn directions(&self) -> Vec<bool> {
        self.state.lock().directions.clone()
    }

    /// Lines whose motion profile has finished.
    pub fn lines_run(&self) -> usize {
        self.state.lock().lines_run
    }

    /// Last loaded profile.
    pub fn parameters(&self) -> Option<TrajectoryParameters> {
        self.state.lock().params.clone()
    }
}

#[async_trait]
impl TrajectoryGenerator for MockTrajectory {
    async fn configure(&self, params: &TrajectoryParameters) -> Result<()> {
        self.core.issue("configure")?;
        if params.fast_points < 2 {
            bail!("{}: trajectory needs at least 2 points", self.core.id);
        }
        if params.step_size <= 0.0 {
            bail!("{}: step size must be positive", self.core.id);
        }
        let mut state = self.state.lock();
        state.params = Some(params.clone());
        state.forward = params.forward_first;
        Ok(())
    }

    async fn clear_readback(&self) -> Result<()> {
        self.core.issue("clear_readback")?;
        let mut state = self.state.lock();
        state.positions.clear();
        state.line_times.clear();
        state.directions.clear();
        state.lines_run = 0;
        Ok(())
    }

    async fn select_direction(&self, forward: bool) -> Result<()> {
        self.core.issue("select_direction")?;
        self.state.lock().forward = forward;
        Ok(())
    }

    async fn start(&self) -> Result<Status> {
        self.core.issue("start")?;
        let (params, forward, epoch) = {
            let mut state = self.state.lock();
            let params = state
                .params
                .clone()
                .ok_or_else(|| anyhow!("{}: start before configure", self.core.id))?;
            let forward = state.forward;
            state.line_open = true;
            state.directions.push(forward);
            (params, forward, state.epoch)
        };

        let duration = self
            .core
            .scaled(self.ramp_time + params.dwell_time * params.fast_points as f64);
        let state = self.state.clone();
        let id = self.core.id.clone();
        Ok(self.queue.submit(async move {
            tracing::debug!(trajectory = %id, forward, "MockTrajectory: line running");
            sleep(duration).await;
            let mut state = state.lock();
            if state.epoch != epoch {
                bail!("{}: line aborted", id);
            }
            state.positions.extend(params.line_positions(forward));
            state.line_times.push(now_secs());
            state.lines_run += 1;
            Ok(())
        }))
    }

    async fn complete(&self) -> Result<Status> {
        self.core.issue("complete")?;
        {
            let mut state = self.state.lock();
            if !state.line_open {
                bail!("{}: complete called before start", self.core.id);
            }
            state.line_open = false;
        }
        Ok(self.queue.submit(async { Ok(()) }))
    }

    async fn collect(&self) -> Result<Collected> {
        self.core.issue("collect")?;
        self.queue.drain().await?;
        let state = self.state.lock();
        let points = state.params.as_ref().map(|p| p.fast_points).unwrap_or(0);
        Ok(Collected {
            data: DataValue::Array {
                shape: vec![state.line_times.len(), points],
                values: state.positions.clone(),
            },
            timestamps: state.line_times.clone(),
        })
    }

    async fn stop(&self) -> Result<()> {
        self.core.issue("stop")?;
        {
            let mut state = self.state.lock();
            state.line_open = false;
            state.epoch += 1;
        }
        tracing::debug!(trajectory = %self.core.id, "MockTrajectory: stopped");
        Ok(())
    }
}

// =============================================================================
// MockMonitor - Simulated beam-intensity monitor (per-line completion)
// =============================================================================

struct MonitorState {
    dwell: f64,
    points_per_line: usize,
    armed: bool,
    epoch: u64,
    line_index: usize,
    hardware: HeapRb<f64>,
    readback: ReadbackBuffer,
}

impl Default for MonitorState {
    fn default() -> Self {
        Self {
            dwell: 0.0,
            points_per_line: 0,
            armed: false,
            epoch: 0,
            line_index: 0,
            hardware: HeapRb::new(1),
            readback: ReadbackBuffer::default(),
        }
    }
}

/// Mock electrometer-style monitor.
///
/// Samples land in a circular hardware buffer sized to one line; `complete`
/// reads the line out into the readback buffer and resets the hardware.
pub struct MockMonitor {
    core: MockCore,
    baseline: f64,
    queue: CommandQueue,
    state: Arc<Mutex<MonitorState>>,
}

mock_builders!(MockMonitor);

impl MockMonitor {
    /// Create a monitor reading around 1.0.
    pub fn new(id: &str) -> Self {
        Self {
            core: MockCore::new(id),
            baseline: 1.0,
            queue: CommandQueue::spawn(id),
            state: Arc::new(Mutex::new(MonitorState::default())),
        }
    }

    /// Lines read back so far.
    pub fn lines_read(&self) -> usize {
        self.state.lock().readback.line_count()
    }
}

#[async_trait]
impl AcquisitionChannel for MockMonitor {
    async fn configure(&self, config: &AcquisitionConfig) -> Result<()> {
        self.core.issue("configure")?;
        let AcquisitionConfig::PerLine {
            dwell,
            points_per_line,
            ..
        } = config
        else {
            bail!("{}: monitor only supports per-line acquisition", self.core.id);
        };
        let mut state = self.state.lock();
        state.dwell = *dwell;
        state.points_per_line = *points_per_line;
        state.hardware = HeapRb::new((*points_per_line).max(1));
        state.readback.reset(*points_per_line);
        Ok(())
    }

    async fn clear_readback(&self) -> Result<()> {
        self.core.issue("clear_readback")?;
        let mut state = self.state.lock();
        let points = state.points_per_line;
        state.readback.reset(points);
        state.line_index = 0;
        Ok(())
    }

    async fn start(&self) -> Result<Status> {
        self.core.issue("start")?;
        let (dwell, points, line, epoch) = {
            let mut state = self.state.lock();
            if state.points_per_line == 0 {
                bail!("{}: start before configure", self.core.id);
            }
            state.armed = true;
            state.line_index += 1;
            (state.dwell, state.points_per_line, state.line_index, state.epoch)
        };

        let duration = self.core.scaled(dwell * points as f64);
        let baseline = self.baseline;
        let state = self.state.clone();
        Ok(self.queue.submit(async move {
            sleep(duration).await;
            let mut state = state.lock();
            if state.epoch != epoch {
                return Ok(());
            }
            for i in 0..points {
                state
                    .hardware
                    .push_overwrite(baseline + line as f64 + i as f64 * 1e-3);
            }
            Ok(())
        }))
    }

    async fn complete(&self) -> Result<Status> {
        self.core.issue("complete")?;
        let epoch = {
            let mut state = self.state.lock();
            if !state.armed {
                bail!("{}: complete called before start", self.core.id);
            }
            state.armed = false;
            state.epoch
        };

        let state = self.state.clone();
        let id = self.core.id.clone();
        Ok(self.queue.submit(async move {
            let mut state = state.lock();
            if state.epoch != epoch {
                return Ok(());
            }
            let chunk: Vec<f64> = state.hardware.pop_iter().collect();
            tracing::debug!(monitor = %id, samples = chunk.len(), "MockMonitor: line read back");
            state.readback.push_line(chunk, now_secs());
            Ok(())
        }))
    }

    async fn collect(&self) -> Result<Collected> {
        self.core.issue("collect")?;
        self.queue.drain().await?;
        Ok(self.state.lock().readback.collect())
    }

    async fn stop(&self) -> Result<()> {
        self.core.issue("stop")?;
        let mut state = self.state.lock();
        state.armed = false;
        state.epoch += 1;
        state.hardware.clear();
        Ok(())
    }
}

// =============================================================================
// MockAreaDetector - Simulated frame-counted detector (per-raster completion)
// =============================================================================

#[derive(Default)]
struct AreaDetectorState {
    total_frames: Option<usize>,
    armed: bool,
    frames: usize,
    uri: Option<String>,
    finished_at: Vec<f64>,
}

/// Mock area detector writing one frame file per raster.
pub struct MockAreaDetector {
    core: MockCore,
    queue: CommandQueue,
    state: Arc<Mutex<AreaDetectorState>>,
}

mock_builders!(MockAreaDetector);

impl MockAreaDetector {
    /// Create a detector.
    pub fn new(id: &str) -> Self {
        Self {
            core: MockCore::new(id),
            queue: CommandQueue::spawn(id),
            state: Arc::new(Mutex::new(AreaDetectorState::default())),
        }
    }

    /// Frame count received by the last `configure`.
    pub fn configured_frames(&self) -> Option<usize> {
        self.state.lock().total_frames
    }
}

#[async_trait]
impl AcquisitionChannel for MockAreaDetector {
    async fn configure(&self, config: &AcquisitionConfig) -> Result<()> {
        self.core.issue("configure")?;
        let AcquisitionConfig::PerRaster { total_frames, .. } = config else {
            bail!("{}: area detector is configured once per raster", self.core.id);
        };
        self.state.lock().total_frames = Some(*total_frames);
        Ok(())
    }

    async fn clear_readback(&self) -> Result<()> {
        self.core.issue("clear_readback")?;
        let mut state = self.state.lock();
        state.frames = 0;
        state.uri = None;
        state.finished_at.clear();
        Ok(())
    }

    async fn start(&self) -> Result<Status> {
        self.core.issue("start")?;
        let mut state = self.state.lock();
        if state.total_frames.is_none() {
            bail!("{}: armed before configure", self.core.id);
        }
        state.armed = true;
        state.frames = 0;
        Ok(Status::done())
    }

    async fn complete(&self) -> Result<Status> {
        self.core.issue("complete")?;
        let total = {
            let mut state = self.state.lock();
            if !state.armed {
                bail!("{}: complete called before start", self.core.id);
            }
            state.armed = false;
            state.total_frames.unwrap_or(0)
        };

        let state = self.state.clone();
        let id = self.core.id.clone();
        let flush = self.core.scaled(0.01);
        Ok(self.queue.submit(async move {
            sleep(flush).await;
            let mut state = state.lock();
            state.frames = total;
            state.uri = Some(format!("mock://{}/{}.h5", id, new_uid()));
            state.finished_at.push(now_secs());
            Ok(())
        }))
    }

    async fn collect(&self) -> Result<Collected> {
        self.core.issue("collect")?;
        self.queue.drain().await?;
        let state = self.state.lock();
        Ok(Collected {
            data: DataValue::Resource {
                uri: state.uri.clone().unwrap_or_default(),
                frames: state.frames,
            },
            timestamps: state.finished_at.clone(),
        })
    }

    async fn stop(&self) -> Result<()> {
        self.core.issue("stop")?;
        self.state.lock().armed = false;
        Ok(())
    }
}

// =============================================================================
// MockShutter
// =============================================================================

/// Mock fast shutter.
pub struct MockShutter {
    core: MockCore,
    open: Arc<Mutex<bool>>,
}

mock_builders!(MockShutter);

impl MockShutter {
    /// Create a closed shutter.
    pub fn new(id: &str) -> Self {
        Self {
            core: MockCore::new(id),
            open: Arc::new(Mutex::new(false)),
        }
    }

    /// Whether the shutter is open.
    pub fn is_open(&self) -> bool {
        *self.open.lock()
    }
}

#[async_trait]
impl Shutter for MockShutter {
    async fn open(&self) -> Result<()> {
        self.core.issue("open")?;
        *self.open.lock() = true;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.core.issue("close")?;
        *self.open.lock() = false;
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn params(points: usize) -> TrajectoryParameters {
        TrajectoryParameters {
            fast_axis: "ss_x".into(),
            fast_start: 0.0,
            fast_end: 10.0,
            fast_points: points,
            step_size: 10.0 / (points.max(2) - 1) as f64,
            dwell_time: 0.001,
            slow_axis: None,
            slow_points: 1,
            ramp_up_distance: 0.0,
            forward_first: true,
        }
    }

    #[tokio::test]
    async fn test_mock_stage_absolute_move() {
        let stage = MockStage::new().with_speed(1000.0);

        assert_eq!(stage.position().await.unwrap(), 0.0);

        stage.move_abs(10.0).await.unwrap();
        assert_eq!(stage.position().await.unwrap(), 10.0);

        stage.move_abs(25.0).await.unwrap();
        assert_eq!(stage.position().await.unwrap(), 25.0);
        assert_eq!(stage.visited(), vec![10.0, 25.0]);
    }

    #[tokio::test]
    async fn test_mock_stage_direction_sign() {
        assert_eq!(MockStage::new().direction_sign(), 1.0);
        assert_eq!(MockStage::new().reversed().direction_sign(), -1.0);
    }

    #[tokio::test]
    async fn test_trajectory_rejects_bad_profile() {
        let pp = MockTrajectory::new("pp");
        assert!(pp.configure(&params(1)).await.is_err());

        let mut negative = params(5);
        negative.step_size = 0.0;
        assert!(pp.configure(&negative).await.is_err());
    }

    #[tokio::test]
    async fn test_trajectory_line_readback() {
        let pp = MockTrajectory::new("pp").with_time_scale(0.1);
        pp.configure(&params(5)).await.unwrap();
        pp.clear_readback().await.unwrap();

        pp.select_direction(false).await.unwrap();
        let started = pp.start().await.unwrap();
        let done = pp.complete().await.unwrap();
        started.wait().await.unwrap();
        done.wait().await.unwrap();

        let collected = pp.collect().await.unwrap();
        assert_eq!(
            collected.data,
            DataValue::Array {
                shape: vec![1, 5],
                values: vec![10.0, 7.5, 5.0, 2.5, 0.0],
            }
        );
        assert_eq!(pp.directions(), vec![false]);
    }

    #[tokio::test]
    async fn test_monitor_complete_before_start_fails() {
        let em = MockMonitor::new("em1");
        em.configure(&AcquisitionConfig::PerLine {
            exposure: 0.001,
            dwell: 0.001,
            points_per_line: 4,
            lines: 1,
        })
        .await
        .unwrap();

        assert!(em.complete().await.is_err());
    }

    #[tokio::test]
    async fn test_monitor_accumulates_lines() {
        let em = MockMonitor::new("em1");
        em.configure(&AcquisitionConfig::PerLine {
            exposure: 0.001,
            dwell: 0.001,
            points_per_line: 4,
            lines: 2,
        })
        .await
        .unwrap();
        em.clear_readback().await.unwrap();

        for _ in 0..2 {
            let _ = em.start().await.unwrap();
            let _ = em.complete().await.unwrap();
        }

        let collected = em.collect().await.unwrap();
        assert_eq!(collected.data.shape(), vec![2, 4]);
        assert_eq!(collected.timestamps.len(), 2);
        assert_eq!(em.lines_read(), 2);
    }

    #[tokio::test]
    async fn test_monitor_rejects_per_raster_config() {
        let em = MockMonitor::new("em1");
        let result = em
            .configure(&AcquisitionConfig::PerRaster {
                exposure: 0.1,
                dwell: 0.1,
                total_frames: 10,
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_area_detector_frames_after_complete() {
        let det = MockAreaDetector::new("pil1M").with_time_scale(0.0);
        det.configure(&AcquisitionConfig::PerRaster {
            exposure: 0.1,
            dwell: 0.105,
            total_frames: 15,
        })
        .await
        .unwrap();
        det.clear_readback().await.unwrap();

        det.start().await.unwrap().wait().await.unwrap();
        det.complete().await.unwrap().wait().await.unwrap();

        let collected = det.collect().await.unwrap();
        assert_eq!(collected.data.len(), 15);
        match collected.data {
            DataValue::Resource { uri, .. } => assert!(uri.starts_with("mock://pil1M/")),
            other => panic!("unexpected value: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fault_injection_and_journal() {
        let journal = CallJournal::new();
        let shutter = MockShutter::new("fs")
            .with_journal(journal.clone())
            .fail_on("close", 2);

        shutter.open().await.unwrap();
        shutter.close().await.unwrap();
        shutter.open().await.unwrap();
        assert!(shutter.close().await.is_err());
        assert!(shutter.is_open());

        assert_eq!(journal.operations("fs"), vec!["open", "close", "open", "close"]);
        assert_eq!(journal.count("fs", "close"), 2);
        assert_eq!(journal.positions("fs", "open"), vec![0, 2]);
    }

    #[tokio::test]
    async fn test_stop_discards_queued_line() {
        let pp = MockTrajectory::new("pp");
        pp.configure(&params(5)).await.unwrap();
        pp.clear_readback().await.unwrap();

        let started = pp.start().await.unwrap();
        pp.stop().await.unwrap();
        assert!(started.wait().await.is_err());

        let collected = pp.collect().await.unwrap();
        assert!(collected.data.is_empty());
        assert_eq!(pp.lines_run(), 0);
    }
}
