//! Raster orchestrator.
//!
//! Runs one [`RasterScan`] at a time through
//! `Idle -> Configuring -> Running(line) -> Finalizing -> Done | Aborted`.
//!
//! - **Configuring**: resolve the plan against the registry (no device call
//!   before this succeeds), configure the trajectory and every channel,
//!   clear all readback, arm per-raster channels.
//! - **Running**: per slow-axis target: fence the previous line, move the
//!   slow axis, select the direction, issue the line. Direction alternates
//!   only when a slow axis is present.
//! - **Finalizing**: fence the last line, `complete` and await each
//!   per-raster channel, then collect the trajectory and every channel.
//!
//! Any error or an [`AbortHandle::abort`] ends the run in `Aborted` after a
//! concurrent best-effort `stop` of the trajectory, every commanded channel
//! and the motors. Stop failures are logged and never replace the original
//! error.
//!
//! # Example
//!
//! ```rust,ignore
//! let orchestrator = RasterOrchestrator::new(Arc::new(registry), config.raster)
//!     .with_recorder(Arc::new(MemoryRecorder::new()));
//! let outcome = orchestrator.run(&plan).await?;
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, instrument, warn};

use super::document::{
    CollectedRecord, DataKey, DescriptorDoc, Document, RecordDoc, ScanHeader, StartDoc, StopDoc,
};
use super::line::{LineDriver, LineStatus};
use super::plan::{RasterScan, ResolvedRaster, PLAN_TYPE};
use super::recorder::RunRecorder;
use crate::config::RasterSettings;
use crate::data::readback::DataValue;
use crate::error::{AppResult, DaqError, DeviceContext};
use crate::hardware::registry::DeviceRegistry;

/// Plan name recorded in start documents.
pub const PLAN_NAME: &str = "Raster Fly Scan";

/// Orchestrator lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RasterState {
    /// No run has started.
    Idle,
    /// Validating and configuring devices.
    Configuring,
    /// Issuing line `line`.
    Running {
        /// Zero-based line index.
        line: usize,
        /// Direction of that line.
        forward: bool,
    },
    /// Fencing per-raster channels and collecting.
    Finalizing,
    /// Last run completed.
    Done,
    /// Last run failed or was cancelled.
    Aborted,
}

/// Cancels the in-flight run of the orchestrator it came from.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    /// Request cancellation. Has no effect when nothing is running.
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }
}

/// Result of a successful raster.
#[derive(Debug, Clone)]
pub struct RasterOutcome {
    /// Start document uid.
    pub run_uid: String,
    /// Shape-and-metadata header.
    pub header: ScanHeader,
    /// One record per participant: trajectory first, then channels in plan order.
    pub records: Vec<CollectedRecord>,
    /// Lines driven.
    pub lines_run: usize,
}

impl RasterOutcome {
    /// Record of `participant`.
    pub fn record(&self, participant: &str) -> Option<&CollectedRecord> {
        self.records.iter().find(|r| r.participant == participant)
    }
}

/// Runs raster fly scans against the devices of one registry.
pub struct RasterOrchestrator {
    registry: Arc<DeviceRegistry>,
    settings: RasterSettings,
    recorder: Option<Arc<dyn RunRecorder>>,
    state_tx: watch::Sender<RasterState>,
    abort_tx: Arc<watch::Sender<bool>>,
    run_lock: Mutex<()>,
}

impl RasterOrchestrator {
    /// Orchestrator over `registry` using `settings`.
    pub fn new(registry: Arc<DeviceRegistry>, settings: RasterSettings) -> Self {
        let (state_tx, _) = watch::channel(RasterState::Idle);
        let (abort_tx, _) = watch::channel(false);
        Self {
            registry,
            settings,
            recorder: None,
            state_tx,
            abort_tx: Arc::new(abort_tx),
            run_lock: Mutex::new(()),
        }
    }

    /// Send run documents to `recorder`.
    pub fn with_recorder(mut self, recorder: Arc<dyn RunRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Current state.
    pub fn state(&self) -> RasterState {
        *self.state_tx.borrow()
    }

    /// Follow state changes.
    pub fn subscribe(&self) -> watch::Receiver<RasterState> {
        self.state_tx.subscribe()
    }

    /// Handle that cancels whichever run is in flight when it fires.
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            tx: self.abort_tx.clone(),
        }
    }

    fn set_state(&self, state: RasterState) {
        debug!(?state, "raster state");
        self.state_tx.send_replace(state);
    }

    async fn emit(&self, doc: Document) {
        if let Some(recorder) = &self.recorder {
            let kind = doc.kind();
            if let Err(e) = recorder.emit(doc).await {
                warn!(document = kind, error = %e, "recorder rejected document");
            }
        }
    }

    /// Execute `plan`. Returns [`DaqError::Busy`] if a run is already in flight.
    #[instrument(skip_all, fields(fast_axis = plan.fast_axis(), lines = plan.lines(), points = plan.fast_points()))]
    pub async fn run(&self, plan: &RasterScan) -> AppResult<RasterOutcome> {
        let _guard = self.run_lock.try_lock().map_err(|_| DaqError::Busy)?;
        self.abort_tx.send_replace(false);
        self.set_state(RasterState::Configuring);

        let resolved = match plan.resolve(&self.registry, &self.settings) {
            Ok(resolved) => resolved,
            Err(e) => {
                error!(error = %e, "raster rejected");
                self.set_state(RasterState::Aborted);
                return Err(e);
            }
        };

        let header = plan.header();
        let mut start = StartDoc::new(PLAN_TYPE, PLAN_NAME, header.clone());
        for (key, value) in plan.plan_args() {
            start = start.with_arg(&key, &value);
        }
        for (key, value) in plan.metadata() {
            start = start.with_metadata(key, value);
        }
        let run_uid = start.uid.clone();
        self.emit(Document::Start(start)).await;
        info!(
            run_uid = %run_uid,
            step = resolved.params.step_size,
            dwell = resolved.params.dwell_time,
            forward_first = resolved.params.forward_first,
            "raster starting"
        );

        let mut driver = LineDriver::new(
            resolved.trajectory_id.clone(),
            resolved.trajectory.clone(),
            resolved.per_line_channels().cloned().collect(),
        );
        let mut armed = BTreeSet::new();

        let result = {
            let mut cancel = self.abort_tx.subscribe();
            let drive = self.drive(&resolved, &mut driver, &mut armed);
            tokio::pin!(drive);
            tokio::select! {
                result = &mut drive => result,
                _ = cancel.wait_for(|aborted| *aborted) => Err(DaqError::Cancelled),
            }
        };

        match result {
            Ok(records) => {
                self.record_results(&run_uid, &resolved, &records).await;
                let lines_run = driver.lines_completed();
                self.emit(Document::Stop(StopDoc::success(&run_uid, lines_run)))
                    .await;
                self.set_state(RasterState::Done);
                info!(run_uid = %run_uid, lines_run, "raster complete");
                Ok(RasterOutcome {
                    run_uid,
                    header,
                    records,
                    lines_run,
                })
            }
            Err(e) => {
                error!(run_uid = %run_uid, error = %e, "raster aborted, stopping devices");
                self.stop_devices(&resolved, &driver, &armed).await;
                let lines = driver.lines_completed();
                let reason = e.to_string();
                let stop = match e {
                    DaqError::Cancelled => StopDoc::abort(&run_uid, &reason, lines),
                    _ => StopDoc::fail(&run_uid, &reason, lines),
                };
                self.emit(Document::Stop(stop)).await;
                self.set_state(RasterState::Aborted);
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        raster: &ResolvedRaster,
        driver: &mut LineDriver,
        armed: &mut BTreeSet<String>,
    ) -> AppResult<Vec<CollectedRecord>> {
        let trajectory_id = raster.trajectory_id.as_str();
        let trajectory = &raster.trajectory;

        // Configuring
        trajectory
            .configure(&raster.params)
            .await
            .device_context(trajectory_id, "configure")?;
        for (channel, config) in &raster.channels {
            channel
                .device
                .configure(config)
                .await
                .device_context(&channel.id, "configure")?;
            debug!(channel = %channel.id, samples = config.expected_samples(), "configured");
        }
        trajectory
            .clear_readback()
            .await
            .device_context(trajectory_id, "clear_readback")?;
        for (channel, _) in &raster.channels {
            channel
                .device
                .clear_readback()
                .await
                .device_context(&channel.id, "clear_readback")?;
        }
        for channel in raster.per_raster_channels() {
            armed.insert(channel.id.clone());
            channel
                .device
                .start()
                .await
                .device_context(&channel.id, "start")?
                .wait()
                .await
                .device_context(&channel.id, "start")?;
            debug!(channel = %channel.id, "armed for raster");
        }

        // Running
        let serpentine = raster.slow_motor.is_some();
        let mut forward = raster.params.forward_first;
        let mut pending: Option<LineStatus> = None;
        for (line, target) in raster.slow_positions.iter().enumerate() {
            if let Some(previous) = pending.take() {
                driver.fence(previous).await?;
            }
            if let Some((slow_id, slow)) = &raster.slow_motor {
                slow.move_abs(*target)
                    .await
                    .device_context(slow_id, "move")?;
            }
            self.set_state(RasterState::Running { line, forward });
            trajectory
                .select_direction(forward)
                .await
                .device_context(trajectory_id, "select_direction")?;
            pending = Some(driver.run_line().await?);
            if serpentine {
                forward = !forward;
            }
        }

        // Finalizing
        self.set_state(RasterState::Finalizing);
        if let Some(last) = pending.take() {
            driver.fence(last).await?;
        }
        for channel in raster.per_raster_channels() {
            channel
                .device
                .complete()
                .await
                .device_context(&channel.id, "complete")?
                .wait()
                .await
                .device_context(&channel.id, "complete")?;
        }

        let mut records = Vec::with_capacity(1 + raster.channels.len());
        let positions = trajectory
            .collect()
            .await
            .device_context(trajectory_id, "collect")?;
        records.push(CollectedRecord::from_collected(trajectory_id, positions));
        for (channel, _) in &raster.channels {
            let collected = channel
                .device
                .collect()
                .await
                .device_context(&channel.id, "collect")?;
            records.push(CollectedRecord::from_collected(&channel.id, collected));
        }
        Ok(records)
    }

    async fn stop_devices(
        &self,
        raster: &ResolvedRaster,
        driver: &LineDriver,
        armed: &BTreeSet<String>,
    ) {
        let commanded: BTreeSet<&str> = driver
            .commanded()
            .chain(armed.iter().map(String::as_str))
            .collect();

        let mut stops: Vec<(String, BoxFuture<'static, anyhow::Result<()>>)> = Vec::new();
        let trajectory = raster.trajectory.clone();
        stops.push((
            raster.trajectory_id.clone(),
            async move { trajectory.stop().await }.boxed(),
        ));
        for (channel, _) in &raster.channels {
            if commanded.contains(channel.id.as_str()) {
                let device = channel.device.clone();
                stops.push((channel.id.clone(), async move { device.stop().await }.boxed()));
            }
        }
        let fast = raster.fast_motor.clone();
        stops.push((
            raster.params.fast_axis.clone(),
            async move { fast.stop().await }.boxed(),
        ));
        if let Some((slow_id, slow)) = &raster.slow_motor {
            let slow = slow.clone();
            stops.push((slow_id.clone(), async move { slow.stop().await }.boxed()));
        }

        let (ids, futures): (Vec<_>, Vec<_>) = stops.into_iter().unzip();
        for (id, result) in ids.into_iter().zip(join_all(futures).await) {
            match result {
                Ok(()) => debug!(device = %id, "stopped"),
                Err(e) => warn!(device = %id, error = %e, "best-effort stop failed"),
            }
        }
    }

    async fn record_results(&self, run_uid: &str, raster: &ResolvedRaster, records: &[CollectedRecord]) {
        if self.recorder.is_none() {
            return;
        }
        let mut descriptors = Vec::with_capacity(records.len());
        for record in records {
            let mut descriptor = DescriptorDoc::new(run_uid, &record.participant);
            if let Some(value) = record.value() {
                let key = match value {
                    DataValue::Array { shape, .. } => {
                        DataKey::array(&record.participant, shape.clone())
                    }
                    DataValue::Resource { frames, .. } => {
                        DataKey::resource(&record.participant, *frames)
                    }
                };
                descriptor = descriptor.with_data_key(&record.participant, key);
            }
            if record.participant == raster.trajectory_id {
                descriptor = descriptor
                    .with_config("role", "trajectory")
                    .with_config("fast_axis", &raster.params.fast_axis);
            } else if let Some((channel, config)) = raster
                .channels
                .iter()
                .find(|(c, _)| c.id == record.participant)
            {
                descriptor = descriptor
                    .with_config("family", channel.descriptor.family.as_str())
                    .with_config(
                        "per_line_completion",
                        &channel.descriptor.per_line_completion.to_string(),
                    )
                    .with_config("dwell", &config.dwell().to_string());
            }
            descriptors.push(descriptor);
        }

        let descriptor_uids: Vec<String> = descriptors.iter().map(|d| d.uid.clone()).collect();
        for descriptor in descriptors {
            self.emit(Document::Descriptor(descriptor)).await;
        }
        for (record, descriptor_uid) in records.iter().zip(descriptor_uids) {
            self.emit(Document::Record(RecordDoc::new(
                run_uid,
                &descriptor_uid,
                record.clone(),
            )))
            .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::recorder::MemoryRecorder;
    use crate::hardware::capabilities::ChannelDescriptor;
    use crate::hardware::mock::{
        CallJournal, MockAreaDetector, MockMonitor, MockStage, MockTrajectory,
    };

    const SCALE: f64 = 0.01;

    fn registry(journal: &CallJournal) -> DeviceRegistry {
        let mut registry = DeviceRegistry::new();
        registry.register_motor(
            "ss_x",
            Arc::new(MockStage::named("ss_x").with_journal(journal.clone())),
        );
        registry.register_motor(
            "ss_y",
            Arc::new(
                MockStage::named("ss_y")
                    .with_speed(1000.0)
                    .with_journal(journal.clone()),
            ),
        );
        registry
            .attach_trajectory(
                "ss_x",
                "pp",
                Arc::new(
                    MockTrajectory::new("pp")
                        .with_time_scale(SCALE)
                        .with_journal(journal.clone()),
                ),
            )
            .unwrap();
        registry.register_channel(
            "em1",
            Arc::new(
                MockMonitor::new("em1")
                    .with_time_scale(SCALE)
                    .with_journal(journal.clone()),
            ),
            ChannelDescriptor::monitor(),
        );
        registry.register_channel(
            "pil1M",
            Arc::new(
                MockAreaDetector::new("pil1M")
                    .with_time_scale(SCALE)
                    .with_journal(journal.clone()),
            ),
            ChannelDescriptor::area_detector(),
        );
        registry
    }

    #[tokio::test]
    async fn test_single_line_raster_reaches_done() {
        let journal = CallJournal::new();
        let recorder = Arc::new(MemoryRecorder::new());
        let orchestrator = RasterOrchestrator::new(
            Arc::new(registry(&journal)),
            RasterSettings::default(),
        )
        .with_recorder(recorder.clone());
        assert_eq!(orchestrator.state(), RasterState::Idle);

        let plan = RasterScan::new("ss_x", 0.0, 10.0, 5)
            .with_exposure(0.1)
            .with_detector("em1");
        let outcome = orchestrator.run(&plan).await.unwrap();

        assert_eq!(orchestrator.state(), RasterState::Done);
        assert_eq!(outcome.lines_run, 1);
        assert_eq!(outcome.header.shape, (1, 5));
        assert_eq!(outcome.header.motors, vec!["ss_x"]);
        let em1 = outcome.record("em1").unwrap();
        assert_eq!(em1.value().unwrap().shape(), vec![1, 5]);
        assert_eq!(em1.timestamps["em1"].len(), 1);
        assert_eq!(
            recorder.kinds(),
            vec!["start", "descriptor", "descriptor", "record", "record", "stop"]
        );
    }

    #[tokio::test]
    async fn test_configuration_error_issues_no_device_call() {
        let journal = CallJournal::new();
        let orchestrator = RasterOrchestrator::new(
            Arc::new(registry(&journal)),
            RasterSettings::default(),
        );
        let plan = RasterScan::new("ss_x", 0.0, 10.0, 5).with_lines(3);

        let err = orchestrator.run(&plan).await.unwrap_err();
        assert!(err.is_configuration());
        assert!(journal.calls().is_empty());
        assert_eq!(orchestrator.state(), RasterState::Aborted);
    }

    #[tokio::test]
    async fn test_per_raster_channel_armed_once_and_completed_once() {
        let journal = CallJournal::new();
        let orchestrator = RasterOrchestrator::new(
            Arc::new(registry(&journal)),
            RasterSettings::default(),
        );
        let plan = RasterScan::new("ss_x", 0.0, 10.0, 5)
            .with_slow_axis("ss_y", 0.0, 4.0, 3)
            .with_detectors(&["em1", "pil1M"]);
        orchestrator.run(&plan).await.unwrap();

        assert_eq!(journal.count("pil1M", "start"), 1);
        assert_eq!(journal.count("pil1M", "complete"), 1);
        assert_eq!(journal.count("em1", "start"), 3);
        assert_eq!(journal.count("em1", "complete"), 3);
    }

    #[tokio::test]
    async fn test_second_run_while_busy_is_rejected() {
        let journal = CallJournal::new();
        let orchestrator = Arc::new(RasterOrchestrator::new(
            Arc::new(registry(&journal)),
            RasterSettings::default(),
        ));
        let plan = RasterScan::new("ss_x", 0.0, 10.0, 50)
            .with_slow_axis("ss_y", 0.0, 4.0, 5)
            .with_detector("em1");

        let mut states = orchestrator.subscribe();
        let first = {
            let orchestrator = orchestrator.clone();
            let plan = plan.clone();
            tokio::spawn(async move { orchestrator.run(&plan).await })
        };
        states
            .wait_for(|s| matches!(s, RasterState::Running { .. }))
            .await
            .unwrap();

        assert!(matches!(orchestrator.run(&plan).await, Err(DaqError::Busy)));
        first.await.unwrap().unwrap();
    }
}
