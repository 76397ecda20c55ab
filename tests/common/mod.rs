//! Simulated LIX beamline shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use lix_daq::config::RasterSettings;
use lix_daq::experiment::{MemoryRecorder, RasterOrchestrator};
use lix_daq::hardware::mock::{
    CallJournal, MockAreaDetector, MockMonitor, MockShutter, MockStage, MockTrajectory,
};
use lix_daq::hardware::{ChannelDescriptor, DeviceRegistry};

/// Simulated durations are multiplied by this.
pub const TIME_SCALE: f64 = 0.01;

/// Unregistered mocks, open for fault injection before `build`.
pub struct BeamlineBuilder {
    pub journal: CallJournal,
    pub fast: MockStage,
    pub slow: MockStage,
    pub trajectory: MockTrajectory,
    pub em1: MockMonitor,
    pub pil1m: MockAreaDetector,
    pub shutter: MockShutter,
}

impl BeamlineBuilder {
    pub fn new() -> Self {
        let journal = CallJournal::new();
        Self {
            fast: MockStage::named("ss_x")
                .with_speed(1000.0)
                .with_journal(journal.clone()),
            slow: MockStage::named("ss_y")
                .with_speed(1000.0)
                .with_journal(journal.clone()),
            trajectory: MockTrajectory::new("pp")
                .with_time_scale(TIME_SCALE)
                .with_journal(journal.clone()),
            em1: MockMonitor::new("em1")
                .with_time_scale(TIME_SCALE)
                .with_journal(journal.clone()),
            pil1m: MockAreaDetector::new("pil1M")
                .with_time_scale(TIME_SCALE)
                .with_journal(journal.clone()),
            shutter: MockShutter::new("fs").with_journal(journal.clone()),
            journal,
        }
    }

    pub fn build(self) -> Beamline {
        let fast = Arc::new(self.fast);
        let slow = Arc::new(self.slow);
        let trajectory = Arc::new(self.trajectory);
        let em1 = Arc::new(self.em1);
        let pil1m = Arc::new(self.pil1m);
        let shutter = Arc::new(self.shutter);

        let mut registry = DeviceRegistry::new();
        registry.register_motor("ss_x", fast.clone());
        registry.register_motor("ss_y", slow.clone());
        registry
            .attach_trajectory("ss_x", "pp", trajectory.clone())
            .expect("ss_x is registered");
        registry.register_channel(
            "em1",
            em1.clone(),
            ChannelDescriptor::monitor().with_capacity(1000),
        );
        registry.register_channel("pil1M", pil1m.clone(), ChannelDescriptor::area_detector());
        registry.register_shutter("fs", shutter.clone());

        Beamline {
            journal: self.journal,
            registry: Arc::new(registry),
            fast,
            slow,
            trajectory,
            em1,
            pil1m,
            shutter,
        }
    }
}

/// Registered mocks plus direct handles for assertions.
pub struct Beamline {
    pub journal: CallJournal,
    pub registry: Arc<DeviceRegistry>,
    pub fast: Arc<MockStage>,
    pub slow: Arc<MockStage>,
    pub trajectory: Arc<MockTrajectory>,
    pub em1: Arc<MockMonitor>,
    pub pil1m: Arc<MockAreaDetector>,
    pub shutter: Arc<MockShutter>,
}

impl Beamline {
    pub fn new() -> Self {
        BeamlineBuilder::new().build()
    }

    /// Orchestrator with default settings recording into the returned recorder.
    pub fn orchestrator(&self) -> (RasterOrchestrator, Arc<MemoryRecorder>) {
        let recorder = Arc::new(MemoryRecorder::new());
        let orchestrator =
            RasterOrchestrator::new(self.registry.clone(), RasterSettings::default())
                .with_recorder(recorder.clone());
        (orchestrator, recorder)
    }

    /// Issued calls of the given operations, as "device.operation", in issue order.
    pub fn issued(&self, operations: &[&str]) -> Vec<String> {
        self.journal
            .calls()
            .into_iter()
            .filter(|c| operations.contains(&c.operation))
            .map(|c| format!("{}.{}", c.device, c.operation))
            .collect()
    }
}
