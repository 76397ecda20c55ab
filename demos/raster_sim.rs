//! Simulated Raster Fly Scan
//!
//! Runs a 3 x 5 serpentine raster on simulated hardware (trajectory
//! controller, beam-intensity monitor, area detector, fast shutter) and
//! prints every run document as JSON, one per line.
//!
//! # Running
//! ```bash
//! cargo run --example raster_sim
//! RUST_LOG=lix_daq=debug cargo run --example raster_sim
//! ```

use std::sync::Arc;

use lix_daq::config::RasterConfig;
use lix_daq::experiment::{run_with_shutter, BroadcastRecorder, RasterOrchestrator, RasterScan};
use lix_daq::hardware::mock::{
    MockAreaDetector, MockMonitor, MockShutter, MockStage, MockTrajectory,
};
use lix_daq::hardware::{ChannelDescriptor, DeviceRegistry};
use lix_daq::telemetry::init_tracing;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = RasterConfig::load()?;
    init_tracing(&config.application)?;
    info!(app = %config.application.name, "starting simulated raster");

    let mut registry = DeviceRegistry::new();
    registry.register_motor("ss_x", Arc::new(MockStage::named("ss_x").with_speed(50.0)));
    registry.register_motor("ss_y", Arc::new(MockStage::named("ss_y").with_speed(50.0)));
    registry.attach_trajectory("ss_x", "pp", Arc::new(MockTrajectory::new("pp")))?;
    registry.register_channel(
        "em1",
        Arc::new(MockMonitor::new("em1")),
        ChannelDescriptor::monitor().with_capacity(4096),
    );
    registry.register_channel(
        "pil1M",
        Arc::new(MockAreaDetector::new("pil1M")),
        ChannelDescriptor::area_detector(),
    );
    registry.register_shutter("fs", Arc::new(MockShutter::new("fs")));
    let registry = Arc::new(registry);
    let shutter = registry.shutter("fs")?;

    let recorder = BroadcastRecorder::new(64);
    let mut documents = recorder.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(doc) = documents.recv().await {
            match serde_json::to_string(&doc) {
                Ok(json) => println!("{json}"),
                Err(e) => eprintln!("unserializable {} document: {e}", doc.kind()),
            }
        }
    });

    let orchestrator = RasterOrchestrator::new(registry.clone(), config.raster)
        .with_recorder(Arc::new(recorder));

    let plan = RasterScan::new("ss_x", 0.0, 2.0, 5)
        .with_slow_axis("ss_y", 0.0, 1.0, 3)
        .with_exposure(0.05)
        .with_detectors(&["em1", "pil1M"])
        .with_metadata("sample", "simulated");

    let outcome = run_with_shutter("fs", shutter.as_ref(), orchestrator.run(&plan)).await?;
    info!(
        run_uid = %outcome.run_uid,
        lines = outcome.lines_run,
        shape = ?outcome.header.shape,
        "raster finished"
    );

    drop(orchestrator);
    printer.await?;
    Ok(())
}
