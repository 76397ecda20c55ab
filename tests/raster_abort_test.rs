//! Failure, cancellation and shutter handling.

mod common;

use common::{Beamline, BeamlineBuilder};
use lix_daq::experiment::{run_with_shutter, Document, RasterScan, RasterState};
use lix_daq::DaqError;
use tracing_test::traced_test;

fn three_line_plan() -> RasterScan {
    RasterScan::new("ss_x", 0.0, 10.0, 5)
        .with_slow_axis("ss_y", 0.0, 4.0, 3)
        .with_exposure(0.01)
        .with_detector("em1")
}

#[tokio::test]
#[traced_test]
async fn test_channel_failure_stops_devices_and_keeps_error() {
    let mut builder = BeamlineBuilder::new();
    builder.em1 = builder.em1.fail_on("complete", 2);
    builder.trajectory = builder.trajectory.fail_on("stop", 1);
    let beamline = builder.build();
    let (orchestrator, recorder) = beamline.orchestrator();

    let err = orchestrator.run(&three_line_plan()).await.unwrap_err();
    match &err {
        DaqError::Device {
            device, operation, ..
        } => {
            assert_eq!(device, "em1");
            assert_eq!(*operation, "complete");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(orchestrator.state(), RasterState::Aborted);

    let journal = &beamline.journal;
    for device in ["pp", "em1", "ss_x", "ss_y"] {
        assert_eq!(journal.count(device, "stop"), 1, "{device} not stopped");
    }
    assert_eq!(journal.count("pp", "start"), 2);
    assert_eq!(journal.count("pp", "collect"), 0);

    let Some(Document::Stop(stop)) = recorder.documents().last().cloned() else {
        panic!("run must end with a stop document");
    };
    assert_eq!(stop.exit_status, "fail");
    assert_eq!(stop.lines_completed, 1);

    assert!(logs_contain("raster aborted, stopping devices"));
    assert!(logs_contain("best-effort stop failed"));
}

#[tokio::test]
#[traced_test]
async fn test_failed_slow_move_aborts_remaining_lines() {
    let mut builder = BeamlineBuilder::new();
    builder.slow = builder.slow.fail_on("move", 3);
    let beamline = builder.build();
    let (orchestrator, _) = beamline.orchestrator();

    let err = orchestrator.run(&three_line_plan()).await.unwrap_err();
    assert!(matches!(
        err,
        DaqError::Device {
            operation: "move",
            ..
        }
    ));
    assert_eq!(beamline.journal.count("pp", "start"), 2);
    assert_eq!(beamline.journal.count("ss_y", "stop"), 1);
    assert!(logs_contain("raster aborted"));
    assert!(!logs_contain("best-effort stop failed"));
}

#[tokio::test]
async fn test_unstarted_channels_are_not_stopped() {
    let mut builder = BeamlineBuilder::new();
    builder.trajectory = builder.trajectory.fail_on("configure", 1);
    let beamline = builder.build();
    let (orchestrator, _) = beamline.orchestrator();

    let plan = three_line_plan().with_detector("pil1M");
    let err = orchestrator.run(&plan).await.unwrap_err();
    assert!(!err.is_configuration());

    assert_eq!(beamline.journal.count("pp", "stop"), 1);
    assert_eq!(beamline.journal.count("em1", "stop"), 0);
    assert_eq!(beamline.journal.count("pil1M", "stop"), 0);
}

#[tokio::test]
async fn test_armed_area_detector_stopped_when_completion_fails() {
    let mut builder = BeamlineBuilder::new();
    builder.pil1m = builder.pil1m.fail_on("complete", 1);
    let beamline = builder.build();
    let (orchestrator, recorder) = beamline.orchestrator();

    let plan = three_line_plan().with_detector("pil1M");
    let err = orchestrator.run(&plan).await.unwrap_err();
    match &err {
        DaqError::Device {
            device, operation, ..
        } => {
            assert_eq!(device, "pil1M");
            assert_eq!(*operation, "complete");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(orchestrator.state(), RasterState::Aborted);

    let journal = &beamline.journal;
    for device in ["pp", "em1", "pil1M", "ss_x", "ss_y"] {
        assert_eq!(journal.count(device, "stop"), 1, "{device} not stopped");
    }
    assert_eq!(journal.count("pil1M", "collect"), 0);

    let Some(Document::Stop(stop)) = recorder.documents().last().cloned() else {
        panic!("run must end with a stop document");
    };
    assert_eq!(stop.exit_status, "fail");
    assert_eq!(stop.lines_completed, 3);
}

#[tokio::test]
async fn test_abort_handle_cancels_running_raster() {
    let beamline = Beamline::new();
    let (orchestrator, recorder) = beamline.orchestrator();
    let orchestrator = std::sync::Arc::new(orchestrator);
    let abort = orchestrator.abort_handle();
    let mut states = orchestrator.subscribe();

    let plan = RasterScan::new("ss_x", 0.0, 10.0, 20)
        .with_slow_axis("ss_y", 0.0, 4.0, 40)
        .with_exposure(0.1)
        .with_detector("em1");
    let run = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.run(&plan).await })
    };

    states
        .wait_for(|s| matches!(s, RasterState::Running { line, .. } if *line >= 1))
        .await
        .expect("orchestrator alive");
    abort.abort();

    let err = run.await.expect("task joined").unwrap_err();
    assert!(matches!(err, DaqError::Cancelled));
    assert_eq!(orchestrator.state(), RasterState::Aborted);
    assert!(beamline.journal.count("pp", "start") < 40);
    for device in ["pp", "em1", "ss_x", "ss_y"] {
        assert_eq!(beamline.journal.count(device, "stop"), 1, "{device} not stopped");
    }

    let Some(Document::Stop(stop)) = recorder.documents().last().cloned() else {
        panic!("run must end with a stop document");
    };
    assert_eq!(stop.exit_status, "abort");
}

#[tokio::test]
async fn test_orchestrator_reusable_after_abort() {
    let mut builder = BeamlineBuilder::new();
    builder.em1 = builder.em1.fail_on("start", 1);
    let beamline = builder.build();
    let (orchestrator, _) = beamline.orchestrator();

    assert!(orchestrator.run(&three_line_plan()).await.is_err());
    let outcome = orchestrator
        .run(&three_line_plan())
        .await
        .expect("second run should succeed");
    assert_eq!(outcome.lines_run, 3);
    assert_eq!(orchestrator.state(), RasterState::Done);
}

#[tokio::test]
async fn test_shutter_wraps_successful_raster() {
    let beamline = Beamline::new();
    let (orchestrator, _) = beamline.orchestrator();

    let outcome = run_with_shutter(
        "fs",
        beamline.shutter.as_ref(),
        orchestrator.run(&three_line_plan()),
    )
    .await
    .expect("raster should succeed");
    assert_eq!(outcome.lines_run, 3);

    let journal = &beamline.journal;
    let open = journal.positions("fs", "open");
    let close = journal.positions("fs", "close");
    assert_eq!((open.len(), close.len()), (1, 1));
    assert!(open[0] < journal.positions("pp", "configure")[0]);
    assert!(close[0] > journal.positions("em1", "collect")[0]);
    assert!(!beamline.shutter.is_open());
}

#[tokio::test]
async fn test_shutter_closes_after_failed_raster() {
    let mut builder = BeamlineBuilder::new();
    builder.trajectory = builder.trajectory.fail_on("start", 2);
    let beamline = builder.build();
    let (orchestrator, _) = beamline.orchestrator();

    let shutter = beamline.registry.shutter("fs").expect("fs is registered");
    let err = run_with_shutter("fs", shutter.as_ref(), orchestrator.run(&three_line_plan()))
        .await
        .unwrap_err();
    assert!(matches!(err, DaqError::Device { .. }));

    let journal = &beamline.journal;
    assert_eq!(journal.operations("fs"), vec!["open", "close"]);
    assert!(journal.positions("fs", "close")[0] > journal.positions("pp", "stop")[0]);
    assert!(!beamline.shutter.is_open());
}
