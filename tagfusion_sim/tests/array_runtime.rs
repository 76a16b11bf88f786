//! Multi-array fusion through the sensor array runtime.

use approx::assert_relative_eq;
use std::sync::Arc;
use std::time::Duration;
use tagfusion_core::{
    ConfigError, FailureSink, FusedPosition, FusionConfig, FusionEngine, RecordingSink, Sensor,
    SensorArray, SensorArrayRuntime,
};
use tagfusion_env::{
    DiagnosticReport, LocationReport, ReaderError, ReaderOp, ReaderReport, Session, SpatialMode,
    TagId,
};
use tagfusion_sim::{SimContext, SimReader};
use tokio::time::timeout;

type Runtime = SensorArrayRuntime<SimContext, SimReader>;

fn array() -> SensorArray {
    SensorArray::new(vec![
        Sensor::new("xarray-a", 300, 0, 0, 0, Session(2)),
        Sensor::new("xarray-b", 300, 0, 400, 0, Session(3)),
    ])
    .unwrap()
}

fn readers() -> Vec<Arc<SimReader>> {
    vec![
        Arc::new(SimReader::new("xarray-a")),
        Arc::new(SimReader::new("xarray-b")),
    ]
}

fn build(
    readers: Vec<Arc<SimReader>>,
    sink: Arc<RecordingSink>,
) -> Result<Runtime, ConfigError> {
    let config = FusionConfig::default();
    let engine = Arc::new(FusionEngine::new(&config)?);
    let sink: Arc<dyn FailureSink> = sink;
    SensorArrayRuntime::new(SimContext::shared(), engine, config, array(), readers, sink)
}

fn location(tag: &str, x_cm: i32, y_cm: i32, read_count: u32) -> ReaderReport {
    ReaderReport::Location(LocationReport {
        tag: TagId::new(tag),
        x_cm,
        y_cm,
        read_count,
    })
}

fn cycle(micros: u32) -> ReaderReport {
    ReaderReport::Diagnostic(DiagnosticReport::end_of_cycle(micros))
}

async fn drained(reader: &SimReader) {
    while reader.pending() > 0 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_two_arrays_fuse_weighted_position() {
    let readers = readers();
    let runtime = build(readers.clone(), Arc::new(RecordingSink::new())).unwrap();
    let mut estimates = runtime.launch().await;

    // 30 s window over 2 s cycles: 15 expected cycles per array
    readers[0].push_report(cycle(2_000_000));
    readers[0].push_report(location("E1", 100, 200, 30));
    drained(&readers[0]).await;

    readers[1].push_report(cycle(2_000_000));
    readers[1].push_report(location("E1", 250, 500, 15));

    let estimate = timeout(Duration::from_secs(5), estimates.recv())
        .await
        .expect("estimate in time")
        .expect("channel open");

    assert_eq!(estimate.tag, TagId::new("E1"));
    assert_eq!(estimate.position, FusedPosition::Position { x_cm: 150, y_cm: 300 });
    assert_eq!(estimate.observations, 2);
    assert_relative_eq!(estimate.confidence_sum, 3.0);

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_reports_before_cycle_time_are_dropped() {
    let readers = readers();
    let runtime = build(readers.clone(), Arc::new(RecordingSink::new())).unwrap();
    let mut estimates = runtime.launch().await;

    // Trigger array reports before either array has a cycle time
    readers[1].push_report(location("E1", 10, 10, 5));
    drained(&readers[1]).await;
    assert!(estimates.try_recv().is_err());
    assert!(runtime.engine().tracked_tags().is_empty());

    readers[1].push_report(cycle(3_000_000));
    readers[1].push_report(location("E1", 10, 10, 5));
    let estimate = timeout(Duration::from_secs(5), estimates.recv())
        .await
        .expect("estimate in time")
        .expect("channel open");
    assert_eq!(estimate.position, FusedPosition::Position { x_cm: 10, y_cm: 10 });

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_zero_reads_yield_invalid_estimate() {
    let readers = readers();
    let runtime = build(readers.clone(), Arc::new(RecordingSink::new())).unwrap();
    let mut estimates = runtime.launch().await;

    readers[1].push_report(cycle(2_000_000));
    readers[1].push_report(location("E7", 500, 500, 0));

    let estimate = timeout(Duration::from_secs(5), estimates.recv())
        .await
        .expect("estimate in time")
        .expect("channel open");
    assert!(!estimate.position.is_valid());
    assert_eq!(estimate.position.to_string(), "invalid read, confidence is 0");

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_launch_applies_location_settings_per_array() {
    let readers = readers();
    let runtime = build(readers.clone(), Arc::new(RecordingSink::new())).unwrap();
    let _estimates = runtime.launch().await;

    for (sensor, reader) in runtime.array().iter().zip(&readers) {
        let applied = reader.applied_settings();
        assert_eq!(applied.len(), 1);
        let settings = &applied[0];
        assert_eq!(settings.spatial_mode, SpatialMode::Location);
        assert_eq!(settings.session, sensor.session);
        assert_eq!(settings.placement, Some(sensor.placement));
        let reporting = settings.location.expect("location reporting");
        assert_eq!(reporting.compute_window_secs, 30);
        assert_eq!(reporting.tag_age_interval_secs, 60);
        assert_eq!(reporting.update_interval_secs, 10);
        assert!(reporting.diagnostic_reports);
        assert!(reader.is_running());
    }

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_reader_order_must_match_array() {
    let mut swapped = readers();
    swapped.reverse();
    let err = build(swapped, Arc::new(RecordingSink::new())).err();
    assert!(matches!(
        err,
        Some(ConfigError::ReaderMismatch { index: 0, .. })
    ));

    let mut short = readers();
    short.pop();
    let err = build(short, Arc::new(RecordingSink::new())).err();
    assert!(matches!(
        err,
        Some(ConfigError::ReaderCount { expected: 2, actual: 1 })
    ));
}

#[tokio::test]
async fn test_connect_failure_skips_array() {
    let readers = readers();
    let sink = Arc::new(RecordingSink::new());
    readers[0].fail_next(ReaderOp::Connect, ReaderError::connection("no route to host"));

    let runtime = build(readers.clone(), sink.clone()).unwrap();
    let _estimates = runtime.launch().await;

    assert_eq!(readers[0].ops(), vec![ReaderOp::Connect]);
    assert!(readers[1].is_running());
    assert_eq!(sink.count_for(ReaderOp::Connect), 1);

    // No feed task for the skipped array
    readers[0].push_report(cycle(2_000_000));
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(readers[0].pending(), 1);

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_settings_failure_still_feeds() {
    let readers = readers();
    let sink = Arc::new(RecordingSink::new());
    readers[1].fail_next(ReaderOp::ApplySettings, ReaderError::configuration("bad placement"));

    let runtime = build(readers.clone(), sink.clone()).unwrap();
    let mut estimates = runtime.launch().await;
    assert_eq!(sink.count_for(ReaderOp::ApplySettings), 1);

    readers[1].push_report(cycle(2_000_000));
    readers[1].push_report(location("E2", 40, 60, 15));
    let estimate = timeout(Duration::from_secs(5), estimates.recv())
        .await
        .expect("estimate in time")
        .expect("channel open");
    assert_eq!(estimate.tag, TagId::new("E2"));

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_restores_and_stops_feeds() {
    let readers = readers();
    let runtime = build(readers.clone(), Arc::new(RecordingSink::new())).unwrap();
    let _estimates = runtime.launch().await;

    runtime.shutdown().await;
    for reader in &readers {
        assert!(!reader.is_connected());
        assert!(reader.current_settings().is_none());
        let ops = reader.ops();
        assert_eq!(
            &ops[ops.len() - 2..],
            &[ReaderOp::ApplyDefaultSettings, ReaderOp::Disconnect]
        );
    }

    readers[1].push_report(cycle(2_000_000));
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(readers[1].pending(), 1);
}
