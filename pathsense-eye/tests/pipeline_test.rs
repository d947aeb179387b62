//! End-to-end pipeline tests against the stub inference engine

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use pathsense_eye::{CalibrationScale, EnvironmentMode, FramePipeline, InferenceEngine, Rotation};
use tempfile::TempDir;
use tokio::sync::mpsc;

use common::{gray_frame, gray_frame_rotated, test_config, write_model_files, StubEngine};

fn pipeline_with(engine: StubEngine, dir: &TempDir) -> FramePipeline {
    let config = test_config(dir.path());
    FramePipeline::new(
        config,
        Arc::new(engine) as Arc<dyn InferenceEngine>,
        Arc::new(CalibrationScale::default()),
    )
    .unwrap()
}

#[tokio::test]
async fn test_analyze_frame_attaches_distance() {
    let dir = TempDir::new().unwrap();
    write_model_files(dir.path(), true, false);
    let pipeline = pipeline_with(StubEngine::default(), &dir);
    assert!(pipeline.is_depth_available());

    let analysis = pipeline.analyze_frame(gray_frame(64, 48)).await.unwrap();
    assert_eq!(analysis.width, 64);
    assert_eq!(analysis.height, 48);
    assert!(analysis.depth.is_some());

    // The weak stub candidate is thresholded away.
    assert_eq!(analysis.detections.len(), 1);
    let det = &analysis.detections[0];
    assert_eq!(det.class_id, 2);
    // 64x48 letterboxes into 640 with scale 10 and a 80px vertical pad:
    // model box (270,280)-(370,360) maps back to (27,20)-(37,28).
    assert!((det.x1 - 27.0).abs() < 1e-3);
    assert!((det.y1 - 20.0).abs() < 1e-3);
    assert!((det.x2 - 37.0).abs() < 1e-3);
    assert!((det.y2 - 28.0).abs() < 1e-3);
    // Uniform 1.5m depth: 1.5 * 100 * 0.33 = 49.5cm.
    assert!((det.distance_cm - 49.5).abs() < 1e-3);
}

#[tokio::test]
async fn test_rotation_swaps_analysis_dimensions() {
    let dir = TempDir::new().unwrap();
    write_model_files(dir.path(), true, false);
    let pipeline = pipeline_with(StubEngine::default(), &dir);

    let analysis = pipeline
        .analyze_frame(gray_frame_rotated(64, 48, Rotation::Deg90))
        .await
        .unwrap();
    assert_eq!(analysis.width, 48);
    assert_eq!(analysis.height, 64);
}

#[tokio::test]
async fn test_detector_failure_degrades_to_empty() {
    let dir = TempDir::new().unwrap();
    write_model_files(dir.path(), true, false);
    let engine = StubEngine {
        detector_fails: true,
        ..Default::default()
    };
    let pipeline = pipeline_with(engine, &dir);

    let analysis = pipeline.analyze_frame(gray_frame(64, 48)).await.unwrap();
    assert!(analysis.detections.is_empty());
    // Depth still ran; the frame is not a total loss.
    assert!(analysis.depth.is_some());
}

#[tokio::test]
async fn test_depth_failure_yields_detection_only() {
    let dir = TempDir::new().unwrap();
    write_model_files(dir.path(), true, false);
    let engine = StubEngine {
        depth_fails: true,
        ..Default::default()
    };
    let pipeline = pipeline_with(engine, &dir);

    let analysis = pipeline.analyze_frame(gray_frame(64, 48)).await.unwrap();
    assert_eq!(analysis.detections.len(), 1);
    assert!(analysis.depth.is_none());
    assert!(analysis.detections[0].distance_cm.is_nan());
}

#[tokio::test]
async fn test_missing_depth_model_runs_detector_only() {
    let dir = TempDir::new().unwrap();
    write_model_files(dir.path(), false, false);
    let pipeline = pipeline_with(StubEngine::default(), &dir);
    assert!(!pipeline.is_depth_available());

    let analysis = pipeline.analyze_frame(gray_frame(64, 48)).await.unwrap();
    assert_eq!(analysis.detections.len(), 1);
    assert!(analysis.depth.is_none());
}

#[tokio::test]
async fn test_missing_detector_model_is_fatal() {
    let dir = TempDir::new().unwrap();
    // No files at all: the pipeline cannot start.
    let config = test_config(dir.path());
    let result = FramePipeline::new(
        config,
        Arc::new(StubEngine::default()) as Arc<dyn InferenceEngine>,
        Arc::new(CalibrationScale::default()),
    );
    assert!(result.is_err());
}

#[tokio::test]
async fn test_depth_throttle_reuses_across_frames() {
    let dir = TempDir::new().unwrap();
    write_model_files(dir.path(), true, false);
    let engine = StubEngine::default();
    let detect_runs = engine.detect_runs.clone();
    let depth_runs = engine.depth_runs.clone();
    let pipeline = pipeline_with(engine, &dir);

    pipeline.analyze_frame(gray_frame(64, 48)).await.unwrap();
    pipeline.analyze_frame(gray_frame(64, 48)).await.unwrap();

    // Detection runs every frame; depth ran once and was reused within the
    // throttle interval.
    assert_eq!(detect_runs.load(Ordering::SeqCst), 2);
    assert_eq!(depth_runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_environment_switch_to_missing_model_degrades() {
    let dir = TempDir::new().unwrap();
    write_model_files(dir.path(), true, false);
    let pipeline = pipeline_with(StubEngine::default(), &dir);
    assert!(pipeline.is_depth_available());

    // Outdoor weights are absent: the switch fails and depth is disabled...
    assert!(pipeline
        .set_environment_mode(EnvironmentMode::Outdoor)
        .await
        .is_err());
    assert!(!pipeline.is_depth_available());
    assert_eq!(pipeline.environment_mode(), EnvironmentMode::Outdoor);

    // ...but switching back recovers without rebuilding the pipeline.
    assert!(pipeline
        .set_environment_mode(EnvironmentMode::Indoor)
        .await
        .is_ok());
    assert!(pipeline.is_depth_available());
}

#[tokio::test]
async fn test_environment_switch_resets_depth_cache() {
    let dir = TempDir::new().unwrap();
    write_model_files(dir.path(), true, true);
    let engine = StubEngine::default();
    let depth_runs = engine.depth_runs.clone();
    let pipeline = pipeline_with(engine, &dir);

    pipeline.analyze_frame(gray_frame(64, 48)).await.unwrap();
    assert_eq!(depth_runs.load(Ordering::SeqCst), 1);

    pipeline
        .set_environment_mode(EnvironmentMode::Outdoor)
        .await
        .unwrap();

    // The cache was invalidated with the mode switch, so the next frame runs
    // fresh depth inference even though the interval has not elapsed.
    pipeline.analyze_frame(gray_frame(64, 48)).await.unwrap();
    assert_eq!(depth_runs.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_single_shot_processes_exactly_one_frame() {
    let dir = TempDir::new().unwrap();
    write_model_files(dir.path(), true, false);
    let pipeline = pipeline_with(StubEngine::default(), &dir);

    let mut events = pipeline.subscribe();
    let (tx, rx) = mpsc::channel(4);
    pipeline.start(rx).unwrap();

    pipeline.set_realtime(false);
    assert!(pipeline.request_single_shot());
    // A second request is rejected while the first is pending.
    assert!(!pipeline.request_single_shot());

    tx.send(gray_frame(64, 48)).await.unwrap();
    let analysis = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("single-shot analysis published")
        .unwrap();
    assert_eq!(analysis.detections.len(), 1);

    // With the one-shot consumed and realtime paused, further frames are
    // dropped.
    tx.send(gray_frame(64, 48)).await.unwrap();
    assert!(
        tokio::time::timeout(Duration::from_millis(300), events.recv())
            .await
            .is_err()
    );

    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_realtime_loop_publishes_analyses() {
    let dir = TempDir::new().unwrap();
    write_model_files(dir.path(), true, false);
    let pipeline = pipeline_with(StubEngine::default(), &dir);

    let mut events = pipeline.subscribe();
    let (tx, rx) = mpsc::channel(4);
    pipeline.start(rx).unwrap();
    // Starting twice is an error while the loop is alive.
    let (_tx2, rx2) = mpsc::channel(1);
    assert!(pipeline.start(rx2).is_err());

    tx.send(gray_frame(64, 48)).await.unwrap();
    tx.send(gray_frame(64, 48)).await.unwrap();

    for _ in 0..2 {
        let analysis = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("analysis published")
            .unwrap();
        assert_eq!(analysis.width, 64);
    }

    pipeline.shutdown().await;
}
