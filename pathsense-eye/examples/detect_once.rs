//! Smoke test for the ONNX Runtime backend: runs the full pipeline once on a
//! synthetic frame and prints the resulting labels.
//!
//! Expects the detector and depth models under `~/.pathsense/models`.
//!
//! ```sh
//! cargo run --example detect_once --features backend-ort
//! ```

use std::sync::Arc;

use anyhow::Result;
use pathsense_eye::inference::ort::OrtEngine;
use pathsense_eye::{
    format_label, CalibrationScale, FramePipeline, InferenceEngine, PipelineConfig, Rotation,
    SensorFrame, YuvPlanes,
};

fn synthetic_frame(width: usize, height: usize) -> SensorFrame {
    let uv_len = (width / 2) * (height / 2);
    SensorFrame {
        yuv: YuvPlanes {
            width,
            height,
            y: vec![128; width * height],
            u: vec![128; uv_len],
            v: vec![128; uv_len],
            y_row_stride: width,
            uv_row_stride: width / 2,
            uv_pixel_stride: 1,
        },
        rotation: Rotation::None,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let pipeline = FramePipeline::new(
        PipelineConfig::default(),
        Arc::new(OrtEngine) as Arc<dyn InferenceEngine>,
        Arc::new(CalibrationScale::default()),
    )?;

    let analysis = pipeline.analyze_frame(synthetic_frame(640, 480)).await?;
    println!(
        "{} detections in {}x{} frame (depth {})",
        analysis.detections.len(),
        analysis.width,
        analysis.height,
        if analysis.depth.is_some() {
            "available"
        } else {
            "unavailable"
        }
    );
    for det in &analysis.detections {
        println!("  {}", format_label(det));
    }
    Ok(())
}
