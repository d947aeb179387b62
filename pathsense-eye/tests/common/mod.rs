//! Shared fixtures: a deterministic stub inference engine and synthetic frames
#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pathsense_eye::{
    EnvironmentMode, InferenceEngine, InferenceSession, PipelineConfig, Rotation, SensorFrame,
    Tensor, VisionError, YuvPlanes, COCO_CLASSES,
};

pub const DETECTOR_FILE: &str = "yolov8m.onnx";
pub const DEPTH_INDOOR_FILE: &str = "depth_anything_v2_metric_hypersim_vits.onnx";
pub const DEPTH_OUTDOOR_FILE: &str = "depth_anything_v2_metric_vkitti_vits.onnx";

/// Inference engine producing fixed outputs: one confident car candidate from
/// the detector and a uniform depth plane from the depth model.
pub struct StubEngine {
    pub depth_value: f32,
    pub detector_fails: bool,
    pub depth_fails: bool,
    pub detect_runs: Arc<AtomicUsize>,
    pub depth_runs: Arc<AtomicUsize>,
}

impl Default for StubEngine {
    fn default() -> Self {
        Self {
            depth_value: 1.5,
            detector_fails: false,
            depth_fails: false,
            detect_runs: Arc::new(AtomicUsize::new(0)),
            depth_runs: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl InferenceEngine for StubEngine {
    fn load(&self, model_path: &Path) -> Result<Box<dyn InferenceSession>, VisionError> {
        let name = model_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        if name.contains("depth") {
            Ok(Box::new(DepthStubSession {
                value: self.depth_value,
                fails: self.depth_fails,
                runs: self.depth_runs.clone(),
            }))
        } else {
            Ok(Box::new(DetectorStubSession {
                fails: self.detector_fails,
                runs: self.detect_runs.clone(),
            }))
        }
    }
}

struct DetectorStubSession {
    fails: bool,
    runs: Arc<AtomicUsize>,
}

impl InferenceSession for DetectorStubSession {
    fn run(&self, _input: &Tensor) -> Result<Vec<Tensor>, VisionError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if self.fails {
            return Err(VisionError::Inference("detector stub failure".to_string()));
        }
        // Two candidates in [1, N, 4+C] layout: a confident car in the middle
        // of the model canvas and one below the confidence threshold.
        let props = 4 + COCO_CLASSES.len();
        let mut data = vec![0.0f32; 2 * props];
        data[0] = 320.0; // cx
        data[1] = 320.0; // cy
        data[2] = 100.0; // w
        data[3] = 80.0; // h
        data[4 + 2] = 0.9; // car

        let base = props;
        data[base] = 10.0;
        data[base + 1] = 10.0;
        data[base + 2] = 4.0;
        data[base + 3] = 4.0;
        data[base + 4] = 0.1; // person, below threshold

        Ok(vec![Tensor::new(vec![1, 2, props], data).unwrap()])
    }
}

struct DepthStubSession {
    value: f32,
    fails: bool,
    runs: Arc<AtomicUsize>,
}

impl InferenceSession for DepthStubSession {
    fn run(&self, input: &Tensor) -> Result<Vec<Tensor>, VisionError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if self.fails {
            return Err(VisionError::Inference("depth stub failure".to_string()));
        }
        let size = input.shape[2];
        Ok(vec![Tensor::new(
            vec![1, size, size],
            vec![self.value; size * size],
        )
        .unwrap()])
    }
}

/// Uniform mid-gray frame with neutral chroma.
pub fn gray_frame(width: usize, height: usize) -> SensorFrame {
    gray_frame_rotated(width, height, Rotation::None)
}

pub fn gray_frame_rotated(width: usize, height: usize, rotation: Rotation) -> SensorFrame {
    let uv_len = (width / 2).max(1) * (height / 2).max(1);
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
        rotation,
    }
}

/// Place model files so the manager resolves them.
pub fn write_model_files(dir: &Path, indoor_depth: bool, outdoor_depth: bool) {
    std::fs::write(dir.join(DETECTOR_FILE), b"stub").unwrap();
    if indoor_depth {
        std::fs::write(dir.join(DEPTH_INDOOR_FILE), b"stub").unwrap();
    }
    if outdoor_depth {
        std::fs::write(dir.join(DEPTH_OUTDOOR_FILE), b"stub").unwrap();
    }
}

pub fn test_config(model_dir: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.model_dir = model_dir.to_path_buf();
    config.capture_timeout = std::time::Duration::from_millis(50);
    config.environment = EnvironmentMode::Indoor;
    config
}
