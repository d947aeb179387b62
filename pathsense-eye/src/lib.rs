//! pathsense-eye: real-time perception for assisted navigation
//!
//! Detects obstacles in a live camera feed and estimates their distance by
//! running an object detector and a monocular depth estimator side by side.
//! Depth inference is throttled and cached; per-object distances come from a
//! class-aware sampling heuristic with per-device calibration. A sequential
//! dual-camera capture mode trades latency for a more reliable single-shot
//! estimate on devices with multiple rear lenses.
//!
//! Camera hardware, model downloads, rendering, and speech output are
//! collaborators behind narrow traits; the inference engine itself is opaque
//! (load a model, run a tensor in, get tensors out).

pub mod calibration;
pub mod camera;
pub mod config;
pub mod error;
pub mod frame;
pub mod imaging;
pub mod inference;
pub mod models;
pub mod pipeline;
pub mod processing;
pub mod stereo;
pub mod store;

pub use calibration::{calibration_key, CalibrationScale};
pub use camera::{choose_sequential_ids, CameraInfo, CaptureBinding};
pub use config::{EnvironmentMode, PipelineConfig};
pub use error::VisionError;
pub use frame::{RgbFrame, Rotation, SensorFrame, YuvPlanes};
pub use inference::{InferenceEngine, InferenceSession, Tensor};
pub use models::{class_name, format_label, DepthMap, Detection, COCO_CLASSES};
pub use pipeline::{DepthFusion, FrameAnalysis, FramePipeline};
pub use stereo::DualCaptureResult;
pub use store::{CalibrationStore, JsonSettingsStore, ModeStore};
