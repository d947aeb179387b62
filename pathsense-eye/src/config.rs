//! Configuration for the perception pipeline

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::VisionError;

/// Which depth-model weights are active. Switching modes reloads the depth
/// engine and invalidates any cached depth map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EnvironmentMode {
    #[default]
    Indoor,
    Outdoor,
}

impl EnvironmentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvironmentMode::Indoor => "INDOOR",
            EnvironmentMode::Outdoor => "OUTDOOR",
        }
    }

    /// Parse a persisted mode string; unknown values fall back to Indoor.
    pub fn from_str_or_default(value: &str) -> Self {
        match value {
            "OUTDOOR" => EnvironmentMode::Outdoor,
            _ => EnvironmentMode::Indoor,
        }
    }
}

/// Perception pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory holding the detector and depth model files
    pub model_dir: PathBuf,
    /// Detector input side (square), pixels
    pub detector_input: usize,
    /// Depth model input side (square), pixels
    pub depth_input: usize,
    /// Depth model stride; content dimensions are rounded to a multiple of this
    pub depth_stride: usize,
    /// Minimum class score for a detection candidate to survive
    pub confidence_threshold: f32,
    /// IoU above which a lower-scoring box of the same class is suppressed
    pub iou_threshold: f32,
    /// Minimum time between depth inferences
    pub depth_interval: Duration,
    /// Maximum age at which a cached depth map may be reused
    pub depth_cache: Duration,
    /// Blur the detector input before inference
    pub blur_enabled: bool,
    /// Blur kernel radius (1 => 3x3)
    pub blur_radius: usize,
    /// Bounded wait for one frame during sequential dual capture
    pub capture_timeout: Duration,
    /// Fraction of the detection box used when selecting the sampling region
    pub danger_region_fraction: f32,
    /// Fixed scale calibrating raw depth output to real-world centimeters
    pub base_depth_scale: f32,
    /// Active depth-model environment
    pub environment: EnvironmentMode,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let model_dir = dirs::home_dir()
            .map(|mut p| {
                p.push(".pathsense");
                p.push("models");
                p
            })
            .unwrap_or_else(|| PathBuf::from("./models"));

        Self {
            model_dir,
            detector_input: 640,
            depth_input: 518,
            depth_stride: 14,
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            depth_interval: Duration::from_millis(1500),
            depth_cache: Duration::from_millis(3000),
            blur_enabled: true,
            blur_radius: 1,
            capture_timeout: Duration::from_millis(1500),
            danger_region_fraction: 0.2,
            base_depth_scale: 0.33,
            environment: EnvironmentMode::Indoor,
        }
    }
}

impl PipelineConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), VisionError> {
        if self.detector_input == 0 {
            return Err(VisionError::Config(
                "Detector input size must be non-zero".to_string(),
            ));
        }
        if self.depth_stride == 0 {
            return Err(VisionError::Config(
                "Depth stride must be non-zero".to_string(),
            ));
        }
        if self.depth_input < self.depth_stride {
            return Err(VisionError::Config(
                "Depth input size must be at least one stride".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(VisionError::Config(
                "Confidence threshold must be within [0, 1]".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(VisionError::Config(
                "IoU threshold must be within [0, 1]".to_string(),
            ));
        }
        if self.depth_interval.is_zero() {
            return Err(VisionError::Config(
                "Depth interval must be non-zero".to_string(),
            ));
        }
        if !(0.0..0.5).contains(&self.danger_region_fraction) {
            return Err(VisionError::Config(
                "Danger region fraction must be within [0, 0.5)".to_string(),
            ));
        }
        if self.base_depth_scale <= 0.0 || !self.base_depth_scale.is_finite() {
            return Err(VisionError::Config(
                "Base depth scale must be a positive finite value".to_string(),
            ));
        }
        if self.blur_radius > 16 {
            return Err(VisionError::Config(
                "Blur radius too large (max 16)".to_string(),
            ));
        }
        Ok(())
    }
}
