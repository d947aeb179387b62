//! Model file resolution per environment mode

use std::path::PathBuf;

use tracing::info;

use crate::config::{EnvironmentMode, PipelineConfig};
use crate::error::VisionError;

const DETECTOR_MODEL_FILE: &str = "yolov8m.onnx";
const DEPTH_INDOOR_MODEL_FILE: &str = "depth_anything_v2_metric_hypersim_vits.onnx";
const DEPTH_OUTDOOR_MODEL_FILE: &str = "depth_anything_v2_metric_vkitti_vits.onnx";

/// Resolves model files under the configured model directory. Download and
/// installation of model packages happen elsewhere; this only answers "where is
/// it" and "is it present".
pub struct ModelManager {
    model_dir: PathBuf,
}

impl ModelManager {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            model_dir: config.model_dir.clone(),
        }
    }

    /// Path to the detector model. The detector is required: a missing file is
    /// an error because the whole pipeline cannot run without it.
    pub fn detector_model_path(&self) -> Result<PathBuf, VisionError> {
        let path = self.model_dir.join(DETECTOR_MODEL_FILE);
        if !path.is_file() {
            return Err(VisionError::Model(format!(
                "Detector model missing at {:?}",
                path
            )));
        }
        Ok(path)
    }

    /// Path to the depth model for `mode`. A missing file is an error, but the
    /// caller may continue detector-only and retry after the model appears.
    pub fn depth_model_path(&self, mode: EnvironmentMode) -> Result<PathBuf, VisionError> {
        let path = self.model_dir.join(depth_model_file(mode));
        if !path.is_file() {
            return Err(VisionError::Model(format!(
                "Depth model for {} missing at {:?}",
                mode.as_str(),
                path
            )));
        }
        info!("Resolved {} depth model at {:?}", mode.as_str(), path);
        Ok(path)
    }

    /// Whether the depth model for `mode` is present on disk.
    pub fn is_depth_model_available(&self, mode: EnvironmentMode) -> bool {
        self.model_dir.join(depth_model_file(mode)).is_file()
    }
}

fn depth_model_file(mode: EnvironmentMode) -> &'static str {
    match mode {
        EnvironmentMode::Indoor => DEPTH_INDOOR_MODEL_FILE,
        EnvironmentMode::Outdoor => DEPTH_OUTDOOR_MODEL_FILE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.model_dir = dir.path().to_path_buf();
        config
    }

    #[test]
    fn test_detector_model_missing_is_error() {
        let dir = TempDir::new().unwrap();
        let manager = ModelManager::new(&config_in(&dir));
        assert!(manager.detector_model_path().is_err());
    }

    #[test]
    fn test_detector_model_resolves_when_present() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(DETECTOR_MODEL_FILE), b"onnx").unwrap();
        let manager = ModelManager::new(&config_in(&dir));
        assert!(manager.detector_model_path().is_ok());
    }

    #[test]
    fn test_depth_availability_tracks_mode() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(DEPTH_INDOOR_MODEL_FILE), b"onnx").unwrap();
        let manager = ModelManager::new(&config_in(&dir));
        assert!(manager.is_depth_model_available(EnvironmentMode::Indoor));
        assert!(!manager.is_depth_model_available(EnvironmentMode::Outdoor));
        assert!(manager.depth_model_path(EnvironmentMode::Indoor).is_ok());
        assert!(manager.depth_model_path(EnvironmentMode::Outdoor).is_err());
    }
}
