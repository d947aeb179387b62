//! Camera metadata and the capture-binding collaborator seam

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::VisionError;
use crate::frame::SensorFrame;

/// Metadata for one usable rear camera.
#[derive(Debug, Clone)]
pub struct CameraInfo {
    pub id: String,
    pub focal_length_mm: f32,
}

/// Pick the cameras used for a sequential dual capture: the widest and the
/// longest lens among the available rear cameras, wide first. A single usable
/// camera yields a one-element list.
pub fn choose_sequential_ids(back_cameras: &[CameraInfo]) -> Vec<String> {
    if back_cameras.is_empty() {
        return Vec::new();
    }
    let mut sorted: Vec<&CameraInfo> = back_cameras.iter().collect();
    sorted.sort_by(|a, b| a.focal_length_mm.total_cmp(&b.focal_length_mm));

    let wide = sorted[0];
    let tele = sorted[sorted.len() - 1];
    if wide.id == tele.id {
        return vec![wide.id.clone()];
    }
    vec![wide.id.clone(), tele.id.clone()]
}

/// Capture-pipeline binding, implemented by the camera-hardware collaborator.
///
/// `bind` attaches the analyzer to one physical camera and returns a channel
/// delivering analyzed frames; the source is expected to keep only the latest
/// frame when the receiver is busy. `unbind` detaches it again. The
/// orchestrator never waits on a bound camera without a deadline.
#[async_trait]
pub trait CaptureBinding: Send + Sync {
    async fn bind(&self, camera_id: &str) -> Result<mpsc::Receiver<SensorFrame>, VisionError>;

    async fn unbind(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cam(id: &str, focal: f32) -> CameraInfo {
        CameraInfo {
            id: id.to_string(),
            focal_length_mm: focal,
        }
    }

    #[test]
    fn test_choose_empty() {
        assert!(choose_sequential_ids(&[]).is_empty());
    }

    #[test]
    fn test_choose_single_camera() {
        let ids = choose_sequential_ids(&[cam("0", 4.2)]);
        assert_eq!(ids, vec!["0"]);
    }

    #[test]
    fn test_choose_extremes_wide_first() {
        let ids = choose_sequential_ids(&[cam("2", 6.8), cam("0", 4.2), cam("3", 2.2)]);
        assert_eq!(ids, vec!["3", "2"]);
    }

    #[test]
    fn test_choose_identical_focal_lengths_dedupes() {
        let ids = choose_sequential_ids(&[cam("0", 4.2), cam("0", 4.2)]);
        assert_eq!(ids, vec!["0"]);
    }
}
