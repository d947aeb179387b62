//! Sequential dual-camera capture: one still frame from the wide and tele
//! lenses in turn, for a more reliable single-shot depth estimate

use std::sync::atomic::Ordering;

use tokio::time::timeout;
use tracing::{info, warn};

use crate::camera::{choose_sequential_ids, CameraInfo, CaptureBinding};
use crate::error::VisionError;
use crate::pipeline::{DepthPolicy, FrameAnalysis, FramePipeline};

/// Outcome of a sequential dual capture: the last camera that produced a
/// usable analysis wins.
pub struct DualCaptureResult {
    pub analysis: FrameAnalysis,
    pub camera_id: String,
}

impl FramePipeline {
    /// Capture one frame from each selected rear camera in sequence (wide
    /// first, then tele) and run the full pipeline on each. Depth runs
    /// directly on every capture, bypassing the realtime throttle cache.
    ///
    /// A camera that fails to deliver a frame within the configured bound
    /// simply contributes nothing; only the total absence of results is an
    /// error. Concurrent invocations are rejected while one is in flight.
    pub async fn dual_capture(
        &self,
        binding: &dyn CaptureBinding,
        back_cameras: &[CameraInfo],
    ) -> Result<DualCaptureResult, VisionError> {
        let ids = choose_sequential_ids(back_cameras);
        if ids.is_empty() {
            return Err(VisionError::Camera("No usable back cameras".to_string()));
        }

        if self
            .dual_capture_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(VisionError::Camera(
                "Dual capture already in flight".to_string(),
            ));
        }

        let result = self.run_sequential_captures(binding, &ids).await;
        self.dual_capture_running.store(false, Ordering::Release);

        result.ok_or_else(|| {
            VisionError::Camera("No camera produced an analyzable frame".to_string())
        })
    }

    async fn run_sequential_captures(
        &self,
        binding: &dyn CaptureBinding,
        ids: &[String],
    ) -> Option<DualCaptureResult> {
        let wait = self.shared.config.capture_timeout;
        let mut last: Option<DualCaptureResult> = None;

        for camera_id in ids {
            let mut frames = match binding.bind(camera_id).await {
                Ok(rx) => rx,
                Err(e) => {
                    warn!("Failed to bind camera {}: {}", camera_id, e);
                    continue;
                }
            };

            match timeout(wait, frames.recv()).await {
                Ok(Some(frame)) => {
                    match self.shared.analyze(frame, DepthPolicy::Direct).await {
                        Ok(analysis) => {
                            info!(
                                "Sequential capture from camera {}: {} detections",
                                camera_id,
                                analysis.detections.len()
                            );
                            last = Some(DualCaptureResult {
                                analysis,
                                camera_id: camera_id.clone(),
                            });
                        }
                        Err(e) => warn!("Sequential capture analysis failed: {}", e),
                    }
                }
                Ok(None) => warn!("Camera {} closed its frame channel", camera_id),
                Err(_) => warn!(
                    "Camera {} did not deliver a frame within {:?}",
                    camera_id, wait
                ),
            }

            binding.unbind().await;
        }

        last
    }
}
