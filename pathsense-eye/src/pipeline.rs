//! Per-frame orchestration: concurrent detection and depth, realtime loop,
//! single-shot mode

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::calibration::CalibrationScale;
use crate::config::{EnvironmentMode, PipelineConfig};
use crate::error::VisionError;
use crate::frame::SensorFrame;
use crate::imaging::box_blur;
use crate::inference::InferenceEngine;
use crate::models::{class_name, DepthEngine, DepthMap, Detection, DetectionEngine, ModelManager};
use crate::processing::{DepthGate, DistanceSampler};

/// Stereo fusion collaborator: may override or average distances using a
/// second depth source. Opaque to the pipeline.
pub trait DepthFusion: Send + Sync {
    fn fuse(
        &self,
        depth: &DepthMap,
        detections: Vec<Detection>,
        frame_w: usize,
        frame_h: usize,
    ) -> Vec<Detection>;
}

/// Output of one analyzed frame, handed to the overlay and alerting
/// collaborators.
#[derive(Clone)]
pub struct FrameAnalysis {
    pub detections: Vec<Detection>,
    pub depth: Option<Arc<DepthMap>>,
    pub width: usize,
    pub height: usize,
}

impl FrameAnalysis {
    /// Simplified `(label, distance in meters)` list for the alerting
    /// collaborator. Objects with unknown distance are skipped.
    pub fn alert_items(&self) -> Vec<(String, f32)> {
        self.detections
            .iter()
            .filter(|d| !d.distance_cm.is_nan())
            .map(|d| {
                let label = match class_name(d.class_id) {
                    Some(n) => n.to_string(),
                    None => format!("cls {}", d.class_id),
                };
                (label, d.distance_cm / 100.0)
            })
            .collect()
    }
}

/// How depth participates in one analysis pass.
#[derive(Clone, Copy)]
pub(crate) enum DepthPolicy {
    /// Throttled and cached across frames (realtime).
    Gated,
    /// Run unconditionally, bypassing the cache (sequential dual capture).
    Direct,
}

/// State shared between the public pipeline handle, the processing loop task,
/// and the dual-capture orchestrator.
pub(crate) struct PipelineShared {
    pub(crate) config: Arc<PipelineConfig>,
    pub(crate) engine: Arc<dyn InferenceEngine>,
    pub(crate) manager: ModelManager,
    pub(crate) detector: Arc<DetectionEngine>,
    pub(crate) depth: RwLock<Option<Arc<DepthEngine>>>,
    pub(crate) gate: Arc<DepthGate>,
    pub(crate) sampler: DistanceSampler,
    pub(crate) fusion: RwLock<Option<Arc<dyn DepthFusion>>>,
}

impl PipelineShared {
    pub(crate) async fn analyze(
        &self,
        frame: SensorFrame,
        policy: DepthPolicy,
    ) -> Result<FrameAnalysis, VisionError> {
        let rgb = frame.yuv.to_rgb()?;
        let rgb = rgb.rotate(frame.rotation);
        let (width, height) = (rgb.width, rgb.height);

        let detector_input = if self.config.blur_enabled && self.config.blur_radius > 0 {
            box_blur(&rgb, self.config.blur_radius)
        } else {
            rgb.clone()
        };

        let now = Instant::now();

        let detector = self.detector.clone();
        let det_task = tokio::task::spawn_blocking(move || detector.detect(&detector_input));

        // Read the active depth engine exactly once; a swap mid-frame is
        // ignored until the next frame.
        let depth_engine = self.depth.read().clone();
        let depth_task = depth_engine.map(|engine| {
            let rgb = rgb.clone();
            let gate = self.gate.clone();
            tokio::task::spawn_blocking(move || match policy {
                DepthPolicy::Gated => gate.acquire(now, || engine.estimate(&rgb)),
                DepthPolicy::Direct => match engine.estimate(&rgb) {
                    Ok(map) => Some(Arc::new(map)),
                    Err(e) => {
                        warn!("Depth inference error: {}", e);
                        None
                    }
                },
            })
        });

        let mut detections = match det_task.await {
            Ok(Ok(dets)) => dets,
            Ok(Err(e)) => {
                warn!("Detection failed: {}", e);
                Vec::new()
            }
            Err(e) => {
                error!("Detection task failed to complete: {}", e);
                Vec::new()
            }
        };

        let depth = match depth_task {
            Some(task) => match task.await {
                Ok(d) => d,
                Err(e) => {
                    error!("Depth task failed to complete: {}", e);
                    None
                }
            },
            None => None,
        };

        if let Some(map) = depth.as_ref() {
            detections = self.sampler.attach_distances(detections, map);
            let fusion = self.fusion.read().clone();
            if let Some(fusion) = fusion {
                detections = fusion.fuse(map, detections, width, height);
            }
        }

        Ok(FrameAnalysis {
            detections,
            depth,
            width,
            height,
        })
    }
}

/// The perception pipeline: owns both models, the depth throttle cache, and
/// the realtime processing loop.
pub struct FramePipeline {
    pub(crate) shared: Arc<PipelineShared>,
    pub(crate) event_tx: broadcast::Sender<FrameAnalysis>,
    pub(crate) realtime_enabled: Arc<AtomicBool>,
    pub(crate) single_shot_requested: Arc<AtomicBool>,
    pub(crate) single_shot_running: Arc<AtomicBool>,
    pub(crate) dual_capture_running: Arc<AtomicBool>,
    pub(crate) is_running: Arc<RwLock<bool>>,
    processing_handle: RwLock<Option<JoinHandle<()>>>,
    environment: RwLock<EnvironmentMode>,
}

impl FramePipeline {
    /// Build the pipeline: loads the detector (required) and the depth model
    /// for the configured environment (optional; the pipeline degrades to
    /// detector-only output when it is unavailable).
    pub fn new(
        config: PipelineConfig,
        engine: Arc<dyn InferenceEngine>,
        calibration: Arc<CalibrationScale>,
    ) -> Result<Self, VisionError> {
        config.validate()?;
        let config = Arc::new(config);
        let manager = ModelManager::new(&config);

        let detector_path = manager.detector_model_path()?;
        let detector = Arc::new(DetectionEngine::load(&engine, &detector_path, &config)?);
        info!("Detector loaded from {:?}", detector_path);

        let depth = match manager
            .depth_model_path(config.environment)
            .and_then(|path| DepthEngine::load(&engine, &path, &config))
        {
            Ok(depth_engine) => {
                info!("Depth estimator ready ({})", config.environment.as_str());
                Some(Arc::new(depth_engine))
            }
            Err(e) => {
                warn!("Depth estimator disabled: {}", e);
                None
            }
        };

        let gate = Arc::new(DepthGate::new(config.depth_interval, config.depth_cache));
        let sampler = DistanceSampler::new(&config, calibration);

        const EVENT_BUFFER_SIZE: usize = 64;
        let (event_tx, _) = broadcast::channel(EVENT_BUFFER_SIZE);

        let environment = config.environment;
        Ok(Self {
            shared: Arc::new(PipelineShared {
                config,
                engine,
                manager,
                detector,
                depth: RwLock::new(depth),
                gate,
                sampler,
                fusion: RwLock::new(None),
            }),
            event_tx,
            realtime_enabled: Arc::new(AtomicBool::new(true)),
            single_shot_requested: Arc::new(AtomicBool::new(false)),
            single_shot_running: Arc::new(AtomicBool::new(false)),
            dual_capture_running: Arc::new(AtomicBool::new(false)),
            is_running: Arc::new(RwLock::new(false)),
            processing_handle: RwLock::new(None),
            environment: RwLock::new(environment),
        })
    }

    /// Run the full pipeline on one frame.
    pub async fn analyze_frame(&self, frame: SensorFrame) -> Result<FrameAnalysis, VisionError> {
        self.shared.analyze(frame, DepthPolicy::Gated).await
    }

    /// Subscribe to analysis results published by the processing loop.
    pub fn subscribe(&self) -> broadcast::Receiver<FrameAnalysis> {
        self.event_tx.subscribe()
    }

    /// Install or clear the stereo fusion collaborator.
    pub fn set_fusion(&self, fusion: Option<Arc<dyn DepthFusion>>) {
        *self.shared.fusion.write() = fusion;
    }

    /// Enable or pause continuous analysis. Enabling clears any pending
    /// single-shot request.
    pub fn set_realtime(&self, enabled: bool) {
        self.realtime_enabled.store(enabled, Ordering::Release);
        if enabled {
            self.single_shot_requested.store(false, Ordering::Release);
        }
    }

    /// Request exactly one pipeline run while continuous analysis is paused.
    /// Returns false when a one-shot is already pending or in flight.
    pub fn request_single_shot(&self) -> bool {
        if self.single_shot_running.load(Ordering::Acquire)
            || self.dual_capture_running.load(Ordering::Acquire)
        {
            return false;
        }
        self.single_shot_requested
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Whether a depth engine is currently installed.
    pub fn is_depth_available(&self) -> bool {
        self.shared.depth.read().is_some()
    }

    pub fn environment_mode(&self) -> EnvironmentMode {
        *self.environment.read()
    }

    /// Switch depth-model weights. The cached depth state is invalidated and
    /// the depth engine reloaded; on failure the pipeline continues
    /// detector-only and the error is returned so the caller can retry later.
    pub async fn set_environment_mode(&self, mode: EnvironmentMode) -> Result<(), VisionError> {
        info!("Switching environment mode to {}", mode.as_str());
        *self.environment.write() = mode;
        self.shared.gate.reset();

        let path = match self.shared.manager.depth_model_path(mode) {
            Ok(path) => path,
            Err(e) => {
                *self.shared.depth.write() = None;
                return Err(e);
            }
        };

        let engine = self.shared.engine.clone();
        let config = self.shared.config.clone();
        let loaded =
            tokio::task::spawn_blocking(move || DepthEngine::load(&engine, &path, &config))
                .await
                .map_err(|e| VisionError::Model(format!("Depth reload did not finish: {}", e)))?;

        match loaded {
            Ok(new_engine) => {
                // The previous engine drops once in-flight frames release
                // their clone of the handle.
                *self.shared.depth.write() = Some(Arc::new(new_engine));
                self.shared.gate.reset();
                info!("Depth model loaded for {}", mode.as_str());
                Ok(())
            }
            Err(e) => {
                *self.shared.depth.write() = None;
                self.shared.gate.reset();
                Err(e)
            }
        }
    }

    /// Start the processing loop over a frame channel. The capture source is
    /// expected to deliver only the most recent frame when the loop is busy.
    pub fn start(&self, frames: mpsc::Receiver<SensorFrame>) -> Result<(), VisionError> {
        {
            let mut is_running = self.is_running.write();
            if *is_running {
                return Err(VisionError::Processing(
                    "Pipeline already running".to_string(),
                ));
            }
            *is_running = true;
        }

        let shared = self.shared.clone();
        let event_tx = self.event_tx.clone();
        let realtime = self.realtime_enabled.clone();
        let requested = self.single_shot_requested.clone();
        let shot_running = self.single_shot_running.clone();
        let is_running = self.is_running.clone();

        let handle = tokio::spawn(async move {
            let mut frames = frames;
            loop {
                if !*is_running.read() {
                    break;
                }

                // Bounded recv so a stopped pipeline exits promptly.
                match tokio::time::timeout(Duration::from_millis(100), frames.recv()).await {
                    Ok(Some(frame)) => {
                        let single_shot = !realtime.load(Ordering::Acquire)
                            && requested
                                .compare_exchange(
                                    true,
                                    false,
                                    Ordering::AcqRel,
                                    Ordering::Acquire,
                                )
                                .is_ok();
                        if !realtime.load(Ordering::Acquire) && !single_shot {
                            continue;
                        }
                        if single_shot {
                            shot_running.store(true, Ordering::Release);
                        }

                        match shared.analyze(frame, DepthPolicy::Gated).await {
                            Ok(analysis) => {
                                // Nobody subscribed yet is not an error.
                                let _ = event_tx.send(analysis);
                            }
                            Err(e) => error!("Frame processing error: {}", e),
                        }

                        if single_shot {
                            shot_running.store(false, Ordering::Release);
                        }
                    }
                    Ok(None) => {
                        warn!("Frame channel closed, stopping processing loop");
                        break;
                    }
                    Err(_) => continue,
                }
            }

            *is_running.write() = false;
            info!("Frame processing loop stopped");
        });

        *self.processing_handle.write() = Some(handle);
        info!("Frame processing loop started");
        Ok(())
    }

    /// Stop the processing loop, abandon in-flight work, and clear the depth
    /// cache.
    pub async fn shutdown(&self) {
        {
            let mut is_running = self.is_running.write();
            if !*is_running && self.processing_handle.read().is_none() {
                return;
            }
            *is_running = false;
        }

        let handle = self.processing_handle.write().take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;
        }

        self.shared.gate.reset();
        info!("Pipeline stopped");
    }
}
