//! Object detection: letterbox preprocessing, output decoding, NMS

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::config::PipelineConfig;
use crate::error::VisionError;
use crate::frame::RgbFrame;
use crate::inference::{InferenceEngine, InferenceSession, Tensor};

/// COCO class names (80 classes)
pub const COCO_CLASSES: &[&str] = &[
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat",
    "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack",
    "umbrella", "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball",
    "kite", "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket",
    "bottle", "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple",
    "sandwich", "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair",
    "couch", "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
    "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator",
    "book", "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

/// Look up a class name from the fixed table.
pub fn class_name(class_id: usize) -> Option<&'static str> {
    COCO_CLASSES.get(class_id).copied()
}

/// One detected object in source-frame pixel coordinates.
///
/// Immutable: attaching a distance produces a new value via [`Detection::with_distance`].
#[derive(Debug, Clone)]
pub struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub score: f32,
    pub class_id: usize,
    /// Estimated distance in centimeters; NaN when unknown.
    pub distance_cm: f32,
}

impl Detection {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, score: f32, class_id: usize) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            score,
            class_id,
            distance_cm: f32::NAN,
        }
    }

    /// Return a copy with the given distance attached.
    pub fn with_distance(&self, distance_cm: f32) -> Self {
        Self {
            distance_cm,
            ..self.clone()
        }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }
}

/// Overlay label text: class, score, and distance when known.
pub fn format_label(det: &Detection) -> String {
    let name = match class_name(det.class_id) {
        Some(n) => n.to_string(),
        None => format!("cls {}", det.class_id),
    };
    if det.distance_cm.is_nan() {
        format!("{} {:.2}", name, det.score)
    } else {
        format!("{} {:.2} [{:.0}cm]", name, det.score, det.distance_cm)
    }
}

/// Letterbox transform: content scale plus the symmetric padding that centers
/// the scaled content in the square model input.
#[derive(Debug)]
pub(crate) struct Letterbox {
    pub data: Vec<f32>,
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
}

impl Letterbox {
    /// Map a model-space coordinate back to source space, clamped to the frame.
    pub fn to_source(&self, mx: f32, my: f32, img_w: f32, img_h: f32) -> (f32, f32) {
        (
            ((mx - self.pad_x) / self.scale).clamp(0.0, img_w),
            ((my - self.pad_y) / self.scale).clamp(0.0, img_h),
        )
    }
}

/// The two output tensor layouts the detector may produce, resolved once per
/// call from the declared shape.
#[derive(Debug, PartialEq, Eq)]
enum OutputLayout {
    /// `[1, 4+C, N]`: each property is a contiguous row of N candidates.
    PropertiesByRow { candidates: usize },
    /// `[1, N, 4+C]`: each candidate is a contiguous row of properties.
    PropertiesByColumn { candidates: usize },
}

fn resolve_layout(shape: &[usize], props: usize) -> Result<OutputLayout, VisionError> {
    if shape.len() != 3 || shape[0] != 1 {
        return Err(VisionError::Inference(format!(
            "Unexpected detector output shape {:?}",
            shape
        )));
    }
    if shape[1] == props {
        Ok(OutputLayout::PropertiesByRow {
            candidates: shape[2],
        })
    } else if shape[2] == props {
        Ok(OutputLayout::PropertiesByColumn {
            candidates: shape[1],
        })
    } else {
        Err(VisionError::Inference(format!(
            "Detector output shape {:?} has no axis of extent {}",
            shape, props
        )))
    }
}

/// Object detector: fixed square input, dual-layout output decoding,
/// per-class greedy NMS. Stateless per call beyond the loaded session.
pub struct DetectionEngine {
    session: Box<dyn InferenceSession>,
    input_size: usize,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl DetectionEngine {
    /// Load the detector model through the inference engine.
    pub fn load(
        engine: &Arc<dyn InferenceEngine>,
        model_path: &Path,
        config: &PipelineConfig,
    ) -> Result<Self, VisionError> {
        let session = engine.load(model_path)?;
        Ok(Self {
            session,
            input_size: config.detector_input,
            confidence_threshold: config.confidence_threshold,
            iou_threshold: config.iou_threshold,
        })
    }

    /// Run detection on a frame; boxes come back in source-frame coordinates.
    pub fn detect(&self, frame: &RgbFrame) -> Result<Vec<Detection>, VisionError> {
        if frame.width == 0 || frame.height == 0 {
            return Err(VisionError::Processing(
                "Cannot detect on an empty frame".to_string(),
            ));
        }
        let mut lb = self.letterbox(frame);
        let t = self.input_size;
        let input = Tensor::new(vec![1, 3, t, t], std::mem::take(&mut lb.data))?;

        let outputs = self.session.run(&input)?;
        let output = match outputs.first() {
            Some(o) => o,
            None => return Ok(Vec::new()),
        };

        let dets = self.decode(output, &lb, frame.width as f32, frame.height as f32)?;
        let kept = non_max_suppression(dets, self.iou_threshold);
        debug!("Detector kept {} boxes after NMS", kept.len());
        Ok(kept)
    }

    /// Aspect-preserving nearest-neighbor resize into a zero-padded square,
    /// producing channel-major planar floats in [0, 1].
    fn letterbox(&self, frame: &RgbFrame) -> Letterbox {
        let t = self.input_size;
        let r = (t as f32 / frame.width as f32).min(t as f32 / frame.height as f32);
        let nw = ((frame.width as f32 * r) as usize).min(t);
        let nh = ((frame.height as f32 * r) as usize).min(t);
        let dx = (t - nw) / 2;
        let dy = (t - nh) / 2;

        let plane = t * t;
        let mut data = vec![0.0f32; 3 * plane];
        for y in 0..nh {
            let sy = ((y as f32 / r) as usize).min(frame.height - 1);
            for x in 0..nw {
                let sx = ((x as f32 / r) as usize).min(frame.width - 1);
                let (pr, pg, pb) = frame.pixel(sx, sy);
                let idx = (y + dy) * t + (x + dx);
                data[idx] = pr as f32 / 255.0;
                data[plane + idx] = pg as f32 / 255.0;
                data[2 * plane + idx] = pb as f32 / 255.0;
            }
        }
        Letterbox {
            data,
            scale: r,
            pad_x: dx as f32,
            pad_y: dy as f32,
        }
    }

    fn decode(
        &self,
        output: &Tensor,
        lb: &Letterbox,
        img_w: f32,
        img_h: f32,
    ) -> Result<Vec<Detection>, VisionError> {
        let props = 4 + COCO_CLASSES.len();
        let layout = resolve_layout(&output.shape, props)?;
        let flat = &output.data;

        let mut dets = Vec::new();
        match layout {
            OutputLayout::PropertiesByRow { candidates } => {
                let stride = candidates;
                for i in 0..candidates {
                    let x = flat[i];
                    let y = flat[stride + i];
                    let w = flat[2 * stride + i];
                    let h = flat[3 * stride + i];

                    let mut best_class = 0usize;
                    let mut best_score = 0.0f32;
                    for c in 0..COCO_CLASSES.len() {
                        let s = flat[(4 + c) * stride + i];
                        if s > best_score {
                            best_score = s;
                            best_class = c;
                        }
                    }
                    if best_score < self.confidence_threshold {
                        continue;
                    }
                    if let Some(det) =
                        candidate_to_detection(x, y, w, h, best_score, best_class, lb, img_w, img_h)
                    {
                        dets.push(det);
                    }
                }
            }
            OutputLayout::PropertiesByColumn { candidates } => {
                for i in 0..candidates {
                    let base = i * props;
                    let x = flat[base];
                    let y = flat[base + 1];
                    let w = flat[base + 2];
                    let h = flat[base + 3];

                    let mut best_class = 0usize;
                    let mut best_score = 0.0f32;
                    for c in 0..COCO_CLASSES.len() {
                        let s = flat[base + 4 + c];
                        if s > best_score {
                            best_score = s;
                            best_class = c;
                        }
                    }
                    if best_score < self.confidence_threshold {
                        continue;
                    }
                    if let Some(det) =
                        candidate_to_detection(x, y, w, h, best_score, best_class, lb, img_w, img_h)
                    {
                        dets.push(det);
                    }
                }
            }
        }
        Ok(dets)
    }
}

/// Convert one center-form candidate to a source-frame detection.
#[allow(clippy::too_many_arguments)]
fn candidate_to_detection(
    x: f32,
    y: f32,
    w: f32,
    h: f32,
    score: f32,
    class_id: usize,
    lb: &Letterbox,
    img_w: f32,
    img_h: f32,
) -> Option<Detection> {
    if !(x.is_finite() && y.is_finite() && w.is_finite() && h.is_finite()) {
        return None;
    }
    if w < 0.0 || h < 0.0 {
        return None;
    }
    let (x1, y1) = lb.to_source(x - w / 2.0, y - h / 2.0, img_w, img_h);
    let (x2, y2) = lb.to_source(x + w / 2.0, y + h / 2.0, img_w, img_h);
    Some(Detection::new(x1, y1, x2, y2, score, class_id))
}

/// Intersection-over-union of two axis-aligned boxes, with a small epsilon
/// guarding the degenerate zero-area case.
pub fn iou(a: &Detection, b: &Detection) -> f32 {
    let ix1 = a.x1.max(b.x1);
    let iy1 = a.y1.max(b.y1);
    let ix2 = a.x2.min(b.x2);
    let iy2 = a.y2.min(b.y2);
    let iw = (ix2 - ix1).max(0.0);
    let ih = (iy2 - iy1).max(0.0);
    let inter = iw * ih;
    let area_a = a.width() * a.height();
    let area_b = b.width() * b.height();
    inter / (area_a + area_b - inter + 1e-6)
}

/// Greedy per-class NMS: keep the highest-scoring box, drop same-class boxes
/// overlapping it beyond the threshold, repeat.
pub fn non_max_suppression(mut dets: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    dets.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut keep = Vec::with_capacity(dets.len());
    while !dets.is_empty() {
        let top = dets.remove(0);
        dets.retain(|d| d.class_id != top.class_id || iou(d, &top) <= iou_threshold);
        keep.push(top);
    }
    keep
}
