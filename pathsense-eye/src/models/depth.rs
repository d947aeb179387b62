//! Monocular depth estimation: stride-aligned preprocessing, crop, upsample

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::config::PipelineConfig;
use crate::error::VisionError;
use crate::frame::RgbFrame;
use crate::imaging::{crop_plane, resize_bilinear};
use crate::inference::{InferenceEngine, InferenceSession, Tensor};

/// Per-channel normalization applied to the depth model input.
const INPUT_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const INPUT_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Dense per-pixel depth in raw model units (meters), at source-frame
/// resolution, with the frame-wide extremes recorded for diagnostics.
/// Superseded by the next inference, never mutated.
#[derive(Debug, Clone)]
pub struct DepthMap {
    pub data: Vec<f32>,
    pub width: usize,
    pub height: usize,
    pub min: f32,
    pub max: f32,
}

impl DepthMap {
    /// Depth value at a pixel. Caller guarantees bounds.
    #[inline]
    pub fn at(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }
}

/// Preprocessed depth input plus the geometry needed to crop the model output
/// back to the content region.
#[derive(Debug)]
struct DepthPrep {
    data: Vec<f32>,
    model_size: usize,
    content_w: usize,
    content_h: usize,
    pad_x: usize,
    pad_y: usize,
}

/// Depth estimator. Stateless per call beyond the loaded session.
pub struct DepthEngine {
    session: Box<dyn InferenceSession>,
    input_size: usize,
    stride: usize,
}

impl DepthEngine {
    /// Load the depth model through the inference engine.
    pub fn load(
        engine: &Arc<dyn InferenceEngine>,
        model_path: &Path,
        config: &PipelineConfig,
    ) -> Result<Self, VisionError> {
        let session = engine.load(model_path)?;
        Ok(Self {
            session,
            input_size: config.depth_input,
            stride: config.depth_stride,
        })
    }

    /// Estimate a dense depth map for the frame, upsampled back to the frame's
    /// exact resolution.
    pub fn estimate(&self, frame: &RgbFrame) -> Result<DepthMap, VisionError> {
        if frame.width == 0 || frame.height == 0 {
            return Err(VisionError::Processing(
                "Cannot estimate depth on an empty frame".to_string(),
            ));
        }
        let mut prep = self.preprocess(frame);
        let t = prep.model_size;
        let input = Tensor::new(vec![1, 3, t, t], std::mem::take(&mut prep.data))?;

        let outputs = self.session.run(&input)?;
        let output = outputs
            .first()
            .ok_or_else(|| VisionError::Inference("Depth model produced no outputs".to_string()))?;

        let (raw_h, raw_w) = match output.shape.as_slice() {
            [1, h, w] => (*h, *w),
            other => {
                return Err(VisionError::Inference(format!(
                    "Unexpected depth output shape {:?}",
                    other
                )))
            }
        };
        if prep.pad_x + prep.content_w > raw_w || prep.pad_y + prep.content_h > raw_h {
            return Err(VisionError::Inference(format!(
                "Depth output {}x{} smaller than content region", raw_w, raw_h
            )));
        }

        let cropped = crop_plane(
            &output.data,
            raw_w,
            prep.pad_x,
            prep.pad_y,
            prep.content_w,
            prep.content_h,
        );
        let full = resize_bilinear(
            &cropped,
            prep.content_w,
            prep.content_h,
            frame.width,
            frame.height,
        );

        let mut min = f32::MAX;
        let mut max = f32::MIN;
        for v in &full {
            if *v < min {
                min = *v;
            }
            if *v > max {
                max = *v;
            }
        }
        debug!("Depth frame range: {:.3}..{:.3}", min, max);

        Ok(DepthMap {
            data: full,
            width: frame.width,
            height: frame.height,
            min,
            max,
        })
    }

    /// Aspect-preserving resize into the square model input. Content dimensions
    /// are rounded to the nearest stride multiple and clamped into
    /// `[stride, input_size]`, then centered; values are mean/std normalized.
    fn preprocess(&self, frame: &RgbFrame) -> DepthPrep {
        let target = self.input_size;
        let longest = frame.width.max(frame.height);
        let scale = target as f32 / longest as f32;

        let content_w = clamp_to_range(
            round_to_multiple((frame.width as f32 * scale).round() as usize, self.stride),
            self.stride,
            target,
        );
        let content_h = clamp_to_range(
            round_to_multiple((frame.height as f32 * scale).round() as usize, self.stride),
            self.stride,
            target,
        );
        let pad_x = (target - content_w) / 2;
        let pad_y = (target - content_h) / 2;

        let sx = content_w as f32 / frame.width as f32;
        let sy = content_h as f32 / frame.height as f32;

        let plane = target * target;
        let mut data = vec![0.0f32; 3 * plane];
        for y in 0..content_h {
            let py = ((y as f32 / sy) as usize).min(frame.height - 1);
            for x in 0..content_w {
                let px = ((x as f32 / sx) as usize).min(frame.width - 1);
                let (r, g, b) = frame.pixel(px, py);
                let idx = (y + pad_y) * target + (x + pad_x);
                data[idx] = (r as f32 / 255.0 - INPUT_MEAN[0]) / INPUT_STD[0];
                data[plane + idx] = (g as f32 / 255.0 - INPUT_MEAN[1]) / INPUT_STD[1];
                data[2 * plane + idx] = (b as f32 / 255.0 - INPUT_MEAN[2]) / INPUT_STD[2];
            }
        }

        DepthPrep {
            data,
            model_size: target,
            content_w,
            content_h,
            pad_x,
            pad_y,
        }
    }
}

fn round_to_multiple(value: usize, multiple: usize) -> usize {
    if multiple <= 1 {
        return value;
    }
    let q = (value as f32 / multiple as f32).round() as usize;
    (q * multiple).max(multiple)
}

fn clamp_to_range(value: usize, min: usize, max: usize) -> usize {
    value.clamp(min, max)
}
