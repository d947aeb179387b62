//! Distance estimation: danger-region sampling and depth-to-centimeter conversion

use std::sync::Arc;

use tracing::trace;

use crate::calibration::CalibrationScale;
use crate::config::PipelineConfig;
use crate::models::{DepthMap, Detection};

/// Classes sampled with the ground-contact heuristic: bicycle, car,
/// motorcycle, bus, truck.
pub const GROUND_VEHICLE_CLASSES: [usize; 5] = [1, 2, 3, 5, 7];

/// Distance ceiling after conversion, in centimeters.
const MAX_DISTANCE_CM: f32 = 2000.0;

/// Attaches distances to detections by sampling a class-dependent sub-region
/// of the depth map and taking the nearest plausible value.
pub struct DistanceSampler {
    region_fraction: f32,
    base_scale: f32,
    calibration: Arc<CalibrationScale>,
}

impl DistanceSampler {
    pub fn new(config: &PipelineConfig, calibration: Arc<CalibrationScale>) -> Self {
        Self {
            region_fraction: config.danger_region_fraction,
            base_scale: config.base_depth_scale,
            calibration,
        }
    }

    /// Produce a new detection list with distances attached. Detections whose
    /// sampling region yields nothing carry NaN.
    pub fn attach_distances(&self, dets: Vec<Detection>, map: &DepthMap) -> Vec<Detection> {
        dets.into_iter()
            .map(|d| {
                let raw = self.sample_raw(map, &d);
                let cm = self.raw_to_centimeters(raw);
                trace!(
                    "rawDepth={:.3} (frame min={:.3} max={:.3}, cls={})",
                    raw,
                    map.min,
                    map.max,
                    d.class_id
                );
                d.with_distance(cm)
            })
            .collect()
    }

    /// Minimum strictly-positive depth inside the detection's danger region,
    /// in raw model units. NaN when the region or its sample set is empty.
    pub fn sample_raw(&self, map: &DepthMap, det: &Detection) -> f32 {
        let region = match self.danger_region(det, map.width, map.height) {
            Some(r) => r,
            None => return f32::NAN,
        };
        let mut nearest = f32::NAN;
        for y in region.y1..=region.y2 {
            for x in region.x1..=region.x2 {
                let v = map.at(x, y);
                if v > 0.0 && (nearest.is_nan() || v < nearest) {
                    nearest = v;
                }
            }
        }
        nearest
    }

    /// Convert raw model units to centimeters. NaN propagates unchanged.
    pub fn raw_to_centimeters(&self, raw: f32) -> f32 {
        if raw.is_nan() {
            return f32::NAN;
        }
        let cm = raw * 100.0 * self.base_scale * self.calibration.get();
        cm.clamp(0.0, MAX_DISTANCE_CM)
    }

    /// Select the sub-region of the box to sample. Ground vehicles use a
    /// bottom-center band (the point nearest the camera is usually the lower
    /// front edge); everything else uses a centered core inset from the box
    /// edges.
    fn danger_region(&self, det: &Detection, map_w: usize, map_h: usize) -> Option<PixelRegion> {
        if map_w == 0 || map_h == 0 {
            return None;
        }
        let frac = self.region_fraction;
        let (fx1, fy1, fx2, fy2) = if GROUND_VEHICLE_CLASSES.contains(&det.class_id) {
            let band_top = det.y2 - det.height() * frac;
            let cx = (det.x1 + det.x2) / 2.0;
            let half = det.width() * 0.25;
            (cx - half, band_top, cx + half, det.y2)
        } else {
            let inset_x = det.width() * frac;
            let inset_y = det.height() * frac;
            (
                det.x1 + inset_x,
                det.y1 + inset_y,
                det.x2 - inset_x,
                det.y2 - inset_y,
            )
        };

        if fx2 <= fx1 || fy2 <= fy1 {
            return None;
        }
        let x1 = (fx1.floor().max(0.0) as usize).min(map_w - 1);
        let y1 = (fy1.floor().max(0.0) as usize).min(map_h - 1);
        let x2 = (fx2.ceil().max(0.0) as usize).min(map_w - 1);
        let y2 = (fy2.ceil().max(0.0) as usize).min(map_h - 1);
        if x2 < x1 || y2 < y1 {
            return None;
        }
        Some(PixelRegion { x1, y1, x2, y2 })
    }
}

/// Inclusive pixel bounds of a sampling region.
#[derive(Debug, PartialEq, Eq)]
struct PixelRegion {
    x1: usize,
    y1: usize,
    x2: usize,
    y2: usize,
}
