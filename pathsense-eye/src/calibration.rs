//! Per-device depth calibration

use parking_lot::RwLock;

/// Lower bound for the user calibration multiplier.
pub const MIN_USER_SCALE: f32 = 0.25;
/// Upper bound for the user calibration multiplier.
pub const MAX_USER_SCALE: f32 = 4.0;

const KEY_PREFIX: &str = "depth_calibration_scale_";

/// Shared, clamped calibration multiplier applied to every depth-to-centimeter
/// conversion. Held behind an `Arc` and passed explicitly to the sampler; reads
/// happen per conversion, writes come from the calibration UI collaborator.
#[derive(Debug)]
pub struct CalibrationScale {
    value: RwLock<f32>,
}

impl CalibrationScale {
    pub fn new(initial: f32) -> Self {
        Self {
            value: RwLock::new(clamp_scale(initial)),
        }
    }

    pub fn get(&self) -> f32 {
        *self.value.read()
    }

    /// Store a new multiplier, clamped into `[MIN_USER_SCALE, MAX_USER_SCALE]`.
    pub fn set(&self, scale: f32) {
        *self.value.write() = clamp_scale(scale);
    }
}

impl Default for CalibrationScale {
    fn default() -> Self {
        Self::new(1.0)
    }
}

fn clamp_scale(scale: f32) -> f32 {
    if scale.is_nan() {
        return 1.0;
    }
    scale.clamp(MIN_USER_SCALE, MAX_USER_SCALE)
}

/// Build the persistence key for a calibration value: device identity plus the
/// rear-lens aperture formatted to two decimals, or identity alone when the
/// aperture is unknown.
pub fn calibration_key(device: &str, aperture: Option<f32>) -> String {
    match aperture {
        Some(a) if a > 0.0 => format!("{}{}_{:.2}", KEY_PREFIX, device, a),
        _ => format!("{}{}", KEY_PREFIX, device),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_clamps_low_and_high() {
        let scale = CalibrationScale::default();
        scale.set(0.0);
        assert_eq!(scale.get(), MIN_USER_SCALE);
        scale.set(-3.0);
        assert_eq!(scale.get(), MIN_USER_SCALE);
        scale.set(100.0);
        assert_eq!(scale.get(), MAX_USER_SCALE);
        scale.set(1.3);
        assert_eq!(scale.get(), 1.3);
    }

    #[test]
    fn test_constructor_clamps() {
        assert_eq!(CalibrationScale::new(9.0).get(), MAX_USER_SCALE);
        assert_eq!(CalibrationScale::new(0.01).get(), MIN_USER_SCALE);
    }

    #[test]
    fn test_nan_resets_to_identity() {
        let scale = CalibrationScale::default();
        scale.set(f32::NAN);
        assert_eq!(scale.get(), 1.0);
    }

    #[test]
    fn test_calibration_key_with_aperture() {
        let key = calibration_key("acme_phone9", Some(1.8));
        assert_eq!(key, "depth_calibration_scale_acme_phone9_1.80");
    }

    #[test]
    fn test_calibration_key_without_aperture() {
        assert_eq!(
            calibration_key("acme_phone9", None),
            "depth_calibration_scale_acme_phone9"
        );
        assert_eq!(
            calibration_key("acme_phone9", Some(-1.0)),
            "depth_calibration_scale_acme_phone9"
        );
    }
}
