//! Opaque inference-engine seam: load a model, run a tensor in, get tensors out

use std::path::Path;

use crate::error::VisionError;

#[cfg(feature = "backend-ort")]
pub mod ort;

/// A dense f32 tensor with an explicit shape.
#[derive(Debug, Clone)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl Tensor {
    /// Create a tensor, checking that the data length matches the shape.
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self, VisionError> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(VisionError::Inference(format!(
                "Tensor shape {:?} expects {} elements, got {}",
                shape,
                expected,
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }
}

/// A loaded model ready to run. Implementations must be safe to share across
/// the inference worker tasks.
pub trait InferenceSession: Send + Sync {
    fn run(&self, input: &Tensor) -> Result<Vec<Tensor>, VisionError>;
}

/// Loads model files into runnable sessions.
pub trait InferenceEngine: Send + Sync {
    fn load(&self, model_path: &Path) -> Result<Box<dyn InferenceSession>, VisionError>;
}
