//! ONNX Runtime backend, enabled with the `backend-ort` feature

use std::path::Path;

use parking_lot::Mutex;
use tracing::info;

use crate::error::VisionError;
use crate::inference::{InferenceEngine, InferenceSession, Tensor};

/// Engine backed by ONNX Runtime CPU execution.
pub struct OrtEngine;

impl InferenceEngine for OrtEngine {
    fn load(&self, model_path: &Path) -> Result<Box<dyn InferenceSession>, VisionError> {
        let session = ::ort::session::Session::builder()
            .map_err(|e| VisionError::Model(format!("Failed to create session builder: {}", e)))?
            .commit_from_file(model_path)
            .map_err(|e| {
                VisionError::Model(format!(
                    "Failed to load model {}: {}",
                    model_path.display(),
                    e
                ))
            })?;
        info!("ONNX model loaded from {:?}", model_path);
        Ok(Box::new(OrtSession {
            session: Mutex::new(session),
        }))
    }
}

struct OrtSession {
    // ort sessions take `&mut self` to run; serialize callers behind a mutex.
    session: Mutex<::ort::session::Session>,
}

impl InferenceSession for OrtSession {
    fn run(&self, input: &Tensor) -> Result<Vec<Tensor>, VisionError> {
        let array = ::ort::value::Value::from_array((
            input.shape.clone(),
            input.data.clone().into_boxed_slice(),
        ))
        .map_err(|e| VisionError::Inference(format!("Failed to build input value: {}", e)))?;

        let mut session = self.session.lock();
        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| VisionError::Inference("Model declares no inputs".to_string()))?;

        let outputs = session
            .run(vec![(input_name, array)])
            .map_err(|e| VisionError::Inference(format!("Inference failed: {}", e)))?;

        let mut result = Vec::with_capacity(outputs.len());
        for (_, value) in outputs.iter() {
            let (shape, data) = value
                .try_extract_tensor::<f32>()
                .map_err(|e| VisionError::Inference(format!("Failed to extract output: {}", e)))?;
            let shape: Vec<usize> = shape.iter().map(|d| *d as usize).collect();
            result.push(Tensor::new(shape, data.to_vec())?);
        }
        Ok(result)
    }
}
