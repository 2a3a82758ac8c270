//! ONNX Runtime backend implementation
//!
//! Runs the model through ONNX Runtime on the CPU execution provider. Enabled
//! with the `onnx` feature.

use crate::config::RemovalConfig;
use crate::error::{CutoutError, Result};
use crate::inference::InferenceBackend;
use crate::models::{ModelInfo, ModelManager, PreprocessingConfig};
use ndarray::Array4;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;

// Use instant crate for cross-platform time compatibility
use instant::{Duration, Instant};

/// ONNX Runtime backend
#[derive(Debug, Default)]
pub struct OnnxBackend {
    session: Option<Session>,
    model_manager: Option<ModelManager>,
}

impl OnnxBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn load_model(&mut self, model_manager: &ModelManager, config: &RemovalConfig) -> Result<Duration> {
        let model_load_start = Instant::now();
        let model_data = model_manager.load_model()?;

        // 0 = use all available cores
        let intra_threads = if config.intra_threads > 0 {
            config.intra_threads
        } else {
            std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(4)
        };

        tracing::info!(
            model = %model_manager.spec().source.display_name(),
            size_bytes = model_data.len(),
            intra_threads,
            "initializing onnx runtime backend"
        );

        let session = Session::builder()
            .map_err(|e| CutoutError::model(format!("failed to create session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| CutoutError::model(format!("failed to set optimization level: {e}")))?
            .with_intra_threads(intra_threads)
            .map_err(|e| CutoutError::model(format!("failed to set intra threads: {e}")))?
            .commit_from_memory(&model_data)
            .map_err(|e| {
                CutoutError::model(format!("failed to create session from model data: {e}"))
            })?;

        self.session = Some(session);
        self.model_manager = Some(model_manager.clone());

        let model_load_time = model_load_start.elapsed();
        tracing::info!(
            load_ms = model_load_time.as_millis() as u64,
            "onnx runtime backend ready"
        );
        Ok(model_load_time)
    }
}

impl InferenceBackend for OnnxBackend {
    fn initialize(
        &mut self,
        model: &ModelManager,
        config: &RemovalConfig,
    ) -> Result<Option<Duration>> {
        if self.is_initialized() {
            return Ok(None);
        }
        self.load_model(model, config).map(Some)
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| CutoutError::inference("onnx session not initialized"))?;

        let inference_start = Instant::now();
        let input_value = Value::from_array(input.clone())
            .map_err(|e| CutoutError::inference(format!("failed to convert input tensor: {e}")))?;

        // Positional inputs avoid depending on model-specific tensor names
        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|e| CutoutError::inference(format!("onnx inference failed: {e}")))?;

        let keys: Vec<_> = outputs.keys().collect();
        let first_key = keys
            .first()
            .ok_or_else(|| CutoutError::inference("model produced no output tensor"))?;
        let output_tensor = outputs
            .get(first_key)
            .ok_or_else(|| CutoutError::inference("first output tensor not found"))?
            .try_extract_array::<f32>()
            .map_err(|e| CutoutError::inference(format!("failed to extract output tensor: {e}")))?;

        let output_shape = output_tensor.shape().to_vec();
        let (n, c, h, w) = match output_shape.as_slice() {
            [n, c, h, w] => (*n, *c, *h, *w),
            [n, h, w] => (*n, 1, *h, *w),
            other => {
                return Err(CutoutError::inference(format!(
                    "expected 4D output tensor, got shape {:?}",
                    other
                )))
            },
        };
        let output_data: Vec<f32> = output_tensor.iter().copied().collect();
        let output_array = Array4::from_shape_vec((n, c, h, w), output_data)
            .map_err(|e| CutoutError::inference(format!("failed to reshape output tensor: {e}")))?;

        log::debug!(
            "ONNX inference completed in {}ms, output {:?}",
            inference_start.elapsed().as_millis(),
            output_array.shape()
        );
        Ok(output_array)
    }

    fn preprocessing_config(&self) -> Result<PreprocessingConfig> {
        self.model_manager
            .as_ref()
            .map(|m| m.preprocessing_config().clone())
            .ok_or_else(|| CutoutError::model("onnx backend not initialized"))
    }

    fn model_info(&self) -> Result<ModelInfo> {
        self.model_manager
            .as_ref()
            .ok_or_else(|| CutoutError::model("onnx backend not initialized"))?
            .info()
    }

    fn is_initialized(&self) -> bool {
        self.session.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uninitialized_backend() {
        let mut backend = OnnxBackend::new();
        assert!(!backend.is_initialized());
        assert!(backend.preprocessing_config().is_err());

        let input = Array4::<f32>::zeros((1, 3, 4, 4));
        assert!(backend.infer(&input).is_err());
    }
}
