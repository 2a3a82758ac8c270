//! Tract backend implementation
//!
//! Tract is a pure Rust ONNX inference engine: no native libraries, runs
//! everywhere the crate compiles. It is the default backend.

use crate::config::RemovalConfig;
use crate::error::{CutoutError, Result};
use crate::inference::InferenceBackend;
use crate::models::{ModelInfo, ModelManager, PreprocessingConfig};
use ndarray::Array4;
use tract_onnx::prelude::*;

// Use instant crate for cross-platform time compatibility
use instant::{Duration, Instant};

/// Type alias for the optimized runnable tract model
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Tract backend for running segmentation models in pure Rust
#[derive(Debug, Default)]
pub struct TractBackend {
    model: Option<TractModel>,
    model_manager: Option<ModelManager>,
}

impl TractBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn load_model(&mut self, model_manager: &ModelManager, config: &RemovalConfig) -> Result<Duration> {
        let model_load_start = Instant::now();
        let model_data = model_manager.load_model()?;
        let side = model_manager.preprocessing_config().target_size as usize;

        tracing::info!(
            model = %model_manager.spec().source.display_name(),
            size_bytes = model_data.len(),
            input_size = side,
            "initializing tract backend"
        );
        if config.intra_threads > 0 {
            log::debug!(
                "Tract backend ignores intra_threads={} (single inference thread)",
                config.intra_threads
            );
        }

        let model = tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(model_data))
            .map_err(|e| CutoutError::model(format!("failed to load ONNX model: {e}")))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .map_err(|e| CutoutError::model(format!("failed to set model input shape: {e}")))?
            .into_optimized()
            .map_err(|e| CutoutError::model(format!("failed to optimize model: {e}")))?
            .into_runnable()
            .map_err(|e| CutoutError::model(format!("failed to create runnable model: {e}")))?;

        self.model = Some(model);
        self.model_manager = Some(model_manager.clone());

        let model_load_time = model_load_start.elapsed();
        tracing::info!(
            load_ms = model_load_time.as_millis() as u64,
            "tract backend ready"
        );
        Ok(model_load_time)
    }
}

impl InferenceBackend for TractBackend {
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
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| CutoutError::inference("tract model not initialized"))?;

        let inference_start = Instant::now();

        // Copy through a flat buffer so tract and this crate may use different ndarray versions
        let data: Vec<f32> = input.iter().copied().collect();
        let input_tensor = Tensor::from_shape(input.shape(), &data)
            .map_err(|e| CutoutError::inference(format!("failed to build input tensor: {e}")))?;

        let outputs = model
            .run(tvec![input_tensor.into()])
            .map_err(|e| CutoutError::inference(format!("tract inference failed: {e}")))?;

        // Segmentation models list the fused prediction first
        let output_tensor = outputs
            .into_iter()
            .next()
            .ok_or_else(|| CutoutError::inference("model produced no output tensor"))?
            .into_arc_tensor();

        let output_shape = output_tensor.shape().to_vec();
        let output_data = output_tensor
            .as_slice::<f32>()
            .map_err(|e| CutoutError::inference(format!("output tensor is not f32: {e}")))?;

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

        let output_array = Array4::from_shape_vec((n, c, h, w), output_data.to_vec())
            .map_err(|e| CutoutError::inference(format!("failed to reshape output tensor: {e}")))?;

        log::debug!(
            "Tract inference completed in {}ms, output {:?}",
            inference_start.elapsed().as_millis(),
            output_array.shape()
        );
        Ok(output_array)
    }

    fn preprocessing_config(&self) -> Result<PreprocessingConfig> {
        self.model_manager
            .as_ref()
            .map(|m| m.preprocessing_config().clone())
            .ok_or_else(|| CutoutError::model("tract backend not initialized"))
    }

    fn model_info(&self) -> Result<ModelInfo> {
        self.model_manager
            .as_ref()
            .ok_or_else(|| CutoutError::model("tract backend not initialized"))?
            .info()
    }

    fn is_initialized(&self) -> bool {
        self.model.is_some()
    }
}
