//! Inference backend abstraction

use crate::{
    config::RemovalConfig,
    error::Result,
    models::{ModelInfo, ModelManager, PreprocessingConfig},
};
use ndarray::Array4;

// Use instant crate for cross-platform time compatibility
use instant::Duration;

/// Trait for inference backends
pub trait InferenceBackend {
    /// Load `model` and prepare it for inference
    ///
    /// Returns the model load time, or `None` when already initialized.
    ///
    /// # Errors
    /// - Model loading or optimization failures
    /// - Invalid configuration parameters
    fn initialize(&mut self, model: &ModelManager, config: &RemovalConfig)
        -> Result<Option<Duration>>;

    /// Run inference on a `1×3×S×S` input tensor
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Model inference failures
    /// - Unexpected output tensor shape
    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>>;

    /// Preprocessing the loaded model expects
    ///
    /// # Errors
    /// - Backend not initialized
    fn preprocessing_config(&self) -> Result<PreprocessingConfig>;

    /// Information about the loaded model
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Model metadata unavailable
    fn model_info(&self) -> Result<ModelInfo>;

    fn is_initialized(&self) -> bool;
}
