//! Mock inference backends for testing
//!
//! The mock "model" predicts foreground wherever the input pixel is darker
//! than the padding color, which is enough to exercise the whole
//! preprocess, infer and postprocess path deterministically.

use crate::{
    config::{BackendType, RemovalConfig},
    error::{CutoutError, Result},
    inference::InferenceBackend,
    models::{ModelInfo, ModelManager, PreprocessingConfig},
};
use instant::Duration;
use ndarray::Array4;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::BackendFactory;

/// Shared call counters, cloned into every backend a factory creates
#[derive(Debug, Default, Clone)]
pub struct CallCounters {
    pub initialize: Arc<AtomicUsize>,
    pub infer: Arc<AtomicUsize>,
}

impl CallCounters {
    pub fn initialize_calls(&self) -> usize {
        self.initialize.load(Ordering::SeqCst)
    }

    pub fn infer_calls(&self) -> usize {
        self.infer.load(Ordering::SeqCst)
    }
}

/// Mock backend thresholding the first input channel
#[derive(Debug, Default)]
pub struct MockBackend {
    model_manager: Option<ModelManager>,
    counters: CallCounters,
    fail_init: bool,
    fail_inference: bool,
    panic_on_first_infer: bool,
}

impl MockBackend {
    pub fn new(counters: CallCounters) -> Self {
        Self {
            counters,
            ..Self::default()
        }
    }
}

impl InferenceBackend for MockBackend {
    fn initialize(
        &mut self,
        model: &ModelManager,
        _config: &RemovalConfig,
    ) -> Result<Option<Duration>> {
        self.counters.initialize.fetch_add(1, Ordering::SeqCst);
        if self.fail_init {
            return Err(CutoutError::model("mock initialization failure"));
        }
        if self.model_manager.is_some() {
            return Ok(None);
        }
        self.model_manager = Some(model.clone());
        Ok(Some(Duration::from_millis(1)))
    }

    fn infer(&mut self, input: &Array4<f32>) -> Result<Array4<f32>> {
        let previous_calls = self.counters.infer.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_first_infer && previous_calls == 0 {
            panic!("mock backend panicked during inference");
        }
        if self.fail_inference {
            return Err(CutoutError::inference("mock inference failure"));
        }
        let preprocessing = self.preprocessing_config()?;
        let (_, _, h, w) = input.dim();

        // Normalized value of a white (padding) pixel in channel 0
        let white = (1.0 - preprocessing.normalization_mean[0]) / preprocessing.normalization_std[0];
        let output = Array4::from_shape_fn((1, 1, h, w), |(_, _, y, x)| {
            if input[[0, 0, y, x]] < white - 0.5 {
                1.0
            } else {
                0.0
            }
        });
        Ok(output)
    }

    fn preprocessing_config(&self) -> Result<PreprocessingConfig> {
        self.model_manager
            .as_ref()
            .map(|m| m.preprocessing_config().clone())
            .ok_or_else(|| CutoutError::model("mock backend not initialized"))
    }

    fn model_info(&self) -> Result<ModelInfo> {
        self.model_manager
            .as_ref()
            .ok_or_else(|| CutoutError::model("mock backend not initialized"))?
            .info()
    }

    fn is_initialized(&self) -> bool {
        self.model_manager.is_some()
    }
}

/// Factory producing [`MockBackend`]s
#[derive(Debug, Default, Clone)]
pub struct MockBackendFactory {
    pub counters: CallCounters,
    pub fail_init: bool,
    pub fail_inference: bool,
    /// Panic inside the first `infer` call across all created backends
    pub panic_on_first_infer: bool,
}

impl BackendFactory for MockBackendFactory {
    fn create_backend(&self, _backend_type: BackendType) -> Result<Box<dyn InferenceBackend + Send>> {
        let mut backend = MockBackend::new(self.counters.clone());
        backend.fail_init = self.fail_init;
        backend.fail_inference = self.fail_inference;
        backend.panic_on_first_infer = self.panic_on_first_infer;
        Ok(Box::new(backend))
    }

    fn available_backends(&self) -> Vec<BackendType> {
        vec![BackendType::Tract, BackendType::Onnx]
    }
}
