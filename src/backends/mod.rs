//! Inference backend implementations
//!
//! - Tract backend (pure Rust, default)
//! - ONNX Runtime backend (feature `onnx`)

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "tract")]
pub mod tract;

// Mock backends for testing the removal service without model files
#[cfg(test)]
pub mod test_utils;

#[cfg(feature = "onnx")]
pub use self::onnx::OnnxBackend;

#[cfg(feature = "tract")]
pub use self::tract::TractBackend;

use crate::{
    config::BackendType,
    error::{CutoutError, Result},
    inference::InferenceBackend,
};

/// Creates inference backends on demand
pub trait BackendFactory: Send + Sync {
    /// Create an uninitialized backend of the given type
    ///
    /// # Errors
    /// - Backend not compiled into this build
    fn create_backend(&self, backend_type: BackendType) -> Result<Box<dyn InferenceBackend + Send>>;

    /// Backends this factory can create
    fn available_backends(&self) -> Vec<BackendType>;
}

/// Factory for the backends enabled at compile time
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultBackendFactory;

impl BackendFactory for DefaultBackendFactory {
    fn create_backend(&self, backend_type: BackendType) -> Result<Box<dyn InferenceBackend + Send>> {
        match backend_type {
            #[cfg(feature = "tract")]
            BackendType::Tract => Ok(Box::new(TractBackend::new())),
            #[cfg(feature = "onnx")]
            BackendType::Onnx => Ok(Box::new(OnnxBackend::new())),
            #[allow(unreachable_patterns)]
            other => Err(CutoutError::invalid_config(format!(
                "backend '{}' is not available in this build (enable the '{}' feature)",
                other, other
            ))),
        }
    }

    fn available_backends(&self) -> Vec<BackendType> {
        let mut backends = Vec::new();
        #[cfg(feature = "tract")]
        backends.push(BackendType::Tract);
        #[cfg(feature = "onnx")]
        backends.push(BackendType::Onnx);
        backends
    }
}
