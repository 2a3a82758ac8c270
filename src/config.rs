//! Configuration types for background removal

use crate::error::{CutoutError, Result};
use crate::models::{ModelKind, ModelSpec};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound accepted for intra-op threads
pub const MAX_INTRA_THREADS: usize = 256;

/// Inference engine used by the model-backed removal service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// Pure Rust inference via tract
    Tract,
    /// ONNX Runtime (CPU)
    Onnx,
}

impl Default for BackendType {
    fn default() -> Self {
        Self::Tract
    }
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tract => write!(f, "tract"),
            Self::Onnx => write!(f, "onnx"),
        }
    }
}

impl std::str::FromStr for BackendType {
    type Err = CutoutError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tract" => Ok(Self::Tract),
            "onnx" | "ort" => Ok(Self::Onnx),
            other => Err(CutoutError::invalid_config(format!(
                "unknown backend '{}' (expected 'tract' or 'onnx')",
                other
            ))),
        }
    }
}

/// Configuration for the model-backed removal service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemovalConfig {
    /// Model to load
    pub model_spec: ModelSpec,

    /// Inference engine
    pub backend: BackendType,

    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,

    /// Base directory of the model cache (None = platform cache dir)
    pub cache_dir: Option<PathBuf>,

    /// Download built-in models that are not cached yet
    pub auto_download: bool,

    /// Deliver a timeout failure when one removal takes longer than this
    pub service_timeout_ms: Option<u64>,
}

impl Default for RemovalConfig {
    fn default() -> Self {
        Self {
            model_spec: ModelSpec::default(),
            backend: BackendType::default(),
            intra_threads: 0,
            cache_dir: None,
            auto_download: true,
            service_timeout_ms: None,
        }
    }
}

impl RemovalConfig {
    /// Create a new configuration builder
    ///
    /// ```rust
    /// use alphacut::{BackendType, ModelKind, RemovalConfig};
    ///
    /// let config = RemovalConfig::builder()
    ///     .model(ModelKind::U2NetP)
    ///     .backend(BackendType::Tract)
    ///     .intra_threads(4)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.intra_threads, 4);
    /// ```
    #[must_use]
    pub fn builder() -> RemovalConfigBuilder {
        RemovalConfigBuilder::default()
    }

    /// Load a configuration from a JSON file
    ///
    /// Missing fields take their default values.
    ///
    /// # Errors
    /// - File unreadable
    /// - Malformed JSON
    /// - Values out of range
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| CutoutError::file_io_error("read config file", path, &e))?;
        let config: Self = serde_json::from_str(&contents).map_err(|e| {
            CutoutError::invalid_config(format!("failed to parse '{}': {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Service timeout as a [`Duration`]
    #[must_use]
    pub fn service_timeout(&self) -> Option<Duration> {
        self.service_timeout_ms.map(Duration::from_millis)
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Thread count above [`MAX_INTRA_THREADS`]
    /// - Zero service timeout
    /// - Custom preprocessing with a zero input size or zero std
    /// - Model sha256 that is not 64 hex digits
    pub fn validate(&self) -> Result<()> {
        if self.intra_threads > MAX_INTRA_THREADS {
            return Err(CutoutError::config_value_error(
                "intra-op threads",
                self.intra_threads,
                &format!("0-{}", MAX_INTRA_THREADS),
            ));
        }

        if self.service_timeout_ms == Some(0) {
            return Err(CutoutError::config_value_error(
                "service timeout",
                "0ms",
                "at least 1ms",
            ));
        }

        if let Some(preprocessing) = &self.model_spec.preprocessing {
            if preprocessing.target_size == 0 {
                return Err(CutoutError::config_value_error(
                    "model input size",
                    preprocessing.target_size,
                    "1 or more",
                ));
            }
            if preprocessing.normalization_std.iter().any(|s| *s == 0.0) {
                return Err(CutoutError::invalid_config(
                    "normalization std must not contain zero",
                ));
            }
        }

        if let Some(digest) = &self.model_spec.sha256 {
            if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(CutoutError::config_value_error(
                    "model sha256",
                    digest,
                    "64 hex digits",
                ));
            }
        }

        Ok(())
    }
}

/// Builder for `RemovalConfig`
#[derive(Debug, Default)]
pub struct RemovalConfigBuilder {
    config: RemovalConfig,
}

impl RemovalConfigBuilder {
    /// Use a built-in model
    #[must_use]
    pub fn model(mut self, kind: ModelKind) -> Self {
        self.config.model_spec = ModelSpec::builtin(kind);
        self
    }

    /// Set the full model specification
    #[must_use]
    pub fn model_spec(mut self, model_spec: ModelSpec) -> Self {
        self.config.model_spec = model_spec;
        self
    }

    #[must_use]
    pub fn backend(mut self, backend: BackendType) -> Self {
        self.config.backend = backend;
        self
    }

    /// Set intra-op threads (0 = auto)
    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self
    }

    /// Override the cache base directory
    #[must_use]
    pub fn cache_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.cache_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn auto_download(mut self, enabled: bool) -> Self {
        self.config.auto_download = enabled;
        self
    }

    /// Fail a removal that takes longer than `timeout`
    #[must_use]
    pub fn service_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.service_timeout_ms = timeout.map(|t| t.as_millis() as u64);
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// - Same as [`RemovalConfig::validate`]
    pub fn build(self) -> Result<RemovalConfig> {
        let config = self.config;
        config.validate()?;
        Ok(config)
    }
}
