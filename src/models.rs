//! Segmentation model catalog and model resolution
//!
//! The built-in catalog is the U²-Net family published with rembg. Each entry
//! knows where to download its ONNX file and how its input has to be
//! normalized. External models are plain `.onnx` files on disk; they default to
//! the U²-Net preprocessing unless the model spec overrides it.

use crate::{
    cache::ModelCache,
    download::ModelDownloader,
    error::{CutoutError, Result},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

const RELEASE_BASE_URL: &str = "https://github.com/danielgatis/rembg/releases/download/v0.0.0";

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Built-in segmentation models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelKind {
    /// General purpose U²-Net (176 MB)
    U2Net,
    /// Lightweight U²-Net (4.7 MB)
    U2NetP,
    /// Pruned U²-Net (43 MB)
    Silueta,
    /// IS-Net trained for general use (1024×1024 input)
    IsNetGeneralUse,
}

impl ModelKind {
    #[must_use]
    pub fn all() -> &'static [ModelKind] {
        &[
            ModelKind::U2Net,
            ModelKind::U2NetP,
            ModelKind::Silueta,
            ModelKind::IsNetGeneralUse,
        ]
    }

    /// Identifier used on the command line and as cache file stem
    #[must_use]
    pub fn id(self) -> &'static str {
        match self {
            ModelKind::U2Net => "u2net",
            ModelKind::U2NetP => "u2netp",
            ModelKind::Silueta => "silueta",
            ModelKind::IsNetGeneralUse => "isnet-general-use",
        }
    }

    #[must_use]
    pub fn file_name(self) -> String {
        format!("{}.onnx", self.id())
    }

    #[must_use]
    pub fn download_url(self) -> String {
        format!("{}/{}", RELEASE_BASE_URL, self.file_name())
    }

    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            ModelKind::U2Net => "general purpose salient object segmentation",
            ModelKind::U2NetP => "lightweight version of u2net",
            ModelKind::Silueta => "u2net pruned to a quarter of the size",
            ModelKind::IsNetGeneralUse => "high resolution general segmentation",
        }
    }

    #[must_use]
    pub fn preprocessing(self) -> PreprocessingConfig {
        match self {
            ModelKind::U2Net | ModelKind::U2NetP | ModelKind::Silueta => PreprocessingConfig {
                target_size: 320,
                normalization_mean: IMAGENET_MEAN,
                normalization_std: IMAGENET_STD,
            },
            ModelKind::IsNetGeneralUse => PreprocessingConfig {
                target_size: 1024,
                normalization_mean: [0.5, 0.5, 0.5],
                normalization_std: [1.0, 1.0, 1.0],
            },
        }
    }
}

impl Default for ModelKind {
    fn default() -> Self {
        Self::U2Net
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ModelKind {
    type Err = CutoutError;

    fn from_str(s: &str) -> Result<Self> {
        let needle = s.trim().to_lowercase();
        ModelKind::all()
            .iter()
            .copied()
            .find(|kind| kind.id() == needle)
            .ok_or_else(|| {
                let known: Vec<&str> = ModelKind::all().iter().map(|k| k.id()).collect();
                CutoutError::invalid_config(format!(
                    "unknown model '{}' (known models: {})",
                    s,
                    known.join(", ")
                ))
            })
    }
}

/// Where the model weights come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ModelSource {
    /// Built-in model, resolved through the cache (downloaded on first use)
    Builtin(ModelKind),
    /// ONNX file on the local filesystem
    External(PathBuf),
}

impl ModelSource {
    /// Get a display name for tracing and logging
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            ModelSource::Builtin(kind) => format!("builtin:{}", kind),
            ModelSource::External(path) => format!(
                "external:{}",
                path.file_name().unwrap_or_default().to_string_lossy()
            ),
        }
    }
}

/// Complete model specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub source: ModelSource,
    /// Overrides the preprocessing implied by the source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preprocessing: Option<PreprocessingConfig>,
    /// Hex SHA-256 the model file must match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl ModelSpec {
    #[must_use]
    pub fn builtin(kind: ModelKind) -> Self {
        Self {
            source: ModelSource::Builtin(kind),
            preprocessing: None,
            sha256: None,
        }
    }

    #[must_use]
    pub fn external<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            source: ModelSource::External(path.into()),
            preprocessing: None,
            sha256: None,
        }
    }

    /// Require the model file to have this SHA-256 digest
    #[must_use]
    pub fn with_sha256<S: Into<String>>(mut self, digest: S) -> Self {
        self.sha256 = Some(digest.into());
        self
    }

    /// Preprocessing to use for this model
    #[must_use]
    pub fn effective_preprocessing(&self) -> PreprocessingConfig {
        if let Some(config) = &self.preprocessing {
            return config.clone();
        }
        match &self.source {
            ModelSource::Builtin(kind) => kind.preprocessing(),
            ModelSource::External(_) => ModelKind::U2Net.preprocessing(),
        }
    }
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self::builtin(ModelKind::default())
    }
}

/// Input normalization expected by a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    /// Side of the square model input
    pub target_size: u32,
    pub normalization_mean: [f32; 3],
    pub normalization_std: [f32; 3],
}

/// Model information and metadata
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub input_shape: (usize, usize, usize, usize), // NCHW format
    pub output_shape: (usize, usize, usize, usize),
}

/// A model resolved to a file on disk, ready to be loaded by a backend
#[derive(Debug, Clone)]
pub struct ModelManager {
    spec: ModelSpec,
    path: PathBuf,
    preprocessing: PreprocessingConfig,
}

impl ModelManager {
    /// Resolve `spec` to a local file
    ///
    /// Built-in models are looked up in `cache`; when missing and
    /// `auto_download` is set they are downloaded first.
    ///
    /// # Errors
    /// - External model file does not exist
    /// - Built-in model not cached and auto-download disabled
    /// - Download failures
    /// - Model file does not match `spec.sha256`
    pub fn resolve(spec: &ModelSpec, cache: &ModelCache, auto_download: bool) -> Result<Self> {
        let mut verified = false;
        let path = match &spec.source {
            ModelSource::External(path) => {
                if !path.is_file() {
                    return Err(CutoutError::model(format!(
                        "model file '{}' does not exist",
                        path.display()
                    )));
                }
                path.clone()
            },
            ModelSource::Builtin(kind) => {
                if cache.is_model_cached(*kind) {
                    cache.model_path(*kind)
                } else if auto_download {
                    tracing::info!(model = %kind, "model not cached, downloading");
                    let downloader = ModelDownloader::with_cache(cache.clone())?
                        .with_expected_sha256(spec.sha256.clone());
                    verified = true;
                    downloader.download_blocking(*kind)?
                } else {
                    return Err(CutoutError::model(format!(
                        "model '{}' is not cached in '{}' and auto-download is disabled",
                        kind,
                        cache.cache_dir().display()
                    )));
                }
            },
        };

        if !verified {
            Self::verify_checksum(spec, &path)?;
        }
        Ok(Self::from_path(spec, path))
    }

    fn verify_checksum(spec: &ModelSpec, path: &Path) -> Result<()> {
        let expected = spec.sha256.as_deref();
        if ModelDownloader::verify_file_integrity(path, expected)? {
            return Ok(());
        }
        Err(CutoutError::model(format!(
            "model file '{}' does not match the expected sha256 {}",
            path.display(),
            expected.unwrap_or_default()
        )))
    }

    /// Use an already resolved path without touching the cache
    #[must_use]
    pub fn from_path(spec: &ModelSpec, path: PathBuf) -> Self {
        Self {
            preprocessing: spec.effective_preprocessing(),
            spec: spec.clone(),
            path,
        }
    }

    /// Read the model weights
    ///
    /// # Errors
    /// - Model file unreadable
    pub fn load_model(&self) -> Result<Vec<u8>> {
        std::fs::read(&self.path)
            .map_err(|e| CutoutError::file_io_error("read model file", &self.path, &e))
    }

    #[must_use]
    pub fn model_path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    #[must_use]
    pub fn preprocessing_config(&self) -> &PreprocessingConfig {
        &self.preprocessing
    }

    /// Model information derived from the model spec and the file on disk
    ///
    /// # Errors
    /// - Model file metadata unavailable
    pub fn info(&self) -> Result<ModelInfo> {
        let size_bytes = std::fs::metadata(&self.path)
            .map_err(|e| CutoutError::file_io_error("stat model file", &self.path, &e))?
            .len();
        let side = self.preprocessing.target_size as usize;

        Ok(ModelInfo {
            name: self.spec.source.display_name(),
            path: self.path.clone(),
            size_bytes,
            input_shape: (1, 3, side, side),
            output_shape: (1, 1, side, side),
        })
    }
}
