//! Model cache management for downloaded models
//!
//! Built-in models live as flat `<id>.onnx` files in an XDG-compliant cache
//! directory:
//! - Linux: `~/.cache/alphacut/models/`
//! - macOS: `~/Library/Caches/alphacut/models/`
//! - Windows: `%LOCALAPPDATA%/alphacut/models/`
//!
//! `ALPHACUT_CACHE_DIR` overrides the base directory.

use crate::error::{CutoutError, Result};
use crate::models::ModelKind;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the cache base directory
pub const CACHE_DIR_ENV: &str = "ALPHACUT_CACHE_DIR";

/// Information about a cached model
#[derive(Debug, Clone)]
pub struct CachedModelInfo {
    pub kind: ModelKind,
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Model cache manager
#[derive(Debug, Clone)]
pub struct ModelCache {
    cache_dir: PathBuf,
}

impl ModelCache {
    /// Open the default cache, creating its directory if needed
    ///
    /// # Errors
    /// - Failed to determine cache directory
    /// - Failed to create cache directory
    pub fn new() -> Result<Self> {
        let base = if let Ok(cache_override) = std::env::var(CACHE_DIR_ENV) {
            PathBuf::from(cache_override)
        } else {
            dirs::cache_dir()
                .ok_or_else(|| {
                    CutoutError::invalid_config(format!(
                        "failed to determine cache directory, set {}",
                        CACHE_DIR_ENV
                    ))
                })?
                .join("alphacut")
        };

        Self::with_custom_cache_dir(&base)
    }

    /// Open a cache rooted at `base` (models are stored in `base/models`)
    ///
    /// # Errors
    /// - Failed to create cache directory
    pub fn with_custom_cache_dir(base: &Path) -> Result<Self> {
        let cache_dir = base.join("models");
        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir)
                .map_err(|e| CutoutError::file_io_error("create cache directory", &cache_dir, &e))?;
        }
        Ok(Self { cache_dir })
    }

    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Path a model is (or would be) stored at
    #[must_use]
    pub fn model_path(&self, kind: ModelKind) -> PathBuf {
        self.cache_dir.join(kind.file_name())
    }

    /// A model counts as cached when its file exists and is not empty
    #[must_use]
    pub fn is_model_cached(&self, kind: ModelKind) -> bool {
        fs::metadata(self.model_path(kind))
            .map(|meta| meta.is_file() && meta.len() > 0)
            .unwrap_or(false)
    }

    /// List the built-in models present in the cache
    ///
    /// # Errors
    /// - Failed to stat a cached model file
    pub fn scan_cached_models(&self) -> Result<Vec<CachedModelInfo>> {
        let mut models = Vec::new();
        for kind in ModelKind::all() {
            if !self.is_model_cached(*kind) {
                continue;
            }
            let path = self.model_path(*kind);
            let size_bytes = fs::metadata(&path)
                .map_err(|e| CutoutError::file_io_error("stat cached model", &path, &e))?
                .len();
            models.push(CachedModelInfo {
                kind: *kind,
                path,
                size_bytes,
            });
        }
        Ok(models)
    }

    /// Remove one cached model, returning whether anything was deleted
    ///
    /// # Errors
    /// - Failed to delete the model file
    pub fn clear_specific_model(&self, kind: ModelKind) -> Result<bool> {
        let path = self.model_path(kind);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)
            .map_err(|e| CutoutError::file_io_error("remove cached model", &path, &e))?;
        log::info!("Removed cached model {}", kind);
        Ok(true)
    }

    /// Remove every cached model, returning the ids that were deleted
    ///
    /// # Errors
    /// - Failed to delete a model file
    pub fn clear_all_models(&self) -> Result<Vec<String>> {
        let mut removed = Vec::new();
        for kind in ModelKind::all() {
            if self.clear_specific_model(*kind)? {
                removed.push(kind.id().to_string());
            }
        }
        Ok(removed)
    }
}

/// Format a byte count for display
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", size, UNITS.get(unit).copied().unwrap_or("GB"))
    }
}
