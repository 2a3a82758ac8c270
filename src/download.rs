//! Model downloading
//!
//! Streams a model file over HTTP into a temporary file inside the cache
//! directory and renames it into place once complete, so a crashed or
//! interrupted download never leaves a truncated model behind.

use crate::cache::ModelCache;
use crate::error::{CutoutError, Result};
use crate::models::ModelKind;
use futures_util::stream::TryStreamExt;
#[cfg(feature = "cli")]
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;

/// Progress bar abstraction that works with and without CLI features
#[derive(Debug)]
pub enum ProgressIndicator {
    #[cfg(feature = "cli")]
    Indicatif(ProgressBar),
    NoOp,
}

impl ProgressIndicator {
    pub fn set_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_message(msg),
            Self::NoOp => {
                let _ = msg;
            },
        }
    }

    pub fn set_length(&self, len: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_length(len),
            Self::NoOp => {
                let _ = len;
            },
        }
    }

    pub fn set_position(&self, pos: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_position(pos),
            Self::NoOp => {
                let _ = pos;
            },
        }
    }

    pub fn finish_with_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.finish_with_message(msg),
            Self::NoOp => {
                let _ = msg;
            },
        }
    }

    fn create(show_progress: bool) -> Self {
        #[cfg(feature = "cli")]
        {
            if show_progress {
                let pb = ProgressBar::new(0);
                if let Ok(style) = ProgressStyle::default_bar().template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
                ) {
                    pb.set_style(style.progress_chars("#>-"));
                }
                return Self::Indicatif(pb);
            }
        }
        let _ = show_progress;
        Self::NoOp
    }
}

/// Model downloader
#[derive(Debug, Clone)]
pub struct ModelDownloader {
    client: Client,
    cache: ModelCache,
    show_progress: bool,
    expected_sha256: Option<String>,
}

impl ModelDownloader {
    /// Create a downloader writing into the default cache
    ///
    /// # Errors
    /// - Failed to create HTTP client
    /// - Failed to initialize model cache
    pub fn new() -> Result<Self> {
        Self::with_cache(ModelCache::new()?)
    }

    /// Create a downloader writing into `cache`
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn with_cache(cache: ModelCache) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| CutoutError::network_error("failed to create HTTP client", e))?;

        Ok(Self {
            client,
            cache,
            show_progress: false,
            expected_sha256: None,
        })
    }

    /// Show an indicatif progress bar while downloading (CLI builds only)
    #[must_use]
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// Reject downloads whose SHA-256 differs from `digest`
    #[must_use]
    pub fn with_expected_sha256(mut self, digest: Option<String>) -> Self {
        self.expected_sha256 = digest;
        self
    }

    #[must_use]
    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    /// Download a built-in model into the cache unless it is already there
    ///
    /// # Errors
    /// - Network errors during download
    /// - File system errors while writing the cache
    pub async fn download_model(&self, kind: ModelKind) -> Result<PathBuf> {
        let final_path = self.cache.model_path(kind);
        if self.cache.is_model_cached(kind) {
            log::debug!("Model {} already cached at {}", kind, final_path.display());
            return Ok(final_path);
        }

        let url = kind.download_url();
        log::info!("Downloading model {} from {}", kind, url);
        self.download_to(&url, &final_path, self.expected_sha256.as_deref())
            .await?;
        log::info!("Model {} stored at {}", kind, final_path.display());
        Ok(final_path)
    }

    /// Synchronous wrapper around [`ModelDownloader::download_model`]
    ///
    /// Runs the download on a dedicated thread with its own current-thread
    /// runtime, so it is safe to call from plain threads, from tokio's
    /// blocking pool and from inside an async task alike.
    ///
    /// # Errors
    /// - Same as [`ModelDownloader::download_model`]
    /// - Failed to start the download runtime
    pub fn download_blocking(&self, kind: ModelKind) -> Result<PathBuf> {
        let downloader = self.clone();
        let handle = std::thread::Builder::new()
            .name("alphacut-download".to_string())
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(|e| CutoutError::internal(format!("failed to start runtime: {e}")))?;
                runtime.block_on(downloader.download_model(kind))
            })
            .map_err(|e| CutoutError::internal(format!("failed to spawn download thread: {e}")))?;

        handle
            .join()
            .map_err(|_| CutoutError::internal("download thread panicked"))?
    }

    /// Download `url` to `destination` atomically, optionally checking its SHA-256
    ///
    /// # Errors
    /// - HTTP or stream errors
    /// - Integrity check failure
    /// - File system errors
    pub async fn download_to(
        &self,
        url: &str,
        destination: &Path,
        expected_sha256: Option<&str>,
    ) -> Result<()> {
        let parent = destination
            .parent()
            .ok_or_else(|| CutoutError::invalid_config("download destination has no parent"))?;
        std::fs::create_dir_all(parent)
            .map_err(|e| CutoutError::file_io_error("create directory", parent, &e))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CutoutError::network_error(format!("failed to download {}", url), e))?;

        if !response.status().is_success() {
            return Err(CutoutError::network_error(
                format!("failed to download {}", url),
                format!("HTTP {}", response.status()),
            ));
        }

        let total_size = response.content_length();
        let progress = ProgressIndicator::create(self.show_progress);
        if let Some(total) = total_size {
            progress.set_length(total);
        }
        progress.set_message(
            destination
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string(),
        );

        let temp = tempfile::Builder::new()
            .prefix(".download-")
            .suffix(".part")
            .tempfile_in(parent)
            .map_err(|e| CutoutError::file_io_error("create temporary file", parent, &e))?;
        let (std_file, temp_path) = temp.into_parts();
        let mut file = tokio::fs::File::from_std(std_file);
        let mut hasher = Sha256::new();

        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let mut downloaded = 0u64;
        let mut buffer = vec![0; 64 * 1024];
        loop {
            let bytes_read = stream
                .read(&mut buffer)
                .await
                .map_err(|e| CutoutError::network_error("failed to read download stream", e))?;
            if bytes_read == 0 {
                break;
            }

            let chunk = buffer.get(..bytes_read).unwrap_or(&[]);
            file.write_all(chunk)
                .await
                .map_err(|e| CutoutError::file_io_error("write to file", &temp_path, &e))?;
            hasher.update(chunk);

            downloaded += bytes_read as u64;
            progress.set_position(downloaded);
        }

        file.flush()
            .await
            .map_err(|e| CutoutError::file_io_error("flush file", &temp_path, &e))?;
        drop(file);

        if let Some(expected) = expected_sha256 {
            let actual = format!("{:x}", hasher.finalize());
            if !actual.eq_ignore_ascii_case(expected) {
                progress.finish_with_message("integrity check failed".to_string());
                return Err(CutoutError::network_error(
                    format!("integrity check failed for {}", url),
                    format!("expected sha256 {}, got {}", expected, actual),
                ));
            }
        }

        temp_path
            .persist(destination)
            .map_err(|e| CutoutError::file_io_error("move download into place", destination, &e.error))?;

        progress.finish_with_message(format!("downloaded {} bytes", downloaded));
        log::debug!("Downloaded {} bytes to {}", downloaded, destination.display());
        Ok(())
    }

    /// Verify a file on disk against an expected SHA-256 digest
    ///
    /// # Errors
    /// - File unreadable
    pub fn verify_file_integrity(file_path: &Path, expected_hash: Option<&str>) -> Result<bool> {
        let Some(expected) = expected_hash else {
            return Ok(true);
        };

        let contents = std::fs::read(file_path)
            .map_err(|e| CutoutError::file_io_error("read file for verification", file_path, &e))?;
        let actual = format!("{:x}", Sha256::digest(&contents));

        if actual.eq_ignore_ascii_case(expected) {
            Ok(true)
        } else {
            log::warn!(
                "File integrity check failed for {}: expected {}, got {}",
                file_path.display(),
                expected,
                actual
            );
            Ok(false)
        }
    }
}
