//! Core types exchanged between the pipeline, the task runner and the UI layer

use crate::{
    error::{CutoutError, Result},
    services::ImageCodec,
};
use image::{GrayImage, Luma, RgbaImage};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// An image file selected by the user, read eagerly into memory
#[derive(Debug, Clone)]
pub struct SourceImage {
    path: PathBuf,
    bytes: Vec<u8>,
}

impl SourceImage {
    /// Read the whole file at `path`
    ///
    /// # Errors
    /// - The file is missing, unreadable or permission is denied
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| CutoutError::file_io_error("read image file", path, &e))?;

        Ok(Self {
            path: path.to_path_buf(),
            bytes,
        })
    }

    /// Wrap bytes that are already in memory
    #[must_use]
    pub fn from_bytes<P: Into<PathBuf>>(path: P, bytes: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            bytes,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Successful output of one pipeline run
///
/// The mask is always exactly the alpha channel of the bitmap. The only way
/// to build a result is [`ProcessedResult::from_bitmap`], which derives the
/// mask, so the two can never disagree.
#[derive(Debug, Clone)]
pub struct ProcessedResult {
    bitmap: RgbaImage,
    mask: GrayImage,
    timings: ProcessingTimings,
}

impl ProcessedResult {
    /// Build a result from a decoded RGBA bitmap, extracting its alpha channel as the mask
    #[must_use]
    pub fn from_bitmap(bitmap: RgbaImage) -> Self {
        let mask = extract_alpha(&bitmap);
        Self {
            bitmap,
            mask,
            timings: ProcessingTimings::default(),
        }
    }

    #[must_use]
    pub(crate) fn with_timings(mut self, timings: ProcessingTimings) -> Self {
        self.timings = timings;
        self
    }

    /// The RGBA cutout
    #[must_use]
    pub fn bitmap(&self) -> &RgbaImage {
        &self.bitmap
    }

    /// The alpha mask (0 = background, 255 = foreground)
    #[must_use]
    pub fn mask(&self) -> &GrayImage {
        &self.mask
    }

    #[must_use]
    pub fn timings(&self) -> &ProcessingTimings {
        &self.timings
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.bitmap.dimensions()
    }

    #[must_use]
    pub fn into_parts(self) -> (RgbaImage, GrayImage) {
        (self.bitmap, self.mask)
    }

    /// Save the cutout as PNG with its alpha channel
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        ImageCodec::save_rgba_png(&self.bitmap, path)
    }

    /// Save the mask as an 8-bit grayscale PNG
    pub fn save_mask_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        ImageCodec::save_mask_png(&self.mask, path)
    }

    /// Encode the cutout as PNG bytes
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        ImageCodec::encode_rgba_png(&self.bitmap)
    }

    #[must_use]
    pub fn mask_statistics(&self) -> MaskStatistics {
        MaskStatistics::from_mask(&self.mask)
    }
}

/// Copy the alpha channel of `bitmap` into a single-channel image
#[must_use]
pub fn extract_alpha(bitmap: &RgbaImage) -> GrayImage {
    let (width, height) = bitmap.dimensions();
    GrayImage::from_fn(width, height, |x, y| Luma([bitmap.get_pixel(x, y).0[3]]))
}

/// Diagnostic category of a failed pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// The source file could not be opened or read
    Io,
    /// The removal service rejected or failed to process the input
    Service,
    /// The service output could not be decoded as an image
    Decode,
    /// A defect (panic) inside the pipeline, caught by the task runner
    Internal,
    /// The configured service timeout elapsed
    Timeout,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io => write!(f, "io"),
            Self::Service => write!(f, "service"),
            Self::Decode => write!(f, "decode"),
            Self::Internal => write!(f, "internal"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// Human-readable failure reason, tagged with its category
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct ProcessingFailure {
    pub kind: FailureKind,
    pub reason: String,
}

impl ProcessingFailure {
    pub fn new<S: Into<String>>(kind: FailureKind, reason: S) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }

    /// Tag an internal error with the category of the step that raised it
    #[must_use]
    pub fn from_error(kind: FailureKind, error: &CutoutError) -> Self {
        Self::new(kind, error.to_string())
    }
}

/// Outcome of one pipeline run: exactly one of success or failure
#[derive(Debug, Clone)]
pub enum ProcessingOutcome {
    Success(ProcessedResult),
    Failure(ProcessingFailure),
}

impl ProcessingOutcome {
    pub fn failure<S: Into<String>>(kind: FailureKind, reason: S) -> Self {
        Self::Failure(ProcessingFailure::new(kind, reason))
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    #[must_use]
    pub fn result(&self) -> Option<&ProcessedResult> {
        match self {
            Self::Success(result) => Some(result),
            Self::Failure(_) => None,
        }
    }

    #[must_use]
    pub fn failure_info(&self) -> Option<&ProcessingFailure> {
        match self {
            Self::Success(_) => None,
            Self::Failure(failure) => Some(failure),
        }
    }

    /// Convert into a standard `Result` for `?`-style callers
    pub fn into_result(self) -> std::result::Result<ProcessedResult, ProcessingFailure> {
        match self {
            Self::Success(result) => Ok(result),
            Self::Failure(failure) => Err(failure),
        }
    }
}

/// Statistics about a mask
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskStatistics {
    pub total_pixels: usize,
    pub foreground_pixels: usize,
    pub background_pixels: usize,
    pub foreground_ratio: f32,
    pub background_ratio: f32,
}

impl MaskStatistics {
    /// Count foreground (> 127) and background pixels of `mask`
    #[must_use]
    pub fn from_mask(mask: &GrayImage) -> Self {
        let total_pixels = mask.as_raw().len();
        let foreground_pixels = mask.as_raw().iter().filter(|&&v| v > 127).count();
        let background_pixels = total_pixels - foreground_pixels;

        let (foreground_ratio, background_ratio) = if total_pixels == 0 {
            (0.0, 0.0)
        } else {
            (
                foreground_pixels as f32 / total_pixels as f32,
                background_pixels as f32 / total_pixels as f32,
            )
        };

        Self {
            total_pixels,
            foreground_pixels,
            background_pixels,
            foreground_ratio,
            background_ratio,
        }
    }
}

/// Timing breakdown of one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingTimings {
    /// Reading the source file
    pub read_ms: u64,
    /// The removal service call (model load on first use + inference)
    pub removal_ms: u64,
    /// Decoding the service output and extracting the mask
    pub decode_ms: u64,
    /// End-to-end
    pub total_ms: u64,
}

impl ProcessingTimings {
    /// Share of the total spent inside the removal service
    #[must_use]
    pub fn removal_ratio(&self) -> f64 {
        if self.total_ms == 0 {
            0.0
        } else {
            self.removal_ms as f64 / self.total_ms as f64
        }
    }

    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Total: {}ms | Read: {}ms | Removal: {}ms ({:.1}%) | Decode: {}ms",
            self.total_ms,
            self.read_ms,
            self.removal_ms,
            self.removal_ratio() * 100.0,
            self.decode_ms
        )
    }
}
