//! Image codec adapter
//!
//! Keeps the `image` crate calls used by the pipeline and the removal service
//! in one place: decoding bytes into an RGBA bitmap and writing bitmaps and
//! masks back out as PNG.

use crate::error::{CutoutError, Result};
use image::{DynamicImage, GrayImage, ImageFormat, RgbaImage};
use std::io::Cursor;
use std::path::Path;

/// Service for decoding and encoding images
pub struct ImageCodec;

impl ImageCodec {
    /// Decode image bytes, detecting the format from the content
    ///
    /// # Errors
    /// - Unknown or unsupported format
    /// - Corrupt image data
    pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
        image::load_from_memory(bytes).map_err(|e| {
            let format = image::guess_format(bytes)
                .map_or_else(|_| "unknown".to_string(), |f| format!("{f:?}"));
            CutoutError::decode(format!(
                "failed to decode {} bytes (format: {}): {}",
                bytes.len(),
                format,
                e
            ))
        })
    }

    /// Decode image bytes into an 8-bit RGBA bitmap
    ///
    /// Formats without an alpha channel come back fully opaque (alpha 255).
    ///
    /// # Errors
    /// - Same as [`ImageCodec::decode`]
    pub fn decode_rgba(bytes: &[u8]) -> Result<RgbaImage> {
        Ok(Self::decode(bytes)?.to_rgba8())
    }

    /// Encode an RGBA bitmap as PNG bytes (alpha preserved)
    ///
    /// # Errors
    /// - PNG encoder failure
    pub fn encode_rgba_png(bitmap: &RgbaImage) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        bitmap
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .map_err(|e| CutoutError::encode(format!("failed to encode PNG: {}", e)))?;
        Ok(buffer)
    }

    /// Encode a mask as 8-bit grayscale PNG bytes
    ///
    /// # Errors
    /// - PNG encoder failure
    pub fn encode_mask_png(mask: &GrayImage) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        mask.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .map_err(|e| CutoutError::encode(format!("failed to encode mask PNG: {}", e)))?;
        Ok(buffer)
    }

    /// Write an RGBA bitmap to `path` as PNG, creating parent directories
    ///
    /// # Errors
    /// - Failed to create the parent directory or write the file
    pub fn save_rgba_png<P: AsRef<Path>>(bitmap: &RgbaImage, path: P) -> Result<()> {
        let bytes = Self::encode_rgba_png(bitmap)?;
        Self::write_file(path.as_ref(), &bytes)
    }

    /// Write a mask to `path` as grayscale PNG, creating parent directories
    ///
    /// # Errors
    /// - Failed to create the parent directory or write the file
    pub fn save_mask_png<P: AsRef<Path>>(mask: &GrayImage, path: P) -> Result<()> {
        let bytes = Self::encode_mask_png(mask)?;
        Self::write_file(path.as_ref(), &bytes)
    }

    /// Check if a file path has an extension the decoder handles
    pub fn is_supported_format<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase)
            .is_some_and(|ext| {
                matches!(
                    ext.as_str(),
                    "jpg" | "jpeg" | "png" | "webp" | "tiff" | "tif" | "bmp"
                )
            })
    }

    fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| CutoutError::file_io_error("create output directory", parent, &e))?;
        }
        std::fs::write(path, bytes)
            .map_err(|e| CutoutError::file_io_error("write PNG file", path, &e))?;
        log::debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(())
    }
}
