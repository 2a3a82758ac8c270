//! Image preprocessing for model inference
//!
//! Images are letterboxed: resized to fit the square model input while keeping
//! their aspect ratio, centered on a padded canvas, then normalized into an
//! NCHW tensor. The [`Letterbox`] geometry is kept so the prediction can be
//! mapped back onto the source image.

use crate::{
    error::{CutoutError, Result},
    models::PreprocessingConfig,
};
use image::{DynamicImage, ImageBuffer, RgbImage};
use ndarray::Array4;

/// Placement of the resized image on the square model canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Letterbox {
    pub target_size: u32,
    pub scaled_width: u32,
    pub scaled_height: u32,
    pub offset_x: u32,
    pub offset_y: u32,
}

impl Letterbox {
    /// Compute the placement of a `width`×`height` image on a `target_size` canvas
    ///
    /// # Errors
    /// - Zero-sized image or canvas
    pub fn compute(width: u32, height: u32, target_size: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(CutoutError::processing_stage_error(
                "preprocessing",
                "image has zero width or height",
                Some(&format!("{}x{}", width, height)),
            ));
        }
        if target_size == 0 {
            return Err(CutoutError::invalid_config("model input size must be positive"));
        }

        let target = target_size as f32;
        let scale = (target / width as f32).min(target / height as f32);

        let scaled_width = ((width as f32 * scale).round() as u32).clamp(1, target_size);
        let scaled_height = ((height as f32 * scale).round() as u32).clamp(1, target_size);

        Ok(Self {
            target_size,
            scaled_width,
            scaled_height,
            offset_x: (target_size - scaled_width) / 2,
            offset_y: (target_size - scaled_height) / 2,
        })
    }
}

/// Shared image preprocessing utilities
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Padding color of the letterbox canvas
    pub const PADDING_COLOR: [u8; 3] = [255, 255, 255];

    /// Preprocess an image into a normalized `1×3×S×S` tensor
    ///
    /// # Errors
    /// - Zero-sized image
    /// - Invalid target size
    pub fn preprocess_for_inference(
        image: &DynamicImage,
        config: &PreprocessingConfig,
    ) -> Result<(Array4<f32>, Letterbox)> {
        let rgb_image = image.to_rgb8();
        let (width, height) = rgb_image.dimensions();
        let letterbox = Letterbox::compute(width, height, config.target_size)?;

        let resized = image::imageops::resize(
            &rgb_image,
            letterbox.scaled_width,
            letterbox.scaled_height,
            image::imageops::FilterType::Triangle,
        );

        let padding = Self::PADDING_COLOR;
        let mut canvas = ImageBuffer::from_pixel(
            letterbox.target_size,
            letterbox.target_size,
            image::Rgb(padding),
        );
        image::imageops::replace(
            &mut canvas,
            &resized,
            i64::from(letterbox.offset_x),
            i64::from(letterbox.offset_y),
        );

        Ok((Self::canvas_to_tensor(&canvas, config), letterbox))
    }

    /// Convert the canvas to a normalized NCHW tensor
    fn canvas_to_tensor(canvas: &RgbImage, config: &PreprocessingConfig) -> Array4<f32> {
        let (width, height) = canvas.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

        for (x, y, pixel) in canvas.enumerate_pixels() {
            for channel in 0..3 {
                let value = f32::from(pixel.0[channel]) / 255.0;
                let mean = config.normalization_mean[channel];
                let std = config.normalization_std[channel];
                if let Some(slot) = tensor.get_mut([0, channel, y as usize, x as usize]) {
                    *slot = (value - mean) / std;
                }
            }
        }

        tensor
    }
}
