//! Turning a model prediction back into an alpha mask

use crate::{
    error::{CutoutError, Result},
    utils::preprocessing::Letterbox,
};
use image::{imageops::FilterType, GrayImage, Luma, RgbaImage};
use ndarray::Array4;

/// Post-processing of `1×1×S×S` prediction tensors
pub struct MaskPostprocessor;

impl MaskPostprocessor {
    /// Convert a prediction into a mask matching the source image size
    ///
    /// The letterboxed region is cropped out and min-max normalized to 0..=255
    /// over that region alone, then resized to `original_dimensions` with Lanczos3.
    ///
    /// # Errors
    /// - Unexpected tensor shape
    /// - Letterbox geometry outside the tensor
    pub fn tensor_to_mask(
        tensor: &Array4<f32>,
        letterbox: &Letterbox,
        original_dimensions: (u32, u32),
    ) -> Result<GrayImage> {
        let shape = tensor.shape();
        let (batch, channels, height, width) = match *shape {
            [b, c, h, w] => (b, c, h, w),
            _ => return Err(CutoutError::inference("prediction tensor must be 4D")),
        };
        if batch < 1 || channels < 1 {
            return Err(CutoutError::inference(format!(
                "invalid prediction tensor shape {:?}",
                shape
            )));
        }

        let crop_right = (letterbox.offset_x + letterbox.scaled_width) as usize;
        let crop_bottom = (letterbox.offset_y + letterbox.scaled_height) as usize;
        if crop_right > width || crop_bottom > height {
            return Err(CutoutError::inference(format!(
                "prediction {}x{} is smaller than the letterbox {}x{}",
                width, height, crop_right, crop_bottom
            )));
        }

        let region = tensor.slice(ndarray::s![
            0,
            0,
            letterbox.offset_y as usize..crop_bottom,
            letterbox.offset_x as usize..crop_right
        ]);
        let (min, max) = region
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let range = max - min;

        let cropped = GrayImage::from_fn(letterbox.scaled_width, letterbox.scaled_height, |x, y| {
            let value = region.get([y as usize, x as usize]).copied().unwrap_or(0.0);
            let normalized = if range > f32::EPSILON {
                (value - min) / range
            } else {
                value.clamp(0.0, 1.0)
            };
            Luma([(normalized * 255.0).round().clamp(0.0, 255.0) as u8])
        });

        let (orig_width, orig_height) = original_dimensions;
        if cropped.dimensions() == original_dimensions {
            return Ok(cropped);
        }
        Ok(image::imageops::resize(
            &cropped,
            orig_width,
            orig_height,
            FilterType::Lanczos3,
        ))
    }

    /// Replace the alpha channel of `image` with `mask`
    ///
    /// # Errors
    /// - Dimensions differ
    pub fn apply_alpha(image: &mut RgbaImage, mask: &GrayImage) -> Result<()> {
        if image.dimensions() != mask.dimensions() {
            return Err(CutoutError::internal(format!(
                "image {:?} and mask {:?} dimensions do not match",
                image.dimensions(),
                mask.dimensions()
            )));
        }

        for (pixel, alpha) in image.pixels_mut().zip(mask.pixels()) {
            pixel.0[3] = alpha.0[0];
        }
        Ok(())
    }
}
