//! Shared fakes and fixtures for integration tests
//!
//! The fakes stand in for the model-backed service so the tests run without
//! downloading weights.

#![allow(dead_code)]

use alphacut::{BackgroundRemover, CutoutError, ImageCodec, Result};
use image::{Rgb, RgbImage, Rgba, RgbaImage};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Treats near-white pixels as background and everything else as subject
#[derive(Default)]
pub struct ColorKeyRemover {
    calls: AtomicUsize,
}

impl ColorKeyRemover {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl BackgroundRemover for ColorKeyRemover {
    fn remove(&self, input: &[u8]) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut bitmap = ImageCodec::decode_rgba(input)?;
        for pixel in bitmap.pixels_mut() {
            let [r, g, b, _] = pixel.0;
            let background = r > 200 && g > 200 && b > 200;
            pixel.0[3] = if background { 0 } else { 255 };
        }
        ImageCodec::encode_rgba_png(&bitmap)
    }
}

/// Returns the same bytes for every input
pub struct FixedOutput(pub Vec<u8>);

impl FixedOutput {
    pub fn png(bitmap: &RgbaImage) -> Self {
        Self(ImageCodec::encode_rgba_png(bitmap).unwrap())
    }
}

impl BackgroundRemover for FixedOutput {
    fn remove(&self, _input: &[u8]) -> Result<Vec<u8>> {
        Ok(self.0.clone())
    }
}

/// Always fails with a service error
pub struct FailingRemover(pub &'static str);

impl BackgroundRemover for FailingRemover {
    fn remove(&self, _input: &[u8]) -> Result<Vec<u8>> {
        Err(CutoutError::service(self.0))
    }
}

/// Sleeps before delegating to [`ColorKeyRemover`]
pub struct SlowRemover {
    pub delay: Duration,
    pub inner: ColorKeyRemover,
}

impl SlowRemover {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            inner: ColorKeyRemover::default(),
        }
    }
}

impl BackgroundRemover for SlowRemover {
    fn remove(&self, input: &[u8]) -> Result<Vec<u8>> {
        std::thread::sleep(self.delay);
        self.inner.remove(input)
    }
}

pub struct PanickingRemover;

impl BackgroundRemover for PanickingRemover {
    fn remove(&self, _input: &[u8]) -> Result<Vec<u8>> {
        panic!("segmentation model crashed")
    }
}

/// White canvas with a dark square covering the middle third
pub fn subject_on_white(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let inside = x >= width / 3 && x < 2 * width / 3 && y >= height / 3 && y < 2 * height / 3;
        if inside {
            Rgb([20, 40, 60])
        } else {
            Rgb([255, 255, 255])
        }
    })
}

/// Save [`subject_on_white`] under `dir`; the extension picks the format
pub fn write_subject_image(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    subject_on_white(width, height).save(&path).unwrap();
    path
}

/// RGBA bitmap whose alpha grows left to right
pub fn alpha_ramp(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let alpha = ((x * 255) / width.max(1)) as u8;
        Rgba([(x % 256) as u8, (y % 256) as u8, 128, alpha])
    })
}
