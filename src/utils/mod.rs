//! Tensor conversion helpers shared by the inference backends

pub mod postprocessing;
pub mod preprocessing;

pub use postprocessing::MaskPostprocessor;
pub use preprocessing::{ImagePreprocessor, Letterbox};
