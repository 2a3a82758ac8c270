#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # alphacut
//!
//! One-shot background removal: pick an image, cut out its subject with a
//! pretrained segmentation model, get back the RGBA cutout and its alpha
//! mask, save a transparent PNG.
//!
//! ## Building blocks
//!
//! - [`BackgroundRemover`]: encoded image in, encoded cutout out. The model
//!   sits behind this trait; [`ModelRemovalService`] runs the rembg model
//!   family (`u2net`, `u2netp`, `silueta`, `isnet-general-use`) on tract or
//!   ONNX Runtime, downloading the weights into a local cache on first use.
//! - [`process`] / [`ProcessingPipeline`]: read a file, call the service,
//!   decode its output, extract the mask. Always returns a
//!   [`ProcessingOutcome`]; errors become tagged failures.
//! - [`TaskRunner`]: runs the pipeline in the background and delivers the
//!   outcome to a callback on the UI thread.
//! - [`Session`]: the result a UI currently shows, busy state, PNG export.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use alphacut::{process, ModelKind, ModelRemovalService, RemovalConfig};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = RemovalConfig::builder().model(ModelKind::U2NetP).build()?;
//! let service = ModelRemovalService::new(config)?;
//!
//! match process("portrait.jpg", &service).into_result() {
//!     Ok(result) => result.save_png("portrait_cutout.png")?,
//!     Err(failure) => eprintln!("{} failure: {}", failure.kind, failure.reason),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `tract` (default): pure Rust inference backend
//! - `onnx`: ONNX Runtime inference backend
//! - `cli` (default): the `alphacut` binary
//! - `webp-support` (default): WebP input
//! - `tracing-json`: JSON log output for the binary

pub mod backends;
pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod inference;
pub mod models;
pub mod pipeline;
pub mod runner;
pub mod services;
pub mod session;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;

pub use backends::{BackendFactory, DefaultBackendFactory};
pub use cache::{format_size, CachedModelInfo, ModelCache};
pub use config::{BackendType, RemovalConfig, RemovalConfigBuilder};
pub use download::ModelDownloader;
pub use error::{CutoutError, Result};
pub use inference::InferenceBackend;
pub use models::{ModelKind, ModelManager, ModelSource, ModelSpec, PreprocessingConfig};
pub use pipeline::{process, process_source, ProcessingPipeline};
pub use runner::{SubmissionId, TaskRunner};
pub use services::{BackgroundRemover, ImageCodec, ModelRemovalService};
pub use session::{Session, SessionUpdate};
pub use types::{
    extract_alpha, FailureKind, MaskStatistics, ProcessedResult, ProcessingFailure,
    ProcessingOutcome, ProcessingTimings, SourceImage,
};

#[cfg(feature = "cli")]
pub use tracing_config::{TracingConfig, TracingFormat};

/// Remove the background of encoded image bytes with a one-off model service
///
/// Loads the model on every call; keep a [`ModelRemovalService`] around when
/// processing more than one image.
///
/// # Errors
/// - Invalid configuration
/// - Model loading, inference or decoding failures
pub fn remove_background_from_bytes(
    image_bytes: &[u8],
    config: &RemovalConfig,
) -> Result<ProcessedResult> {
    let service = ModelRemovalService::new(config.clone())?;
    let output = service.remove(image_bytes)?;
    Ok(ProcessedResult::from_bitmap(ImageCodec::decode_rgba(&output)?))
}
