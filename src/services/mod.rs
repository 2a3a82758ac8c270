//! Services the pipeline is built from
//!
//! - [`ImageCodec`]: decoding and PNG encoding
//! - [`BackgroundRemover`]: the removal service seam and its model-backed implementation

pub mod codec;
pub mod removal;

pub use codec::ImageCodec;
pub use removal::{BackgroundRemover, ModelRemovalService};
