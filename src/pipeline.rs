//! Synchronous processing pipeline
//!
//! One run reads the source file, hands its bytes to the removal service,
//! decodes the service output into an RGBA bitmap and derives the mask from
//! its alpha channel. Every error along the way is folded into a
//! [`ProcessingOutcome::Failure`] tagged with the step that failed; nothing
//! escapes as an `Err`.

use crate::{
    error::CutoutError,
    services::{BackgroundRemover, ImageCodec},
    types::{
        FailureKind, ProcessedResult, ProcessingFailure, ProcessingOutcome, ProcessingTimings,
        SourceImage,
    },
};
use instant::Instant;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument, span, warn, Level};

/// Pipeline bound to one removal service
#[derive(Clone)]
pub struct ProcessingPipeline {
    service: Arc<dyn BackgroundRemover>,
}

impl std::fmt::Debug for ProcessingPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingPipeline").finish_non_exhaustive()
    }
}

impl ProcessingPipeline {
    #[must_use]
    pub fn new(service: Arc<dyn BackgroundRemover>) -> Self {
        Self { service }
    }

    #[must_use]
    pub fn service(&self) -> &Arc<dyn BackgroundRemover> {
        &self.service
    }

    /// Run the pipeline for the image at `path`
    ///
    /// Blocks for the duration of the service call. Never panics on bad
    /// input; a panicking service is the caller's concern.
    pub fn process<P: AsRef<Path>>(&self, path: P) -> ProcessingOutcome {
        process(path, self.service.as_ref())
    }
}

/// Run the pipeline for the image at `path` with `service`
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn process<P, S>(path: P, service: &S) -> ProcessingOutcome
where
    P: AsRef<Path>,
    S: BackgroundRemover + ?Sized,
{
    let total_start = Instant::now();
    let mut timings = ProcessingTimings::default();

    let source = {
        let _span = span!(Level::DEBUG, "read_source").entered();
        let read_start = Instant::now();
        match SourceImage::read(path.as_ref()) {
            Ok(source) => {
                timings.read_ms = read_start.elapsed().as_millis() as u64;
                source
            },
            Err(e) => return failed(FailureKind::Io, &e),
        }
    };

    process_source_with_timings(&source, service, timings, total_start)
}

/// Run the pipeline for a source that is already in memory
pub fn process_source<S>(source: &SourceImage, service: &S) -> ProcessingOutcome
where
    S: BackgroundRemover + ?Sized,
{
    process_source_with_timings(source, service, ProcessingTimings::default(), Instant::now())
}

fn process_source_with_timings<S>(
    source: &SourceImage,
    service: &S,
    mut timings: ProcessingTimings,
    total_start: Instant,
) -> ProcessingOutcome
where
    S: BackgroundRemover + ?Sized,
{
    let output = {
        let _span = span!(
            Level::INFO,
            "background_removal",
            input_bytes = source.bytes().len()
        )
        .entered();
        let removal_start = Instant::now();
        match service.remove(source.bytes()) {
            Ok(output) => {
                timings.removal_ms = removal_start.elapsed().as_millis() as u64;
                output
            },
            Err(e) => return failed(FailureKind::Service, &e),
        }
    };

    let bitmap = {
        let _span = span!(Level::DEBUG, "decode_output", output_bytes = output.len()).entered();
        let decode_start = Instant::now();
        match ImageCodec::decode_rgba(&output) {
            Ok(bitmap) => {
                timings.decode_ms = decode_start.elapsed().as_millis() as u64;
                bitmap
            },
            Err(e) => return failed(FailureKind::Decode, &e),
        }
    };

    let result = ProcessedResult::from_bitmap(bitmap);
    timings.total_ms = total_start.elapsed().as_millis() as u64;

    let (width, height) = result.dimensions();
    info!(width, height, total_ms = timings.total_ms, "background removed");
    debug!("{}", timings.summary());

    ProcessingOutcome::Success(result.with_timings(timings))
}

fn failed(kind: FailureKind, error: &CutoutError) -> ProcessingOutcome {
    warn!(kind = %kind, error = %error, "processing failed");
    ProcessingOutcome::Failure(ProcessingFailure::from_error(kind, error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use image::{Rgba, RgbaImage};
    use tempfile::TempDir;

    /// Returns a fixed PNG regardless of input
    struct FixedOutput(Vec<u8>);

    impl BackgroundRemover for FixedOutput {
        fn remove(&self, _input: &[u8]) -> Result<Vec<u8>> {
            Ok(self.0.clone())
        }
    }

    struct Rejecting;

    impl BackgroundRemover for Rejecting {
        fn remove(&self, _input: &[u8]) -> Result<Vec<u8>> {
            Err(CutoutError::service("model rejected the input"))
        }
    }

    fn input_file(temp_dir: &TempDir) -> std::path::PathBuf {
        let path = temp_dir.path().join("input.bin");
        std::fs::write(&path, b"raw bytes the fake services ignore").unwrap();
        path
    }

    #[test]
    fn test_success_mask_matches_alpha() {
        let temp_dir = TempDir::new().unwrap();
        let bitmap = RgbaImage::from_fn(6, 4, |x, y| Rgba([10, 20, 30, (x * 40 + y) as u8]));
        let service = FixedOutput(ImageCodec::encode_rgba_png(&bitmap).unwrap());

        let outcome = process(input_file(&temp_dir), &service);
        let result = outcome.into_result().unwrap();

        assert_eq!(result.bitmap(), &bitmap);
        assert_eq!(result.mask().dimensions(), (6, 4));
        for (x, y, alpha) in result.mask().enumerate_pixels() {
            assert_eq!(alpha.0[0], bitmap.get_pixel(x, y).0[3]);
        }
    }

    #[test]
    fn test_missing_file_is_io_failure() {
        let temp_dir = TempDir::new().unwrap();
        let outcome = process(temp_dir.path().join("nope.png"), &Rejecting);

        let failure = outcome.failure_info().unwrap();
        assert_eq!(failure.kind, FailureKind::Io);
        assert!(failure.reason.contains("io error"));
    }

    #[test]
    fn test_service_error_is_service_failure() {
        let temp_dir = TempDir::new().unwrap();
        let outcome = process(input_file(&temp_dir), &Rejecting);

        let failure = outcome.failure_info().unwrap();
        assert_eq!(failure.kind, FailureKind::Service);
        assert!(failure.reason.contains("model rejected the input"));
    }

    #[test]
    fn test_garbage_output_is_decode_failure() {
        let temp_dir = TempDir::new().unwrap();
        let service = FixedOutput(b"not a png".to_vec());
        let outcome = process(input_file(&temp_dir), &service);

        assert_eq!(outcome.failure_info().unwrap().kind, FailureKind::Decode);
        assert!(outcome.result().is_none());
    }

    #[test]
    fn test_pipeline_struct_and_in_memory_source() {
        let bitmap = RgbaImage::from_pixel(3, 3, Rgba([0, 0, 0, 128]));
        let service: Arc<dyn BackgroundRemover> =
            Arc::new(FixedOutput(ImageCodec::encode_rgba_png(&bitmap).unwrap()));
        let pipeline = ProcessingPipeline::new(Arc::clone(&service));

        let source = SourceImage::from_bytes("memory.png", vec![1, 2, 3]);
        let outcome = process_source(&source, pipeline.service().as_ref());
        assert!(outcome.is_success());
        assert!(pipeline.process("/definitely/missing.png").failure_info().is_some());
    }
}
