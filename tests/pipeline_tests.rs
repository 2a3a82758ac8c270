//! End-to-end pipeline runs against fake removal services

mod common;

use alphacut::{
    extract_alpha, process, process_source, FailureKind, ProcessingOutcome, ProcessingPipeline,
    SourceImage,
};
use common::{alpha_ramp, write_subject_image, ColorKeyRemover, FailingRemover, FixedOutput};
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn test_mask_equals_alpha_channel() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_subject_image(temp_dir.path(), "in.png", 8, 8);
    let bitmap = alpha_ramp(17, 9);

    let result = process(&input, &FixedOutput::png(&bitmap))
        .into_result()
        .unwrap();

    assert_eq!(result.dimensions(), (17, 9));
    assert_eq!(result.bitmap(), &bitmap);
    for (x, y, pixel) in result.bitmap().enumerate_pixels() {
        assert_eq!(result.mask().get_pixel(x, y).0[0], pixel.0[3]);
    }
    assert_eq!(result.mask(), &extract_alpha(&bitmap));
}

#[test]
fn test_jpeg_input_end_to_end() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_subject_image(temp_dir.path(), "portrait.jpg", 400, 300);
    let service = ColorKeyRemover::default();

    let result = process(&input, &service).into_result().unwrap();

    assert_eq!(result.dimensions(), (400, 300));
    assert_eq!(service.calls(), 1);
    // Centre of the dark square is kept, the corner is cut away
    assert_eq!(result.mask().get_pixel(200, 150).0[0], 255);
    assert_eq!(result.mask().get_pixel(5, 5).0[0], 0);

    let stats = result.mask_statistics();
    assert_eq!(stats.total_pixels, 400 * 300);
    assert!(stats.foreground_ratio > 0.05 && stats.foreground_ratio < 0.2);
}

#[test]
fn test_missing_file_is_io_failure() {
    let temp_dir = TempDir::new().unwrap();
    let service = ColorKeyRemover::default();

    let outcome = process(temp_dir.path().join("missing.png"), &service);

    let failure = outcome.failure_info().unwrap();
    assert_eq!(failure.kind, FailureKind::Io);
    assert!(failure.reason.contains("io error"));
    assert!(failure.reason.contains("missing.png"));
    assert_eq!(service.calls(), 0);
}

#[test]
fn test_service_error_is_service_failure() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_subject_image(temp_dir.path(), "in.png", 4, 4);

    let outcome = process(&input, &FailingRemover("model unavailable"));

    let failure = outcome.failure_info().unwrap();
    assert_eq!(failure.kind, FailureKind::Service);
    assert!(failure.reason.contains("model unavailable"));
}

#[test]
fn test_undecodable_output_is_decode_failure() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_subject_image(temp_dir.path(), "in.png", 4, 4);

    let outcome = process(&input, &FixedOutput(b"definitely not an image".to_vec()));
    assert_eq!(outcome.failure_info().unwrap().kind, FailureKind::Decode);

    let outcome = process(&input, &FixedOutput(Vec::new()));
    assert_eq!(outcome.failure_info().unwrap().kind, FailureKind::Decode);
}

#[test]
fn test_input_bytes_reach_service_unchanged() {
    // The pipeline does not validate input; garbage goes to the service
    let temp_dir = TempDir::new().unwrap();
    let input = temp_dir.path().join("garbage.png");
    std::fs::write(&input, b"garbage").unwrap();

    let outcome = process(&input, &ColorKeyRemover::default());
    let failure = outcome.failure_info().unwrap();
    assert_eq!(failure.kind, FailureKind::Service);
}

#[test]
fn test_repeated_runs_are_identical() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_subject_image(temp_dir.path(), "in.png", 30, 20);
    let pipeline = ProcessingPipeline::new(Arc::new(ColorKeyRemover::default()));

    let first = pipeline.process(&input).into_result().unwrap();
    let second = pipeline.process(&input).into_result().unwrap();

    assert_eq!(first.bitmap(), second.bitmap());
    assert_eq!(first.mask(), second.mask());
}

#[test]
fn test_process_source_in_memory() {
    let temp_dir = TempDir::new().unwrap();
    let input = write_subject_image(temp_dir.path(), "in.png", 12, 12);
    let source = SourceImage::read(&input).unwrap();

    match process_source(&source, &ColorKeyRemover::default()) {
        ProcessingOutcome::Success(result) => assert_eq!(result.dimensions(), (12, 12)),
        ProcessingOutcome::Failure(failure) => panic!("unexpected failure: {failure}"),
    }
}
