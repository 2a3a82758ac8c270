//! PNG export of session results

mod common;

use alphacut::{CutoutError, ImageCodec, Session, TaskRunner};
use common::{alpha_ramp, write_subject_image, ColorKeyRemover, FixedOutput};
use image::ColorType;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn run_session(
    service: Arc<dyn alphacut::BackgroundRemover>,
    temp_dir: &TempDir,
) -> Rc<RefCell<Session>> {
    let input = write_subject_image(temp_dir.path(), "in.png", 32, 24);
    let mut runner = TaskRunner::new(service).unwrap();
    let session = Rc::new(RefCell::new(Session::new()));
    let id = Session::submit(&session, &mut runner, input);
    assert!(runner.wait_for(id, Some(Duration::from_secs(30))));
    session
}

#[test]
fn test_exported_png_keeps_alpha() {
    let temp_dir = TempDir::new().unwrap();
    let bitmap = alpha_ramp(13, 7);
    let session = run_session(Arc::new(FixedOutput::png(&bitmap)), &temp_dir);

    let out = temp_dir.path().join("exports").join("cutout.png");
    session.borrow().export_png(&out).unwrap();

    let written = image::open(&out).unwrap();
    assert_eq!(written.color(), ColorType::Rgba8);
    let written = written.to_rgba8();
    assert_eq!(written, bitmap);

    let session = session.borrow();
    let mask = session.current().unwrap().mask();
    for (x, y, pixel) in written.enumerate_pixels() {
        assert_eq!(pixel.0[3], mask.get_pixel(x, y).0[0]);
    }
}

#[test]
fn test_exported_mask_is_grayscale() {
    let temp_dir = TempDir::new().unwrap();
    let session = run_session(Arc::new(ColorKeyRemover::default()), &temp_dir);

    let out = temp_dir.path().join("mask.png");
    session.borrow().export_mask_png(&out).unwrap();

    let bytes = std::fs::read(&out).unwrap();
    let written = ImageCodec::decode(&bytes).unwrap();
    assert_eq!(written.color(), ColorType::L8);

    let written = written.to_luma8();
    let session = session.borrow();
    assert_eq!(&written, session.current().unwrap().mask());
    assert_eq!(written.get_pixel(16, 12).0[0], 255);
    assert_eq!(written.get_pixel(0, 0).0[0], 0);
}

#[test]
fn test_export_before_any_result() {
    let temp_dir = TempDir::new().unwrap();
    let session = Session::new();
    let out = temp_dir.path().join("cutout.png");

    assert!(matches!(session.export_png(&out), Err(CutoutError::NothingToExport)));
    assert!(!out.exists());
}
