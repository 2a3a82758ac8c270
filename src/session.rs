//! Headless UI state
//!
//! [`Session`] is what a presentation layer keeps between runs: the result
//! currently on display, whether a run is in progress, and the last error.
//! A failed run never replaces a good result, and a completion that was
//! superseded by a newer submission is ignored.

use crate::{
    error::{CutoutError, Result},
    runner::{SubmissionId, TaskRunner},
    types::{ProcessedResult, ProcessingFailure, ProcessingOutcome},
};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// What a completion did to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    /// The new result is now current
    Updated,
    /// The run failed; the previous result (if any) is kept
    Failed(ProcessingFailure),
    /// A newer submission exists; the outcome was discarded
    Stale,
}

/// Result ownership and busy state for one image view
#[derive(Debug, Default)]
pub struct Session {
    current: Option<ProcessedResult>,
    current_source: Option<PathBuf>,
    last_error: Option<ProcessingFailure>,
    generation: u64,
    busy_path: Option<PathBuf>,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `path` was submitted; returns its generation token
    pub fn begin<P: Into<PathBuf>>(&mut self, path: P) -> u64 {
        self.generation += 1;
        self.busy_path = Some(path.into());
        self.generation
    }

    /// Apply the outcome of the run started with generation `generation`
    pub fn complete(&mut self, generation: u64, outcome: ProcessingOutcome) -> SessionUpdate {
        if generation != self.generation {
            tracing::debug!(generation, latest = self.generation, "stale completion ignored");
            return SessionUpdate::Stale;
        }

        let source = self.busy_path.take();
        match outcome {
            ProcessingOutcome::Success(result) => {
                self.current = Some(result);
                self.current_source = source;
                self.last_error = None;
                SessionUpdate::Updated
            },
            ProcessingOutcome::Failure(failure) => {
                tracing::warn!(kind = %failure.kind, reason = %failure.reason, "keeping previous result");
                self.last_error = Some(failure.clone());
                SessionUpdate::Failed(failure)
            },
        }
    }

    /// Submit `path` through `runner` and apply the outcome when it is delivered
    pub fn submit<P: Into<PathBuf>>(
        session: &Rc<RefCell<Self>>,
        runner: &mut TaskRunner,
        path: P,
    ) -> SubmissionId {
        let path = path.into();
        let generation = session.borrow_mut().begin(path.clone());
        let target = Rc::clone(session);
        runner.submit(path, move |outcome| {
            target.borrow_mut().complete(generation, outcome);
        })
    }

    /// A run is in progress; the trigger control should be disabled
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy_path.is_some()
    }

    #[must_use]
    pub fn current(&self) -> Option<&ProcessedResult> {
        self.current.as_ref()
    }

    /// Path the current result was produced from
    #[must_use]
    pub fn current_source(&self) -> Option<&Path> {
        self.current_source.as_deref()
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&ProcessingFailure> {
        self.last_error.as_ref()
    }

    /// Write the current cutout as PNG
    ///
    /// # Errors
    /// - No result yet
    /// - Write failures
    pub fn export_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let result = self.current.as_ref().ok_or(CutoutError::NothingToExport)?;
        result.save_png(path.as_ref())?;
        tracing::info!(path = %path.as_ref().display(), "cutout exported");
        Ok(())
    }

    /// Write the current mask as grayscale PNG
    ///
    /// # Errors
    /// - No result yet
    /// - Write failures
    pub fn export_mask_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let result = self.current.as_ref().ok_or(CutoutError::NothingToExport)?;
        result.save_mask_png(path.as_ref())?;
        tracing::info!(path = %path.as_ref().display(), "mask exported");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FailureKind;
    use image::{Rgba, RgbaImage};

    fn result(alpha: u8) -> ProcessingOutcome {
        ProcessingOutcome::Success(ProcessedResult::from_bitmap(RgbaImage::from_pixel(
            2,
            2,
            Rgba([0, 0, 0, alpha]),
        )))
    }

    #[test]
    fn test_success_replaces_result() {
        let mut session = Session::new();
        let generation = session.begin("a.png");
        assert!(session.is_busy());

        assert_eq!(session.complete(generation, result(10)), SessionUpdate::Updated);
        assert!(!session.is_busy());
        assert_eq!(session.current().unwrap().mask().get_pixel(0, 0).0[0], 10);
        assert_eq!(session.current_source(), Some(Path::new("a.png")));
    }

    #[test]
    fn test_failure_keeps_previous_result() {
        let mut session = Session::new();
        let first = session.begin("a.png");
        session.complete(first, result(10));

        let second = session.begin("b.png");
        let update = session.complete(
            second,
            ProcessingOutcome::failure(FailureKind::Service, "model failed"),
        );

        assert!(matches!(update, SessionUpdate::Failed(ref f) if f.kind == FailureKind::Service));
        assert_eq!(session.current().unwrap().mask().get_pixel(0, 0).0[0], 10);
        assert_eq!(session.current_source(), Some(Path::new("a.png")));
        assert_eq!(session.last_error().unwrap().reason, "model failed");
        assert!(!session.is_busy());
    }

    #[test]
    fn test_stale_completion_is_ignored() {
        let mut session = Session::new();
        let old = session.begin("old.png");
        let new = session.begin("new.png");

        assert_eq!(session.complete(old, result(1)), SessionUpdate::Stale);
        assert!(session.current().is_none());
        assert!(session.is_busy());

        assert_eq!(session.complete(new, result(2)), SessionUpdate::Updated);
        assert_eq!(session.current_source(), Some(Path::new("new.png")));
    }

    #[test]
    fn test_export_without_result() {
        let session = Session::new();
        assert!(matches!(
            session.export_png("out.png"),
            Err(CutoutError::NothingToExport)
        ));
        assert!(matches!(
            session.export_mask_png("mask.png"),
            Err(CutoutError::NothingToExport)
        ));
    }
}
