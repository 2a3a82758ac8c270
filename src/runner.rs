//! Background task runner
//!
//! [`TaskRunner`] executes pipeline runs off the UI thread and hands their
//! outcomes back to it. Work runs on tokio's blocking pool; completions come
//! back over a channel that only the owning (UI) thread drains. Callbacks
//! never leave that thread, so they need not be `Send` and may capture UI
//! state such as `Rc<RefCell<_>>`.
//!
//! ```no_run
//! use alphacut::{ModelRemovalService, RemovalConfig, TaskRunner};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # fn main() -> alphacut::Result<()> {
//! let service = Arc::new(ModelRemovalService::new(RemovalConfig::default())?);
//! let mut runner = TaskRunner::new(service)?;
//!
//! let id = runner.submit("photo.jpg", |outcome| {
//!     println!("success: {}", outcome.is_success());
//! });
//!
//! // UI event loop: drain completions between frames
//! while runner.in_flight() > 0 {
//!     runner.wait_for(id, Some(Duration::from_millis(16)));
//! }
//! # Ok(())
//! # }
//! ```

use crate::{
    error::{CutoutError, Result},
    pipeline::ProcessingPipeline,
    services::BackgroundRemover,
    types::{FailureKind, ProcessingOutcome},
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::{Handle, Runtime};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::Instrument;

/// Identifies one submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubmissionId(u64);

impl SubmissionId {
    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

type Completion = Box<dyn FnOnce(ProcessingOutcome)>;

/// Runs pipeline invocations in the background and delivers their outcomes
/// on the thread that owns the runner
pub struct TaskRunner {
    pipeline: ProcessingPipeline,
    handle: Handle,
    runtime: Option<Runtime>,
    service_timeout: Option<Duration>,
    sender: UnboundedSender<(SubmissionId, ProcessingOutcome)>,
    receiver: UnboundedReceiver<(SubmissionId, ProcessingOutcome)>,
    pending: HashMap<SubmissionId, Completion>,
    next_id: u64,
}

impl std::fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRunner")
            .field("owns_runtime", &self.runtime.is_some())
            .field("service_timeout", &self.service_timeout)
            .field("in_flight", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl TaskRunner {
    /// Create a runner with its own tokio runtime
    ///
    /// # Errors
    /// - Failed to start the runtime
    pub fn new(service: Arc<dyn BackgroundRemover>) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("alphacut-runner")
            .enable_time()
            .build()
            .map_err(|e| CutoutError::internal(format!("failed to start task runtime: {e}")))?;
        let handle = runtime.handle().clone();
        Ok(Self::build(service, handle, Some(runtime)))
    }

    /// Create a runner on an existing runtime
    ///
    /// The blocking waits ([`TaskRunner::wait_for`], [`TaskRunner::wait_any`])
    /// must not be called from inside that runtime's async context.
    #[must_use]
    pub fn with_handle(service: Arc<dyn BackgroundRemover>, handle: Handle) -> Self {
        Self::build(service, handle, None)
    }

    fn build(service: Arc<dyn BackgroundRemover>, handle: Handle, runtime: Option<Runtime>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            pipeline: ProcessingPipeline::new(service),
            handle,
            runtime,
            service_timeout: None,
            sender,
            receiver,
            pending: HashMap::new(),
            next_id: 1,
        }
    }

    /// Deliver a timeout failure when a run takes longer than `timeout`
    ///
    /// The blocking call itself cannot be interrupted; its late result is
    /// discarded.
    #[must_use]
    pub fn with_service_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.service_timeout = timeout;
        self
    }

    /// Start processing `path` in the background
    ///
    /// Returns immediately. `on_complete` runs exactly once, on the thread
    /// that drains the runner ([`TaskRunner::poll`] or one of the waits),
    /// after this call returned and after the run finished.
    pub fn submit<P, F>(&mut self, path: P, on_complete: F) -> SubmissionId
    where
        P: Into<PathBuf>,
        F: FnOnce(ProcessingOutcome) + 'static,
    {
        let id = SubmissionId(self.next_id);
        self.next_id += 1;
        self.pending.insert(id, Box::new(on_complete));

        let path = path.into();
        let pipeline = self.pipeline.clone();
        let sender = self.sender.clone();
        let timeout = self.service_timeout;
        let span = tracing::info_span!("submission", id = %id, path = %path.display());

        tracing::debug!(parent: &span, "submitted");
        self.handle.spawn(
            async move {
                let outcome = execute(pipeline, path, timeout).await;
                if sender.send((id, outcome)).is_err() {
                    tracing::debug!("runner dropped, completion discarded");
                }
            }
            .instrument(span),
        );
        id
    }

    /// Number of submissions whose callback has not run yet
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_pending(&self, id: SubmissionId) -> bool {
        self.pending.contains_key(&id)
    }

    /// Run the callbacks of every finished submission without blocking
    ///
    /// Returns the number of callbacks invoked.
    pub fn poll(&mut self) -> usize {
        let mut delivered = 0;
        while let Ok((id, outcome)) = self.receiver.try_recv() {
            if self.deliver(id, outcome) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Block until `id` has been delivered or `timeout` elapses
    ///
    /// Other completions arriving meanwhile are delivered too. Returns whether
    /// the callback of `id` has run.
    pub fn wait_for(&mut self, id: SubmissionId, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        self.poll();
        while self.is_pending(id) {
            match self.recv_blocking(deadline) {
                Some((done, outcome)) => {
                    self.deliver(done, outcome);
                },
                None => break,
            }
        }
        !self.is_pending(id)
    }

    /// Block until any submission completes or `timeout` elapses
    ///
    /// Returns the id whose callback ran, or `None` when nothing is in flight
    /// or the timeout elapsed.
    pub fn wait_any(&mut self, timeout: Option<Duration>) -> Option<SubmissionId> {
        let deadline = timeout.map(|t| Instant::now() + t);
        while !self.pending.is_empty() {
            let (id, outcome) = match self.receiver.try_recv() {
                Ok(message) => message,
                Err(_) => self.recv_blocking(deadline)?,
            };
            if self.deliver(id, outcome) {
                return Some(id);
            }
        }
        None
    }

    /// Block until every in-flight submission is delivered or `timeout` elapses
    ///
    /// Returns whether nothing is left in flight.
    pub fn wait_all(&mut self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        self.poll();
        while !self.pending.is_empty() {
            match self.recv_blocking(deadline) {
                Some((id, outcome)) => {
                    self.deliver(id, outcome);
                },
                None => break,
            }
        }
        self.pending.is_empty()
    }

    fn recv_blocking(
        &mut self,
        deadline: Option<Instant>,
    ) -> Option<(SubmissionId, ProcessingOutcome)> {
        let receiver = &mut self.receiver;
        match deadline {
            None => self.handle.block_on(receiver.recv()),
            Some(deadline) => self.handle.block_on(async {
                tokio::time::timeout_at(tokio::time::Instant::from_std(deadline), receiver.recv())
                    .await
                    .ok()
                    .flatten()
            }),
        }
    }

    fn deliver(&mut self, id: SubmissionId, outcome: ProcessingOutcome) -> bool {
        match self.pending.remove(&id) {
            Some(on_complete) => {
                tracing::debug!(id = %id, success = outcome.is_success(), "delivering completion");
                on_complete(outcome);
                true
            },
            None => {
                tracing::warn!(id = %id, "completion for unknown submission dropped");
                false
            },
        }
    }
}

impl Drop for TaskRunner {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            tracing::debug!(
                in_flight = self.pending.len(),
                "task runner dropped with undelivered completions"
            );
        }
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

async fn execute(
    pipeline: ProcessingPipeline,
    path: PathBuf,
    timeout: Option<Duration>,
) -> ProcessingOutcome {
    let span = tracing::Span::current();
    let task = tokio::task::spawn_blocking(move || {
        let _entered = span.enter();
        pipeline.process(&path)
    });

    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, task).await {
            Ok(joined) => joined,
            Err(_) => {
                tracing::warn!(timeout_ms = limit.as_millis() as u64, "background removal timed out");
                return ProcessingOutcome::failure(
                    FailureKind::Timeout,
                    format!(
                        "background removal did not finish within {}ms",
                        limit.as_millis()
                    ),
                );
            },
        },
        None => task.await,
    };

    match joined {
        Ok(outcome) => outcome,
        Err(e) if e.is_panic() => {
            let message = panic_message(e.into_panic());
            tracing::error!(panic = %message, "processing panicked");
            ProcessingOutcome::failure(
                FailureKind::Internal,
                format!("internal error: processing panicked: {message}"),
            )
        },
        Err(e) => ProcessingOutcome::failure(
            FailureKind::Internal,
            format!("internal error: processing task failed: {e}"),
        ),
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
