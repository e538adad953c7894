//! One run over a fixed URL list: the jobs, the options and the cancel flag.

use crate::config::ConversionOptions;
use crate::error::Web2PdfError;
use crate::job::{ConversionJob, JobSpec, JobStatus, RenderOutcome};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Cooperative cancellation shared by the caller, the scheduler and every
/// in-flight renderer invocation.
///
/// The flag moves `false → true` at most once. The token wakes tasks that
/// are waiting on a child process.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    requested: Arc<AtomicBool>,
    token: CancellationToken,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Returns `true` only for the call that flipped the flag.
    pub fn cancel(&self) -> bool {
        let first = self
            .requested
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if first {
            self.token.cancel();
        }
        first
    }

    pub fn is_cancelled(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

/// One end-to-end run.
///
/// Created from a validated URL list; only the run driver mutates it, one
/// event at a time.
#[derive(Debug)]
pub struct ConversionSession {
    jobs: Vec<ConversionJob>,
    options: ConversionOptions,
    cancel: CancelHandle,
    started_at: Instant,
    dropped_rows: usize,
}

impl ConversionSession {
    /// Build one job per URL, in order. Any invalid URL rejects the whole session.
    pub fn new<I, S>(urls: I, options: ConversionOptions) -> Result<Self, Web2PdfError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let jobs = urls
            .into_iter()
            .enumerate()
            .map(|(i, url)| ConversionJob::new(i, url))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_jobs(jobs, options)
    }

    /// Adopt pre-built jobs. Indices must be unique and contiguous from 0.
    pub fn from_jobs(
        mut jobs: Vec<ConversionJob>,
        options: ConversionOptions,
    ) -> Result<Self, Web2PdfError> {
        if jobs.is_empty() {
            return Err(Web2PdfError::NoUrls { dropped: 0 });
        }
        jobs.sort_by_key(|j| j.index());
        for (expected, job) in jobs.iter().enumerate() {
            if job.index() != expected {
                let reason = if job.index() < expected {
                    "duplicate index".to_string()
                } else {
                    format!("index gap: expected {expected}")
                };
                return Err(Web2PdfError::InvalidJob {
                    index: job.index(),
                    url: job.url().to_string(),
                    reason,
                });
            }
            if job.status() != JobStatus::Pending {
                return Err(Web2PdfError::InvalidJob {
                    index: job.index(),
                    url: job.url().to_string(),
                    reason: format!("job is already {:?}", job.status()),
                });
            }
        }
        Ok(Self {
            jobs,
            options,
            cancel: CancelHandle::new(),
            started_at: Instant::now(),
            dropped_rows: 0,
        })
    }

    /// Record how many input rows were dropped before the session was built.
    pub fn with_dropped_rows(mut self, dropped: usize) -> Self {
        self.dropped_rows = dropped;
        self
    }

    /// Share an existing cancel handle (e.g. one wired to Ctrl-C).
    pub fn with_cancel_handle(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn jobs(&self) -> &[ConversionJob] {
        &self.jobs
    }

    pub fn job(&self, index: usize) -> Option<&ConversionJob> {
        self.jobs.get(index)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn options(&self) -> &ConversionOptions {
        &self.options
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn dropped_rows(&self) -> usize {
        self.dropped_rows
    }

    /// Every job has reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.jobs.iter().all(|j| j.status().is_terminal())
    }

    pub fn count(&self, status: JobStatus) -> usize {
        self.jobs.iter().filter(|j| j.status() == status).count()
    }

    pub(crate) fn job_specs(&self) -> Vec<JobSpec> {
        self.jobs.iter().map(ConversionJob::spec).collect()
    }

    pub(crate) fn restart_clock(&mut self) {
        self.started_at = Instant::now();
    }

    pub(crate) fn mark_started(&mut self, index: usize, at: Instant) {
        match self.jobs.get_mut(index) {
            Some(job) => {
                if !job.start(at) {
                    warn!(index, status = ?job.status(), "ignoring start of a job that is not pending");
                }
            }
            None => warn!(index, "start event for unknown job"),
        }
    }

    pub(crate) fn mark_finished(&mut self, index: usize, outcome: RenderOutcome, at: Instant) {
        match self.jobs.get_mut(index) {
            Some(job) => {
                let from = job.status();
                if !job.finish(outcome, at) {
                    warn!(index, status = ?from, "ignoring backward status transition");
                }
            }
            None => warn!(index, "finish event for unknown job"),
        }
    }
}
