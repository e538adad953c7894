//! Job model: one URL, its input position, and its outcome.
//!
//! A [`ConversionJob`] is created only from a URL that parses with a scheme
//! and a host; anything else is rejected with
//! [`Web2PdfError::InvalidJob`] before the session exists. Status moves
//! strictly forward (see [`JobStatus::can_advance_to`]).

use crate::error::{JobError, Web2PdfError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Allowed transitions: `Pending → Running`, `Pending → Cancelled`
    /// (never dispatched) and `Running → {Succeeded, Failed, Cancelled}`.
    pub fn can_advance_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }
}

/// Immutable part of a job handed to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub index: usize,
    pub url: String,
}

/// Result of one renderer invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    Succeeded { output_path: PathBuf, bytes: u64 },
    Failed(JobError),
    Cancelled,
}

impl RenderOutcome {
    pub fn status(&self) -> JobStatus {
        match self {
            RenderOutcome::Succeeded { .. } => JobStatus::Succeeded,
            RenderOutcome::Failed(_) => JobStatus::Failed,
            RenderOutcome::Cancelled => JobStatus::Cancelled,
        }
    }

    /// Short label used in log lines.
    pub fn label(&self) -> &'static str {
        match self {
            RenderOutcome::Succeeded { .. } => "succeeded",
            RenderOutcome::Failed(e) => e.kind(),
            RenderOutcome::Cancelled => "cancelled",
        }
    }
}

/// One URL-to-PDF task.
#[derive(Debug, Clone)]
pub struct ConversionJob {
    index: usize,
    url: String,
    status: JobStatus,
    output_path: Option<PathBuf>,
    error: Option<JobError>,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
}

impl ConversionJob {
    /// Validate `url` and create a pending job at `index`.
    pub fn new(index: usize, url: impl Into<String>) -> Result<Self, Web2PdfError> {
        let url = url.into();
        validate_url(&url).map_err(|reason| Web2PdfError::InvalidJob {
            index,
            url: url.clone(),
            reason,
        })?;
        Ok(Self {
            index,
            url,
            status: JobStatus::Pending,
            output_path: None,
            error: None,
            started_at: None,
            finished_at: None,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Intermediate artifact; `Some` only when the job succeeded.
    pub fn output_path(&self) -> Option<&Path> {
        self.output_path.as_deref()
    }

    /// Failure detail; `Some` only when the job failed.
    pub fn error(&self) -> Option<&JobError> {
        self.error.as_ref()
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<Instant> {
        self.finished_at
    }

    /// Wall time spent in the renderer; `None` for jobs that never ran.
    pub fn duration(&self) -> Option<Duration> {
        match (self.started_at, self.finished_at) {
            (Some(s), Some(f)) => Some(f.saturating_duration_since(s)),
            _ => None,
        }
    }

    pub fn spec(&self) -> JobSpec {
        JobSpec {
            index: self.index,
            url: self.url.clone(),
        }
    }

    /// `Pending → Running`. Returns `false` if the transition is not allowed.
    pub(crate) fn start(&mut self, at: Instant) -> bool {
        if !self.status.can_advance_to(JobStatus::Running) {
            return false;
        }
        self.status = JobStatus::Running;
        self.started_at = Some(at);
        true
    }

    /// Move to the terminal status carried by `outcome`.
    /// Returns `false` (and changes nothing) if the transition is not allowed.
    pub(crate) fn finish(&mut self, outcome: RenderOutcome, at: Instant) -> bool {
        let next = outcome.status();
        if !self.status.can_advance_to(next) {
            return false;
        }
        self.status = next;
        self.finished_at = Some(at);
        match outcome {
            RenderOutcome::Succeeded { output_path, .. } => self.output_path = Some(output_path),
            RenderOutcome::Failed(e) => self.error = Some(e),
            RenderOutcome::Cancelled => {}
        }
        true
    }
}

/// Check that `raw` is an absolute URL with a scheme and a host.
pub fn validate_url(raw: &str) -> Result<url::Url, String> {
    if raw.trim().is_empty() {
        return Err("URL is empty".to_string());
    }
    if raw.trim() != raw {
        return Err("URL has leading or trailing whitespace".to_string());
    }
    let parsed = url::Url::parse(raw).map_err(|e| e.to_string())?;
    if !parsed.has_host() {
        return Err(format!("URL has no host (scheme '{}')", parsed.scheme()));
    }
    Ok(parsed)
}
