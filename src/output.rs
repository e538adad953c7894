//! Report types produced by one conversion run.

use crate::error::{JobError, MergeError, Web2PdfError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The single result of a run.
///
/// `succeeded`, `failed` and `cancelled` partition the session's jobs: every
/// index appears in exactly one of them, and each list is sorted ascending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub succeeded: Vec<usize>,
    pub failed: Vec<FailedJob>,
    pub cancelled: Vec<usize>,

    /// Where the results were written. `None` when nothing was produced
    /// (merged mode with a merge error).
    pub output: Option<OutputLocation>,

    /// Set when the merge step was skipped or failed.
    pub merge_error: Option<MergeError>,

    /// Whether cancellation was requested during the run.
    pub was_cancelled: bool,

    pub stats: RunStats,
}

/// A job that ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedJob {
    pub index: usize,
    pub url: String,
    pub error: JobError,
}

/// Final location of the run's artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputLocation {
    /// One merged document.
    MergedFile(PathBuf),
    /// One document per succeeded job.
    Directory {
        path: PathBuf,
        files: Vec<SavedFile>,
        /// Succeeded jobs whose artifact could not be placed in `path`.
        unsaved: Vec<UnsavedFile>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedFile {
    pub index: usize,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsavedFile {
    pub index: usize,
    pub reason: String,
}

/// Run-level counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunStats {
    pub total_jobs: usize,
    /// Input rows dropped before the run (empty or malformed).
    pub dropped_rows: usize,
    pub total_duration_ms: u64,
    /// Time spent merging or moving files after the last job settled.
    pub merge_duration_ms: u64,
}

impl RunReport {
    /// Pretty-printed JSON, as printed by `web2pdf --json`.
    pub fn to_json_pretty(&self) -> Result<String, Web2PdfError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Web2PdfError::Internal(format!("report serialisation: {e}")))
    }

    /// Strict view of the report for callers that want an error when the
    /// run produced nothing usable.
    ///
    /// Returns [`Web2PdfError::AllJobsFailed`] when no job succeeded and the
    /// run was not cancelled, and [`Web2PdfError::MergeFailed`] when the
    /// merge step failed.
    pub fn into_result(self) -> Result<RunReport, Web2PdfError> {
        if self.succeeded.is_empty() && !self.was_cancelled {
            let first_error = self
                .failed
                .first()
                .map(|f| format!("#{} {}: {}", f.index, f.url, f.error))
                .unwrap_or_else(|| "Unknown error".to_string());
            return Err(Web2PdfError::AllJobsFailed {
                total: self.stats.total_jobs,
                first_error,
            });
        }
        if let Some(e) = self.merge_error {
            return Err(Web2PdfError::MergeFailed(e));
        }
        Ok(self)
    }

    /// True when at least one page was written to its final location.
    pub fn has_output(&self) -> bool {
        match &self.output {
            Some(OutputLocation::MergedFile(_)) => true,
            Some(OutputLocation::Directory { files, .. }) => !files.is_empty(),
            None => false,
        }
    }
}
