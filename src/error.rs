//! Error types for the webpage2pdf library.
//!
//! Three error types reflect three failure scopes:
//!
//! * [`Web2PdfError`] (**Fatal**): the run cannot start or the caller asked
//!   for a strict result (bad URL in the input, missing renderer, unusable
//!   output directory). Returned as `Err(Web2PdfError)` from the `convert*`
//!   entry points.
//!
//! * [`JobError`] (**Per job**): one page failed to render (non-zero exit,
//!   timeout, empty output). Stored inside [`crate::output::FailedJob`]; the
//!   other jobs keep running.
//!
//! * [`MergeError`] (**Per run, after rendering**): the ordered merge of the
//!   rendered pages failed. Stored in [`crate::output::RunReport`] next to
//!   the per-job outcomes, which stay valid.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the webpage2pdf library.
///
/// Per-job failures use [`JobError`] and merge failures use [`MergeError`];
/// neither is propagated here unless the caller asks for it through
/// [`crate::output::RunReport::into_result`].
#[derive(Debug, Error)]
pub enum Web2PdfError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// A URL failed validation; no job of the session was started.
    #[error("Invalid job #{index} ('{url}'): {reason}")]
    InvalidJob {
        index: usize,
        url: String,
        reason: String,
    },

    /// The input contained no usable URL.
    #[error("No URLs found in the input ({dropped} malformed or empty rows dropped)")]
    NoUrls { dropped: usize },

    /// The URL list file does not exist.
    #[error("URL list not found: '{path}'\nCheck the path exists and is readable.")]
    InputNotFound { path: PathBuf },

    /// The URL list file exists but could not be read as CSV.
    #[error("Failed to read URL list '{path}': {detail}")]
    InputRead { path: PathBuf, detail: String },

    // ── Renderer errors ───────────────────────────────────────────────────
    /// The renderer executable is missing.
    #[error(
        "Renderer executable not found: '{path}'\n\
Install wkhtmltopdf or point --renderer / WEB2PDF_RENDERER at the binary."
    )]
    RendererNotFound { path: PathBuf },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create the output directory or write an output file.
    #[error("Failed to write output '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The merged document could not be produced.
    ///
    /// Returned by [`crate::output::RunReport::into_result`].
    #[error("Merge failed: {0}")]
    MergeFailed(#[from] MergeError),

    /// Every job ended without a rendered page.
    ///
    /// Returned by [`crate::output::RunReport::into_result`].
    #[error("None of the {total} pages were converted.\nFirst error: {first_error}")]
    AllJobsFailed { total: usize, first_error: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single job.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum JobError {
    /// The renderer exited with a non-zero status (`None` when killed by a signal).
    #[error("renderer exited with {}: {stderr_tail}", exit_label(.exit_code))]
    RenderFailed {
        exit_code: Option<i32>,
        stderr_tail: String,
    },

    /// The renderer did not finish before its deadline and was terminated.
    #[error("renderer timed out after {secs}s")]
    RenderTimeout { secs: u64 },

    /// The renderer exited cleanly but produced no output.
    #[error("renderer produced no output at '{path}'")]
    EmptyOutput { path: PathBuf },

    /// The renderer process could not be started.
    #[error("failed to start renderer: {detail}")]
    SpawnFailed { detail: String },
}

impl JobError {
    /// Short machine-friendly label used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::RenderFailed { .. } => "render_failed",
            JobError::RenderTimeout { .. } => "timeout",
            JobError::EmptyOutput { .. } => "empty_output",
            JobError::SpawnFailed { .. } => "spawn_failed",
        }
    }
}

fn exit_label(code: &Option<i32>) -> String {
    match *code {
        Some(c) => format!("code {c}"),
        None => "a signal".to_string(),
    }
}

/// Failure of the ordered merge step.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum MergeError {
    /// No job succeeded, so there was nothing to merge.
    #[error("no pages were rendered; nothing to merge")]
    NoPages,

    /// One of the rendered pages could not be parsed as PDF.
    #[error("cannot load '{path}': {detail}")]
    Load { path: PathBuf, detail: String },

    /// The inputs parsed but lack the objects needed to build a document.
    #[error("malformed page tree: {0}")]
    Structure(String),

    /// The merged document could not be written.
    #[error("cannot write '{path}': {detail}")]
    Write { path: PathBuf, detail: String },
}
