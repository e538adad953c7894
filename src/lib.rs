//! # webpage2pdf
//!
//! Convert lists of web pages to PDF by driving an external
//! wkhtmltopdf-compatible renderer, producing one merged document or one file
//! per page.
//!
//! ## Run Overview
//!
//! ```text
//! URL list
//!  │
//!  ├─ 1. Session    validate every URL up front; one job per URL
//!  ├─ 2. Schedule   at most N renderer processes at once, in index order
//!  ├─ 3. Render     child process per job, with deadline and cancellation
//!  ├─ 4. Observe    one consumer updates jobs, progress/ETA, log, callback
//!  └─ 5. Aggregate  merge in input order, or move files into a directory
//! ```
//!
//! A failing page never stops the run: it is recorded in the
//! [`RunReport`] and the remaining pages carry on. Cancellation (via
//! [`CancelHandle`]) stops new dispatches, terminates in-flight renderers
//! and still assembles whatever finished.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use webpage2pdf::{convert_csv, ConversionOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = ConversionOptions::builder()
//!         .concurrency(4)
//!         .merged_output("merged_output.pdf")
//!         .build()?;
//!     let report = convert_csv("urls.csv", &options).await?;
//!     eprintln!("{} ok, {} failed", report.succeeded.len(), report.failed.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `web2pdf` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! webpage2pdf = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod job;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod scheduler;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ConversionOptions, ConversionOptionsBuilder, Margins, Orientation, OutputMode, PageSize,
};
pub use convert::{convert, convert_csv, convert_sync, run_session};
pub use error::{JobError, MergeError, Web2PdfError};
pub use job::{ConversionJob, JobSpec, JobStatus, RenderOutcome};
pub use output::{FailedJob, OutputLocation, RunReport, RunStats, SavedFile, UnsavedFile};
pub use pipeline::merge::{LopdfMerger, MergeStats, PdfMerger};
pub use pipeline::render::{PageRenderer, RenderRequest, WkhtmltopdfRenderer};
pub use progress::{
    ChannelProgressCallback, ConversionProgressCallback, NoopProgressCallback, ProgressCallback,
    ProgressEstimator, ProgressSnapshot,
};
pub use scheduler::{CompletionEvent, Scheduler, SchedulerEvent};
pub use session::{CancelHandle, ConversionSession};
