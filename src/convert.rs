//! Run entry points.
//!
//! [`run_session`] is the driver every other entry point ends up in. It owns
//! the session for the whole run and is the only place that mutates it:
//! scheduler events arrive one at a time through a single stream, and each
//! one updates the job, the progress estimator, the log and the progress
//! callback, in that order.

use crate::config::{ConversionOptions, OutputMode};
use crate::error::Web2PdfError;
use crate::job::RenderOutcome;
use crate::output::RunReport;
use crate::pipeline::merge::{LopdfMerger, PdfMerger};
use crate::pipeline::render::{PageRenderer, WkhtmltopdfRenderer};
use crate::pipeline::{aggregate, input};
use crate::progress::{NoopProgressCallback, ProgressCallback, ProgressEstimator};
use crate::scheduler::{CompletionEvent, Scheduler, SchedulerEvent};
use crate::session::ConversionSession;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Convert an ordered list of URLs.
///
/// This is the primary entry point for the library.
///
/// # Returns
/// `Ok(RunReport)` once every job has settled, even if some jobs failed or
/// the merge step failed (check `report.failed` and `report.merge_error`, or
/// call [`RunReport::into_result`]).
///
/// # Errors
/// Returns `Err(Web2PdfError)` only when the run cannot start:
/// - a URL is invalid ([`Web2PdfError::InvalidJob`]); nothing is rendered
/// - the list is empty
/// - the renderer executable is missing
/// - the output directory or the work directory cannot be created
///
/// # Example
/// ```rust,no_run
/// use webpage2pdf::{convert, ConversionOptions};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let options = ConversionOptions::builder().merged_output("docs.pdf").build()?;
/// let report = convert(["https://www.rust-lang.org", "https://docs.rs"], &options).await?;
/// println!("{} of {} pages converted", report.succeeded.len(), report.stats.total_jobs);
/// # Ok(())
/// # }
/// ```
pub async fn convert<I, S>(urls: I, options: &ConversionOptions) -> Result<RunReport, Web2PdfError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let session = ConversionSession::new(urls, options.clone())?;
    run_session(session).await
}

/// Convert every URL listed in a CSV or text file (first field of each row).
///
/// Rows that are empty or not URLs are dropped and counted in
/// `report.stats.dropped_rows`.
pub async fn convert_csv(
    path: impl AsRef<Path>,
    options: &ConversionOptions,
) -> Result<RunReport, Web2PdfError> {
    let list = input::read_url_list(path).await?;
    let session =
        ConversionSession::new(list.urls, options.clone())?.with_dropped_rows(list.dropped);
    run_session(session).await
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync<I, S>(urls: I, options: &ConversionOptions) -> Result<RunReport, Web2PdfError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    tokio::runtime::Runtime::new()
        .map_err(|e| Web2PdfError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(urls, options))
}

/// Drive a prepared session to completion.
///
/// Use this instead of [`convert`] when you need the session's
/// [`crate::CancelHandle`] before the run starts (e.g. to wire it to Ctrl-C).
pub async fn run_session(mut session: ConversionSession) -> Result<RunReport, Web2PdfError> {
    let options = Arc::new(session.options().clone());
    let renderer = resolve_renderer(&options)?;
    let merger: Arc<dyn PdfMerger> = match &options.merger {
        Some(m) => Arc::clone(m),
        None => Arc::new(LopdfMerger),
    };
    let callback: ProgressCallback = match &options.progress_callback {
        Some(cb) => Arc::clone(cb),
        None => Arc::new(NoopProgressCallback),
    };

    if let OutputMode::Separate { directory } = &options.mode {
        tokio::fs::create_dir_all(directory)
            .await
            .map_err(|e| Web2PdfError::OutputWriteFailed {
                path: directory.clone(),
                source: e,
            })?;
    }
    // Intermediate PDFs live here until aggregation; removed on drop.
    let work_dir = create_work_dir(&options)?;
    debug!("work directory: {}", work_dir.path().display());

    session.restart_clock();
    let total = session.len();
    info!(
        jobs = total,
        concurrency = options.concurrency,
        mode = options.mode.label(),
        renderer = renderer.name(),
        "run started"
    );
    callback.on_run_start(total);

    let cancel = session.cancel_handle();
    let scheduler = Scheduler::new(
        renderer,
        Arc::clone(&options),
        work_dir.path(),
        cancel.clone(),
    );
    let mut events = scheduler.run(session.job_specs());
    let mut estimator = ProgressEstimator::new(total, session.started_at());
    let mut cancel_seen = false;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled(), if !cancel_seen => {
                cancel_seen = true;
                info!(
                    completed = estimator.completed(),
                    total,
                    "cancel requested, draining in-flight jobs"
                );
                callback.on_cancel_requested();
            }
            event = events.next() => match event {
                Some(SchedulerEvent::Started { index, url, at }) => {
                    session.mark_started(index, at);
                    debug!(index, url = %url, "job started");
                    callback.on_job_start(index, &url);
                }
                Some(SchedulerEvent::Finished(event)) => {
                    session.mark_finished(event.index, event.outcome.clone(), event.finished_at);
                    let snapshot = estimator.record_at(event.finished_at);
                    log_completion(&event);
                    callback.on_job_complete(&event, &snapshot);
                }
                None => break,
            }
        }
    }

    let report = aggregate::finalize(&session, merger).await;
    if let Err(e) = work_dir.close() {
        warn!("could not remove work directory: {e}");
    }

    info!(
        succeeded = report.succeeded.len(),
        failed = report.failed.len(),
        cancelled = report.cancelled.len(),
        was_cancelled = report.was_cancelled,
        duration_ms = report.stats.total_duration_ms,
        "run complete"
    );
    callback.on_run_complete(&report);
    Ok(report)
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn log_completion(event: &CompletionEvent) {
    let duration_ms = event
        .started_at
        .map(|s| event.finished_at.saturating_duration_since(s).as_millis() as u64)
        .unwrap_or(0);
    match &event.outcome {
        RenderOutcome::Succeeded { bytes, .. } => info!(
            index = event.index,
            url = %event.url,
            outcome = "succeeded",
            duration_ms,
            bytes,
            "job finished"
        ),
        RenderOutcome::Failed(e) => warn!(
            index = event.index,
            url = %event.url,
            outcome = e.kind(),
            duration_ms,
            error = %e,
            "job failed"
        ),
        RenderOutcome::Cancelled => info!(
            index = event.index,
            url = %event.url,
            outcome = "cancelled",
            duration_ms,
            dispatched = event.dispatched,
            "job cancelled"
        ),
    }
}

/// Resolve the renderer, most specific first.
///
/// 1. **Injected renderer** (`options.renderer`), used as-is.
/// 2. **Executable path** (`options.renderer_path`). A bare program name
///    such as `wkhtmltopdf` is looked up on `PATH`.
fn resolve_renderer(options: &ConversionOptions) -> Result<Arc<dyn PageRenderer>, Web2PdfError> {
    if let Some(ref renderer) = options.renderer {
        return Ok(Arc::clone(renderer));
    }
    let executable = locate_executable(&options.renderer_path).ok_or_else(|| {
        Web2PdfError::RendererNotFound {
            path: options.renderer_path.clone(),
        }
    })?;
    debug!("renderer executable: {}", executable.display());
    Ok(Arc::new(WkhtmltopdfRenderer::new(executable)))
}

fn locate_executable(path: &Path) -> Option<PathBuf> {
    if path.is_file() {
        return Some(path.to_path_buf());
    }
    if path.components().count() != 1 {
        return None;
    }
    let search = std::env::var_os("PATH")?;
    std::env::split_paths(&search).find_map(|dir| {
        let candidate = dir.join(path);
        if candidate.is_file() {
            return Some(candidate);
        }
        if cfg!(windows) {
            let exe = candidate.with_extension("exe");
            if exe.is_file() {
                return Some(exe);
            }
        }
        None
    })
}

fn create_work_dir(options: &ConversionOptions) -> Result<TempDir, Web2PdfError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("web2pdf-");
    let created = match &options.temp_dir {
        Some(parent) => builder.tempdir_in(parent),
        None => builder.tempdir(),
    };
    created.map_err(|e| Web2PdfError::OutputWriteFailed {
        path: options
            .temp_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir),
        source: e,
    })
}
