//! Result aggregation: turn a settled session into its final artifacts and report.
//!
//! Runs once, after the scheduler's stream has ended, so every job is
//! terminal. Output order is always ascending job index, independent of the
//! order in which renders completed.

use crate::config::OutputMode;
use crate::error::{JobError, MergeError};
use crate::job::{ConversionJob, JobStatus};
use crate::output::{FailedJob, OutputLocation, RunReport, RunStats, SavedFile, UnsavedFile};
use crate::pipeline::merge::PdfMerger;
use crate::session::ConversionSession;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9]+").expect("valid regex"));

const MAX_SLUG_CHARS: usize = 60;

/// Produce the merged document or the per-URL files, then the run report.
pub async fn finalize(session: &ConversionSession, merger: Arc<dyn PdfMerger>) -> RunReport {
    let mut succeeded = Vec::new();
    let mut failed = Vec::new();
    let mut cancelled = Vec::new();
    for job in session.jobs() {
        match job.status() {
            JobStatus::Succeeded => succeeded.push(job.index()),
            JobStatus::Failed => failed.push(FailedJob {
                index: job.index(),
                url: job.url().to_string(),
                error: job.error().cloned().unwrap_or(JobError::SpawnFailed {
                    detail: "no error recorded".into(),
                }),
            }),
            JobStatus::Cancelled => cancelled.push(job.index()),
            status @ (JobStatus::Pending | JobStatus::Running) => {
                warn!(index = job.index(), ?status, "job not settled at aggregation, counting as cancelled");
                cancelled.push(job.index());
            }
        }
    }

    let artifacts: Vec<(usize, &str, PathBuf)> = session
        .jobs()
        .iter()
        .filter_map(|job: &ConversionJob| {
            job.output_path()
                .map(|p| (job.index(), job.url(), p.to_path_buf()))
        })
        .collect();

    let merge_start = Instant::now();
    let (output, merge_error) = match &session.options().mode {
        OutputMode::Merged { output } => {
            let inputs: Vec<PathBuf> = artifacts.into_iter().map(|(_, _, p)| p).collect();
            match merge(inputs, output.clone(), merger).await {
                Ok(()) => (Some(OutputLocation::MergedFile(output.clone())), None),
                Err(e) => {
                    warn!("merge failed: {e}");
                    (None, Some(e))
                }
            }
        }
        OutputMode::Separate { directory } => {
            let location = place_separately(&artifacts, directory).await;
            (Some(location), None)
        }
    };
    let merge_duration_ms = merge_start.elapsed().as_millis() as u64;

    RunReport {
        succeeded,
        failed,
        cancelled,
        output,
        merge_error,
        was_cancelled: session.is_cancel_requested(),
        stats: RunStats {
            total_jobs: session.len(),
            dropped_rows: session.dropped_rows(),
            total_duration_ms: session.started_at().elapsed().as_millis() as u64,
            merge_duration_ms,
        },
    }
}

async fn merge(
    inputs: Vec<PathBuf>,
    output: PathBuf,
    merger: Arc<dyn PdfMerger>,
) -> Result<(), MergeError> {
    if inputs.is_empty() {
        return Err(MergeError::NoPages);
    }
    let count = inputs.len();
    let target = output.clone();
    let stats = tokio::task::spawn_blocking(move || merger.merge(&inputs, &target))
        .await
        .map_err(|e| MergeError::Structure(format!("merge task failed: {e}")))??;
    info!(
        "merged {} documents ({} pages, {} bytes) into {}",
        count,
        stats.pages,
        stats.bytes,
        output.display()
    );
    Ok(())
}

async fn place_separately(artifacts: &[(usize, &str, PathBuf)], directory: &Path) -> OutputLocation {
    let mut files = Vec::new();
    let mut unsaved = Vec::new();

    if let Err(e) = tokio::fs::create_dir_all(directory).await {
        for (index, _, _) in artifacts {
            unsaved.push(UnsavedFile {
                index: *index,
                reason: format!("cannot create {}: {e}", directory.display()),
            });
        }
        return OutputLocation::Directory {
            path: directory.to_path_buf(),
            files,
            unsaved,
        };
    }

    for (index, url, source) in artifacts {
        let target = directory.join(separate_file_name(*index, url));
        match move_file(source, &target).await {
            Ok(()) => {
                debug!("saved #{} to {}", index, target.display());
                files.push(SavedFile {
                    index: *index,
                    path: target,
                });
            }
            Err(e) => {
                warn!(index, "could not save {}: {e}", target.display());
                unsaved.push(UnsavedFile {
                    index: *index,
                    reason: e.to_string(),
                });
            }
        }
    }
    info!(
        "saved {} of {} files to {}",
        files.len(),
        artifacts.len(),
        directory.display()
    );
    OutputLocation::Directory {
        path: directory.to_path_buf(),
        files,
        unsaved,
    }
}

/// Rename, falling back to copy + remove across file systems.
async fn move_file(source: &Path, target: &Path) -> std::io::Result<()> {
    if tokio::fs::rename(source, target).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(source, target).await?;
    if let Err(e) = tokio::fs::remove_file(source).await {
        debug!("left intermediate {} behind: {e}", source.display());
    }
    Ok(())
}

/// `page_<NNN>_<slug>.pdf`, 1-based.
pub fn separate_file_name(index: usize, url: &str) -> String {
    format!("page_{:03}_{}.pdf", index + 1, url_slug(url))
}

/// Host and path with every run of non-alphanumerics folded to `_`.
pub fn url_slug(url: &str) -> String {
    let base = match url::Url::parse(url) {
        Ok(u) => format!("{}{}", u.host_str().unwrap_or_default(), u.path()),
        Err(_) => url.to_string(),
    };
    let folded = NON_ALNUM.replace_all(&base, "_");
    let capped: String = folded.trim_matches('_').chars().take(MAX_SLUG_CHARS).collect();
    let slug = capped.trim_end_matches('_');
    if slug.is_empty() {
        "page".to_string()
    } else {
        slug.to_string()
    }
}
