//! Process invoker: run one renderer process per job.
//!
//! The [`PageRenderer`] trait is the seam between the scheduler and whatever
//! produces a PDF for a URL. [`WkhtmltopdfRenderer`] is the production
//! implementation; tests inject in-process fakes.
//!
//! A render never returns an error: every way a child process can end
//! (clean exit, non-zero exit, deadline, cancellation, failure to spawn) is
//! folded into a [`RenderOutcome`]. Whatever the outcome, a partial output
//! file is never left behind on a non-success path.

use crate::config::ConversionOptions;
use crate::error::JobError;
use crate::job::RenderOutcome;
use crate::session::CancelHandle;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Bytes of stderr kept per invocation; older output is discarded.
const MAX_STDERR_BYTES: usize = 1024 * 1024;

/// Non-empty stderr lines kept in [`JobError::RenderFailed`].
const STDERR_TAIL_LINES: usize = 5;

/// Upper bound on the stderr tail carried in an error.
const STDERR_TAIL_BYTES: usize = 1024;

/// How long to wait for the stderr reader once the child has exited.
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Everything the renderer needs to know about one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    pub index: usize,
    pub url: String,
    pub output_path: PathBuf,
}

/// File name of a job's intermediate PDF inside the run's work directory.
pub fn intermediate_file_name(index: usize) -> String {
    format!("page_{:05}.pdf", index + 1)
}

/// Produces one PDF for one URL.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Render `request.url` into `request.output_path`.
    ///
    /// Must finish (and clean up) promptly once `deadline` passes or
    /// `cancel` fires.
    async fn render(
        &self,
        request: &RenderRequest,
        options: &ConversionOptions,
        deadline: tokio::time::Instant,
        cancel: &CancelHandle,
    ) -> RenderOutcome;

    /// Name used in logs.
    fn name(&self) -> &str;
}

/// Build the renderer's argument vector.
///
/// Every option maps to its own flag and value; the URL and the output path
/// come last. Arguments are passed straight to the process, never through a
/// shell.
pub fn build_args(request: &RenderRequest, options: &ConversionOptions) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::with_capacity(14);
    args.push("--quiet".into());
    args.push("--page-size".into());
    args.push(options.page_size.as_token().into());
    args.push("--orientation".into());
    args.push(options.orientation.as_token().into());
    for (flag, value) in options.margins.sides() {
        args.push(flag.into());
        args.push(value.into());
    }
    args.push(request.url.as_str().into());
    args.push(request.output_path.as_os_str().to_owned());
    args
}

/// Drives a wkhtmltopdf-compatible executable.
#[derive(Debug, Clone)]
pub struct WkhtmltopdfRenderer {
    executable: PathBuf,
}

enum Waited {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

impl WkhtmltopdfRenderer {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }
}

#[async_trait]
impl PageRenderer for WkhtmltopdfRenderer {
    async fn render(
        &self,
        request: &RenderRequest,
        options: &ConversionOptions,
        deadline: tokio::time::Instant,
        cancel: &CancelHandle,
    ) -> RenderOutcome {
        if cancel.is_cancelled() {
            return RenderOutcome::Cancelled;
        }

        let args = build_args(request, options);
        debug!(index = request.index, ?args, "spawning {}", self.executable.display());

        let mut cmd = Command::new(&self.executable);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so wrapper scripts can be stopped with their children.
        #[cfg(unix)]
        cmd.process_group(0);
        no_window(&mut cmd);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return RenderOutcome::Failed(JobError::SpawnFailed {
                    detail: format!("{}: {e}", self.executable.display()),
                })
            }
        };

        // Read stderr in its own task so `child.wait()` can borrow the child.
        let stderr = child.stderr.take();
        let mut stderr_task = tokio::spawn(drain_tail(stderr));

        let waited = tokio::select! {
            biased;
            _ = cancel.cancelled() => Waited::Cancelled,
            _ = tokio::time::sleep_until(deadline) => Waited::TimedOut,
            status = child.wait() => Waited::Exited(status),
        };

        let outcome = match waited {
            Waited::Exited(Ok(status)) => {
                let stderr_bytes =
                    match tokio::time::timeout(STDERR_DRAIN_TIMEOUT, &mut stderr_task).await {
                        Ok(Ok(bytes)) => bytes,
                        _ => {
                            // A leftover grandchild may still hold the pipe open.
                            stderr_task.abort();
                            Vec::new()
                        }
                    };
                if status.success() {
                    check_output(&request.output_path).await
                } else {
                    RenderOutcome::Failed(JobError::RenderFailed {
                        exit_code: status.code(),
                        stderr_tail: stderr_tail(&stderr_bytes),
                    })
                }
            }
            Waited::Exited(Err(e)) => {
                stderr_task.abort();
                RenderOutcome::Failed(JobError::RenderFailed {
                    exit_code: None,
                    stderr_tail: format!("waiting for renderer failed: {e}"),
                })
            }
            Waited::TimedOut => {
                debug!(index = request.index, "deadline passed, terminating renderer");
                terminate(&mut child, options.kill_grace()).await;
                stderr_task.abort();
                RenderOutcome::Failed(JobError::RenderTimeout {
                    secs: options.render_timeout_secs,
                })
            }
            Waited::Cancelled => {
                debug!(index = request.index, "cancel requested, terminating renderer");
                terminate(&mut child, options.kill_grace()).await;
                stderr_task.abort();
                RenderOutcome::Cancelled
            }
        };

        if !matches!(outcome, RenderOutcome::Succeeded { .. }) {
            remove_partial(&request.output_path).await;
        }
        outcome
    }

    fn name(&self) -> &str {
        "wkhtmltopdf"
    }
}

/// Ask the child's process group to exit, then kill it if the child
/// outlives `grace`.
///
/// The group is always sent SIGKILL at the end, which reaches processes a
/// wrapper script left running after it exited.
async fn terminate(child: &mut Child, grace: Duration) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            let group = pid as libc::pid_t;
            signal_group(group, libc::SIGTERM);
            let exited = matches!(tokio::time::timeout(grace, child.wait()).await, Ok(Ok(_)));
            signal_group(group, libc::SIGKILL);
            if exited {
                return;
            }
        }
    }
    #[cfg(not(unix))]
    let _ = grace;

    if let Err(e) = child.kill().await {
        warn!("failed to kill renderer: {e}");
    }
}

/// Signal every process in the group led by `group` (the renderer's pid,
/// see `process_group(0)` at spawn).
#[cfg(unix)]
fn signal_group(group: libc::pid_t, signal: libc::c_int) {
    // SAFETY: a negative pid addresses a process group; `group` is the
    // group created for our own child. ESRCH (group already gone) is fine.
    unsafe {
        libc::kill(-group, signal);
    }
}

async fn check_output(path: &Path) -> RenderOutcome {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.len() > 0 => RenderOutcome::Succeeded {
            output_path: path.to_path_buf(),
            bytes: meta.len(),
        },
        _ => RenderOutcome::Failed(JobError::EmptyOutput {
            path: path.to_path_buf(),
        }),
    }
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("removed partial output {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("could not remove partial output {}: {e}", path.display()),
    }
}

/// Read a stream to the end, keeping only its last [`MAX_STDERR_BYTES`].
async fn drain_tail<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    let Some(mut handle) = handle else {
        return buf;
    };
    let mut chunk = [0u8; 8192];
    loop {
        match handle.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if buf.len() > MAX_STDERR_BYTES {
                    let excess = buf.len() - MAX_STDERR_BYTES;
                    buf.drain(..excess);
                }
            }
        }
    }
    buf
}

/// Last few non-empty lines of captured stderr, at most [`STDERR_TAIL_BYTES`].
pub fn stderr_tail(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let lines: Vec<&str> = text
        .split(['\r', '\n'])
        .map(str::trim_end)
        .filter(|l| !l.trim().is_empty())
        .collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    let tail = lines[start..].join("\n");
    if tail.len() <= STDERR_TAIL_BYTES {
        return tail;
    }
    let mut cut = tail.len() - STDERR_TAIL_BYTES;
    while !tail.is_char_boundary(cut) {
        cut += 1;
    }
    tail[cut..].to_string()
}

#[cfg(windows)]
fn no_window(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    cmd.as_std_mut().creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(windows))]
fn no_window(_cmd: &mut Command) {}
