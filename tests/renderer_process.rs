//! `WkhtmltopdfRenderer` against stand-in renderer scripts.
//!
//! Each script behaves like one way wkhtmltopdf can end: writing a PDF,
//! failing with a message, hanging, or exiting cleanly without output.

#![cfg(unix)]

mod common;

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use webpage2pdf::{
    convert, CancelHandle, ConversionOptions, JobError, OutputLocation, PageRenderer,
    RenderOutcome, RenderRequest, WkhtmltopdfRenderer,
};

/// Finds the last argument (the output path) and writes to it.
const WRITE_LAST: &str = r#"for last; do :; done
"#;

fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn request(dir: &Path) -> RenderRequest {
    RenderRequest {
        index: 0,
        url: "https://example.com/".into(),
        output_path: dir.join("page_00001.pdf"),
    }
}

/// Render once, retrying a spawn that races another test's freshly
/// written script (ETXTBSY).
async fn render(
    renderer: &WkhtmltopdfRenderer,
    request: &RenderRequest,
    options: &ConversionOptions,
    budget: Duration,
    cancel: &CancelHandle,
) -> RenderOutcome {
    let mut attempts = 0;
    loop {
        let deadline = tokio::time::Instant::now() + budget;
        let outcome = renderer.render(request, options, deadline, cancel).await;
        match &outcome {
            RenderOutcome::Failed(JobError::SpawnFailed { detail })
                if detail.contains("busy") && attempts < 5 =>
            {
                attempts += 1;
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            _ => return outcome,
        }
    }
}

fn options() -> ConversionOptions {
    ConversionOptions::builder()
        .render_timeout_secs(30)
        .kill_grace_ms(200)
        .build()
        .unwrap()
}

#[tokio::test]
async fn clean_exit_with_output_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let exe = script(
        dir.path(),
        "ok.sh",
        &format!("{WRITE_LAST}printf '%s' '%PDF-1.4 fake' > \"$last\"\n"),
    );
    let renderer = WkhtmltopdfRenderer::new(&exe);
    let req = request(dir.path());

    let outcome = render(&renderer, &req, &options(), Duration::from_secs(10), &CancelHandle::new()).await;

    assert_eq!(
        outcome,
        RenderOutcome::Succeeded {
            output_path: req.output_path.clone(),
            bytes: 13,
        }
    );
}

#[tokio::test]
async fn process_receives_flags_then_url_then_output() {
    let dir = tempfile::tempdir().unwrap();
    let exe = script(
        dir.path(),
        "args.sh",
        &format!(
            "printf '%s\\n' \"$@\" > \"$(dirname \"$0\")/args.txt\"\n{WRITE_LAST}printf x > \"$last\"\n"
        ),
    );
    let renderer = WkhtmltopdfRenderer::new(&exe);
    let req = request(dir.path());

    let outcome = render(&renderer, &req, &options(), Duration::from_secs(10), &CancelHandle::new()).await;
    assert!(matches!(outcome, RenderOutcome::Succeeded { .. }), "got {outcome:?}");

    let args = std::fs::read_to_string(dir.path().join("args.txt")).unwrap();
    let args: Vec<&str> = args.lines().collect();
    assert_eq!(args[..5], ["--quiet", "--page-size", "A4", "--orientation", "Portrait"]);
    assert_eq!(args[args.len() - 2], "https://example.com/");
    assert_eq!(args[args.len() - 1], req.output_path.to_str().unwrap());
}

#[tokio::test]
async fn non_zero_exit_reports_code_and_stderr_tail() {
    let dir = tempfile::tempdir().unwrap();
    let exe = script(
        dir.path(),
        "fail.sh",
        &format!(
            "{WRITE_LAST}printf partial > \"$last\"\n\
             echo 'Loading pages (1/6)' >&2\n\
             echo 'Exit with code 1 due to network error: HostNotFoundError' >&2\n\
             exit 1\n"
        ),
    );
    let renderer = WkhtmltopdfRenderer::new(&exe);
    let req = request(dir.path());

    let outcome = render(&renderer, &req, &options(), Duration::from_secs(10), &CancelHandle::new()).await;

    match outcome {
        RenderOutcome::Failed(JobError::RenderFailed {
            exit_code,
            stderr_tail,
        }) => {
            assert_eq!(exit_code, Some(1));
            assert_eq!(
                stderr_tail,
                "Loading pages (1/6)\nExit with code 1 due to network error: HostNotFoundError"
            );
        }
        other => panic!("expected RenderFailed, got {other:?}"),
    }
    assert!(!req.output_path.exists(), "partial output must be removed");
}

#[tokio::test]
async fn clean_exit_without_output_is_empty_output() {
    let dir = tempfile::tempdir().unwrap();
    let exe = script(dir.path(), "empty.sh", &format!("{WRITE_LAST}: > \"$last\"\n"));
    let renderer = WkhtmltopdfRenderer::new(&exe);
    let req = request(dir.path());

    let outcome = render(&renderer, &req, &options(), Duration::from_secs(10), &CancelHandle::new()).await;

    assert_eq!(
        outcome,
        RenderOutcome::Failed(JobError::EmptyOutput {
            path: req.output_path.clone()
        })
    );
    assert!(!req.output_path.exists());
}

#[tokio::test]
async fn hung_renderer_is_terminated_at_the_deadline() {
    let dir = tempfile::tempdir().unwrap();
    let exe = script(
        dir.path(),
        "hang.sh",
        &format!("{WRITE_LAST}printf partial > \"$last\"\nexec sleep 30\n"),
    );
    let renderer = WkhtmltopdfRenderer::new(&exe);
    let req = request(dir.path());
    let options = ConversionOptions::builder()
        .render_timeout_secs(1)
        .kill_grace_ms(200)
        .build()
        .unwrap();

    let started = Instant::now();
    let outcome = render(&renderer, &req, &options, Duration::from_millis(500), &CancelHandle::new()).await;

    assert_eq!(outcome, RenderOutcome::Failed(JobError::RenderTimeout { secs: 1 }));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!req.output_path.exists(), "partial output must be removed");
}

#[tokio::test]
async fn renderer_ignoring_sigterm_is_killed_after_grace() {
    let dir = tempfile::tempdir().unwrap();
    let exe = script(
        dir.path(),
        "stubborn.sh",
        "trap '' TERM\nwhile :; do sleep 1; done\n",
    );
    let renderer = WkhtmltopdfRenderer::new(&exe);
    let req = request(dir.path());

    let started = Instant::now();
    let outcome = render(&renderer, &req, &options(), Duration::from_millis(300), &CancelHandle::new()).await;

    assert!(matches!(outcome, RenderOutcome::Failed(JobError::RenderTimeout { .. })));
    assert!(started.elapsed() < Duration::from_secs(5));
}

/// Whether `pid` is still a running process. A zombie waiting to be reaped
/// by its new parent counts as gone.
fn alive(pid: i32) -> bool {
    // SAFETY: signal 0 only checks that the pid exists.
    if unsafe { libc::kill(pid, 0) } != 0 {
        return false;
    }
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => !stat
            .rsplit_once(')')
            .map(|(_, rest)| rest.trim_start().starts_with('Z'))
            .unwrap_or(false),
        Err(_) => cfg!(not(target_os = "linux")),
    }
}

/// Wait up to two seconds for `pid` to disappear.
async fn gone(pid: i32) -> bool {
    for _ in 0..40 {
        if !alive(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

/// A shell wrapper that does not `exec` its payload, as `xvfb-run` and
/// similar shims do.
fn wrapper_script(dir: &Path) -> PathBuf {
    script(
        dir,
        "wrapper.sh",
        "sleep 30 &\necho $! > \"$(dirname \"$0\")/child.pid\"\nwait\n",
    )
}

async fn child_pid(dir: &Path) -> i32 {
    let file = dir.join("child.pid");
    for _ in 0..40 {
        if let Ok(text) = std::fs::read_to_string(&file) {
            if let Ok(pid) = text.trim().parse() {
                return pid;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("wrapper never wrote {}", file.display());
}

#[tokio::test]
async fn timeout_stops_processes_started_by_a_wrapper() {
    let dir = tempfile::tempdir().unwrap();
    let exe = wrapper_script(dir.path());
    let renderer = WkhtmltopdfRenderer::new(&exe);
    let req = request(dir.path());

    let outcome = render(&renderer, &req, &options(), Duration::from_millis(500), &CancelHandle::new()).await;

    assert!(matches!(outcome, RenderOutcome::Failed(JobError::RenderTimeout { .. })), "got {outcome:?}");
    let pid = child_pid(dir.path()).await;
    assert!(gone(pid).await, "process {pid} outlived its renderer");
}

#[tokio::test]
async fn cancel_stops_processes_started_by_a_wrapper() {
    let dir = tempfile::tempdir().unwrap();
    let exe = wrapper_script(dir.path());
    let renderer = WkhtmltopdfRenderer::new(&exe);
    let req = request(dir.path());
    let cancel = CancelHandle::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(400)).await;
        trigger.cancel();
    });

    let outcome = render(&renderer, &req, &options(), Duration::from_secs(30), &cancel).await;

    assert_eq!(outcome, RenderOutcome::Cancelled);
    let pid = child_pid(dir.path()).await;
    assert!(gone(pid).await, "process {pid} outlived its renderer");
}

#[tokio::test]
async fn clean_exit_does_not_wait_on_a_lingering_stderr_holder() {
    let dir = tempfile::tempdir().unwrap();
    let exe = script(
        dir.path(),
        "detach.sh",
        &format!(
            "sleep 30 &\necho $! > \"$(dirname \"$0\")/child.pid\"\n\
             {WRITE_LAST}printf x > \"$last\"\nexit 0\n"
        ),
    );
    let renderer = WkhtmltopdfRenderer::new(&exe);
    let req = request(dir.path());

    let started = Instant::now();
    let outcome = render(&renderer, &req, &options(), Duration::from_secs(30), &CancelHandle::new()).await;
    let pid = child_pid(dir.path()).await;
    // SAFETY: `pid` is the background sleep started by the script.
    unsafe {
        libc::kill(pid, libc::SIGKILL);
    }

    assert!(matches!(outcome, RenderOutcome::Succeeded { bytes: 1, .. }), "got {outcome:?}");
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn cancel_terminates_a_running_renderer() {
    let dir = tempfile::tempdir().unwrap();
    let exe = script(dir.path(), "slow.sh", "exec sleep 30\n");
    let renderer = WkhtmltopdfRenderer::new(&exe);
    let req = request(dir.path());
    let cancel = CancelHandle::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let outcome = render(&renderer, &req, &options(), Duration::from_secs(30), &cancel).await;

    assert_eq!(outcome, RenderOutcome::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn full_run_merges_rendered_pages_and_reports_failures() {
    let dir = tempfile::tempdir().unwrap();
    let template = dir.path().join("template.pdf");
    common::write_labelled_pdf(&template, &["rendered"]);
    let exe = script(
        dir.path(),
        "render.sh",
        &format!(
            "case \"$*\" in *unreachable*) echo 'HostNotFoundError' >&2; exit 1;; esac\n\
             {WRITE_LAST}cp \"$(dirname \"$0\")/template.pdf\" \"$last\"\n"
        ),
    );
    let merged = dir.path().join("out").join("merged.pdf");
    let options = ConversionOptions::builder()
        .renderer_path(&exe)
        .merged_output(&merged)
        .concurrency(2)
        .temp_dir(dir.path())
        .build()
        .unwrap();

    let report = convert(
        [
            "https://one.example/",
            "https://unreachable.example/",
            "https://three.example/",
        ],
        &options,
    )
    .await
    .unwrap();

    assert_eq!(report.succeeded, vec![0, 2]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].index, 1);
    assert_eq!(report.output, Some(OutputLocation::MergedFile(merged.clone())));
    assert!(report.merge_error.is_none());
    assert_eq!(common::page_labels(&merged), vec!["rendered", "rendered"]);
}

#[tokio::test]
async fn full_run_in_separate_mode_moves_each_pdf() {
    let dir = tempfile::tempdir().unwrap();
    let exe = script(
        dir.path(),
        "render.sh",
        &format!("{WRITE_LAST}printf '%s' '%PDF-1.4 fake' > \"$last\"\n"),
    );
    let out_dir = dir.path().join("pdfs");
    let options = ConversionOptions::builder()
        .renderer_path(&exe)
        .output_directory(&out_dir)
        .temp_dir(dir.path())
        .build()
        .unwrap();

    let report = convert(["https://a.example/x", "https://b.example/y"], &options)
        .await
        .unwrap();

    let mut names: Vec<String> = std::fs::read_dir(&out_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    assert_eq!(names, vec!["page_001_a_example_x.pdf", "page_002_b_example_y.pdf"]);
    assert_eq!(report.succeeded, vec![0, 1]);
}
