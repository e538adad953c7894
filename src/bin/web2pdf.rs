//! CLI binary for webpage2pdf.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ConversionOptions`, wires Ctrl-C to the session's cancel handle and
//! prints the run report.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use webpage2pdf::config::{DEFAULT_MERGED_OUTPUT, DEFAULT_RENDERER_PATH};
use webpage2pdf::pipeline::input::read_url_list;
use webpage2pdf::{
    run_session, CompletionEvent, ConversionOptions, ConversionProgressCallback,
    ConversionSession, Margins, Orientation, OutputLocation, PageSize, ProgressCallback,
    ProgressSnapshot, RenderOutcome, RunReport,
};

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar anchored at the bottom of the terminal
/// plus a log line per finished page. Pages finish out of order, so lines are
/// printed as they arrive and the bar position follows the estimator.
struct CliProgressCallback {
    bar: ProgressBar,
    cancelling: AtomicBool,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Starting renderers…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            cancelling: AtomicBool::new(false),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Converting");
        self.bar.set_message(format_eta(None));
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_jobs: usize) {
        self.activate_bar(total_jobs);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {total_jobs} pages…"))
        ));
    }

    fn on_job_complete(&self, event: &CompletionEvent, snapshot: &ProgressSnapshot) {
        let secs = event
            .started_at
            .map(|s| event.finished_at.saturating_duration_since(s).as_secs_f64())
            .unwrap_or(0.0);
        let n = event.index + 1;
        let line = match &event.outcome {
            RenderOutcome::Succeeded { bytes, .. } => format!(
                "  {} #{:<4} {}  {}  {}",
                green("✓"),
                n,
                truncate(&event.url, 70),
                dim(&format!("{:>6} KiB", bytes / 1024)),
                dim(&format!("{secs:.1}s")),
            ),
            RenderOutcome::Failed(e) => format!(
                "  {} #{:<4} {}  {}  {}",
                red("✗"),
                n,
                truncate(&event.url, 70),
                red(&truncate(&e.to_string(), 80)),
                dim(&format!("{secs:.1}s")),
            ),
            RenderOutcome::Cancelled if event.dispatched => format!(
                "  {} #{:<4} {}  {}",
                yellow("○"),
                n,
                truncate(&event.url, 70),
                dim("cancelled")
            ),
            // Never-dispatched jobs are summarised at the end instead.
            RenderOutcome::Cancelled => String::new(),
        };
        if !line.is_empty() {
            self.bar.println(line);
        }
        self.bar.set_position(snapshot.completed as u64);
        if !self.cancelling.load(Ordering::SeqCst) {
            self.bar.set_message(format_eta(snapshot.estimated_remaining));
        }
    }

    fn on_cancel_requested(&self) {
        self.cancelling.store(true, Ordering::SeqCst);
        self.bar.set_prefix("Cancelling");
        self.bar.set_message("waiting for running pages…");
        self.bar.println(format!(
            "{} {}",
            yellow("■"),
            bold("Cancel requested: no new pages will start")
        ));
    }

    fn on_run_complete(&self, report: &RunReport) {
        self.bar.finish_and_clear();
        print_summary(report);
    }
}

fn format_eta(remaining: Option<Duration>) -> String {
    match remaining {
        None => "ETA calculating…".to_string(),
        Some(d) => {
            let secs = d.as_secs();
            if secs >= 3600 {
                format!("ETA {}h {:02}m", secs / 3600, (secs % 3600) / 60)
            } else if secs >= 60 {
                format!("ETA {}m {:02}s", secs / 60, secs % 60)
            } else {
                format!("ETA {secs}s")
            }
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max - 1).collect();
    out.push('\u{2026}');
    out
}

fn print_summary(report: &RunReport) {
    let total = report.stats.total_jobs;
    let ok = report.succeeded.len();
    let mark = if ok == total {
        green("✔")
    } else if ok == 0 {
        red("✘")
    } else {
        cyan("⚠")
    };
    eprintln!(
        "{} {}/{} pages converted  ({} failed, {} cancelled)  {}ms",
        mark,
        bold(&ok.to_string()),
        total,
        report.failed.len(),
        report.cancelled.len(),
        report.stats.total_duration_ms,
    );
    match &report.output {
        Some(OutputLocation::MergedFile(path)) => {
            eprintln!("   →  {}", bold(&path.display().to_string()));
        }
        Some(OutputLocation::Directory {
            path,
            files,
            unsaved,
        }) => {
            eprintln!(
                "   →  {} files in {}",
                files.len(),
                bold(&path.display().to_string())
            );
            for u in unsaved {
                eprintln!("   {} page #{} not saved: {}", red("✗"), u.index + 1, u.reason);
            }
        }
        None => {}
    }
    if let Some(e) = &report.merge_error {
        eprintln!("   {} {}", red("merge:"), e);
    }
}

const AFTER_HELP: &str = r#"INPUT:
  A CSV or text file with one URL per row. Only the first column is read;
  rows that are empty or not absolute URLs are skipped. Lines starting with
  '#' are comments.

EXAMPLES:
  # Merge every page into merged_output.pdf
  web2pdf urls.csv

  # Merge into a named file, landscape Letter, 8 renderers at once
  web2pdf urls.csv -o report.pdf --page-size Letter --orientation Landscape -c 8

  # One PDF per URL
  web2pdf urls.csv --output-dir pdfs/

  # Machine-readable report, log to a file
  web2pdf urls.csv --json --log-file conversion.log > report.json

  Press Ctrl-C once to stop: running pages are terminated, finished pages
  are still merged or saved.

ENVIRONMENT VARIABLES:
  WEB2PDF_RENDERER     Path to the wkhtmltopdf executable
  WEB2PDF_CONCURRENCY  Number of renderer processes at once
  RUST_LOG             Override the log filter (e.g. webpage2pdf=debug)
"#;

/// Convert lists of web pages to PDF with wkhtmltopdf.
#[derive(Parser, Debug)]
#[command(
    name = "web2pdf",
    version,
    about = "Convert lists of web pages to PDF with wkhtmltopdf",
    long_about = "Convert every URL in a CSV file to PDF by running a wkhtmltopdf-compatible \
renderer, several pages at a time, and merge the results in input order or keep one file \
per URL.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// CSV or text file with one URL per row.
    input: PathBuf,

    /// Merged output file.
    #[arg(short, long, env = "WEB2PDF_OUTPUT", default_value = DEFAULT_MERGED_OUTPUT)]
    output: PathBuf,

    /// Write one PDF per URL into this directory instead of merging.
    #[arg(long, env = "WEB2PDF_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Path to the wkhtmltopdf executable (a bare name is looked up on PATH).
    #[arg(long, env = "WEB2PDF_RENDERER", default_value = DEFAULT_RENDERER_PATH)]
    renderer: PathBuf,

    /// Paper size: A3, A4, A5, B5, Letter, Legal, Executive, Tabloid, Ledger.
    #[arg(long, env = "WEB2PDF_PAGE_SIZE", default_value = "A4")]
    page_size: PageSize,

    /// Paper orientation: Portrait or Landscape.
    #[arg(long, env = "WEB2PDF_ORIENTATION", default_value = "Portrait")]
    orientation: Orientation,

    /// Margin on every side (e.g. 10mm, 0.5in, 10).
    #[arg(long, env = "WEB2PDF_MARGIN", default_value = "10mm")]
    margin: String,

    /// Top margin, overrides --margin.
    #[arg(long)]
    margin_top: Option<String>,

    /// Right margin, overrides --margin.
    #[arg(long)]
    margin_right: Option<String>,

    /// Bottom margin, overrides --margin.
    #[arg(long)]
    margin_bottom: Option<String>,

    /// Left margin, overrides --margin.
    #[arg(long)]
    margin_left: Option<String>,

    /// Number of renderer processes running at once.
    #[arg(short, long, env = "WEB2PDF_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Per-page render timeout in seconds.
    #[arg(long, env = "WEB2PDF_TIMEOUT", default_value_t = 120)]
    timeout: u64,

    /// Milliseconds a renderer gets to exit after being asked to stop.
    #[arg(long, env = "WEB2PDF_KILL_GRACE_MS", default_value_t = 3000)]
    kill_grace_ms: u64,

    /// Directory for intermediate files (default: system temp dir).
    #[arg(long, env = "WEB2PDF_TEMP_DIR")]
    temp_dir: Option<PathBuf>,

    /// Print the run report as JSON on stdout.
    #[arg(long, env = "WEB2PDF_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "WEB2PDF_NO_PROGRESS")]
    no_progress: bool,

    /// Write logs to this file instead of stderr.
    #[arg(long, env = "WEB2PDF_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "WEB2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "WEB2PDF_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs on stderr while the progress bar is
    // active; a log file always gets them.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.log_file.is_some() {
        "info"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match &cli.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }

    // ── Read input ───────────────────────────────────────────────────────
    let list = read_url_list(&cli.input)
        .await
        .with_context(|| format!("Failed to read URL list {}", cli.input.display()))?;
    if list.dropped > 0 && !cli.quiet && !cli.json {
        eprintln!(
            "{} skipped {} rows that are empty or not URLs",
            yellow("⚠"),
            list.dropped
        );
    }

    // ── Build options ────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new();
        Some(cb as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let options = build_options(&cli, progress_cb)?;

    let session = ConversionSession::new(list.urls, options)
        .context("Invalid URL list")?
        .with_dropped_rows(list.dropped);

    // ── Ctrl-C → cancel ──────────────────────────────────────────────────
    // Keep listening after the first signal so a second Ctrl-C doesn't
    // kill the process mid-drain.
    let cancel = session.cancel_handle();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    // ── Run conversion ───────────────────────────────────────────────────
    let report = run_session(session).await.context("Conversion failed")?;

    if cli.json {
        println!("{}", report.to_json_pretty().context("Failed to serialise report")?);
    } else if !cli.quiet && !show_progress {
        print_summary(&report);
    }

    if report.succeeded.is_empty() || report.merge_error.is_some() {
        std::process::exit(1);
    }
    Ok(())
}

/// Map CLI args to `ConversionOptions`.
fn build_options(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionOptions> {
    let side = |over: &Option<String>| over.clone().unwrap_or_else(|| cli.margin.clone());
    let margins = Margins {
        top: side(&cli.margin_top),
        right: side(&cli.margin_right),
        bottom: side(&cli.margin_bottom),
        left: side(&cli.margin_left),
    };

    let mut builder = ConversionOptions::builder()
        .concurrency(cli.concurrency)
        .page_size(cli.page_size)
        .orientation(cli.orientation)
        .margins(margins)
        .renderer_path(&cli.renderer)
        .render_timeout_secs(cli.timeout)
        .kill_grace_ms(cli.kill_grace_ms);

    builder = match &cli.output_dir {
        Some(dir) => builder.output_directory(dir),
        None => builder.merged_output(&cli.output),
    };
    if let Some(ref dir) = cli.temp_dir {
        builder = builder.temp_dir(dir);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
