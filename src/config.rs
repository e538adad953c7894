//! Configuration types for a web-page-to-PDF run.
//!
//! Every knob of a run lives in [`ConversionOptions`], built via its
//! [`ConversionOptionsBuilder`]. Options are validated once in
//! [`ConversionOptionsBuilder::build`] and stay immutable for the lifetime of
//! a run; the scheduler and the renderer only ever read them.

use crate::error::Web2PdfError;
use crate::pipeline::merge::PdfMerger;
use crate::pipeline::render::PageRenderer;
use crate::progress::ProgressCallback;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Default location of the wkhtmltopdf binary on this platform.
#[cfg(windows)]
pub const DEFAULT_RENDERER_PATH: &str = r"C:\Program Files\wkhtmltopdf\bin\wkhtmltopdf.exe";
/// Default location of the wkhtmltopdf binary on this platform.
#[cfg(not(windows))]
pub const DEFAULT_RENDERER_PATH: &str = "/usr/local/bin/wkhtmltopdf";

/// Default file name of the merged document.
pub const DEFAULT_MERGED_OUTPUT: &str = "merged_output.pdf";

static LENGTH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+(\.\d+)?(mm|cm|in|px|pt)?$").expect("valid regex"));

/// Configuration for one conversion run.
///
/// Built via [`ConversionOptions::builder()`] or using
/// [`ConversionOptions::default()`].
///
/// # Example
/// ```rust
/// use webpage2pdf::{ConversionOptions, Orientation, OutputMode, PageSize};
///
/// let options = ConversionOptions::builder()
///     .concurrency(8)
///     .page_size(PageSize::Letter)
///     .orientation(Orientation::Landscape)
///     .mode(OutputMode::Separate { directory: "out".into() })
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionOptions {
    /// Maximum number of renderer processes alive at once. Default: 4.
    pub concurrency: usize,

    /// Paper size handed to the renderer. Default: A4.
    pub page_size: PageSize,

    /// Paper orientation handed to the renderer. Default: portrait.
    pub orientation: Orientation,

    /// Page margins, passed verbatim. Default: 10mm on every side.
    pub margins: Margins,

    /// Merged single document or one file per URL.
    pub mode: OutputMode,

    /// Path of the renderer executable. Ignored when `renderer` is set.
    pub renderer_path: PathBuf,

    /// Per-job render deadline in seconds. Default: 120.
    pub render_timeout_secs: u64,

    /// Time a renderer gets to exit after a polite termination request
    /// before it is killed. Default: 3000 ms.
    pub kill_grace_ms: u64,

    /// Parent directory for the run's intermediate files.
    /// If None, uses the system temp directory.
    pub temp_dir: Option<PathBuf>,

    /// Pre-constructed renderer. Takes precedence over `renderer_path`.
    pub renderer: Option<Arc<dyn PageRenderer>>,

    /// Pre-constructed merger. If None, uses [`crate::pipeline::merge::LopdfMerger`].
    pub merger: Option<Arc<dyn PdfMerger>>,

    /// Receives run, job and progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            page_size: PageSize::default(),
            orientation: Orientation::default(),
            margins: Margins::default(),
            mode: OutputMode::default(),
            renderer_path: PathBuf::from(DEFAULT_RENDERER_PATH),
            render_timeout_secs: 120,
            kill_grace_ms: 3000,
            temp_dir: None,
            renderer: None,
            merger: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionOptions")
            .field("concurrency", &self.concurrency)
            .field("page_size", &self.page_size)
            .field("orientation", &self.orientation)
            .field("margins", &self.margins)
            .field("mode", &self.mode)
            .field("renderer_path", &self.renderer_path)
            .field("render_timeout_secs", &self.render_timeout_secs)
            .field("kill_grace_ms", &self.kill_grace_ms)
            .field("temp_dir", &self.temp_dir)
            .field("renderer", &self.renderer.as_ref().map(|r| r.name()))
            .field("merger", &self.merger.as_ref().map(|_| "<dyn PdfMerger>"))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionOptions {
    /// Create a new builder for `ConversionOptions`.
    pub fn builder() -> ConversionOptionsBuilder {
        ConversionOptionsBuilder {
            options: Self::default(),
        }
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }
}

/// Builder for [`ConversionOptions`].
#[derive(Debug)]
pub struct ConversionOptionsBuilder {
    options: ConversionOptions,
}

impl ConversionOptionsBuilder {
    pub fn concurrency(mut self, n: usize) -> Self {
        self.options.concurrency = n.max(1);
        self
    }

    pub fn page_size(mut self, size: PageSize) -> Self {
        self.options.page_size = size;
        self
    }

    pub fn orientation(mut self, orientation: Orientation) -> Self {
        self.options.orientation = orientation;
        self
    }

    pub fn margins(mut self, margins: Margins) -> Self {
        self.options.margins = margins;
        self
    }

    pub fn mode(mut self, mode: OutputMode) -> Self {
        self.options.mode = mode;
        self
    }

    /// Shorthand for `mode(OutputMode::Merged { output })`.
    pub fn merged_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.options.mode = OutputMode::Merged {
            output: output.into(),
        };
        self
    }

    /// Shorthand for `mode(OutputMode::Separate { directory })`.
    pub fn output_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.options.mode = OutputMode::Separate {
            directory: directory.into(),
        };
        self
    }

    pub fn renderer_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.renderer_path = path.into();
        self
    }

    pub fn render_timeout_secs(mut self, secs: u64) -> Self {
        self.options.render_timeout_secs = secs.max(1);
        self
    }

    pub fn kill_grace_ms(mut self, ms: u64) -> Self {
        self.options.kill_grace_ms = ms;
        self
    }

    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.options.temp_dir = Some(dir.into());
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.options.renderer = Some(renderer);
        self
    }

    pub fn merger(mut self, merger: Arc<dyn PdfMerger>) -> Self {
        self.options.merger = Some(merger);
        self
    }

    pub fn progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.options.progress_callback = Some(callback);
        self
    }

    /// Build the options, validating constraints.
    pub fn build(self) -> Result<ConversionOptions, Web2PdfError> {
        let o = &self.options;
        if o.concurrency == 0 {
            return Err(Web2PdfError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if o.render_timeout_secs == 0 {
            return Err(Web2PdfError::InvalidConfig(
                "Render timeout must be ≥ 1s".into(),
            ));
        }
        o.margins.validate()?;
        match &o.mode {
            OutputMode::Merged { output } if output.as_os_str().is_empty() => {
                return Err(Web2PdfError::InvalidConfig(
                    "Merged output path is empty".into(),
                ));
            }
            OutputMode::Separate { directory } if directory.as_os_str().is_empty() => {
                return Err(Web2PdfError::InvalidConfig(
                    "Output directory is empty".into(),
                ));
            }
            _ => {}
        }
        if o.renderer.is_none() && o.renderer_path.as_os_str().is_empty() {
            return Err(Web2PdfError::InvalidConfig(
                "Renderer path is empty".into(),
            ));
        }
        Ok(self.options)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Where the run's results go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputMode {
    /// Concatenate every rendered page, in input order, into one PDF.
    Merged { output: PathBuf },
    /// Keep one PDF per URL inside `directory`.
    Separate { directory: PathBuf },
}

impl Default for OutputMode {
    fn default() -> Self {
        OutputMode::Merged {
            output: PathBuf::from(DEFAULT_MERGED_OUTPUT),
        }
    }
}

impl OutputMode {
    pub fn label(&self) -> &'static str {
        match self {
            OutputMode::Merged { .. } => "merged",
            OutputMode::Separate { .. } => "separate",
        }
    }
}

/// Paper sizes understood by wkhtmltopdf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageSize {
    A3,
    #[default]
    A4,
    A5,
    B5,
    Letter,
    Legal,
    Executive,
    Tabloid,
    Ledger,
}

impl PageSize {
    /// Token passed after `--page-size`.
    pub fn as_token(&self) -> &'static str {
        match self {
            PageSize::A3 => "A3",
            PageSize::A4 => "A4",
            PageSize::A5 => "A5",
            PageSize::B5 => "B5",
            PageSize::Letter => "Letter",
            PageSize::Legal => "Legal",
            PageSize::Executive => "Executive",
            PageSize::Tabloid => "Tabloid",
            PageSize::Ledger => "Ledger",
        }
    }
}

impl FromStr for PageSize {
    type Err = Web2PdfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a3" => Ok(PageSize::A3),
            "a4" => Ok(PageSize::A4),
            "a5" => Ok(PageSize::A5),
            "b5" => Ok(PageSize::B5),
            "letter" => Ok(PageSize::Letter),
            "legal" => Ok(PageSize::Legal),
            "executive" => Ok(PageSize::Executive),
            "tabloid" => Ok(PageSize::Tabloid),
            "ledger" => Ok(PageSize::Ledger),
            other => Err(Web2PdfError::InvalidConfig(format!(
                "Unknown page size '{other}'"
            ))),
        }
    }
}

/// Paper orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

impl Orientation {
    /// Token passed after `--orientation`.
    pub fn as_token(&self) -> &'static str {
        match self {
            Orientation::Portrait => "Portrait",
            Orientation::Landscape => "Landscape",
        }
    }
}

impl FromStr for Orientation {
    type Err = Web2PdfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "portrait" => Ok(Orientation::Portrait),
            "landscape" => Ok(Orientation::Landscape),
            other => Err(Web2PdfError::InvalidConfig(format!(
                "Unknown orientation '{other}'"
            ))),
        }
    }
}

/// Page margins as renderer length tokens (`10`, `10mm`, `0.5in`, …).
///
/// A bare number is accepted; wkhtmltopdf reads it as millimetres.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Margins {
    pub top: String,
    pub right: String,
    pub bottom: String,
    pub left: String,
}

impl Default for Margins {
    fn default() -> Self {
        Self::uniform("10mm")
    }
}

impl Margins {
    /// The same margin on all four sides.
    pub fn uniform(value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            top: value.clone(),
            right: value.clone(),
            bottom: value.clone(),
            left: value,
        }
    }

    /// `(flag, value)` pairs in top, right, bottom, left order.
    pub fn sides(&self) -> [(&'static str, &str); 4] {
        [
            ("--margin-top", self.top.as_str()),
            ("--margin-right", self.right.as_str()),
            ("--margin-bottom", self.bottom.as_str()),
            ("--margin-left", self.left.as_str()),
        ]
    }

    fn validate(&self) -> Result<(), Web2PdfError> {
        for (flag, value) in self.sides() {
            if !LENGTH_RE.is_match(value) {
                return Err(Web2PdfError::InvalidConfig(format!(
                    "{} expects a length like 10mm, got '{}'",
                    flag.trim_start_matches("--"),
                    value
                )));
            }
        }
        Ok(())
    }
}
