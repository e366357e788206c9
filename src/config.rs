//! Configuration types for a conversion run.
//!
//! All pipeline behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. The collaborators a run talks to (the
//! PDF backend, the human reviewer, the progress sink) are injected here too,
//! so a test can drive the whole pipeline against in-memory fixtures.

use crate::backend::PdfBackend;
use crate::checkpoint::Reviewer;
use crate::error::ConvertError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default location of the process-wide "active conversion" pointer.
pub const DEFAULT_ACTIVE_POINTER: &str = ".gmkit/active-conversion.json";

/// Configuration for a conversion run.
///
/// # Example
/// ```rust
/// use gmkit_pdf2md::{ConversionConfig, ReviewMode};
///
/// let config = ConversionConfig::builder()
///     .concurrency(8)
///     .review_mode(ReviewMode::Checklist)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_attempts, 3);
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Explicit output directory. If None, `<output_root>/<pdf stem>` is used.
    pub output_dir: Option<PathBuf>,

    /// Parent for derived output directories. Default: ".".
    pub output_root: PathBuf,

    /// Where the active-conversion pointer lives. Default: `.gmkit/active-conversion.json`.
    ///
    /// Tests point this into a temp dir so concurrent runs never share it.
    pub active_pointer: PathBuf,

    /// Pages extracted concurrently in phases 2 and 3. Default: 4.
    pub concurrency: usize,

    /// Automatic attempts per phase before it is left `failed`. Default: 3.
    pub max_attempts: u32,

    /// Initial delay between automatic attempts in milliseconds. Default: 250.
    ///
    /// Doubles after each attempt: 250 ms → 500 ms.
    pub retry_backoff_ms: u64,

    /// Fraction of degraded pages above which extraction fails. Default: 0.25.
    pub max_degraded_ratio: f32,

    /// Average non-whitespace characters per page below which the document
    /// counts as scanned. Default: 32.
    pub min_chars_per_page: usize,

    /// Phase-9 interaction protocol. Default: [`ReviewMode::Interactive`].
    pub review_mode: ReviewMode,

    /// Confirm the pre-flight gate and font mapping and accept issues as-is
    /// without asking. Default: false.
    pub auto_confirm: bool,

    /// Write the `diagnostics/` bundle. Default: false.
    pub diagnostics: bool,

    /// Replaces the provenance notice prepended to the final Markdown.
    pub provenance_notice: Option<String>,

    /// Path to libpdfium (file or containing directory).
    pub pdfium_library_path: Option<PathBuf>,

    /// Pre-constructed backend. Takes precedence over `pdfium_library_path`.
    pub backend: Option<Arc<dyn PdfBackend>>,

    /// Answers the human checkpoints.
    pub reviewer: Option<Arc<dyn Reviewer>>,

    /// Receives phase and step events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            output_root: PathBuf::from("."),
            active_pointer: PathBuf::from(DEFAULT_ACTIVE_POINTER),
            concurrency: 4,
            max_attempts: 3,
            retry_backoff_ms: 250,
            max_degraded_ratio: 0.25,
            min_chars_per_page: 32,
            review_mode: ReviewMode::default(),
            auto_confirm: false,
            diagnostics: false,
            provenance_notice: None,
            pdfium_library_path: None,
            backend: None,
            reviewer: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("output_dir", &self.output_dir)
            .field("output_root", &self.output_root)
            .field("active_pointer", &self.active_pointer)
            .field("concurrency", &self.concurrency)
            .field("max_attempts", &self.max_attempts)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("max_degraded_ratio", &self.max_degraded_ratio)
            .field("min_chars_per_page", &self.min_chars_per_page)
            .field("review_mode", &self.review_mode)
            .field("auto_confirm", &self.auto_confirm)
            .field("diagnostics", &self.diagnostics)
            .field("pdfium_library_path", &self.pdfium_library_path)
            .field("backend", &self.backend.as_ref().map(|_| "<dyn PdfBackend>"))
            .field("reviewer", &self.reviewer.as_ref().map(|_| "<dyn Reviewer>"))
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = Some(dir.into());
        self
    }

    pub fn output_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_root = dir.into();
        self
    }

    pub fn active_pointer(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.active_pointer = path.into();
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn max_degraded_ratio(mut self, ratio: f32) -> Self {
        self.config.max_degraded_ratio = ratio;
        self
    }

    pub fn min_chars_per_page(mut self, n: usize) -> Self {
        self.config.min_chars_per_page = n;
        self
    }

    pub fn review_mode(mut self, mode: ReviewMode) -> Self {
        self.config.review_mode = mode;
        self
    }

    pub fn auto_confirm(mut self, v: bool) -> Self {
        self.config.auto_confirm = v;
        self
    }

    pub fn diagnostics(mut self, v: bool) -> Self {
        self.config.diagnostics = v;
        self
    }

    pub fn provenance_notice(mut self, notice: impl Into<String>) -> Self {
        self.config.provenance_notice = Some(notice.into());
        self
    }

    pub fn pdfium_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_path = Some(path.into());
        self
    }

    pub fn backend(mut self, backend: Arc<dyn PdfBackend>) -> Self {
        self.config.backend = Some(backend);
        self
    }

    pub fn reviewer(mut self, reviewer: Arc<dyn Reviewer>) -> Self {
        self.config.reviewer = Some(reviewer);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, ConvertError> {
        let c = &self.config;
        if c.max_attempts == 0 {
            return Err(ConvertError::InvalidConfig(
                "max_attempts must be ≥ 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&c.max_degraded_ratio) {
            return Err(ConvertError::InvalidConfig(format!(
                "max_degraded_ratio must be within 0.0–1.0, got {}",
                c.max_degraded_ratio
            )));
        }
        if c.concurrency == 0 {
            return Err(ConvertError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How lint issues are resolved in phase 9.
///
/// | Mode | Transport |
/// |------|-----------|
/// | Interactive | one prompt per issue, answered before the next is shown |
/// | Checklist | `review-checklist.md` annotated offline, applied on resume |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReviewMode {
    #[default]
    Interactive,
    Checklist,
}

impl fmt::Display for ReviewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReviewMode::Interactive => "interactive",
            ReviewMode::Checklist => "checklist",
        })
    }
}
