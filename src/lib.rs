//! # gmkit-pdf2md
//!
//! Convert tabletop adventure PDFs into structured Markdown for quick
//! reference at the table.
//!
//! ## Why phases and checkpoints?
//!
//! Two steps of the conversion cannot be automated safely: deciding which
//! fonts are headings, and judging the structural problems a linter finds.
//! The pipeline therefore stops for a human at both, and persists its
//! progress after every phase and every page or issue so a run can be
//! interrupted, resumed or partly re-run without starting over.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─  0. Pre-flight      probe + complexity tier; proceed/abort gate
//!  ├─  1. Setup           output layout, source fingerprint
//!  ├─  2. Images          per page, bounded worker pool
//!  ├─  3. Text            per page, bounded worker pool
//!  ├─  4. Segmentation    paragraphs, call-outs, heading candidates
//!  ├─  5. Font inventory
//!  ├─  6. Font proposal   sizes ranked to heading levels
//!  ├─  7. Mapping review  checkpoint
//!  ├─  8. Headings        Markdown skeleton
//!  ├─  9. Lint & review   checkpoint (interactive or checklist)
//!  └─ 10. Report          final Markdown + quality report
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gmkit_pdf2md::{convert, ConversionConfig, RunOutcome};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Confirm both checkpoints automatically and accept every issue.
//!     let config = ConversionConfig::builder().auto_confirm(true).build()?;
//!     if let RunOutcome::Complete { final_markdown, .. } = convert("module.pdf", &config).await? {
//!         println!("{}", final_markdown.display());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2md` binary (clap + indicatif + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod artifacts;
pub mod backend;
pub mod checkpoint;
pub mod config;
pub mod convert;
pub mod diagnostics;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod progress;
pub mod state;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backend::{MemoryBackend, MemoryPage, PdfBackend, PdfiumBackend};
pub use checkpoint::{AutoApprove, GateDecision, MappingDecision, Reviewer};
pub use config::{ConversionConfig, ConversionConfigBuilder, ReviewMode};
pub use convert::{convert, inspect, rerun_from_step, rerun_phase, resume, status, RunOutcome};
pub use error::{ConvertError, ErrorKind, PageFault};
pub use model::{FontMapping, FontRole, FontSignature, Issue, Resolution};
pub use pipeline::assess::PreflightReport;
pub use pipeline::fonts::FontInventory;
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use state::{ConversionState, Lifecycle, Phase, PhaseStatus, StepRef};
