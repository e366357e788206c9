//! Error types for the gmkit-pdf2md library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ConvertError`] — **Fatal** for the current invocation: bad input file,
//!   scanned document, a phase that exhausted its retries, or a state
//!   operation that would break the run's invariants.
//!
//! * [`PageFault`] — **Per page**: one page could not be (fully) extracted.
//!   A `Degraded` fault is recorded in the page artifact and reported; an
//!   `Io` fault fails the phase so the State Manager can retry it.
//!
//! [`ErrorRecord`] is the serialisable projection of a `ConvertError` kept in
//! `.state.json` as the phase's `last_error`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Coarse error classes. They drive retry policy and CLI exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Input file problems; fatal, never retried.
    Input,
    /// The document has no usable text layer; fatal.
    Content,
    /// A phase failed while running; retried automatically.
    Phase,
    /// The persisted state forbids the requested operation.
    State,
    /// Invalid configuration or environment (pdfium missing etc.).
    Config,
}

/// All fatal errors returned by the gmkit-pdf2md library.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file is not a PDF, or its header/trailer/xref cannot be parsed.
    #[error("PDF '{path}' is corrupt or not a PDF: {detail}\nTry repairing with: qpdf input.pdf output.pdf")]
    Corrupted { path: PathBuf, detail: String },

    /// The PDF requires a password. Decryption is not supported.
    #[error("PDF '{path}' is encrypted.\nRemove the password with an external tool before converting.")]
    Encrypted { path: PathBuf },

    // ── Content errors ────────────────────────────────────────────────────
    /// The text layer is too sparse: most likely a scanned document.
    #[error(
        "PDF '{path}' has no extractable text ({chars} characters over {pages} pages).\n\
This looks like a scanned document. Run it through an external OCR tool \
(e.g. `ocrmypdf input.pdf output.pdf`) and convert the result."
    )]
    NoExtractableText {
        path: PathBuf,
        chars: usize,
        pages: usize,
    },

    // ── Phase errors ──────────────────────────────────────────────────────
    /// Reading or writing a pipeline artifact failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An artifact produced by an earlier phase is missing.
    #[error("Artifact '{path}' is missing; re-run the phase that produces it")]
    ArtifactMissing { path: PathBuf },

    /// An artifact exists but cannot be decoded.
    #[error("Artifact '{path}' is unreadable: {detail}")]
    ArtifactCorrupt { path: PathBuf, detail: String },

    /// A page hit a hard I/O fault during extraction.
    #[error("Page {page}: extraction I/O failure: {detail}")]
    PageIo { page: usize, detail: String },

    /// Too many pages degraded for the phase to count as successful.
    #[error("{degraded}/{total} pages degraded (limit is {limit_pct}% of pages)")]
    TooManyDegradedPages {
        degraded: usize,
        total: usize,
        limit_pct: u32,
    },

    /// Applying resolved issues to the skeleton failed.
    #[error("Revision step failed: {0}")]
    RevisionFailed(String),

    /// A phase kept failing and the State Manager stopped retrying.
    #[error("Phase {phase} ({name}) failed after {attempts} attempts: {last_error}\nFix the cause, then run --resume.")]
    PhaseExhausted {
        phase: u8,
        name: &'static str,
        attempts: u32,
        last_error: String,
    },

    // ── State errors ──────────────────────────────────────────────────────
    /// No explicit directory and no active-conversion pointer.
    #[error("No active conversion found at '{pointer}'. Pass an output directory explicitly.")]
    NoActiveConversion { pointer: PathBuf },

    /// The directory has no `.state.json`.
    #[error("No conversion state in '{dir}'. Start one with `convert`.")]
    StateMissing { dir: PathBuf },

    /// `.state.json` exists but cannot be decoded.
    #[error("Conversion state '{path}' is unreadable: {detail}")]
    StateCorrupt { path: PathBuf, detail: String },

    /// `convert` was asked to start over an existing run.
    #[error("A conversion already exists in '{dir}'. Use --resume, or --phase 0 to start over.")]
    RunExists { dir: PathBuf },

    /// Another process holds the single-writer lock.
    #[error("Another run (pid {pid}) is writing '{dir}'. Wait for it to finish.")]
    ConcurrentRun { dir: PathBuf, pid: u32 },

    /// Phase index out of range.
    #[error("Invalid phase {0}: phases are numbered 0–10")]
    InvalidPhase(u8),

    /// Step reference malformed or not applicable.
    #[error("Invalid step '{step}': {reason}")]
    InvalidStep { step: String, reason: String },

    /// A state transition would violate the run invariants.
    #[error("Cannot {action}: {reason}")]
    TransitionRejected { action: String, reason: String },

    /// The source PDF changed since the run started.
    #[error("Source PDF '{path}' changed since this conversion started. Use --phase 0 to start over.")]
    SourceChanged { path: PathBuf },

    /// A checkpoint needs a human answer but nobody can give one.
    #[error("Checkpoint '{checkpoint}' needs a reviewer. Run interactively or pass --yes.")]
    ReviewerRequired { checkpoint: &'static str },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium (file or directory), or place the\n\
platform library next to the binary.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConvertError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        use ConvertError::*;
        match self {
            FileNotFound { .. } | PermissionDenied { .. } | Corrupted { .. } | Encrypted { .. } => {
                ErrorKind::Input
            }
            NoExtractableText { .. } => ErrorKind::Content,
            Io { .. }
            | ArtifactMissing { .. }
            | ArtifactCorrupt { .. }
            | PageIo { .. }
            | TooManyDegradedPages { .. }
            | RevisionFailed(_)
            | PhaseExhausted { .. }
            | Internal(_) => ErrorKind::Phase,
            NoActiveConversion { .. }
            | StateMissing { .. }
            | StateCorrupt { .. }
            | RunExists { .. }
            | ConcurrentRun { .. }
            | InvalidPhase(_)
            | InvalidStep { .. }
            | TransitionRejected { .. }
            | SourceChanged { .. }
            | ReviewerRequired { .. } => ErrorKind::State,
            InvalidConfig(_) | PdfiumBindingFailed(_) => ErrorKind::Config,
        }
    }

    /// Whether the State Manager may re-invoke the phase with the same inputs.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Phase && !matches!(self, ConvertError::PhaseExhausted { .. })
    }

    /// Process exit code for the CLI. Each fatal input/content kind and
    /// retry exhaustion get their own code.
    pub fn exit_code(&self) -> i32 {
        match self {
            ConvertError::FileNotFound { .. } => 2,
            ConvertError::Corrupted { .. } => 3,
            ConvertError::Encrypted { .. } => 4,
            ConvertError::NoExtractableText { .. } => 5,
            ConvertError::PermissionDenied { .. } => 6,
            ConvertError::PhaseExhausted { .. } => 7,
            _ => 1,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConvertError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn rejected(action: impl Into<String>, reason: impl Into<String>) -> Self {
        ConvertError::TransitionRejected {
            action: action.into(),
            reason: reason.into(),
        }
    }
}

/// The persisted form of the last error a phase hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&ConvertError> for ErrorRecord {
    fn from(e: &ConvertError) -> Self {
        Self {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

/// A per-page extraction failure.
///
/// Stored in the page artifact when `Degraded`; escalated to
/// [`ConvertError::PageIo`] when `Io`.
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
pub enum PageFault {
    /// Part of the page could not be read; the rest is kept.
    #[error("Page {page}: degraded: {detail}")]
    Degraded { page: usize, detail: String },

    /// The page could not be read at all because of an I/O problem.
    #[error("Page {page}: I/O failure: {detail}")]
    Io { page: usize, detail: String },
}

impl PageFault {
    pub fn page(&self) -> usize {
        match self {
            PageFault::Degraded { page, .. } | PageFault::Io { page, .. } => *page,
        }
    }
}
