//! Access to the PDF itself.
//!
//! The pipeline never talks to pdfium directly: it goes through the
//! [`PdfBackend`] trait so phases can be driven against in-memory fixtures
//! ([`MemoryBackend`]) as well as real documents ([`PdfiumBackend`]).
//!
//! All methods are blocking. Callers run them inside
//! `tokio::task::spawn_blocking`, the same way page rendering has always been
//! isolated from the async worker threads.

pub mod memory;
pub mod pdfium;

pub use memory::{MemoryBackend, MemoryPage};
pub use pdfium::PdfiumBackend;

use crate::error::{ConvertError, PageFault};
use crate::model::{BoundingBox, DocumentMetrics};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Descriptive metadata from the PDF info dictionary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub pdf_version: Option<String>,
}

/// Everything the prober reads in one pass over the document.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeData {
    pub metrics: DocumentMetrics,
    pub info: DocumentInfo,
}

/// A run of text sharing one font, as reported by the PDF library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSegment {
    pub text: String,
    pub bbox: BoundingBox,
    pub font_name: String,
    pub font_size: f32,
    pub bold: bool,
    pub italic: bool,
}

/// Raw text layer of one page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageLayout {
    /// 1-based page number.
    pub page: usize,
    pub width: f32,
    pub height: f32,
    pub segments: Vec<TextSegment>,
    /// Rectangles drawn on the page (borders, shaded boxes).
    pub boxes: Vec<BoundingBox>,
    /// Set when some of the page could not be read.
    pub degraded: Option<String>,
}

/// One embedded image.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub image: DynamicImage,
    pub bbox: Option<BoundingBox>,
}

/// The embedded images of one page.
#[derive(Debug, Clone, Default)]
pub struct PageImages {
    pub page: usize,
    pub images: Vec<PageImage>,
    pub degraded: Option<String>,
}

/// Read access to a PDF.
///
/// Page numbers are 1-based throughout. A page that cannot be read at all
/// returns [`PageFault::Degraded`] when the rest of the document is still
/// usable, or [`PageFault::Io`] when the failure is environmental and a
/// retry may succeed.
pub trait PdfBackend: Send + Sync {
    /// Open the document and collect its metrics.
    ///
    /// Fails with [`ConvertError::Encrypted`] or [`ConvertError::Corrupted`]
    /// when the document cannot be opened.
    fn probe(&self, pdf: &Path) -> Result<ProbeData, ConvertError>;

    /// Embedded images of `page`.
    fn page_images(&self, pdf: &Path, page: usize) -> Result<PageImages, PageFault>;

    /// Text segments and drawn rectangles of `page`.
    fn page_layout(&self, pdf: &Path, page: usize) -> Result<PageLayout, PageFault>;
}
