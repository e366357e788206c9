//! [`PdfBackend`] over pdfium via `pdfium-render`.
//!
//! pdfium keeps thread-local state and is not safe to call from async code;
//! every method here is blocking and is invoked from `spawn_blocking`. Each
//! call binds the library and opens the document afresh, which keeps the
//! backend `Send + Sync` without sharing pdfium handles between threads.

use super::{DocumentInfo, PageImage, PageImages, PageLayout, PdfBackend, ProbeData, TextSegment};
use crate::error::{ConvertError, PageFault};
use crate::model::{BoundingBox, DocumentMetrics, FontSignature};
use pdfium_render::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Drawn rectangles smaller than this (points) are rules or decorations.
const MIN_BOX_WIDTH: f32 = 36.0;
const MIN_BOX_HEIGHT: f32 = 18.0;

#[derive(Debug, Clone, Default)]
pub struct PdfiumBackend {
    library_path: Option<PathBuf>,
}

impl PdfiumBackend {
    /// `library_path` may name the library file or its directory. When
    /// `None`, `PDFIUM_LIB_PATH`, the working directory and the system
    /// library are tried in that order.
    pub fn new(library_path: Option<PathBuf>) -> Self {
        Self { library_path }
    }

    fn bind(&self) -> Result<Pdfium, ConvertError> {
        let configured = self
            .library_path
            .clone()
            .or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));
        let bindings = match configured {
            Some(path) => {
                let lib = if path.is_dir() {
                    Pdfium::pdfium_platform_library_name_at_path(&path)
                } else {
                    path
                };
                debug!("Binding pdfium from {}", lib.display());
                Pdfium::bind_to_library(&lib)
            }
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| ConvertError::PdfiumBindingFailed(format!("{e:?}")))?;
        Ok(Pdfium::new(bindings))
    }

    fn page_fault(page: usize, detail: impl Into<String>) -> PageFault {
        PageFault::Io {
            page,
            detail: detail.into(),
        }
    }
}

fn open_error(pdf: &Path, e: PdfiumError) -> ConvertError {
    let detail = format!("{e:?}");
    if detail.contains("Password") || detail.contains("password") {
        ConvertError::Encrypted {
            path: pdf.to_path_buf(),
        }
    } else {
        ConvertError::Corrupted {
            path: pdf.to_path_buf(),
            detail,
        }
    }
}

impl PdfBackend for PdfiumBackend {
    fn probe(&self, pdf: &Path) -> Result<ProbeData, ConvertError> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_file(pdf, None)
            .map_err(|e| open_error(pdf, e))?;

        let pages = document.pages();
        let page_count = pages.len() as usize;
        info!("PDF loaded: {} pages", page_count);

        let mut counts: BTreeMap<FontSignature, usize> = BTreeMap::new();
        let mut image_count = 0;
        for (index, page) in pages.iter().enumerate() {
            match page.text() {
                Ok(text) => {
                    for segment in text.segments().iter() {
                        let chars = segment.text().chars().filter(|c| !c.is_whitespace()).count();
                        if chars == 0 {
                            continue;
                        }
                        let style = segment_style(&segment);
                        *counts
                            .entry(FontSignature::new(&style.font_name, style.size))
                            .or_insert(0) += chars;
                    }
                }
                Err(e) => warn!("Page {}: text layer unreadable during probe: {e:?}", index + 1),
            }
            image_count += page
                .objects()
                .iter()
                .filter(|o| o.object_type() == PdfPageObjectType::Image)
                .count();
        }

        let toc_entries = document.bookmarks().iter().count();
        debug!(
            "Probe: {} font signatures, {} images, {} bookmarks",
            counts.len(),
            image_count,
            toc_entries
        );

        let metadata = document.metadata();
        let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
            metadata.get(tag).and_then(|t| {
                let v = t.value().trim().to_string();
                if v.is_empty() {
                    None
                } else {
                    Some(v)
                }
            })
        };
        let info = DocumentInfo {
            title: get_meta(PdfDocumentMetadataTagType::Title),
            author: get_meta(PdfDocumentMetadataTagType::Author),
            subject: get_meta(PdfDocumentMetadataTagType::Subject),
            creator: get_meta(PdfDocumentMetadataTagType::Creator),
            producer: get_meta(PdfDocumentMetadataTagType::Producer),
            pdf_version: Some(format!("{:?}", document.version())),
        };

        Ok(ProbeData {
            metrics: DocumentMetrics::from_counts(page_count, counts, image_count, toc_entries),
            info,
        })
    }

    fn page_images(&self, pdf: &Path, page: usize) -> Result<PageImages, PageFault> {
        let pdfium = self.bind().map_err(|e| Self::page_fault(page, e.to_string()))?;
        let document = pdfium
            .load_pdf_from_file(pdf, None)
            .map_err(|e| Self::page_fault(page, format!("{e:?}")))?;
        let pdf_page = document
            .pages()
            .get(page.saturating_sub(1) as u16)
            .map_err(|e| PageFault::Degraded {
                page,
                detail: format!("{e:?}"),
            })?;

        let mut images = Vec::new();
        let mut failed = 0usize;
        for object in pdf_page.objects().iter() {
            let Some(image_object) = object.as_image_object() else {
                continue;
            };
            match image_object.get_raw_image() {
                Ok(image) => {
                    let bbox = object.bounds().ok().map(|q| to_bbox(q.to_rect()));
                    images.push(PageImage { image, bbox });
                }
                Err(e) => {
                    failed += 1;
                    warn!("Page {page}: image could not be decoded: {e:?}");
                }
            }
        }
        debug!("Page {page}: {} images", images.len());

        Ok(PageImages {
            page,
            images,
            degraded: (failed > 0).then(|| format!("{failed} image(s) could not be decoded")),
        })
    }

    fn page_layout(&self, pdf: &Path, page: usize) -> Result<PageLayout, PageFault> {
        let pdfium = self.bind().map_err(|e| Self::page_fault(page, e.to_string()))?;
        let document = pdfium
            .load_pdf_from_file(pdf, None)
            .map_err(|e| Self::page_fault(page, format!("{e:?}")))?;
        let pdf_page = document
            .pages()
            .get(page.saturating_sub(1) as u16)
            .map_err(|e| PageFault::Degraded {
                page,
                detail: format!("{e:?}"),
            })?;

        let text = pdf_page.text().map_err(|e| PageFault::Degraded {
            page,
            detail: format!("text layer unreadable: {e:?}"),
        })?;

        let mut segments = Vec::new();
        for segment in text.segments().iter() {
            let raw = segment.text();
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                continue;
            }
            let style = segment_style(&segment);
            segments.push(TextSegment {
                text: trimmed.to_string(),
                bbox: to_bbox(segment.bounds()),
                font_name: style.font_name,
                font_size: style.size,
                bold: style.bold,
                italic: style.italic,
            });
        }

        let boxes = pdf_page
            .objects()
            .iter()
            .filter(|o| o.object_type() == PdfPageObjectType::Path)
            .filter_map(|o| o.bounds().ok())
            .map(|q| to_bbox(q.to_rect()))
            .filter(|b| b.width() >= MIN_BOX_WIDTH && b.height() >= MIN_BOX_HEIGHT)
            .collect();

        Ok(PageLayout {
            page,
            width: pdf_page.width().value,
            height: pdf_page.height().value,
            segments,
            boxes,
            degraded: None,
        })
    }
}

fn to_bbox(rect: PdfRect) -> BoundingBox {
    BoundingBox::new(
        rect.left().value,
        rect.top().value,
        rect.right().value,
        rect.bottom().value,
    )
}

struct SegmentStyle {
    font_name: String,
    size: f32,
    bold: bool,
    italic: bool,
}

/// Style of a segment, taken from its first character.
fn segment_style(segment: &PdfPageTextSegment<'_>) -> SegmentStyle {
    let unknown = SegmentStyle {
        font_name: String::new(),
        size: 0.0,
        bold: false,
        italic: false,
    };
    let Ok(chars) = segment.chars() else {
        return unknown;
    };
    let Some(first) = chars.iter().next() else {
        return unknown;
    };

    let weight_is_bold = match first.font_weight() {
        Some(PdfFontWeight::Weight600)
        | Some(PdfFontWeight::Weight700Bold)
        | Some(PdfFontWeight::Weight800)
        | Some(PdfFontWeight::Weight900) => true,
        Some(PdfFontWeight::Custom(weight)) => weight >= 600,
        _ => false,
    };

    SegmentStyle {
        font_name: first.font_name(),
        size: first.scaled_font_size().value,
        bold: weight_is_bold || first.font_is_bold_reenforced(),
        italic: first.font_is_italic(),
    }
}
