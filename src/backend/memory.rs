//! An in-memory [`PdfBackend`] built from page fixtures.
//!
//! Used by the test-suite to drive every phase without a pdfium library, and
//! to inject the failures (encrypted input, flaky page reads, unreadable
//! pages) that are hard to produce with real documents.

use super::{DocumentInfo, PageImage, PageImages, PageLayout, PdfBackend, ProbeData, TextSegment};
use crate::error::{ConvertError, PageFault};
use crate::model::{BoundingBox, DocumentMetrics, FontSignature};
use image::DynamicImage;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Left margin used by [`MemoryPage::line`].
pub const LEFT_MARGIN: f32 = 72.0;

/// One fixture page.
#[derive(Debug, Clone, Default)]
pub struct MemoryPage {
    pub segments: Vec<TextSegment>,
    pub boxes: Vec<BoundingBox>,
    pub images: Vec<BoundingBox>,
    /// The whole page fails with a degraded fault.
    pub unreadable: bool,
}

impl MemoryPage {
    pub fn new() -> Self {
        Self::default()
    }

    /// A regular line at the left margin, `top` points from the page bottom.
    pub fn line(self, text: &str, font: &str, size: f32, top: f32) -> Self {
        self.styled(text, font, size, top, LEFT_MARGIN, false, false)
    }

    pub fn bold_line(self, text: &str, font: &str, size: f32, top: f32) -> Self {
        self.styled(text, font, size, top, LEFT_MARGIN, true, false)
    }

    pub fn italic_line_at(self, left: f32, text: &str, font: &str, size: f32, top: f32) -> Self {
        self.styled(text, font, size, top, left, false, true)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn styled(
        mut self,
        text: &str,
        font: &str,
        size: f32,
        top: f32,
        left: f32,
        bold: bool,
        italic: bool,
    ) -> Self {
        let width = text.chars().count() as f32 * size * 0.5;
        self.segments.push(TextSegment {
            text: text.to_string(),
            bbox: BoundingBox::new(left, top, left + width, top - size),
            font_name: font.to_string(),
            font_size: size,
            bold,
            italic,
        });
        self
    }

    /// A drawn rectangle (call-out border).
    pub fn boxed(mut self, bbox: BoundingBox) -> Self {
        self.boxes.push(bbox);
        self
    }

    /// An embedded image placed at `bbox`.
    pub fn image(mut self, bbox: BoundingBox) -> Self {
        self.images.push(bbox);
        self
    }

    pub fn unreadable(mut self) -> Self {
        self.unreadable = true;
        self
    }
}

/// Fixture-backed PDF.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    pages: Vec<MemoryPage>,
    toc_entries: usize,
    info: DocumentInfo,
    encrypted: bool,
    corrupted: bool,
    /// page → remaining layout reads that fail with an I/O fault.
    layout_failures: Mutex<HashMap<usize, usize>>,
    layout_calls: AtomicUsize,
    image_calls: AtomicUsize,
}

impl MemoryBackend {
    pub fn new(pages: Vec<MemoryPage>) -> Self {
        Self {
            pages,
            ..Self::default()
        }
    }

    pub fn with_toc(mut self, entries: usize) -> Self {
        self.toc_entries = entries;
        self
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.info.title = Some(title.to_string());
        self
    }

    pub fn encrypted(mut self) -> Self {
        self.encrypted = true;
        self
    }

    pub fn corrupted(mut self) -> Self {
        self.corrupted = true;
        self
    }

    /// The next `times` layout reads of `page` fail with [`PageFault::Io`].
    pub fn fail_layout(self, page: usize, times: usize) -> Self {
        if let Ok(mut failures) = self.layout_failures.lock() {
            failures.insert(page, times);
        }
        self
    }

    pub fn layout_calls(&self) -> usize {
        self.layout_calls.load(Ordering::SeqCst)
    }

    pub fn image_calls(&self) -> usize {
        self.image_calls.load(Ordering::SeqCst)
    }

    fn page(&self, page: usize) -> Result<&MemoryPage, PageFault> {
        let fixture = page
            .checked_sub(1)
            .and_then(|i| self.pages.get(i))
            .ok_or_else(|| PageFault::Degraded {
                page,
                detail: "page out of range".into(),
            })?;
        if fixture.unreadable {
            return Err(PageFault::Degraded {
                page,
                detail: "page content stream is unreadable".into(),
            });
        }
        Ok(fixture)
    }
}

impl PdfBackend for MemoryBackend {
    fn probe(&self, pdf: &Path) -> Result<ProbeData, ConvertError> {
        if self.encrypted {
            return Err(ConvertError::Encrypted {
                path: pdf.to_path_buf(),
            });
        }
        if self.corrupted {
            return Err(ConvertError::Corrupted {
                path: pdf.to_path_buf(),
                detail: "xref table not found".into(),
            });
        }
        let mut counts: BTreeMap<FontSignature, usize> = BTreeMap::new();
        for segment in self.pages.iter().filter(|p| !p.unreadable).flat_map(|p| &p.segments) {
            let chars = segment.text.chars().filter(|c| !c.is_whitespace()).count();
            if chars > 0 {
                *counts
                    .entry(FontSignature::new(&segment.font_name, segment.font_size))
                    .or_insert(0) += chars;
            }
        }
        let image_count = self.pages.iter().map(|p| p.images.len()).sum();
        Ok(ProbeData {
            metrics: DocumentMetrics::from_counts(
                self.pages.len(),
                counts,
                image_count,
                self.toc_entries,
            ),
            info: self.info.clone(),
        })
    }

    fn page_images(&self, _pdf: &Path, page: usize) -> Result<PageImages, PageFault> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        let fixture = self.page(page)?;
        let images = fixture
            .images
            .iter()
            .map(|bbox| PageImage {
                image: DynamicImage::new_rgb8(4, 4),
                bbox: Some(*bbox),
            })
            .collect();
        Ok(PageImages {
            page,
            images,
            degraded: None,
        })
    }

    fn page_layout(&self, _pdf: &Path, page: usize) -> Result<PageLayout, PageFault> {
        self.layout_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut failures) = self.layout_failures.lock() {
            if let Some(remaining) = failures.get_mut(&page) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(PageFault::Io {
                        page,
                        detail: "simulated read failure".into(),
                    });
                }
            }
        }
        let fixture = self.page(page)?;
        Ok(PageLayout {
            page,
            width: 612.0,
            height: 792.0,
            segments: fixture.segments.clone(),
            boxes: fixture.boxes.clone(),
            degraded: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> MemoryBackend {
        MemoryBackend::new(vec![
            MemoryPage::new()
                .line("Chapter One", "Title", 24.0, 700.0)
                .line("Body text here", "Body", 10.0, 650.0),
            MemoryPage::new()
                .line("More body", "Body", 10.0, 700.0)
                .image(BoundingBox::new(72.0, 600.0, 300.0, 400.0)),
        ])
        .with_toc(3)
    }

    #[test]
    fn probe_counts_fonts_and_images() {
        let data = doc().probe(Path::new("x.pdf")).unwrap();
        assert_eq!(data.metrics.page_count, 2);
        assert_eq!(data.metrics.image_count, 1);
        assert_eq!(data.metrics.fonts[0].font.face, "Body");
        assert_eq!(data.metrics.fonts[0].usage, 20);
        assert_eq!(data.metrics.toc_entries, 3);
    }

    #[test]
    fn encrypted_probe_fails() {
        let err = doc().encrypted().probe(Path::new("x.pdf")).unwrap_err();
        assert!(matches!(err, ConvertError::Encrypted { .. }));
    }

    #[test]
    fn injected_layout_failures_run_out() {
        let backend = doc().fail_layout(2, 2);
        let pdf = Path::new("x.pdf");
        assert!(matches!(backend.page_layout(pdf, 2), Err(PageFault::Io { .. })));
        assert!(matches!(backend.page_layout(pdf, 2), Err(PageFault::Io { .. })));
        assert!(backend.page_layout(pdf, 2).is_ok());
        assert!(backend.page_layout(pdf, 1).is_ok());
        assert_eq!(backend.layout_calls(), 4);
    }

    #[test]
    fn unreadable_page_is_degraded() {
        let backend = MemoryBackend::new(vec![MemoryPage::new().unreadable()]);
        let err = backend.page_layout(Path::new("x.pdf"), 1).unwrap_err();
        assert!(matches!(err, PageFault::Degraded { page: 1, .. }));
    }

    #[test]
    fn images_come_with_placement() {
        let images = doc().page_images(Path::new("x.pdf"), 2).unwrap();
        assert_eq!(images.images.len(), 1);
        assert!(images.images[0].bbox.is_some());
    }
}
