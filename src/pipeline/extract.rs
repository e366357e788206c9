//! Per-page extraction (phases 2 and 3).
//!
//! Pages are independent, so both phases fan out over a bounded pool:
//! `buffer_unordered` over `spawn_blocking` tasks, at most `concurrency` at a
//! time. Each page writes its own artifact under `.pipeline/pages/` before it
//! is reported back, and the caller records the page as a completed step as
//! soon as it arrives. Completion order is therefore irrelevant: everything
//! downstream reads the per-page artifacts back in page order.

use crate::artifacts::{read_json, write_atomic, write_json, OutputLayout};
use crate::backend::{PageLayout, PdfBackend};
use crate::error::{ConvertError, PageFault};
use crate::model::ImageRef;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// Phase-2 artifact: the images written for one page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageImagesArtifact {
    pub page: usize,
    pub images: Vec<ImageRef>,
    pub degraded: Option<String>,
}

/// What a page contributed, as reported to the step callback.
#[derive(Debug, Clone, PartialEq)]
pub struct PageOutcome {
    pub page: usize,
    pub degraded: Option<String>,
}

/// Shared inputs of the extraction phases.
#[derive(Clone)]
pub struct Extractor {
    pub pdf: PathBuf,
    pub backend: Arc<dyn PdfBackend>,
    pub layout: OutputLayout,
    pub concurrency: usize,
}

impl Extractor {
    /// Phase 2: write the embedded images of `pages` (1-based).
    pub async fn extract_images<F>(&self, pages: Vec<usize>, on_page: F) -> Result<(), ConvertError>
    where
        F: FnMut(PageOutcome) -> Result<(), ConvertError>,
    {
        let this = self.clone();
        self.fan_out(pages, on_page, move |page| this.images_blocking(page))
            .await
    }

    /// Phase 3: write the text layer of `pages` (1-based).
    pub async fn extract_layout<F>(&self, pages: Vec<usize>, on_page: F) -> Result<(), ConvertError>
    where
        F: FnMut(PageOutcome) -> Result<(), ConvertError>,
    {
        let this = self.clone();
        self.fan_out(pages, on_page, move |page| this.layout_blocking(page))
            .await
    }

    async fn fan_out<W, F>(&self, pages: Vec<usize>, mut on_page: F, work: W) -> Result<(), ConvertError>
    where
        W: Fn(usize) -> Result<PageOutcome, ConvertError> + Clone + Send + 'static,
        F: FnMut(PageOutcome) -> Result<(), ConvertError>,
    {
        let mut results = stream::iter(pages.into_iter().map(|page| {
            let work = work.clone();
            async move {
                tokio::task::spawn_blocking(move || work(page))
                    .await
                    .map_err(|e| ConvertError::Internal(format!("Page {page} task panicked: {e}")))?
            }
        }))
        .buffer_unordered(self.concurrency.max(1));

        while let Some(result) = results.next().await {
            on_page(result?)?;
        }
        Ok(())
    }

    fn images_blocking(&self, page: usize) -> Result<PageOutcome, ConvertError> {
        let artifact = match self.backend.page_images(&self.pdf, page) {
            Ok(found) => {
                let mut images = Vec::with_capacity(found.images.len());
                for (i, img) in found.images.iter().enumerate() {
                    let (rel, abs) = self.layout.image_file(page, i + 1);
                    let mut buf = Vec::new();
                    img.image
                        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
                        .map_err(|e| ConvertError::PageIo {
                            page,
                            detail: format!("PNG encoding failed: {e}"),
                        })?;
                    write_atomic(&abs, &buf)?;
                    images.push(ImageRef {
                        file: rel,
                        page,
                        sequence: i + 1,
                        bbox: img.bbox,
                    });
                }
                debug!("Page {page}: wrote {} images", images.len());
                PageImagesArtifact {
                    page,
                    images,
                    degraded: found.degraded,
                }
            }
            Err(PageFault::Degraded { detail, .. }) => {
                warn!("Page {page}: images degraded: {detail}");
                PageImagesArtifact {
                    page,
                    images: Vec::new(),
                    degraded: Some(detail),
                }
            }
            Err(PageFault::Io { detail, .. }) => return Err(ConvertError::PageIo { page, detail }),
        };
        write_json(&self.layout.page_images(page), &artifact)?;
        Ok(PageOutcome {
            page,
            degraded: artifact.degraded,
        })
    }

    fn layout_blocking(&self, page: usize) -> Result<PageOutcome, ConvertError> {
        let artifact = match self.backend.page_layout(&self.pdf, page) {
            Ok(layout) => {
                debug!(
                    "Page {page}: {} segments, {} boxes",
                    layout.segments.len(),
                    layout.boxes.len()
                );
                layout
            }
            Err(PageFault::Degraded { detail, .. }) => {
                warn!("Page {page}: text degraded: {detail}");
                PageLayout {
                    page,
                    degraded: Some(detail),
                    ..PageLayout::default()
                }
            }
            Err(PageFault::Io { detail, .. }) => return Err(ConvertError::PageIo { page, detail }),
        };
        write_json(&self.layout.page_layout(page), &artifact)?;
        Ok(PageOutcome {
            page,
            degraded: artifact.degraded,
        })
    }
}

/// Read every phase-2 artifact back in page order.
pub fn load_images(layout: &OutputLayout, page_count: usize) -> Result<Vec<PageImagesArtifact>, ConvertError> {
    (1..=page_count)
        .map(|page| read_json(&layout.page_images(page)))
        .collect()
}

/// Read every phase-3 artifact back in page order.
pub fn load_layouts(layout: &OutputLayout, page_count: usize) -> Result<Vec<PageLayout>, ConvertError> {
    (1..=page_count)
        .map(|page| read_json(&layout.page_layout(page)))
        .collect()
}

/// Fail when more than `max_ratio` of `total` pages are degraded.
pub fn check_degraded(degraded: usize, total: usize, max_ratio: f32) -> Result<(), ConvertError> {
    if total > 0 && degraded as f32 > max_ratio * total as f32 {
        return Err(ConvertError::TooManyDegradedPages {
            degraded,
            total,
            limit_pct: (max_ratio * 100.0).round() as u32,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, MemoryPage};
    use crate::model::BoundingBox;
    use tempfile::TempDir;

    fn extractor(dir: &TempDir, backend: MemoryBackend, concurrency: usize) -> Extractor {
        Extractor {
            pdf: dir.path().join("doc.pdf"),
            backend: Arc::new(backend),
            layout: OutputLayout::new(dir.path(), "doc"),
            concurrency,
        }
    }

    fn pages(n: usize) -> Vec<MemoryPage> {
        (1..=n)
            .map(|i| {
                MemoryPage::new()
                    .line(&format!("Page {i} text"), "Body", 10.0, 700.0)
                    .image(BoundingBox::new(72.0, 500.0, 200.0, 400.0))
            })
            .collect()
    }

    #[tokio::test]
    async fn images_are_written_per_page() {
        let dir = TempDir::new().unwrap();
        let ex = extractor(&dir, MemoryBackend::new(pages(3)), 2);
        let mut seen = Vec::new();
        ex.extract_images(vec![1, 2, 3], |o| {
            seen.push(o.page);
            Ok(())
        })
        .await
        .unwrap();
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 2, 3]);
        assert!(dir.path().join("images/page-0002-01.png").exists());
        let loaded = load_images(&ex.layout, 3).unwrap();
        assert_eq!(loaded[1].images[0].file, "images/page-0002-01.png");
    }

    #[tokio::test]
    async fn layout_artifacts_load_in_page_order() {
        let dir = TempDir::new().unwrap();
        let ex = extractor(&dir, MemoryBackend::new(pages(5)), 4);
        ex.extract_layout(vec![5, 3, 1, 2, 4], |_| Ok(())).await.unwrap();
        let loaded = load_layouts(&ex.layout, 5).unwrap();
        let order: Vec<usize> = loaded.iter().map(|l| l.page).collect();
        assert_eq!(order, vec![1, 2, 3, 4, 5]);
        assert_eq!(loaded[2].segments[0].text, "Page 3 text");
    }

    #[tokio::test]
    async fn io_fault_fails_and_degraded_is_recorded() {
        let dir = TempDir::new().unwrap();
        let mut fixture = pages(3);
        fixture[2] = MemoryPage::new().unreadable();
        let backend = MemoryBackend::new(fixture).fail_layout(2, 1);
        let ex = extractor(&dir, backend, 1);

        let mut done = Vec::new();
        let err = ex
            .extract_layout(vec![1, 2, 3], |o| {
                done.push(o);
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::PageIo { page: 2, .. }));
        assert_eq!(done[0].page, 1);

        let mut degraded = Vec::new();
        ex.extract_layout(vec![2, 3], |o| {
            degraded.extend(o.degraded);
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(degraded.len(), 1);
    }

    #[test]
    fn degraded_ratio() {
        assert!(check_degraded(2, 10, 0.25).is_ok());
        assert!(check_degraded(3, 10, 0.25).is_err());
        assert!(check_degraded(0, 0, 0.0).is_ok());
        let err = check_degraded(4, 8, 0.25).unwrap_err();
        assert!(err.to_string().contains("limit is 25%"));
    }
}
