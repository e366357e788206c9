//! Document prober: the first and only full read of the PDF before the
//! operator decides whether to convert it.

use super::input::validate_pdf;
use crate::backend::{PdfBackend, ProbeData};
use crate::error::ConvertError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Validate `pdf`, open it through `backend` and collect its metrics.
///
/// Fails with an input error (not found, permission, corrupted, encrypted)
/// or with [`ConvertError::NoExtractableText`] when the text layer averages
/// fewer than `min_chars_per_page` non-whitespace characters per page.
pub async fn probe(
    pdf: &Path,
    backend: Arc<dyn PdfBackend>,
    min_chars_per_page: usize,
) -> Result<(PathBuf, ProbeData), ConvertError> {
    let path = validate_pdf(pdf)?;
    let probe_path = path.clone();
    let data = tokio::task::spawn_blocking(move || backend.probe(&probe_path))
        .await
        .map_err(|e| ConvertError::Internal(format!("Probe task panicked: {e}")))??;

    let metrics = &data.metrics;
    debug!(
        "Probe of {}: {} pages, {} chars, {} fonts",
        path.display(),
        metrics.page_count,
        metrics.char_count,
        metrics.fonts.len()
    );

    let required = min_chars_per_page * metrics.page_count;
    if metrics.page_count == 0 || metrics.char_count < required {
        return Err(ConvertError::NoExtractableText {
            path,
            chars: metrics.char_count,
            pages: metrics.page_count,
        });
    }

    info!(
        "Probed {}: {} pages, {} font signatures, {} images",
        path.display(),
        metrics.page_count,
        metrics.fonts.len(),
        metrics.image_count
    );
    Ok((path, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, MemoryPage};
    use tempfile::TempDir;

    fn pdf_file(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("doc.pdf");
        std::fs::write(&path, "%PDF-1.7\n").unwrap();
        path
    }

    #[tokio::test]
    async fn sparse_text_layer_is_rejected() {
        let dir = TempDir::new().unwrap();
        let pdf = pdf_file(&dir);
        let backend = MemoryBackend::new(vec![
            MemoryPage::new().line("p. 1", "Body", 10.0, 700.0),
            MemoryPage::new(),
        ]);
        let err = probe(&pdf, Arc::new(backend), 32).await.unwrap_err();
        match err {
            ConvertError::NoExtractableText { chars, pages, .. } => {
                assert_eq!(chars, 3);
                assert_eq!(pages, 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn encrypted_document_is_reported_as_such() {
        let dir = TempDir::new().unwrap();
        let pdf = pdf_file(&dir);
        let backend = MemoryBackend::new(vec![MemoryPage::new()]).encrypted();
        let err = probe(&pdf, Arc::new(backend), 32).await.unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }

    #[tokio::test]
    async fn dense_text_passes() {
        let dir = TempDir::new().unwrap();
        let pdf = pdf_file(&dir);
        let text = "The goblins wait in ambush beneath the old stone bridge.";
        let backend = MemoryBackend::new(vec![MemoryPage::new().line(text, "Body", 10.0, 700.0)]);
        let (path, data) = probe(&pdf, Arc::new(backend), 32).await.unwrap();
        assert!(path.is_absolute());
        assert_eq!(data.metrics.page_count, 1);
    }
}
