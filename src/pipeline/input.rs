//! Input validation: make sure the source path names a readable PDF before
//! pdfium ever sees it.
//!
//! pdfium gives poor diagnostics for missing or non-PDF files, so the magic
//! bytes (`%PDF`) are checked here and callers get a precise error instead.

use crate::error::ConvertError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Validate a local PDF path and return it in absolute form.
pub fn validate_pdf(path: &Path) -> Result<PathBuf, ConvertError> {
    if !path.exists() {
        return Err(ConvertError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    if path.is_dir() {
        return Err(ConvertError::Corrupted {
            path: path.to_path_buf(),
            detail: "path is a directory".into(),
        });
    }

    match std::fs::File::open(path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            match f.read_exact(&mut magic) {
                Ok(()) if &magic == b"%PDF" => {}
                Ok(()) => {
                    return Err(ConvertError::Corrupted {
                        path: path.to_path_buf(),
                        detail: format!("missing %PDF header (found {:02x?})", magic),
                    })
                }
                Err(_) => {
                    return Err(ConvertError::Corrupted {
                        path: path.to_path_buf(),
                        detail: "file is too short to be a PDF".into(),
                    })
                }
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ConvertError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(ConvertError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    }

    let absolute = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    debug!("Resolved local PDF: {}", absolute.display());
    Ok(absolute)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file() {
        let err = validate_pdf(Path::new("/definitely/not/here.pdf")).unwrap_err();
        assert!(matches!(err, ConvertError::FileNotFound { .. }));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn wrong_magic_is_corrupted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.pdf");
        std::fs::write(&path, "hello world").unwrap();
        let err = validate_pdf(&path).unwrap_err();
        assert!(matches!(err, ConvertError::Corrupted { .. }));
    }

    #[test]
    fn truncated_file_is_corrupted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tiny.pdf");
        std::fs::write(&path, "%P").unwrap();
        assert!(matches!(
            validate_pdf(&path),
            Err(ConvertError::Corrupted { .. })
        ));
    }

    #[test]
    fn valid_header_resolves_to_absolute_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ok.pdf");
        std::fs::write(&path, "%PDF-1.7\n").unwrap();
        let resolved = validate_pdf(&path).unwrap();
        assert!(resolved.is_absolute());
    }
}
