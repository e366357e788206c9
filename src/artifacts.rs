//! On-disk layout of an output directory and the helpers that touch it.
//!
//! Every file a phase produces is written through [`write_atomic`]: the bytes
//! go to a temporary file in the same directory which is then renamed over
//! the target, so a crash never leaves a half-written artifact behind.
//!
//! ```text
//! <output-dir>/
//!   .state.json  .state.lock  metadata.json
//!   <name>-final.md  conversion-report.md  review-checklist.md
//!   images/page-0003-01.png
//!   .pipeline/  (intermediate artifacts, one file per phase or page)
//!   diagnostics/  (only with --diagnostics)
//! ```

use crate::error::ConvertError;
use crate::state::ConversionState;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind as IoErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const STATE_FILE: &str = ".state.json";
pub const LOCK_FILE: &str = ".state.lock";

// ── Layout ───────────────────────────────────────────────────────────────

/// Paths of every artifact in one output directory.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
    name: String,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            name: name.into(),
        }
    }

    pub fn for_state(state: &ConversionState) -> Self {
        Self::new(&state.output_dir, &state.name)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state_file(&self) -> PathBuf {
        self.root.join(STATE_FILE)
    }

    pub fn metadata(&self) -> PathBuf {
        self.root.join("metadata.json")
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join("images")
    }

    /// Relative and absolute path of the `sequence`-th image on `page`.
    pub fn image_file(&self, page: usize, sequence: usize) -> (String, PathBuf) {
        let rel = format!("images/page-{page:04}-{sequence:02}.png");
        let abs = self.root.join(&rel);
        (rel, abs)
    }

    pub fn final_markdown(&self) -> PathBuf {
        self.root.join(format!("{}-final.md", self.name))
    }

    pub fn report(&self) -> PathBuf {
        self.root.join("conversion-report.md")
    }

    pub fn checklist(&self) -> PathBuf {
        self.root.join("review-checklist.md")
    }

    pub fn pipeline_dir(&self) -> PathBuf {
        self.root.join(".pipeline")
    }

    pub fn pages_dir(&self) -> PathBuf {
        self.pipeline_dir().join("pages")
    }

    pub fn source_fingerprint(&self) -> PathBuf {
        self.pipeline_dir().join("source.json")
    }

    pub fn preflight(&self) -> PathBuf {
        self.pipeline_dir().join("preflight.json")
    }

    pub fn page_images(&self, page: usize) -> PathBuf {
        self.pages_dir().join(format!("page-{page:04}.images.json"))
    }

    pub fn page_layout(&self, page: usize) -> PathBuf {
        self.pages_dir().join(format!("page-{page:04}.layout.json"))
    }

    pub fn spans(&self) -> PathBuf {
        self.pipeline_dir().join("spans.json")
    }

    pub fn font_inventory(&self) -> PathBuf {
        self.pipeline_dir().join("font-inventory.json")
    }

    pub fn font_proposal(&self) -> PathBuf {
        self.pipeline_dir().join("font-proposal.json")
    }

    pub fn font_mapping(&self) -> PathBuf {
        self.pipeline_dir().join("font-mapping.json")
    }

    pub fn skeleton(&self) -> PathBuf {
        self.pipeline_dir().join("skeleton.json")
    }

    pub fn skeleton_markdown(&self) -> PathBuf {
        self.pipeline_dir().join("skeleton.md")
    }

    pub fn issues(&self) -> PathBuf {
        self.pipeline_dir().join("issues.json")
    }

    pub fn revised(&self) -> PathBuf {
        self.pipeline_dir().join("revised.md")
    }

    pub fn diagnostics_dir(&self) -> PathBuf {
        self.root.join("diagnostics")
    }
}

// ── Atomic I/O ───────────────────────────────────────────────────────────

/// Write `bytes` to `path` via a same-directory temp file and rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ConvertError> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(parent).map_err(|e| ConvertError::io(parent, e))?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| ConvertError::io(parent, e))?;
    tmp.write_all(bytes).map_err(|e| ConvertError::io(path, e))?;
    tmp.as_file().sync_all().map_err(|e| ConvertError::io(path, e))?;
    tmp.persist(path).map_err(|e| ConvertError::io(path, e.error))?;
    Ok(())
}

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), ConvertError> {
    let mut json = serde_json::to_vec_pretty(value)
        .map_err(|e| ConvertError::Internal(format!("serialising {}: {e}", path.display())))?;
    json.push(b'\n');
    write_atomic(path, &json)
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConvertError> {
    let bytes = read_bytes(path)?;
    serde_json::from_slice(&bytes).map_err(|e| ConvertError::ArtifactCorrupt {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

pub fn read_text(path: &Path) -> Result<String, ConvertError> {
    let bytes = read_bytes(path)?;
    String::from_utf8(bytes).map_err(|e| ConvertError::ArtifactCorrupt {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, ConvertError> {
    fs::read(path).map_err(|e| match e.kind() {
        IoErrorKind::NotFound => ConvertError::ArtifactMissing {
            path: path.to_path_buf(),
        },
        _ => ConvertError::io(path, e),
    })
}

// ── State persistence ────────────────────────────────────────────────────

pub fn save_state(state: &ConversionState) -> Result<(), ConvertError> {
    if let Err(detail) = state.validate() {
        return Err(ConvertError::Internal(format!(
            "refusing to save inconsistent state: {detail}"
        )));
    }
    write_json(&OutputLayout::for_state(state).state_file(), state)
}

pub fn load_state(dir: &Path) -> Result<ConversionState, ConvertError> {
    let path = dir.join(STATE_FILE);
    let state: ConversionState = match read_json(&path) {
        Ok(s) => s,
        Err(ConvertError::ArtifactMissing { .. }) => {
            return Err(ConvertError::StateMissing {
                dir: dir.to_path_buf(),
            })
        }
        Err(ConvertError::ArtifactCorrupt { path, detail }) => {
            return Err(ConvertError::StateCorrupt { path, detail })
        }
        Err(e) => return Err(e),
    };
    state
        .validate()
        .map_err(|detail| ConvertError::StateCorrupt { path, detail })?;
    Ok(state)
}

// ── Single-writer lock ───────────────────────────────────────────────────

/// Advisory lock held while a process mutates an output directory.
///
/// The lock file holds the owner's pid. A lock whose owner no longer exists
/// is treated as stale and taken over. Released on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(dir: &Path) -> Result<RunLock, ConvertError> {
        fs::create_dir_all(dir).map_err(|e| ConvertError::io(dir, e))?;
        let path = dir.join(LOCK_FILE);
        for _ in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    write!(file, "{}", std::process::id()).map_err(|e| ConvertError::io(&path, e))?;
                    debug!("Acquired run lock {}", path.display());
                    return Ok(RunLock { path });
                }
                Err(e) if e.kind() == IoErrorKind::AlreadyExists => {
                    let pid = read_lock_pid(&path);
                    match pid {
                        Some(pid) if !process_alive(pid) => {
                            warn!("Removing stale lock {} left by pid {pid}", path.display());
                            fs::remove_file(&path).map_err(|e| ConvertError::io(&path, e))?;
                        }
                        _ => {
                            return Err(ConvertError::ConcurrentRun {
                                dir: dir.to_path_buf(),
                                pid: pid.unwrap_or(0),
                            })
                        }
                    }
                }
                Err(e) => return Err(ConvertError::io(&path, e)),
            }
        }
        Err(ConvertError::ConcurrentRun {
            dir: dir.to_path_buf(),
            pid: read_lock_pid(&path).unwrap_or(0),
        })
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to release lock {}: {e}", self.path.display());
        }
    }
}

fn read_lock_pid(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(all(unix, not(target_os = "linux")))]
fn process_alive(pid: u32) -> bool {
    // `kill -0` sends no signal and fails when no such process exists.
    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map_or(true, |status| status.success())
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    true
}

// ── Active-conversion pointer ────────────────────────────────────────────

/// The most recently started conversion, used when `--resume`/`--status`
/// get no directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivePointer {
    pub output_dir: PathBuf,
    pub source_pdf: PathBuf,
}

impl ActivePointer {
    pub fn write(pointer: &Path, state: &ConversionState) -> Result<(), ConvertError> {
        let dir = fs::canonicalize(&state.output_dir).unwrap_or_else(|_| state.output_dir.clone());
        write_json(
            pointer,
            &ActivePointer {
                output_dir: dir,
                source_pdf: state.source_pdf.clone(),
            },
        )
    }

    pub fn read(pointer: &Path) -> Result<ActivePointer, ConvertError> {
        match read_json(pointer) {
            Ok(p) => Ok(p),
            Err(ConvertError::ArtifactMissing { .. }) => Err(ConvertError::NoActiveConversion {
                pointer: pointer.to_path_buf(),
            }),
            Err(e) => Err(e),
        }
    }
}

/// Resolve an explicit directory or fall back to the active pointer.
pub fn resolve_output_dir(explicit: Option<&Path>, pointer: &Path) -> Result<PathBuf, ConvertError> {
    match explicit {
        Some(dir) => Ok(dir.to_path_buf()),
        None => Ok(ActivePointer::read(pointer)?.output_dir),
    }
}

// ── Source fingerprint ───────────────────────────────────────────────────

/// Identity of the source PDF recorded by phase 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFingerprint {
    pub sha256: String,
    pub bytes: u64,
}

impl SourceFingerprint {
    pub fn of(path: &Path) -> Result<SourceFingerprint, ConvertError> {
        let mut file = fs::File::open(path).map_err(|e| match e.kind() {
            IoErrorKind::NotFound => ConvertError::FileNotFound {
                path: path.to_path_buf(),
            },
            IoErrorKind::PermissionDenied => ConvertError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => ConvertError::io(path, e),
        })?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; 64 * 1024];
        let mut bytes = 0u64;
        loop {
            let n = file.read(&mut buf).map_err(|e| ConvertError::io(path, e))?;
            if n == 0 {
                break;
            }
            bytes += n as u64;
            hasher.update(&buf[..n]);
        }
        let digest = hasher.finalize();
        let sha256 = digest.iter().map(|b| format!("{b:02x}")).collect();
        Ok(SourceFingerprint { sha256, bytes })
    }
}

/// Derive the output name from a PDF path: `Lost Mine (v2).pdf` → `lost-mine-v2`.
pub fn output_name(pdf: &Path) -> String {
    let stem = pdf
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let mut name = String::with_capacity(stem.len());
    for c in stem.chars() {
        if c.is_alphanumeric() {
            name.extend(c.to_lowercase());
        } else if !name.ends_with('-') && !name.is_empty() {
            name.push('-');
        }
    }
    let name = name.trim_end_matches('-').to_string();
    if name.is_empty() {
        "document".to_string()
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReviewMode;
    use tempfile::TempDir;

    #[test]
    fn output_name_slugifies_stem() {
        assert_eq!(output_name(Path::new("/x/Lost Mine (v2).pdf")), "lost-mine-v2");
        assert_eq!(output_name(Path::new("---.pdf")), "document");
        assert_eq!(output_name(Path::new("module.pdf")), "module");
    }

    #[test]
    fn layout_paths() {
        let l = OutputLayout::new("/out", "mod");
        assert_eq!(l.final_markdown(), PathBuf::from("/out/mod-final.md"));
        assert_eq!(l.page_layout(3), PathBuf::from("/out/.pipeline/pages/page-0003.layout.json"));
        let (rel, abs) = l.image_file(12, 2);
        assert_eq!(rel, "images/page-0012-02.png");
        assert_eq!(abs, PathBuf::from("/out/images/page-0012-02.png"));
    }

    #[test]
    fn atomic_write_replaces_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/a.txt");
        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "two");
        let leftovers = fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn missing_and_corrupt_artifacts_are_distinguished() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.json");
        assert!(matches!(
            read_json::<Vec<u32>>(&path),
            Err(ConvertError::ArtifactMissing { .. })
        ));
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            read_json::<Vec<u32>>(&path),
            Err(ConvertError::ArtifactCorrupt { .. })
        ));
    }

    #[test]
    fn state_roundtrip_and_missing_state() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            load_state(dir.path()),
            Err(ConvertError::StateMissing { .. })
        ));
        let state = ConversionState::new("a.pdf", dir.path(), "a", ReviewMode::Checklist, false);
        save_state(&state).unwrap();
        assert_eq!(load_state(dir.path()).unwrap(), state);
    }

    #[test]
    fn corrupt_state_is_reported() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(STATE_FILE), "[]").unwrap();
        assert!(matches!(
            load_state(dir.path()),
            Err(ConvertError::StateCorrupt { .. })
        ));
    }

    #[test]
    fn second_lock_is_refused_until_first_drops() {
        let dir = TempDir::new().unwrap();
        let first = RunLock::acquire(dir.path()).unwrap();
        match RunLock::acquire(dir.path()) {
            Err(ConvertError::ConcurrentRun { pid, .. }) => assert_eq!(pid, std::process::id()),
            other => panic!("expected ConcurrentRun, got {other:?}"),
        }
        drop(first);
        assert!(RunLock::acquire(dir.path()).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn stale_lock_is_taken_over() {
        let dir = TempDir::new().unwrap();
        // Above pid_max on Linux (2^22) and macOS (99998), so never alive.
        fs::write(dir.path().join(LOCK_FILE), "99999999").unwrap();
        let lock = RunLock::acquire(dir.path()).unwrap();
        let owner = fs::read_to_string(dir.path().join(LOCK_FILE)).unwrap();
        assert_eq!(owner, std::process::id().to_string());
        drop(lock);
    }

    #[test]
    fn active_pointer_roundtrip() {
        let dir = TempDir::new().unwrap();
        let pointer = dir.path().join(".gmkit/active-conversion.json");
        assert!(matches!(
            resolve_output_dir(None, &pointer),
            Err(ConvertError::NoActiveConversion { .. })
        ));
        let state = ConversionState::new("a.pdf", dir.path(), "a", ReviewMode::Interactive, false);
        ActivePointer::write(&pointer, &state).unwrap();
        let resolved = resolve_output_dir(None, &pointer).unwrap();
        assert_eq!(resolved, fs::canonicalize(dir.path()).unwrap());
        assert_eq!(
            resolve_output_dir(Some(Path::new("/elsewhere")), &pointer).unwrap(),
            PathBuf::from("/elsewhere")
        );
    }

    #[test]
    fn fingerprint_changes_with_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.pdf");
        fs::write(&path, b"%PDF-1.7 one").unwrap();
        let a = SourceFingerprint::of(&path).unwrap();
        fs::write(&path, b"%PDF-1.7 two").unwrap();
        let b = SourceFingerprint::of(&path).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.sha256.len(), 64);
        assert!(matches!(
            SourceFingerprint::of(&dir.path().join("none.pdf")),
            Err(ConvertError::FileNotFound { .. })
        ));
    }
}
