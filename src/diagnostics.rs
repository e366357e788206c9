//! The `--diagnostics` bundle.
//!
//! Written to `<output-dir>/diagnostics/` after each invocation that drove
//! the pipeline. It only ever adds files there, so enabling it cannot change
//! any other output.

use crate::artifacts::{read_json, write_atomic, write_json, OutputLayout};
use crate::config::{ConversionConfig, ReviewMode};
use crate::error::ConvertError;
use crate::state::{ConversionState, Phase};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// One attempt of one phase as seen by this process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTiming {
    pub phase: Phase,
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub millis: u64,
    /// `succeeded`, `suspended`, `failed: <message>`.
    pub outcome: String,
}

/// The configuration values that influenced the run.
#[derive(Debug, Clone, Serialize)]
struct EffectiveConfig {
    output_root: PathBuf,
    active_pointer: PathBuf,
    concurrency: usize,
    max_attempts: u32,
    retry_backoff_ms: u64,
    max_degraded_ratio: f32,
    min_chars_per_page: usize,
    review_mode: ReviewMode,
    auto_confirm: bool,
    provenance_notice: Option<String>,
    pdfium_library_path: Option<PathBuf>,
    custom_backend: bool,
    custom_reviewer: bool,
}

impl From<&ConversionConfig> for EffectiveConfig {
    fn from(c: &ConversionConfig) -> Self {
        Self {
            output_root: c.output_root.clone(),
            active_pointer: c.active_pointer.clone(),
            concurrency: c.concurrency,
            max_attempts: c.max_attempts,
            retry_backoff_ms: c.retry_backoff_ms,
            max_degraded_ratio: c.max_degraded_ratio,
            min_chars_per_page: c.min_chars_per_page,
            review_mode: c.review_mode,
            auto_confirm: c.auto_confirm,
            provenance_notice: c.provenance_notice.clone(),
            pdfium_library_path: c.pdfium_library_path.clone(),
            custom_backend: c.backend.is_some(),
            custom_reviewer: c.reviewer.is_some(),
        }
    }
}

/// Write the bundle. Timings are appended to those of earlier invocations.
pub fn write_bundle(
    layout: &OutputLayout,
    state: &ConversionState,
    config: &ConversionConfig,
    timings: &[PhaseTiming],
) -> Result<(), ConvertError> {
    let dir = layout.diagnostics_dir();
    fs::create_dir_all(&dir).map_err(|e| ConvertError::io(&dir, e))?;

    write_json(&dir.join("state.json"), state)?;
    write_json(&dir.join("config.json"), &EffectiveConfig::from(config))?;

    let timings_path = dir.join("timings.json");
    let mut all: Vec<PhaseTiming> = match read_json(&timings_path) {
        Ok(previous) => previous,
        Err(ConvertError::ArtifactMissing { .. }) | Err(ConvertError::ArtifactCorrupt { .. }) => Vec::new(),
        Err(e) => return Err(e),
    };
    all.extend_from_slice(timings);
    write_json(&timings_path, &all)?;

    let artifacts = dir.join("pipeline");
    let mut copied = 0;
    if let Ok(entries) = fs::read_dir(layout.pipeline_dir()) {
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let bytes = fs::read(&path).map_err(|e| ConvertError::io(&path, e))?;
            write_atomic(&artifacts.join(entry.file_name()), &bytes)?;
            copied += 1;
        }
    }
    debug!("Diagnostics: {copied} artifacts copied to {}", dir.display());
    Ok(())
}
