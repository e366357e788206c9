//! The Conversion State Manager: entry points and the phase driver.
//!
//! Every mutating entry point ([`convert`], [`resume`], [`rerun_phase`],
//! [`rerun_from_step`]) takes the single-writer lock, brings the persisted
//! [`ConversionState`] up to date and then drives phases in order until the
//! run completes, suspends at the checklist checkpoint or fails.
//!
//! The descriptor is saved after every transition: phase start, each
//! completed step, success, failure. Dropping the future at any `.await`
//! (Ctrl-C in the CLI) therefore leaves the run at its last step boundary;
//! the next writer finds the phase `running` and resets it to `pending`.

use crate::artifacts::{
    load_state, output_name, read_json, read_text, resolve_output_dir, save_state, write_atomic,
    write_json, ActivePointer, OutputLayout, RunLock, SourceFingerprint, STATE_FILE,
};
use crate::backend::{PdfBackend, PdfiumBackend};
use crate::checkpoint::{AutoApprove, GateDecision, MappingDecision, Reviewer};
use crate::config::{ConversionConfig, ReviewMode};
use crate::diagnostics::{self, PhaseTiming};
use crate::error::ConvertError;
use crate::model::{ExtractedPage, FontMapping, FontRole};
use crate::pipeline::assess::{assess, PreflightReport};
use crate::pipeline::extract::{check_degraded, load_images, load_layouts, Extractor, PageOutcome};
use crate::pipeline::fonts::{propose_mapping, unmapped, FontInventory, MAX_HEADING_LEVEL};
use crate::pipeline::headings::Skeleton;
use crate::pipeline::lint::lint;
use crate::pipeline::report::{self, ReportInput};
use crate::pipeline::review::{parse_checklist, render_checklist, render_revised, revise, IssueLog};
use crate::pipeline::{probe, segment};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::state::{ConversionState, FailureVerdict, Phase, PhaseStatus, StepRef};
use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How an invocation ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// All eleven phases succeeded.
    Complete {
        output_dir: PathBuf,
        final_markdown: PathBuf,
        report: PathBuf,
        /// Pages recorded as degraded, in page order.
        degraded_pages: Vec<usize>,
        /// Issues found (and resolved) in phase 9.
        issues: usize,
    },
    /// The operator declined at the pre-flight gate. Nothing was written.
    Aborted,
    /// Phase 9 is waiting for the annotated checklist.
    AwaitingChecklist {
        output_dir: PathBuf,
        checklist: PathBuf,
        /// Annotation problems found on this resume; empty on first suspension.
        problems: Vec<String>,
    },
}

// ── Entry points ─────────────────────────────────────────────────────────

/// Start a new conversion of `pdf`.
///
/// Phase 0 runs in memory; the output directory is only created once the
/// reviewer proceeds at the gate.
///
/// # Errors
/// Input and content errors from the probe, [`ConvertError::RunExists`] when
/// the output directory already holds a run, and any phase error that
/// exhausted its retries.
pub async fn convert(pdf: impl AsRef<Path>, config: &ConversionConfig) -> Result<RunOutcome, ConvertError> {
    let pdf = pdf.as_ref();
    let name = output_name(pdf);
    let dir = config
        .output_dir
        .clone()
        .unwrap_or_else(|| config.output_root.join(&name));
    if dir.join(STATE_FILE).exists() {
        return Err(ConvertError::RunExists { dir });
    }
    info!("Starting conversion: {}", pdf.display());

    let backend = backend_for(config);
    let progress = progress_for(config);
    progress.on_phase_start(Phase::Preflight, 1);
    let report = preflight(pdf, config, Arc::clone(&backend)).await?;
    if gate(&report, config, &progress).await? == GateDecision::Abort {
        info!("Conversion aborted at the pre-flight gate");
        return Ok(RunOutcome::Aborted);
    }

    let lock = RunLock::acquire(&dir)?;
    let dir = fs::canonicalize(&dir).unwrap_or(dir);
    if dir.join(STATE_FILE).exists() {
        return Err(ConvertError::RunExists { dir });
    }
    let state = ConversionState::new(
        report.source.clone(),
        dir,
        name,
        config.review_mode,
        config.diagnostics,
    );
    let mut run = Run::open(lock, state, config, backend, progress);
    run.record_preflight(&report)?;
    run.drive().await
}

/// Continue the run in `dir` (or the active conversion) from where it stopped.
///
/// A failed phase gets a fresh retry window; a phase left `running` by an
/// interrupted process restarts at its first unfinished step.
pub async fn resume(dir: Option<&Path>, config: &ConversionConfig) -> Result<RunOutcome, ConvertError> {
    let dir = resolve_output_dir(dir, &config.active_pointer)?;
    let (lock, mut state) = lock_existing(&dir)?;
    if let Some(phase) = state.recover_interrupted() {
        warn!("Phase {phase} was interrupted; resuming at step {}", state.current_step);
    }
    if let Some(phase) = state.retry_failed() {
        info!("Retrying failed phase {phase}");
    }
    let mut run = Run::open(lock, state, config, backend_for(config), progress_for(config));
    run.verify_source()?;
    run.save()?;
    run.drive().await
}

/// `--phase N`: re-run phase `phase` and everything after it.
///
/// Phase 0 re-runs the pre-flight gate and replaces the descriptor.
pub async fn rerun_phase(
    dir: Option<&Path>,
    phase: Phase,
    config: &ConversionConfig,
) -> Result<RunOutcome, ConvertError> {
    let dir = resolve_output_dir(dir, &config.active_pointer)?;
    let (lock, mut state) = lock_existing(&dir)?;
    state.recover_interrupted();
    let backend = backend_for(config);
    let progress = progress_for(config);

    if phase == Phase::Preflight {
        progress.on_phase_start(Phase::Preflight, 1);
        let report = preflight(&state.source_pdf, config, Arc::clone(&backend)).await?;
        if gate(&report, config, &progress).await? == GateDecision::Abort {
            info!("Re-run aborted at the pre-flight gate; descriptor unchanged");
            return Ok(RunOutcome::Aborted);
        }
        let fresh = ConversionState::new(
            report.source.clone(),
            state.output_dir.clone(),
            state.name.clone(),
            state.review_mode,
            state.diagnostics,
        );
        let mut run = Run::open(lock, fresh, config, backend, progress);
        run.record_preflight(&report)?;
        return run.drive().await;
    }

    state.rerun_phase(phase)?;
    info!("Re-running from phase {phase}");
    let mut run = Run::open(lock, state, config, backend, progress);
    run.verify_source()?;
    run.save()?;
    run.drive().await
}

/// `--from-step N.S`: re-enter a multi-step phase at step S.
pub async fn rerun_from_step(
    dir: Option<&Path>,
    at: StepRef,
    config: &ConversionConfig,
) -> Result<RunOutcome, ConvertError> {
    if at.phase == Phase::Preflight {
        if at.step != 1 {
            return Err(ConvertError::InvalidStep {
                step: at.to_string(),
                reason: format!("phase {} has no internal steps", at.phase),
            });
        }
        return rerun_phase(dir, Phase::Preflight, config).await;
    }
    let dir = resolve_output_dir(dir, &config.active_pointer)?;
    let (lock, mut state) = lock_existing(&dir)?;
    state.recover_interrupted();
    state.rerun_from_step(at)?;
    info!("Re-entering at step {at}");
    let mut run = Run::open(lock, state, config, backend_for(config), progress_for(config));
    run.verify_source()?;
    run.save()?;
    run.drive().await
}

/// Read the descriptor of `dir` (or the active conversion). Never locks.
pub fn status(dir: Option<&Path>, config: &ConversionConfig) -> Result<ConversionState, ConvertError> {
    let dir = resolve_output_dir(dir, &config.active_pointer)?;
    load_state(&dir)
}

/// Run phase 0 without the gate and without touching the disk.
pub async fn inspect(pdf: impl AsRef<Path>, config: &ConversionConfig) -> Result<PreflightReport, ConvertError> {
    preflight(pdf.as_ref(), config, backend_for(config)).await
}

// ── Collaborators ────────────────────────────────────────────────────────

fn backend_for(config: &ConversionConfig) -> Arc<dyn PdfBackend> {
    match config.backend {
        Some(ref backend) => Arc::clone(backend),
        None => Arc::new(PdfiumBackend::new(config.pdfium_library_path.clone())),
    }
}

fn progress_for(config: &ConversionConfig) -> ProgressCallback {
    config
        .progress_callback
        .clone()
        .unwrap_or_else(|| Arc::new(NoopProgressCallback))
}

fn reviewer_for(config: &ConversionConfig, checkpoint: &'static str) -> Result<Arc<dyn Reviewer>, ConvertError> {
    if config.auto_confirm {
        return Ok(Arc::new(AutoApprove));
    }
    config
        .reviewer
        .clone()
        .ok_or(ConvertError::ReviewerRequired { checkpoint })
}

/// Reviewer calls block on a human; keep them off the async workers.
async fn ask<T, F>(reviewer: Arc<dyn Reviewer>, question: F) -> Result<T, ConvertError>
where
    T: Send + 'static,
    F: FnOnce(&dyn Reviewer) -> Result<T, ConvertError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || question(reviewer.as_ref()))
        .await
        .map_err(|e| ConvertError::Internal(format!("Reviewer task panicked: {e}")))?
}

async fn preflight(
    pdf: &Path,
    config: &ConversionConfig,
    backend: Arc<dyn PdfBackend>,
) -> Result<PreflightReport, ConvertError> {
    let (source, data) = probe::probe(pdf, backend, config.min_chars_per_page).await?;
    let assessment = assess(&data.metrics);
    Ok(PreflightReport {
        source,
        metrics: data.metrics,
        info: data.info,
        assessment,
    })
}

async fn gate(
    report: &PreflightReport,
    config: &ConversionConfig,
    progress: &ProgressCallback,
) -> Result<GateDecision, ConvertError> {
    let reviewer = reviewer_for(config, "pre-flight")?;
    progress.on_checkpoint(Phase::Preflight, "proceed with the conversion?");
    let report = report.clone();
    ask(reviewer, move |r| r.preflight(&report)).await
}

fn lock_existing(dir: &Path) -> Result<(RunLock, ConversionState), ConvertError> {
    if !dir.join(STATE_FILE).exists() {
        return Err(ConvertError::StateMissing {
            dir: dir.to_path_buf(),
        });
    }
    let lock = RunLock::acquire(dir)?;
    let state = load_state(dir)?;
    Ok((lock, state))
}

// ── The driver ───────────────────────────────────────────────────────────

enum PhaseResult {
    Done,
    Suspended(RunOutcome),
}

struct Run<'a> {
    _lock: RunLock,
    state: ConversionState,
    layout: OutputLayout,
    config: &'a ConversionConfig,
    backend: Arc<dyn PdfBackend>,
    progress: ProgressCallback,
    timings: Vec<PhaseTiming>,
}

impl<'a> Run<'a> {
    fn open(
        lock: RunLock,
        state: ConversionState,
        config: &'a ConversionConfig,
        backend: Arc<dyn PdfBackend>,
        progress: ProgressCallback,
    ) -> Self {
        Self {
            _lock: lock,
            layout: OutputLayout::for_state(&state),
            state,
            config,
            backend,
            progress,
            timings: Vec::new(),
        }
    }

    fn save(&self) -> Result<(), ConvertError> {
        save_state(&self.state)
    }

    /// Persist the accepted pre-flight result as phase 0 and create the descriptor.
    fn record_preflight(&mut self, report: &PreflightReport) -> Result<(), ConvertError> {
        let started = Utc::now();
        self.state.begin(Phase::Preflight)?;
        write_json(&self.layout.preflight(), report)?;
        self.state.succeed(Phase::Preflight)?;
        self.save()?;
        ActivePointer::write(&self.config.active_pointer, &self.state)?;
        self.progress.on_phase_complete(Phase::Preflight);
        self.timings.push(PhaseTiming {
            phase: Phase::Preflight,
            attempt: 1,
            started_at: started,
            millis: 0,
            outcome: "succeeded".into(),
        });
        info!(
            "Conversion descriptor created in {} ({} pages, {})",
            self.layout.root().display(),
            report.metrics.page_count,
            report.tier()
        );
        Ok(())
    }

    /// Refuse to mix artifacts of two different source files.
    fn verify_source(&self) -> Result<(), ConvertError> {
        if self.state.status(Phase::Setup) != PhaseStatus::Succeeded {
            return Ok(());
        }
        let recorded: SourceFingerprint = read_json(&self.layout.source_fingerprint())?;
        let current = SourceFingerprint::of(&self.state.source_pdf)?;
        if recorded != current {
            return Err(ConvertError::SourceChanged {
                path: self.state.source_pdf.clone(),
            });
        }
        Ok(())
    }

    async fn drive(&mut self) -> Result<RunOutcome, ConvertError> {
        ActivePointer::write(&self.config.active_pointer, &self.state)?;
        let result = self.drive_phases().await;
        if self.state.diagnostics {
            if let Err(e) = diagnostics::write_bundle(&self.layout, &self.state, self.config, &self.timings) {
                warn!("Failed to write diagnostics: {e}");
            }
        }
        result
    }

    async fn drive_phases(&mut self) -> Result<RunOutcome, ConvertError> {
        while !self.state.is_complete() {
            let phase = self.state.current_phase;
            if let PhaseResult::Suspended(outcome) = self.run_with_retries(phase).await? {
                return Ok(outcome);
            }
        }
        info!("Conversion complete: {}", self.layout.final_markdown().display());
        self.completed()
    }

    async fn run_with_retries(&mut self, phase: Phase) -> Result<PhaseResult, ConvertError> {
        loop {
            self.state.begin(phase)?;
            self.save()?;
            let attempt = self.state.record(phase).attempts;
            info!("Phase {phase}: attempt {attempt}");
            self.progress.on_phase_start(phase, attempt);
            let started_at = Utc::now();
            let clock = Instant::now();

            let result = self.run_phase(phase).await;
            let mut timing = PhaseTiming {
                phase,
                attempt,
                started_at,
                millis: clock.elapsed().as_millis() as u64,
                outcome: String::new(),
            };

            match result {
                Ok(PhaseResult::Done) => {
                    self.state.succeed(phase)?;
                    self.save()?;
                    self.progress.on_phase_complete(phase);
                    timing.outcome = "succeeded".into();
                    self.timings.push(timing);
                    return Ok(PhaseResult::Done);
                }
                Ok(suspended @ PhaseResult::Suspended(_)) => {
                    self.save()?;
                    timing.outcome = "suspended".into();
                    self.timings.push(timing);
                    return Ok(suspended);
                }
                Err(e) if !e.is_retryable() => {
                    // Not a phase failure: put the phase back untouched.
                    self.state.recover_interrupted();
                    self.save()?;
                    timing.outcome = format!("stopped: {e}");
                    self.timings.push(timing);
                    return Err(e);
                }
                Err(e) => {
                    let verdict = self.state.fail(phase, &e, self.config.max_attempts)?;
                    self.save()?;
                    timing.outcome = format!("failed: {e}");
                    self.timings.push(timing);
                    let will_retry = verdict == FailureVerdict::Retry;
                    self.progress
                        .on_phase_failed(phase, attempt, &e.to_string(), will_retry);
                    if !will_retry {
                        warn!("Phase {phase} failed after {attempt} attempts: {e}");
                        return Err(ConvertError::PhaseExhausted {
                            phase: phase.index(),
                            name: phase.name(),
                            attempts: attempt,
                            last_error: e.to_string(),
                        });
                    }
                    let delay = self
                        .config
                        .retry_backoff_ms
                        .saturating_mul(1u64 << (attempt - 1).min(16));
                    warn!("Phase {phase} attempt {attempt} failed: {e}; retrying in {delay}ms");
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    self.state.rearm(phase);
                    self.save()?;
                }
            }
        }
    }

    async fn run_phase(&mut self, phase: Phase) -> Result<PhaseResult, ConvertError> {
        match phase {
            Phase::Preflight => Err(ConvertError::rejected(
                "run the pre-flight phase",
                "it only runs at the start of a conversion or with --phase 0",
            )),
            Phase::Setup => self.setup(),
            Phase::ImageExtraction | Phase::TextExtraction => self.extract(phase).await,
            Phase::Segmentation => self.segment(),
            Phase::FontInventory => self.font_inventory(),
            Phase::FontClassification => self.font_classification(),
            Phase::FontMappingReview => self.font_mapping_review().await,
            Phase::HeadingInsertion => self.heading_insertion(),
            Phase::LintReview => self.lint_review().await,
            Phase::Report => self.report(),
        }
    }

    fn preflight_report(&self) -> Result<PreflightReport, ConvertError> {
        read_json(&self.layout.preflight())
    }

    fn page_count(&self) -> Result<usize, ConvertError> {
        Ok(self.preflight_report()?.metrics.page_count)
    }

    // ── Phase 1 ──────────────────────────────────────────────────────────

    fn setup(&mut self) -> Result<PhaseResult, ConvertError> {
        for dir in [self.layout.images_dir(), self.layout.pages_dir()] {
            fs::create_dir_all(&dir).map_err(|e| ConvertError::io(&dir, e))?;
        }
        let report = self.preflight_report()?;
        write_json(&self.layout.metadata(), &report.metrics)?;
        let fingerprint = SourceFingerprint::of(&self.state.source_pdf)?;
        debug!("Source fingerprint: sha256 {} ({} bytes)", fingerprint.sha256, fingerprint.bytes);
        write_json(&self.layout.source_fingerprint(), &fingerprint)?;
        Ok(PhaseResult::Done)
    }

    // ── Phases 2 and 3 ───────────────────────────────────────────────────

    async fn extract(&mut self, phase: Phase) -> Result<PhaseResult, ConvertError> {
        let total = self.page_count()?;
        self.state.set_total_steps(phase, total);
        self.save()?;
        let pending: Vec<usize> = (1..=total)
            .filter(|p| !self.state.record(phase).is_step_done(*p))
            .collect();
        debug!("Phase {phase}: {} of {total} pages to extract", pending.len());

        let extractor = Extractor {
            pdf: self.state.source_pdf.clone(),
            backend: Arc::clone(&self.backend),
            layout: self.layout.clone(),
            concurrency: self.config.concurrency,
        };
        let state = &mut self.state;
        let progress = &self.progress;
        let on_page = |outcome: PageOutcome| -> Result<(), ConvertError> {
            state.complete_step(phase, outcome.page, total)?;
            save_state(&*state)?;
            progress.on_step_complete(phase, outcome.page, total);
            Ok(())
        };
        if phase == Phase::ImageExtraction {
            extractor.extract_images(pending, on_page).await?;
        } else {
            extractor.extract_layout(pending, on_page).await?;
        }

        let degraded: Vec<usize> = if phase == Phase::ImageExtraction {
            load_images(&self.layout, total)?
                .into_iter()
                .filter(|p| p.degraded.is_some())
                .map(|p| p.page)
                .collect()
        } else {
            load_layouts(&self.layout, total)?
                .into_iter()
                .filter(|p| p.degraded.is_some())
                .map(|p| p.page)
                .collect()
        };
        if !degraded.is_empty() {
            warn!("Phase {phase}: degraded pages {degraded:?}");
        }
        if let Err(e) = check_degraded(degraded.len(), total, self.config.max_degraded_ratio) {
            // Give the degraded pages another chance on the next attempt.
            self.state.forget_steps(phase, &degraded);
            return Err(e);
        }
        Ok(PhaseResult::Done)
    }

    // ── Phases 4 to 6 ────────────────────────────────────────────────────

    fn segment(&mut self) -> Result<PhaseResult, ConvertError> {
        let total = self.page_count()?;
        let images = load_images(&self.layout, total)?;
        let layouts = load_layouts(&self.layout, total)?;
        let pages = segment::segment_document(&layouts, &images);
        info!(
            "Segmented {} pages into {} spans",
            pages.len(),
            pages.iter().map(|p| p.spans.len()).sum::<usize>()
        );
        write_json(&self.layout.spans(), &pages)?;
        Ok(PhaseResult::Done)
    }

    fn font_inventory(&mut self) -> Result<PhaseResult, ConvertError> {
        let pages: Vec<ExtractedPage> = read_json(&self.layout.spans())?;
        let inventory = FontInventory::build(&pages);
        info!("Font inventory: {} signatures", inventory.fonts.len());
        write_json(&self.layout.font_inventory(), &inventory)?;
        Ok(PhaseResult::Done)
    }

    fn font_classification(&mut self) -> Result<PhaseResult, ConvertError> {
        let inventory: FontInventory = read_json(&self.layout.font_inventory())?;
        let proposal = propose_mapping(&inventory);
        info!("Proposed heading levels: {:?}", proposal.heading_levels());
        write_json(&self.layout.font_proposal(), &proposal)?;
        Ok(PhaseResult::Done)
    }

    // ── Phase 7 ──────────────────────────────────────────────────────────

    async fn font_mapping_review(&mut self) -> Result<PhaseResult, ConvertError> {
        let inventory: FontInventory = read_json(&self.layout.font_inventory())?;
        let proposal: FontMapping = read_json(&self.layout.font_proposal())?;
        let reviewer = reviewer_for(self.config, "font-mapping")?;
        let inventory = Arc::new(inventory);

        let mapping = loop {
            self.progress
                .on_checkpoint(Phase::FontMappingReview, "confirm the font mapping");
            let (p, inv) = (proposal.clone(), Arc::clone(&inventory));
            let decision = ask(Arc::clone(&reviewer), move |r| r.font_mapping(&p, &inv)).await?;
            match decision {
                MappingDecision::Confirm => break proposal.clone(),
                MappingDecision::Edit(edited) => match invalid_level(&edited) {
                    Some(level) => warn!("Heading level {level} is out of range 1–{MAX_HEADING_LEVEL}; asking again"),
                    None => break edited,
                },
                MappingDecision::Reject => info!("Font mapping rejected; asking again"),
            }
        };

        let missing = unmapped(&inventory, &mapping);
        if !missing.is_empty() {
            warn!("{} font signatures left unmapped; their text stays body text", missing.len());
        }
        write_json(&self.layout.font_mapping(), &mapping)?;
        Ok(PhaseResult::Done)
    }

    // ── Phase 8 ──────────────────────────────────────────────────────────

    fn heading_insertion(&mut self) -> Result<PhaseResult, ConvertError> {
        let pages: Vec<ExtractedPage> = read_json(&self.layout.spans())?;
        let mapping: FontMapping = read_json(&self.layout.font_mapping())?;
        let skeleton = Skeleton::build(&pages, &mapping);
        write_json(&self.layout.skeleton(), &skeleton)?;
        write_atomic(&self.layout.skeleton_markdown(), skeleton.render().as_bytes())?;
        Ok(PhaseResult::Done)
    }

    // ── Phase 9 ──────────────────────────────────────────────────────────

    async fn lint_review(&mut self) -> Result<PhaseResult, ConvertError> {
        let phase = Phase::LintReview;
        let skeleton: Skeleton = read_json(&self.layout.skeleton())?;
        let mut log = IssueLog::new(lint(&skeleton, self.page_count()?));
        match read_json::<IssueLog>(&self.layout.issues()) {
            Ok(previous) => {
                let record = self.state.record(phase).clone();
                log.carry_over(&previous, |step| record.is_step_done(step));
            }
            Err(ConvertError::ArtifactMissing { .. }) => {}
            Err(e) => return Err(e),
        }
        let total = log.len();
        self.state.set_total_steps(phase, total);
        let stale: Vec<usize> = (1..=total)
            .filter(|s| self.state.record(phase).is_step_done(*s) && log.entries[s - 1].resolution.is_none())
            .collect();
        self.state.forget_steps(phase, &stale);
        write_json(&self.layout.issues(), &log)?;
        self.save()?;
        info!("Lint: {total} issues, {} unresolved", log.unresolved().len());

        if !log.is_resolved() {
            let checklist_mode = self.state.review_mode == ReviewMode::Checklist && !self.config.auto_confirm;
            if checklist_mode {
                if let Some(outcome) = self.resolve_from_checklist(&mut log)? {
                    return Ok(PhaseResult::Suspended(outcome));
                }
            } else {
                self.resolve_interactively(&mut log).await?;
            }
        }

        for step in log.resolved() {
            if !self.state.record(phase).is_step_done(step) {
                self.state.complete_step(phase, step, total)?;
            }
        }
        // An unresolved issue leaves its step open, so the phase cannot succeed.
        if log.is_resolved() {
            let revised = revise(&skeleton, &log)?;
            write_atomic(&self.layout.revised(), render_revised(&revised).as_bytes())?;
        }
        Ok(PhaseResult::Done)
    }

    async fn resolve_interactively(&mut self, log: &mut IssueLog) -> Result<(), ConvertError> {
        let phase = Phase::LintReview;
        let reviewer = reviewer_for(self.config, "issue-resolution")?;
        let total = log.len();
        for position in log.unresolved() {
            let issue = log.entries[position - 1].issue.clone();
            self.progress
                .on_checkpoint(phase, &format!("resolve {}", issue.id));
            let resolution = ask(Arc::clone(&reviewer), move |r| {
                r.resolve_issue(&issue, position, total)
            })
            .await?;
            debug!("{} → {}", log.entries[position - 1].issue.id, resolution.label());
            log.resolve(position, resolution)?;
            write_json(&self.layout.issues(), log)?;
            self.state.complete_step(phase, position, total)?;
            self.save()?;
            self.progress.on_step_complete(phase, position, total);
        }
        Ok(())
    }

    /// Apply the annotated checklist, or write it and suspend.
    fn resolve_from_checklist(&mut self, log: &mut IssueLog) -> Result<Option<RunOutcome>, ConvertError> {
        let phase = Phase::LintReview;
        let path = self.layout.checklist();
        let total = log.len();
        let awaiting = self.state.record(phase).awaiting_checklist;

        if awaiting && path.exists() {
            let text = read_text(&path)?;
            match parse_checklist(&text, log) {
                Ok(resolutions) => {
                    let applied = resolutions.len();
                    for (position, resolution) in resolutions {
                        log.resolve(position, resolution)?;
                        self.state.complete_step(phase, position, total)?;
                        self.progress.on_step_complete(phase, position, total);
                    }
                    write_json(&self.layout.issues(), log)?;
                    info!("Applied {applied} checklist resolutions");
                    return Ok(None);
                }
                Err(problems) => {
                    warn!("Checklist has {} problems; still waiting", problems.len());
                    self.state.suspend_for_checklist(phase)?;
                    return Ok(Some(RunOutcome::AwaitingChecklist {
                        output_dir: self.layout.root().to_path_buf(),
                        checklist: path,
                        problems,
                    }));
                }
            }
        }

        write_atomic(&path, render_checklist(log, self.layout.name()).as_bytes())?;
        self.progress.on_checkpoint(
            phase,
            &format!("annotate {} and run --resume", path.display()),
        );
        self.state.suspend_for_checklist(phase)?;
        info!("Waiting for the annotated checklist at {}", path.display());
        Ok(Some(RunOutcome::AwaitingChecklist {
            output_dir: self.layout.root().to_path_buf(),
            checklist: path,
            problems: Vec::new(),
        }))
    }

    // ── Phase 10 ─────────────────────────────────────────────────────────

    fn report(&mut self) -> Result<PhaseResult, ConvertError> {
        let preflight = self.preflight_report()?;
        let pages: Vec<ExtractedPage> = read_json(&self.layout.spans())?;
        let skeleton: Skeleton = read_json(&self.layout.skeleton())?;
        let inventory: FontInventory = read_json(&self.layout.font_inventory())?;
        let mapping: FontMapping = read_json(&self.layout.font_mapping())?;
        let log: IssueLog = read_json(&self.layout.issues())?;
        let revised = read_text(&self.layout.revised())?;
        let source_file = self
            .state
            .source_pdf
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let reports = report::generate(&ReportInput {
            name: self.layout.name(),
            source_file: &source_file,
            title: preflight.info.title.as_deref(),
            metrics: &preflight.metrics,
            pages: &pages,
            skeleton: &skeleton,
            revised_markdown: &revised,
            inventory: &inventory,
            mapping: &mapping,
            log: &log,
            review_mode: self.state.review_mode,
            provenance_notice: self.config.provenance_notice.as_deref(),
        });
        write_atomic(&self.layout.final_markdown(), reports.final_markdown.as_bytes())?;
        write_atomic(&self.layout.report(), reports.conversion_report.as_bytes())?;
        write_atomic(&self.layout.checklist(), reports.resolution_log.as_bytes())?;
        Ok(PhaseResult::Done)
    }

    fn completed(&self) -> Result<RunOutcome, ConvertError> {
        let pages: Vec<ExtractedPage> = read_json(&self.layout.spans())?;
        let log: IssueLog = read_json(&self.layout.issues())?;
        Ok(RunOutcome::Complete {
            output_dir: self.layout.root().to_path_buf(),
            final_markdown: self.layout.final_markdown(),
            report: self.layout.report(),
            degraded_pages: pages
                .iter()
                .filter(|p| p.degraded.is_some())
                .map(|p| p.page)
                .collect(),
            issues: log.len(),
        })
    }
}

/// A heading level outside 1..=6 in a reviewer-edited mapping.
fn invalid_level(mapping: &FontMapping) -> Option<u8> {
    mapping.assignments.iter().find_map(|a| match a.role {
        FontRole::Heading(level) if level == 0 || level > MAX_HEADING_LEVEL => Some(level),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FontAssignment, FontSignature};

    #[test]
    fn edited_mapping_levels_are_checked() {
        let mut m = FontMapping::default();
        m.assign(FontSignature::new("A", 20.0), FontRole::Heading(2));
        assert_eq!(invalid_level(&m), None);
        m.assignments.push(FontAssignment {
            font: FontSignature::new("B", 30.0),
            role: FontRole::Heading(7),
        });
        assert_eq!(invalid_level(&m), Some(7));
    }

    #[test]
    fn auto_confirm_needs_no_reviewer() {
        let config = ConversionConfig::builder().auto_confirm(true).build().unwrap();
        assert!(reviewer_for(&config, "pre-flight").is_ok());
        let config = ConversionConfig::default();
        assert!(matches!(
            reviewer_for(&config, "pre-flight"),
            Err(ConvertError::ReviewerRequired { checkpoint: "pre-flight" })
        ));
    }
}
