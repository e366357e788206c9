//! The persisted conversion state machine.
//!
//! [`ConversionState`] is the descriptor stored in `<output-dir>/.state.json`.
//! It records, for each of the eleven [`Phase`]s, a status, an attempt
//! counter and the completed steps of multi-step phases. All mutation goes
//! through the transition methods below, which reject any change that would
//! break the run invariants:
//!
//! * at most one phase is `running`;
//! * every phase before the current one is `succeeded`;
//! * a `failed` phase blocks advancement until it is retried.
//!
//! The driver in [`crate::convert`] persists the descriptor after every
//! transition, so a crash leaves it at the last phase/step boundary.

use crate::config::ReviewMode;
use crate::error::{ConvertError, ErrorRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Bumped when the on-disk layout of `.state.json` changes.
pub const STATE_VERSION: u32 = 1;

// ── Phases ───────────────────────────────────────────────────────────────

/// The eleven ordered pipeline phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Preflight,
    Setup,
    ImageExtraction,
    TextExtraction,
    Segmentation,
    FontInventory,
    FontClassification,
    FontMappingReview,
    HeadingInsertion,
    LintReview,
    Report,
}

impl Phase {
    pub const ALL: [Phase; 11] = [
        Phase::Preflight,
        Phase::Setup,
        Phase::ImageExtraction,
        Phase::TextExtraction,
        Phase::Segmentation,
        Phase::FontInventory,
        Phase::FontClassification,
        Phase::FontMappingReview,
        Phase::HeadingInsertion,
        Phase::LintReview,
        Phase::Report,
    ];

    pub const LAST: Phase = Phase::Report;

    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn from_index(index: u8) -> Option<Phase> {
        Phase::ALL.get(index as usize).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Phase::Preflight => "pre-flight",
            Phase::Setup => "setup",
            Phase::ImageExtraction => "image-extraction",
            Phase::TextExtraction => "text-extraction",
            Phase::Segmentation => "segmentation",
            Phase::FontInventory => "font-inventory",
            Phase::FontClassification => "font-classification",
            Phase::FontMappingReview => "font-mapping-review",
            Phase::HeadingInsertion => "heading-insertion",
            Phase::LintReview => "lint-review",
            Phase::Report => "report",
        }
    }

    /// Phases whose work is tracked step by step (pages or issues).
    pub fn is_multi_step(self) -> bool {
        matches!(
            self,
            Phase::ImageExtraction | Phase::TextExtraction | Phase::LintReview
        )
    }

    pub fn next(self) -> Option<Phase> {
        Phase::from_index(self.index() + 1)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.index(), self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PhaseStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PhaseStatus::Pending => "pending",
            PhaseStatus::Running => "running",
            PhaseStatus::Succeeded => "succeeded",
            PhaseStatus::Failed => "failed",
        })
    }
}

/// Progress of one phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub phase: Phase,
    pub status: PhaseStatus,
    /// Attempts in the current retry window.
    pub attempts: u32,
    /// Known once a multi-step phase has started.
    pub total_steps: Option<usize>,
    /// 1-based step numbers already persisted.
    pub completed_steps: BTreeSet<usize>,
    /// Earlier output of this phase was invalidated by a rerun.
    pub invalidated: bool,
    /// Phase 9 in checklist mode: waiting for the annotated checklist.
    pub awaiting_checklist: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl PhaseRecord {
    fn new(phase: Phase) -> Self {
        Self {
            phase,
            status: PhaseStatus::Pending,
            attempts: 0,
            total_steps: None,
            completed_steps: BTreeSet::new(),
            invalidated: false,
            awaiting_checklist: false,
            started_at: None,
            finished_at: None,
        }
    }

    /// First step not yet completed (1-based).
    pub fn next_step(&self) -> usize {
        (1..)
            .find(|s| !self.completed_steps.contains(s))
            .unwrap_or(1)
    }

    pub fn is_step_done(&self, step: usize) -> bool {
        self.completed_steps.contains(&step)
    }
}

/// The error that most recently stopped a phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastError {
    pub phase: Phase,
    #[serde(flatten)]
    pub error: ErrorRecord,
    pub at: DateTime<Utc>,
}

/// Outcome of recording a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureVerdict {
    /// Attempts remain; the driver may re-invoke the phase.
    Retry,
    /// The retry window is spent; the phase stays `failed`.
    Exhausted,
}

/// Coarse run status, as shown by `--status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "phase", rename_all = "kebab-case")]
pub enum Lifecycle {
    NotStarted,
    InProgress(Phase),
    AwaitingChecklist(Phase),
    Failed(Phase),
    Complete,
}

// ── Step references ──────────────────────────────────────────────────────

/// A `N.S` step reference: phase `N`, 1-based step `S`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepRef {
    pub phase: Phase,
    pub step: usize,
}

impl FromStr for StepRef {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ConvertError::InvalidStep {
            step: s.to_string(),
            reason: reason.to_string(),
        };
        let (phase, step) = s
            .trim()
            .split_once('.')
            .ok_or_else(|| invalid("expected <phase>.<step>, e.g. 3.5"))?;
        let phase: u8 = phase.parse().map_err(|_| invalid("phase is not a number"))?;
        let step: usize = step.parse().map_err(|_| invalid("step is not a number"))?;
        let phase = Phase::from_index(phase).ok_or_else(|| invalid("phase must be 0–10"))?;
        if step == 0 {
            return Err(invalid("steps are 1-based"));
        }
        Ok(StepRef { phase, step })
    }
}

impl fmt::Display for StepRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.phase.index(), self.step)
    }
}

// ── The descriptor ───────────────────────────────────────────────────────

/// The persisted descriptor of one conversion run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionState {
    pub version: u32,
    pub source_pdf: PathBuf,
    pub output_dir: PathBuf,
    /// Stem used for `<name>-final.md`.
    pub name: String,
    pub current_phase: Phase,
    /// Step index within the current phase (0 for single-step phases).
    pub current_step: usize,
    pub phases: Vec<PhaseRecord>,
    pub last_error: Option<LastError>,
    pub review_mode: ReviewMode,
    pub diagnostics: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversionState {
    pub fn new(
        source_pdf: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        name: impl Into<String>,
        review_mode: ReviewMode,
        diagnostics: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            version: STATE_VERSION,
            source_pdf: source_pdf.into(),
            output_dir: output_dir.into(),
            name: name.into(),
            current_phase: Phase::Preflight,
            current_step: 0,
            phases: Phase::ALL.iter().map(|p| PhaseRecord::new(*p)).collect(),
            last_error: None,
            review_mode,
            diagnostics,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn record(&self, phase: Phase) -> &PhaseRecord {
        &self.phases[phase.index() as usize]
    }

    fn record_mut(&mut self, phase: Phase) -> &mut PhaseRecord {
        &mut self.phases[phase.index() as usize]
    }

    pub fn status(&self, phase: Phase) -> PhaseStatus {
        self.record(phase).status
    }

    pub fn is_complete(&self) -> bool {
        self.phases.iter().all(|r| r.status == PhaseStatus::Succeeded)
    }

    pub fn lifecycle(&self) -> Lifecycle {
        if self.is_complete() {
            return Lifecycle::Complete;
        }
        if let Some(r) = self.phases.iter().find(|r| r.status == PhaseStatus::Failed) {
            return Lifecycle::Failed(r.phase);
        }
        let current = self.record(self.current_phase);
        if current.awaiting_checklist {
            return Lifecycle::AwaitingChecklist(self.current_phase);
        }
        if self.current_phase == Phase::Preflight && current.attempts == 0 {
            return Lifecycle::NotStarted;
        }
        Lifecycle::InProgress(self.current_phase)
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
        let rec = self.record(self.current_phase);
        self.current_step = if self.current_phase.is_multi_step() {
            rec.next_step()
        } else {
            0
        };
    }

    /// Start an attempt of `phase`.
    pub fn begin(&mut self, phase: Phase) -> Result<(), ConvertError> {
        let action = format!("start phase {phase}");
        if phase != self.current_phase {
            return Err(ConvertError::rejected(
                action,
                format!("the current phase is {}", self.current_phase),
            ));
        }
        if let Some(r) = self.phases.iter().find(|r| r.status == PhaseStatus::Running) {
            return Err(ConvertError::rejected(
                action,
                format!("phase {} is already running", r.phase),
            ));
        }
        if let Some(r) = self.phases[..phase.index() as usize]
            .iter()
            .find(|r| r.status != PhaseStatus::Succeeded)
        {
            return Err(ConvertError::rejected(
                action,
                format!("phase {} has not succeeded", r.phase),
            ));
        }
        let rec = self.record_mut(phase);
        match rec.status {
            PhaseStatus::Succeeded => {
                return Err(ConvertError::rejected(action, "it already succeeded"));
            }
            PhaseStatus::Failed => {
                return Err(ConvertError::rejected(action, "it failed and has not been retried"));
            }
            _ => {}
        }
        rec.status = PhaseStatus::Running;
        rec.attempts += 1;
        rec.started_at = Some(Utc::now());
        rec.finished_at = None;
        self.touch();
        Ok(())
    }

    /// Record one finished step of a running multi-step phase.
    pub fn complete_step(&mut self, phase: Phase, step: usize, total: usize) -> Result<(), ConvertError> {
        let rec = self.record_mut(phase);
        if rec.status != PhaseStatus::Running {
            return Err(ConvertError::rejected(
                format!("record step {}.{step}", phase.index()),
                format!("phase {phase} is {}", rec.status),
            ));
        }
        rec.total_steps = Some(total);
        rec.completed_steps.insert(step);
        self.touch();
        Ok(())
    }

    /// Fix the number of steps of a running phase before any step completes.
    pub fn set_total_steps(&mut self, phase: Phase, total: usize) {
        let rec = self.record_mut(phase);
        rec.total_steps = Some(total);
        rec.completed_steps.retain(|s| *s <= total);
    }

    /// Drop recorded steps so the next attempt of `phase` redoes them.
    pub fn forget_steps(&mut self, phase: Phase, steps: &[usize]) {
        let rec = self.record_mut(phase);
        for step in steps {
            rec.completed_steps.remove(step);
        }
        self.touch();
    }

    /// Mark a running phase succeeded and advance.
    pub fn succeed(&mut self, phase: Phase) -> Result<(), ConvertError> {
        let action = format!("complete phase {phase}");
        let rec = self.record(phase);
        if rec.status != PhaseStatus::Running {
            return Err(ConvertError::rejected(action, format!("it is {}", rec.status)));
        }
        if let Some(total) = rec.total_steps {
            if phase.is_multi_step() && rec.completed_steps.len() < total {
                return Err(ConvertError::rejected(
                    action,
                    format!("{}/{} steps done", rec.completed_steps.len(), total),
                ));
            }
        }
        let rec = self.record_mut(phase);
        rec.status = PhaseStatus::Succeeded;
        rec.invalidated = false;
        rec.awaiting_checklist = false;
        rec.finished_at = Some(Utc::now());
        if self.last_error.as_ref().is_some_and(|e| e.phase == phase) {
            self.last_error = None;
        }
        if let Some(next) = phase.next() {
            self.current_phase = next;
        }
        self.touch();
        Ok(())
    }

    /// Record a failed attempt. The phase is left `failed` either way; the
    /// verdict tells the driver whether another automatic attempt is allowed.
    pub fn fail(
        &mut self,
        phase: Phase,
        error: &ConvertError,
        max_attempts: u32,
    ) -> Result<FailureVerdict, ConvertError> {
        let rec = self.record_mut(phase);
        if rec.status != PhaseStatus::Running {
            return Err(ConvertError::rejected(
                format!("fail phase {phase}"),
                format!("it is {}", rec.status),
            ));
        }
        rec.status = PhaseStatus::Failed;
        rec.finished_at = Some(Utc::now());
        let attempts = rec.attempts;
        self.last_error = Some(LastError {
            phase,
            error: ErrorRecord::from(error),
            at: Utc::now(),
        });
        self.touch();
        if error.is_retryable() && attempts < max_attempts {
            Ok(FailureVerdict::Retry)
        } else {
            Ok(FailureVerdict::Exhausted)
        }
    }

    /// Move a `failed` phase back to `pending` for another automatic attempt
    /// within the same retry window.
    pub fn rearm(&mut self, phase: Phase) {
        let rec = self.record_mut(phase);
        if rec.status == PhaseStatus::Failed {
            rec.status = PhaseStatus::Pending;
        }
    }

    /// Operator-initiated retry of a failed phase: opens a fresh retry window.
    pub fn retry_failed(&mut self) -> Option<Phase> {
        let rec = self
            .phases
            .iter_mut()
            .find(|r| r.status == PhaseStatus::Failed)?;
        rec.status = PhaseStatus::Pending;
        rec.attempts = 0;
        let phase = rec.phase;
        self.touch();
        Some(phase)
    }

    /// Park a running phase at a checklist checkpoint.
    pub fn suspend_for_checklist(&mut self, phase: Phase) -> Result<(), ConvertError> {
        let rec = self.record_mut(phase);
        if rec.status != PhaseStatus::Running {
            return Err(ConvertError::rejected(
                format!("suspend phase {phase}"),
                format!("it is {}", rec.status),
            ));
        }
        rec.status = PhaseStatus::Pending;
        rec.awaiting_checklist = true;
        // Waiting on a human is not a failed attempt.
        rec.attempts = rec.attempts.saturating_sub(1);
        self.touch();
        Ok(())
    }

    /// Reset a phase left `running` by an interrupted process.
    pub fn recover_interrupted(&mut self) -> Option<Phase> {
        let rec = self
            .phases
            .iter_mut()
            .find(|r| r.status == PhaseStatus::Running)?;
        rec.status = PhaseStatus::Pending;
        rec.attempts = rec.attempts.saturating_sub(1);
        let phase = rec.phase;
        self.touch();
        Some(phase)
    }

    /// `--phase N`: re-enter `phase`, invalidating it and every later phase.
    pub fn rerun_phase(&mut self, phase: Phase) -> Result<(), ConvertError> {
        self.check_reentry(phase, &format!("re-run phase {phase}"))?;
        self.invalidate_from(phase, None);
        Ok(())
    }

    /// `--from-step N.S`: re-enter a multi-step phase at step S.
    pub fn rerun_from_step(&mut self, at: StepRef) -> Result<(), ConvertError> {
        let action = format!("re-enter at step {at}");
        if !at.phase.is_multi_step() {
            if at.step == 1 {
                return self.rerun_phase(at.phase);
            }
            return Err(ConvertError::InvalidStep {
                step: at.to_string(),
                reason: format!("phase {} has no internal steps", at.phase),
            });
        }
        self.check_reentry(at.phase, &action)?;
        let total = self.record(at.phase).total_steps.ok_or_else(|| {
            ConvertError::InvalidStep {
                step: at.to_string(),
                reason: format!("phase {} has not started yet", at.phase),
            }
        })?;
        if at.step > total.max(1) {
            return Err(ConvertError::InvalidStep {
                step: at.to_string(),
                reason: format!("phase {} has {total} steps", at.phase),
            });
        }
        self.invalidate_from(at.phase, Some(at.step));
        Ok(())
    }

    fn check_reentry(&self, phase: Phase, action: &str) -> Result<(), ConvertError> {
        if let Some(r) = self.phases.iter().find(|r| r.status == PhaseStatus::Running) {
            return Err(ConvertError::rejected(
                action,
                format!("phase {} is running", r.phase),
            ));
        }
        if let Some(r) = self.phases[..phase.index() as usize]
            .iter()
            .find(|r| r.status != PhaseStatus::Succeeded)
        {
            return Err(ConvertError::rejected(
                action,
                format!("earlier phase {} is {}", r.phase, r.status),
            ));
        }
        Ok(())
    }

    /// Mark `phase` and everything after it pending. Artifacts stay on disk
    /// and are overwritten when the phases run again.
    fn invalidate_from(&mut self, phase: Phase, keep_steps_before: Option<usize>) {
        for rec in self.phases[phase.index() as usize..].iter_mut() {
            let had_output = rec.status != PhaseStatus::Pending || !rec.completed_steps.is_empty();
            rec.invalidated = rec.invalidated || had_output;
            rec.status = PhaseStatus::Pending;
            rec.attempts = 0;
            rec.awaiting_checklist = false;
            rec.finished_at = None;
            match keep_steps_before {
                Some(step) if rec.phase == phase => rec.completed_steps.retain(|s| *s < step),
                _ => {
                    rec.completed_steps.clear();
                    rec.total_steps = None;
                }
            }
        }
        if self.last_error.as_ref().is_some_and(|e| e.phase >= phase) {
            self.last_error = None;
        }
        self.current_phase = phase;
        self.touch();
    }

    /// Check the structural invariants of a loaded or about-to-be-saved state.
    pub fn validate(&self) -> Result<(), String> {
        if self.phases.len() != Phase::ALL.len() {
            return Err(format!("expected 11 phase records, found {}", self.phases.len()));
        }
        for (i, rec) in self.phases.iter().enumerate() {
            if rec.phase.index() as usize != i {
                return Err(format!("phase record {i} is {}", rec.phase));
            }
        }
        let running = self
            .phases
            .iter()
            .filter(|r| r.status == PhaseStatus::Running)
            .count();
        if running > 1 {
            return Err(format!("{running} phases are running"));
        }
        for pair in self.phases.windows(2) {
            if pair[1].status == PhaseStatus::Succeeded && pair[0].status != PhaseStatus::Succeeded {
                return Err(format!(
                    "phase {} succeeded before phase {}",
                    pair[1].phase, pair[0].phase
                ));
            }
        }
        if let Some(r) = self.phases[..self.current_phase.index() as usize]
            .iter()
            .find(|r| r.status != PhaseStatus::Succeeded)
        {
            return Err(format!(
                "phase {} is {} but the current phase is {}",
                r.phase, r.status, self.current_phase
            ));
        }
        Ok(())
    }

    /// Human-readable status table for `--status`.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Source:   {}\n", self.source_pdf.display()));
        out.push_str(&format!("Output:   {}\n", self.output_dir.display()));
        out.push_str(&format!("Review:   {}\n", self.review_mode));
        out.push_str(&format!("State:    {}\n", describe_lifecycle(self.lifecycle())));
        out.push_str(&format!("Updated:  {}\n\n", self.updated_at.to_rfc3339()));
        for rec in &self.phases {
            let steps = match rec.total_steps {
                Some(total) if rec.phase.is_multi_step() => {
                    format!("  steps {}/{}", rec.completed_steps.len(), total)
                }
                _ => String::new(),
            };
            let marker = if rec.phase == self.current_phase && !self.is_complete() {
                "▶"
            } else {
                " "
            };
            let extra = if rec.awaiting_checklist {
                "  awaiting checklist"
            } else if rec.invalidated {
                "  invalidated"
            } else {
                ""
            };
            out.push_str(&format!(
                "{marker} {:>2} {:<22} {:<10} attempts {}{steps}{extra}\n",
                rec.phase.index(),
                rec.phase.name(),
                rec.status.to_string(),
                rec.attempts
            ));
        }
        if let Some(ref err) = self.last_error {
            out.push_str(&format!(
                "\nLast error (phase {}): {}\n",
                err.phase, err.error.message
            ));
        }
        out
    }
}

fn describe_lifecycle(l: Lifecycle) -> String {
    match l {
        Lifecycle::NotStarted => "not started".into(),
        Lifecycle::InProgress(p) => format!("in progress at phase {p}"),
        Lifecycle::AwaitingChecklist(p) => format!("awaiting review checklist (phase {p})"),
        Lifecycle::Failed(p) => format!("failed at phase {p}"),
        Lifecycle::Complete => "complete".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> ConversionState {
        ConversionState::new("a.pdf", "out", "a", ReviewMode::Interactive, false)
    }

    fn run_through(state: &mut ConversionState, last: Phase) {
        for phase in Phase::ALL.iter().take(last.index() as usize + 1) {
            state.begin(*phase).unwrap();
            if phase.is_multi_step() {
                state.complete_step(*phase, 1, 1).unwrap();
            }
            state.succeed(*phase).unwrap();
        }
    }

    fn io_error() -> ConvertError {
        ConvertError::PageIo {
            page: 1,
            detail: "disk".into(),
        }
    }

    #[test]
    fn new_state_is_not_started() {
        let s = fresh();
        assert_eq!(s.lifecycle(), Lifecycle::NotStarted);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn phases_advance_in_order() {
        let mut s = fresh();
        run_through(&mut s, Phase::Setup);
        assert_eq!(s.current_phase, Phase::ImageExtraction);
        let err = s.begin(Phase::TextExtraction).unwrap_err();
        assert!(err.to_string().contains("current phase"));
    }

    #[test]
    fn only_one_phase_runs() {
        let mut s = fresh();
        s.begin(Phase::Preflight).unwrap();
        assert!(s.begin(Phase::Preflight).is_err());
    }

    #[test]
    fn full_run_is_complete() {
        let mut s = fresh();
        run_through(&mut s, Phase::Report);
        assert_eq!(s.lifecycle(), Lifecycle::Complete);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn multi_step_phase_needs_every_step() {
        let mut s = fresh();
        run_through(&mut s, Phase::Setup);
        s.begin(Phase::ImageExtraction).unwrap();
        s.complete_step(Phase::ImageExtraction, 2, 3).unwrap();
        assert_eq!(s.current_step, 1);
        assert!(s.succeed(Phase::ImageExtraction).is_err());
        s.complete_step(Phase::ImageExtraction, 1, 3).unwrap();
        s.complete_step(Phase::ImageExtraction, 3, 3).unwrap();
        assert_eq!(s.current_step, 4);
        s.succeed(Phase::ImageExtraction).unwrap();
    }

    #[test]
    fn review_with_an_open_issue_cannot_succeed() {
        let mut s = fresh();
        run_through(&mut s, Phase::HeadingInsertion);
        s.begin(Phase::LintReview).unwrap();
        s.set_total_steps(Phase::LintReview, 2);
        s.complete_step(Phase::LintReview, 1, 2).unwrap();
        let err = s.succeed(Phase::LintReview).unwrap_err();
        assert!(matches!(err, ConvertError::TransitionRejected { .. }), "{err:?}");
        assert!(!err.is_retryable());
        assert_eq!(s.status(Phase::LintReview), PhaseStatus::Running);
    }

    #[test]
    fn retry_verdicts_follow_attempt_budget() {
        let mut s = fresh();
        run_through(&mut s, Phase::ImageExtraction);
        for attempt in 1..=3 {
            s.begin(Phase::TextExtraction).unwrap();
            let verdict = s.fail(Phase::TextExtraction, &io_error(), 3).unwrap();
            if attempt < 3 {
                assert_eq!(verdict, FailureVerdict::Retry);
                s.rearm(Phase::TextExtraction);
            } else {
                assert_eq!(verdict, FailureVerdict::Exhausted);
            }
        }
        assert_eq!(s.lifecycle(), Lifecycle::Failed(Phase::TextExtraction));
        assert!(s.begin(Phase::TextExtraction).is_err());
        assert_eq!(s.record(Phase::TextExtraction).attempts, 3);
    }

    #[test]
    fn failed_phase_blocks_until_retried() {
        let mut s = fresh();
        run_through(&mut s, Phase::Setup);
        s.begin(Phase::ImageExtraction).unwrap();
        s.fail(Phase::ImageExtraction, &io_error(), 1).unwrap();
        assert_eq!(s.status(Phase::ImageExtraction), PhaseStatus::Failed);
        assert!(s.begin(Phase::ImageExtraction).is_err());
        assert_eq!(s.retry_failed(), Some(Phase::ImageExtraction));
        assert_eq!(s.record(Phase::ImageExtraction).attempts, 0);
        s.begin(Phase::ImageExtraction).unwrap();
    }

    #[test]
    fn input_errors_are_never_retried() {
        let mut s = fresh();
        run_through(&mut s, Phase::Preflight);
        s.begin(Phase::Setup).unwrap();
        let verdict = s
            .fail(Phase::Setup, &ConvertError::FileNotFound { path: "a.pdf".into() }, 3)
            .unwrap();
        assert_eq!(verdict, FailureVerdict::Exhausted);
    }

    #[test]
    fn rerun_invalidates_later_phases() {
        let mut s = fresh();
        run_through(&mut s, Phase::Report);
        s.rerun_phase(Phase::FontMappingReview).unwrap();
        assert_eq!(s.current_phase, Phase::FontMappingReview);
        for phase in &Phase::ALL[7..] {
            let rec = s.record(*phase);
            assert_eq!(rec.status, PhaseStatus::Pending);
            assert!(rec.invalidated);
        }
        assert_eq!(s.status(Phase::HeadingInsertion), PhaseStatus::Pending);
        assert_eq!(s.status(Phase::FontClassification), PhaseStatus::Succeeded);
        assert!(!s.is_complete());
        assert!(s.validate().is_ok());
    }

    #[test]
    fn rerun_refused_when_earlier_phase_not_succeeded() {
        let mut s = fresh();
        run_through(&mut s, Phase::Setup);
        let err = s.rerun_phase(Phase::Report).unwrap_err();
        assert!(err.to_string().contains("earlier phase"));
    }

    #[test]
    fn from_step_keeps_earlier_steps() {
        let mut s = fresh();
        run_through(&mut s, Phase::ImageExtraction);
        s.begin(Phase::TextExtraction).unwrap();
        for step in 1..=5 {
            s.complete_step(Phase::TextExtraction, step, 5).unwrap();
        }
        s.succeed(Phase::TextExtraction).unwrap();
        s.begin(Phase::Segmentation).unwrap();
        s.succeed(Phase::Segmentation).unwrap();

        s.rerun_from_step("3.4".parse().unwrap()).unwrap();
        let rec = s.record(Phase::TextExtraction);
        assert_eq!(rec.completed_steps.iter().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(rec.total_steps, Some(5));
        assert_eq!(s.current_step, 4);
        assert_eq!(s.status(Phase::Segmentation), PhaseStatus::Pending);
        assert!(s.record(Phase::Segmentation).invalidated);
    }

    #[test]
    fn from_step_rejects_single_step_phase_beyond_one() {
        let mut s = fresh();
        run_through(&mut s, Phase::Report);
        assert!(s.rerun_from_step("8.2".parse().unwrap()).is_err());
        s.rerun_from_step("8.1".parse().unwrap()).unwrap();
        assert_eq!(s.current_phase, Phase::HeadingInsertion);
    }

    #[test]
    fn interrupted_phase_recovers_to_pending() {
        let mut s = fresh();
        run_through(&mut s, Phase::ImageExtraction);
        s.begin(Phase::TextExtraction).unwrap();
        s.complete_step(Phase::TextExtraction, 1, 4).unwrap();
        assert_eq!(s.recover_interrupted(), Some(Phase::TextExtraction));
        let rec = s.record(Phase::TextExtraction);
        assert_eq!(rec.status, PhaseStatus::Pending);
        assert_eq!(rec.attempts, 0);
        assert!(rec.is_step_done(1));
    }

    #[test]
    fn checklist_suspension_is_not_an_attempt() {
        let mut s = fresh();
        run_through(&mut s, Phase::HeadingInsertion);
        s.begin(Phase::LintReview).unwrap();
        s.suspend_for_checklist(Phase::LintReview).unwrap();
        assert_eq!(s.lifecycle(), Lifecycle::AwaitingChecklist(Phase::LintReview));
        assert_eq!(s.record(Phase::LintReview).attempts, 0);
    }

    #[test]
    fn validate_detects_out_of_order_success() {
        let mut s = fresh();
        s.phases[3].status = PhaseStatus::Succeeded;
        assert!(s.validate().is_err());
    }

    #[test]
    fn step_ref_parsing() {
        let r: StepRef = "3.12".parse().unwrap();
        assert_eq!(r.phase, Phase::TextExtraction);
        assert_eq!(r.step, 12);
        assert!("3".parse::<StepRef>().is_err());
        assert!("11.1".parse::<StepRef>().is_err());
        assert!("3.0".parse::<StepRef>().is_err());
        assert_eq!(r.to_string(), "3.12");
    }

    #[test]
    fn state_roundtrips_through_json() {
        let mut s = fresh();
        run_through(&mut s, Phase::Setup);
        let json = serde_json::to_string_pretty(&s).unwrap();
        let back: ConversionState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
