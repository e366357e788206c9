//! Human checkpoints as a typed request/response boundary.
//!
//! The pipeline stops three times for a human: the pre-flight gate, the font
//! mapping confirmation and (in interactive mode) each lint issue. All three
//! go through [`Reviewer`]. The CLI answers on the terminal, tests answer
//! from a script, and `--yes` uses [`AutoApprove`].
//!
//! Methods are blocking; the State Manager calls them from
//! `spawn_blocking` so an interrupt is still noticed while a prompt waits.

use crate::error::ConvertError;
use crate::model::{FontMapping, Issue, Resolution};
use crate::pipeline::assess::PreflightReport;
use crate::pipeline::fonts::FontInventory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Proceed,
    Abort,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MappingDecision {
    /// Keep the proposal as it is.
    Confirm,
    /// Use this mapping instead. Signatures left out become unmapped.
    Edit(FontMapping),
    /// Ask again.
    Reject,
}

pub trait Reviewer: Send + Sync {
    /// Phase 0: proceed with the conversion or abort.
    fn preflight(&self, report: &PreflightReport) -> Result<GateDecision, ConvertError>;

    /// Phase 7: confirm, edit or reject the proposed mapping.
    fn font_mapping(
        &self,
        proposal: &FontMapping,
        inventory: &FontInventory,
    ) -> Result<MappingDecision, ConvertError>;

    /// Phase 9, interactive mode: resolve one issue. `position` is 1-based.
    fn resolve_issue(
        &self,
        issue: &Issue,
        position: usize,
        total: usize,
    ) -> Result<Resolution, ConvertError>;
}

/// Proceeds, confirms every proposal and accepts every issue as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

impl Reviewer for AutoApprove {
    fn preflight(&self, _report: &PreflightReport) -> Result<GateDecision, ConvertError> {
        Ok(GateDecision::Proceed)
    }

    fn font_mapping(
        &self,
        _proposal: &FontMapping,
        _inventory: &FontInventory,
    ) -> Result<MappingDecision, ConvertError> {
        Ok(MappingDecision::Confirm)
    }

    fn resolve_issue(
        &self,
        _issue: &Issue,
        _position: usize,
        _total: usize,
    ) -> Result<Resolution, ConvertError> {
        Ok(Resolution::Accepted)
    }
}
