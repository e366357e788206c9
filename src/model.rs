//! Data model shared by the pipeline stages.
//!
//! Every type here is plain data: it derives `Serialize`/`Deserialize` so the
//! stage that produces it can persist it under `.pipeline/` and the next
//! stage (possibly in a later process) can read it back. Behaviour lives in
//! the stage modules under [`crate::pipeline`].

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

// ── Geometry ─────────────────────────────────────────────────────────────

/// A rectangle in PDF user space (origin bottom-left, so `top > bottom`).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl BoundingBox {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn merge(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            left: self.left.min(other.left),
            right: self.right.max(other.right),
            top: self.top.max(other.top),
            bottom: self.bottom.min(other.bottom),
        }
    }

    pub fn height(&self) -> f32 {
        (self.top - self.bottom).abs()
    }

    pub fn width(&self) -> f32 {
        (self.right - self.left).abs()
    }

    pub fn mid_y(&self) -> f32 {
        (self.top + self.bottom) / 2.0
    }

    /// True when `inner` lies inside `self`, allowing `slack` points on each edge.
    pub fn encloses(&self, inner: &BoundingBox, slack: f32) -> bool {
        inner.left >= self.left - slack
            && inner.right <= self.right + slack
            && inner.top <= self.top + slack
            && inner.bottom >= self.bottom - slack
    }
}

// ── Fonts ────────────────────────────────────────────────────────────────

/// A normalised (font face, size) pair.
///
/// Faces lose their subset prefix (`ABCDEF+Garamond` → `Garamond`) and sizes
/// are rounded to the nearest half point, so the same visual font always
/// yields the same signature. Equality, hashing and ordering use the rounded
/// size, which makes the type usable as a map key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FontSignature {
    pub face: String,
    pub size: f32,
}

impl FontSignature {
    pub fn new(face: impl AsRef<str>, size: f32) -> Self {
        Self {
            face: normalise_face(face.as_ref()),
            size: (size * 2.0).round() / 2.0,
        }
    }

    fn size_key(&self) -> i64 {
        (self.size * 2.0).round() as i64
    }

    /// Faces whose name advertises a bold weight.
    pub fn looks_bold(&self) -> bool {
        let f = self.face.to_ascii_lowercase();
        f.contains("bold") || f.contains("black") || f.contains("heavy") || f.contains("semibold")
    }
}

fn normalise_face(face: &str) -> String {
    let face = face.trim();
    let stripped = match face.split_once('+') {
        Some((prefix, rest))
            if prefix.len() == 6 && prefix.chars().all(|c| c.is_ascii_uppercase()) =>
        {
            rest
        }
        _ => face,
    };
    if stripped.is_empty() {
        "unknown".to_string()
    } else {
        stripped.to_string()
    }
}

impl PartialEq for FontSignature {
    fn eq(&self, other: &Self) -> bool {
        self.face == other.face && self.size_key() == other.size_key()
    }
}

impl Eq for FontSignature {}

impl Hash for FontSignature {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.face.hash(state);
        self.size_key().hash(state);
    }
}

impl Ord for FontSignature {
    fn cmp(&self, other: &Self) -> Ordering {
        self.face
            .cmp(&other.face)
            .then_with(|| self.size_key().cmp(&other.size_key()))
    }
}

impl PartialOrd for FontSignature {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for FontSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}pt", self.face, self.size)
    }
}

/// One row of the prober's font inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontUsage {
    pub font: FontSignature,
    /// Non-whitespace characters set in this font.
    pub usage: usize,
}

// ── Prober output ────────────────────────────────────────────────────────

/// Low-level document metrics. Produced once by the prober, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetrics {
    pub page_count: usize,
    /// Sorted by usage, most used first.
    pub fonts: Vec<FontUsage>,
    pub image_count: usize,
    pub toc_detected: bool,
    pub toc_entries: usize,
    /// Non-whitespace characters across the whole document.
    pub char_count: usize,
}

impl DocumentMetrics {
    /// Build metrics from raw per-signature character counts.
    pub fn from_counts(
        page_count: usize,
        counts: BTreeMap<FontSignature, usize>,
        image_count: usize,
        toc_entries: usize,
    ) -> Self {
        let char_count = counts.values().sum();
        let mut fonts: Vec<FontUsage> = counts
            .into_iter()
            .map(|(font, usage)| FontUsage { font, usage })
            .collect();
        fonts.sort_by(|a, b| b.usage.cmp(&a.usage).then_with(|| a.font.cmp(&b.font)));
        Self {
            page_count,
            fonts,
            image_count,
            toc_detected: toc_entries > 0,
            toc_entries,
            char_count,
        }
    }
}

// ── Extraction output ────────────────────────────────────────────────────

/// Whether a boxed passage is meant to be read to the players.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CalloutKind {
    ReadAloud,
    GmOnly,
}

impl CalloutKind {
    pub fn tag(&self) -> &'static str {
        match self {
            CalloutKind::ReadAloud => "read-aloud",
            CalloutKind::GmOnly => "gm-only",
        }
    }
}

/// Structural classification of a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tag", rename_all = "kebab-case")]
pub enum SpanKind {
    Paragraph,
    HeadingCandidate,
    /// Boxed text. `ambiguous` is set when no border was found and the
    /// kind fell back to the default.
    Callout { kind: CalloutKind, ambiguous: bool },
}

/// A contiguous unit of page content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuralSpan {
    /// 1-based source page.
    pub page: usize,
    /// Reading-order position on that page.
    pub order: usize,
    pub kind: SpanKind,
    pub text: String,
    pub font: FontSignature,
    pub bold: bool,
    pub italic: bool,
    pub bbox: BoundingBox,
}

/// An image written to `images/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    /// Path relative to the output directory, e.g. `images/page-0003-01.png`.
    pub file: String,
    pub page: usize,
    pub sequence: usize,
    pub bbox: Option<BoundingBox>,
}

/// One page after segmentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedPage {
    /// 1-based page number.
    pub page: usize,
    pub spans: Vec<StructuralSpan>,
    pub images: Vec<ImageRef>,
    /// Set when part of the page could not be extracted.
    pub degraded: Option<String>,
}

// ── Font mapping ─────────────────────────────────────────────────────────

/// What a font signature means structurally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FontRole {
    Heading(u8),
    Body,
}

impl fmt::Display for FontRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FontRole::Heading(level) => write!(f, "H{level}"),
            FontRole::Body => f.write_str("body"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontAssignment {
    pub font: FontSignature,
    pub role: FontRole,
}

/// Font signature → structural role.
///
/// Signatures absent from the mapping are *unmapped*; heading insertion
/// treats them as body text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FontMapping {
    pub assignments: Vec<FontAssignment>,
}

impl FontMapping {
    pub fn role_of(&self, font: &FontSignature) -> Option<FontRole> {
        self.assignments
            .iter()
            .find(|a| &a.font == font)
            .map(|a| a.role)
    }

    /// Insert or replace the role for `font`.
    pub fn assign(&mut self, font: FontSignature, role: FontRole) {
        match self.assignments.iter_mut().find(|a| a.font == font) {
            Some(existing) => existing.role = role,
            None => self.assignments.push(FontAssignment { font, role }),
        }
    }

    pub fn remove(&mut self, font: &FontSignature) {
        self.assignments.retain(|a| &a.font != font);
    }

    /// Distinct heading levels in ascending order.
    pub fn heading_levels(&self) -> Vec<u8> {
        let mut levels: Vec<u8> = self
            .assignments
            .iter()
            .filter_map(|a| match a.role {
                FontRole::Heading(l) => Some(l),
                FontRole::Body => None,
            })
            .collect();
        levels.sort_unstable();
        levels.dedup();
        levels
    }

    /// The explicit body-text bucket.
    pub fn body_fonts(&self) -> impl Iterator<Item = &FontSignature> {
        self.assignments
            .iter()
            .filter(|a| a.role == FontRole::Body)
            .map(|a| &a.font)
    }
}

// ── Lint findings ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueKind {
    OrphanedHeading,
    HeadingLevelGap,
    UnownedCallout,
    AmbiguousCallout,
    BrokenTransition,
    UnmappedFont,
}

impl IssueKind {
    pub fn slug(&self) -> &'static str {
        match self {
            IssueKind::OrphanedHeading => "orphaned-heading",
            IssueKind::HeadingLevelGap => "heading-level-gap",
            IssueKind::UnownedCallout => "unowned-callout",
            IssueKind::AmbiguousCallout => "ambiguous-callout",
            IssueKind::BrokenTransition => "broken-transition",
            IssueKind::UnmappedFont => "unmapped-font",
        }
    }
}

/// Where in the skeleton an issue was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueLocation {
    pub page: usize,
    /// Index into the skeleton's block list.
    pub block: usize,
    /// 1-based line in `skeleton.md`.
    pub line: usize,
    pub excerpt: String,
}

/// A mechanical change the reviewer can accept with one keystroke.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum SuggestedFix {
    /// Turn a heading into body text.
    Demote,
    /// Change a heading's level.
    SetLevel { level: u8 },
    /// Change a call-out's kind.
    Retag { kind: CalloutKind },
}

impl fmt::Display for SuggestedFix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuggestedFix::Demote => f.write_str("demote the heading to body text"),
            SuggestedFix::SetLevel { level } => write!(f, "change the heading to level {level}"),
            SuggestedFix::Retag { kind } => write!(f, "retag the call-out as {}", kind.tag()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// `ISSUE-001`, numbered in detection order.
    pub id: String,
    pub kind: IssueKind,
    pub severity: Severity,
    pub location: IssueLocation,
    pub message: String,
    pub suggested_fix: Option<SuggestedFix>,
}

/// How the reviewer disposed of an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "resolution", content = "text", rename_all = "kebab-case")]
pub enum Resolution {
    /// Keep the Markdown as it is.
    Accepted,
    /// Apply the issue's suggested fix.
    Fixed,
    /// Replace the block with reviewer-provided Markdown.
    Custom(String),
    /// Not a real problem.
    Dismissed,
}

impl Resolution {
    pub fn label(&self) -> &'static str {
        match self {
            Resolution::Accepted => "accepted",
            Resolution::Fixed => "fixed",
            Resolution::Custom(_) => "custom",
            Resolution::Dismissed => "dismissed",
        }
    }
}
