//! Pipeline stages for PDF-to-Markdown conversion.
//!
//! Each submodule implements one transformation. The stages hold no run
//! state of their own; [`crate::convert`] sequences them into phases and
//! persists what they return.
//!
//! ## Data Flow
//!
//! ```text
//! input ─▶ probe ─▶ assess          (phase 0, in memory)
//!            │
//!            ▼
//!         extract ─▶ segment ─▶ fonts ─▶ headings ─▶ lint ─▶ review ─▶ report
//!         (2, 3)     (4)        (5–7)    (8)         (9)     (9)       (10)
//! ```
//!
//! 1. [`input`]    — validate the user-supplied path
//! 2. [`probe`]    — open the PDF and measure it; runs in `spawn_blocking`
//! 3. [`assess`]   — complexity tier for the pre-flight gate
//! 4. [`extract`]  — per-page images and text layout on a bounded worker pool
//! 5. [`segment`]  — lines, paragraphs, call-outs and heading candidates
//! 6. [`fonts`]    — font inventory and heading-level proposal
//! 7. [`headings`] — Markdown skeleton from pages and the confirmed mapping
//! 8. [`lint`]     — ordered check battery
//! 9. [`review`]   — issue log, checklist transport and revision
//! 10. [`report`]  — final Markdown, quality report and review log
//! 11. [`postprocess`] — deterministic Markdown cleanup used by the report

pub mod assess;
pub mod extract;
pub mod fonts;
pub mod headings;
pub mod input;
pub mod lint;
pub mod postprocess;
pub mod probe;
pub mod report;
pub mod review;
pub mod segment;
