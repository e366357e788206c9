//! Report generation (phase 10).
//!
//! Everything here is a pure function of the persisted artifacts. Nothing
//! carries a timestamp or a duration, so two runs over the same input and the
//! same resolutions produce byte-identical files.

use super::fonts::{mapping_table, FontInventory};
use super::headings::{BlockKind, Skeleton};
use super::postprocess::clean_markdown;
use super::review::IssueLog;
use crate::config::ReviewMode;
use crate::model::{DocumentMetrics, ExtractedPage, FontMapping, Resolution, Severity};

/// Everything the generator reads.
pub struct ReportInput<'a> {
    /// Output stem, e.g. `lost-mine`.
    pub name: &'a str,
    /// File name of the source PDF.
    pub source_file: &'a str,
    /// Title from the PDF metadata, if any.
    pub title: Option<&'a str>,
    pub metrics: &'a DocumentMetrics,
    pub pages: &'a [ExtractedPage],
    pub skeleton: &'a Skeleton,
    pub revised_markdown: &'a str,
    pub inventory: &'a FontInventory,
    pub mapping: &'a FontMapping,
    pub log: &'a IssueLog,
    pub review_mode: ReviewMode,
    pub provenance_notice: Option<&'a str>,
}

/// The three report files, as text.
#[derive(Debug, Clone, PartialEq)]
pub struct Reports {
    pub final_markdown: String,
    pub conversion_report: String,
    pub resolution_log: String,
}

pub fn generate(input: &ReportInput<'_>) -> Reports {
    Reports {
        final_markdown: final_markdown(input),
        conversion_report: conversion_report(input),
        resolution_log: resolution_log(input),
    }
}

// ── <name>-final.md ──────────────────────────────────────────────────────

fn final_markdown(input: &ReportInput<'_>) -> String {
    let title = input
        .title
        .map(str::to_string)
        .or_else(|| {
            input
                .skeleton
                .blocks
                .iter()
                .find(|b| b.heading_level() == Some(1))
                .map(|b| b.text.clone())
        })
        .unwrap_or_else(|| input.name.to_string());
    let notice = input.provenance_notice.map(str::to_string).unwrap_or_else(|| {
        format!(
            "Converted from {} by pdf2md. Check against the source before play.",
            input.source_file
        )
    });

    let mut out = String::from("---\n");
    // JSON strings are valid YAML scalars and escape everything we need.
    out.push_str(&format!("title: {}\n", yaml_string(&title)));
    out.push_str(&format!("source: {}\n", yaml_string(input.source_file)));
    out.push_str(&format!("pages: {}\n", input.metrics.page_count));
    out.push_str("---\n\n");
    for line in notice.lines() {
        out.push_str(&format!("> {line}\n"));
    }
    out.push('\n');
    out.push_str(input.revised_markdown);
    clean_markdown(&out)
}

fn yaml_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s.replace('"', "'")))
}

// ── conversion-report.md ─────────────────────────────────────────────────

/// A top-level section of the skeleton and the issues found inside it.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionRating {
    pub title: String,
    pub info: usize,
    pub warnings: usize,
    pub errors: usize,
}

impl SectionRating {
    pub fn rating(&self) -> &'static str {
        if self.errors > 0 {
            "poor"
        } else if self.warnings > 2 {
            "fair"
        } else if self.warnings > 0 {
            "good"
        } else {
            "clean"
        }
    }
}

/// Rate each section opened by a heading at the shallowest level used.
/// Blocks before the first such heading form a "(front matter)" section.
pub fn section_ratings(skeleton: &Skeleton, log: &IssueLog) -> Vec<SectionRating> {
    let top = skeleton.blocks.iter().filter_map(|b| b.heading_level()).min();
    let mut sections: Vec<SectionRating> = Vec::new();
    let mut owner = Vec::with_capacity(skeleton.blocks.len());

    for block in &skeleton.blocks {
        if top.is_some() && block.heading_level() == top {
            sections.push(SectionRating {
                title: block.text.clone(),
                info: 0,
                warnings: 0,
                errors: 0,
            });
        } else if sections.is_empty() {
            sections.push(SectionRating {
                title: "(front matter)".to_string(),
                info: 0,
                warnings: 0,
                errors: 0,
            });
        }
        owner.push(sections.len() - 1);
    }

    for entry in &log.entries {
        let Some(section) = owner
            .get(entry.issue.location.block)
            .and_then(|i| sections.get_mut(*i))
        else {
            continue;
        };
        match entry.issue.severity {
            Severity::Info => section.info += 1,
            Severity::Warning => section.warnings += 1,
            Severity::Error => section.errors += 1,
        }
    }
    sections
}

fn conversion_report(input: &ReportInput<'_>) -> String {
    let m = input.metrics;
    let blocks = &input.skeleton.blocks;
    let headings = blocks.iter().filter(|b| b.heading_level().is_some()).count();
    let callouts = blocks
        .iter()
        .filter(|b| matches!(b.kind, BlockKind::Callout { .. }))
        .count();
    let images = blocks
        .iter()
        .filter(|b| matches!(b.kind, BlockKind::Image { .. }))
        .count();
    let degraded: Vec<&ExtractedPage> = input.pages.iter().filter(|p| p.degraded.is_some()).collect();

    let mut out = format!("# Conversion report: {}\n\n", input.name);
    out.push_str(&format!("Source: `{}`\n\n", input.source_file));

    out.push_str("## Totals\n\n");
    out.push_str("| Item | Count |\n| --- | --- |\n");
    for (label, count) in [
        ("Pages", m.page_count),
        ("Degraded pages", degraded.len()),
        ("Font signatures", input.inventory.fonts.len()),
        ("Headings", headings),
        ("Call-outs", callouts),
        ("Images", images),
        ("Issues", input.log.len()),
    ] {
        out.push_str(&format!("| {label} | {count} |\n"));
    }

    out.push_str("\n## Sections\n\n");
    let ratings = section_ratings(input.skeleton, input.log);
    if ratings.is_empty() {
        out.push_str("The document has no content blocks.\n");
    } else {
        out.push_str("| Section | Rating | Errors | Warnings | Info |\n| --- | --- | --- | --- | --- |\n");
        for s in &ratings {
            out.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                s.title.replace('|', "\\|"),
                s.rating(),
                s.errors,
                s.warnings,
                s.info
            ));
        }
    }

    out.push_str("\n## Degraded pages\n\n");
    if degraded.is_empty() {
        out.push_str("None.\n");
    } else {
        for page in degraded {
            out.push_str(&format!(
                "- Page {}: {}\n",
                page.page,
                page.degraded.as_deref().unwrap_or_default()
            ));
        }
    }

    out.push_str("\n## Font mapping\n\n```text\n");
    out.push_str(&mapping_table(input.inventory, input.mapping));
    out.push_str("```\n");

    out.push_str("\n## Review\n\n");
    out.push_str(&format!("Mode: {}\n\n", input.review_mode));
    if input.log.is_empty() {
        out.push_str("No issues were found.\n");
    } else {
        for (label, count) in input.log.tally() {
            out.push_str(&format!("- {label}: {count}\n"));
        }
    }
    clean_markdown(&out)
}

// ── review-checklist.md ──────────────────────────────────────────────────

fn resolution_log(input: &ReportInput<'_>) -> String {
    let mut out = format!("# Review log: {}\n\n", input.name);
    if input.log.is_empty() {
        out.push_str("No issues were found.\n");
        return out;
    }
    for entry in &input.log.entries {
        let issue = &entry.issue;
        let resolution = entry.resolution.as_ref().map_or("unresolved", |r| r.label());
        out.push_str(&format!(
            "- **{}** {} ({}), page {}: {} → {}\n",
            issue.id,
            issue.kind.slug(),
            issue.severity,
            issue.location.page,
            issue.message,
            resolution
        ));
        if let Some(Resolution::Custom(text)) = &entry.resolution {
            for line in text.lines() {
                out.push_str(&format!("  > {line}\n"));
            }
        }
    }

    if input.review_mode == ReviewMode::Checklist {
        let carried: Vec<_> = input
            .log
            .entries
            .iter()
            .filter(|e| e.resolution == Some(Resolution::Accepted))
            .collect();
        if !carried.is_empty() {
            out.push_str("\n## Accepted as-is\n\n");
            out.push_str("These were left unchanged and may deserve a second look.\n\n");
            for entry in carried {
                out.push_str(&format!(
                    "- [ ] {} (page {}): `{}`\n",
                    entry.issue.id, entry.issue.location.page, entry.issue.location.excerpt
                ));
            }
        }
    }
    clean_markdown(&out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FontRole, FontSignature, Issue, IssueKind, IssueLocation};
    use crate::pipeline::headings::Block;
    use std::collections::BTreeMap;

    fn block(kind: BlockKind, text: &str) -> Block {
        Block {
            kind,
            text: text.into(),
            page: 1,
            font: None,
        }
    }

    fn skeleton() -> Skeleton {
        Skeleton {
            blocks: vec![
                block(BlockKind::Paragraph, "Credits"),
                block(BlockKind::Heading { level: 1 }, "Part One"),
                block(BlockKind::Paragraph, "Go to area Z."),
                block(BlockKind::Heading { level: 2 }, "The Inn"),
                block(BlockKind::Heading { level: 1 }, "Part Two"),
                block(BlockKind::Paragraph, "End."),
            ],
            unmapped_fonts: vec![],
        }
    }

    fn issue(n: usize, block: usize, severity: Severity) -> Issue {
        Issue {
            id: format!("ISSUE-{n:03}"),
            kind: IssueKind::BrokenTransition,
            severity,
            location: IssueLocation {
                page: 1,
                block,
                line: 1,
                excerpt: "Go to area Z.".into(),
            },
            message: "Reference to area Z has no matching target".into(),
            suggested_fix: None,
        }
    }

    fn metrics() -> DocumentMetrics {
        let mut counts = BTreeMap::new();
        counts.insert(FontSignature::new("Body", 10.0), 500);
        DocumentMetrics::from_counts(3, counts, 0, 4)
    }

    #[test]
    fn sections_collect_issues_by_block() {
        let log = IssueLog::new(vec![
            issue(1, 2, Severity::Warning),
            issue(2, 3, Severity::Info),
            issue(3, 0, Severity::Error),
        ]);
        let ratings = section_ratings(&skeleton(), &log);
        let titles: Vec<_> = ratings.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["(front matter)", "Part One", "Part Two"]);
        assert_eq!(ratings[0].rating(), "poor");
        assert_eq!((ratings[1].warnings, ratings[1].info), (1, 1));
        assert_eq!(ratings[1].rating(), "good");
        assert_eq!(ratings[2].rating(), "clean");
    }

    fn input<'a>(
        s: &'a Skeleton,
        m: &'a DocumentMetrics,
        pages: &'a [ExtractedPage],
        inv: &'a FontInventory,
        map: &'a FontMapping,
        log: &'a IssueLog,
        mode: ReviewMode,
    ) -> ReportInput<'a> {
        ReportInput {
            name: "mod",
            source_file: "mod.pdf",
            title: None,
            metrics: m,
            pages,
            skeleton: s,
            revised_markdown: "# Part One\n\nText\r\n",
            inventory: inv,
            mapping: map,
            log,
            review_mode: mode,
            provenance_notice: None,
        }
    }

    #[test]
    fn final_markdown_has_front_matter_and_notice() {
        let (s, m, inv) = (skeleton(), metrics(), FontInventory::default());
        let mut map = FontMapping::default();
        map.assign(FontSignature::new("Body", 10.0), FontRole::Body);
        let log = IssueLog::default();
        let r = generate(&input(&s, &m, &[], &inv, &map, &log, ReviewMode::Interactive));
        assert_eq!(
            r.final_markdown,
            "---\ntitle: \"Part One\"\nsource: \"mod.pdf\"\npages: 3\n---\n\n\
             > Converted from mod.pdf by pdf2md. Check against the source before play.\n\n\
             # Part One\n\nText\n"
        );
        assert!(r.resolution_log.contains("No issues were found."));
        assert!(r.conversion_report.contains("| Degraded pages | 0 |"));
    }

    #[test]
    fn custom_notice_is_visible_on_every_line() {
        let (s, m, inv, map, log) = (
            skeleton(),
            metrics(),
            FontInventory::default(),
            FontMapping::default(),
            IssueLog::default(),
        );
        let mut i = input(&s, &m, &[], &inv, &map, &log, ReviewMode::Interactive);
        i.provenance_notice = Some("For my table only.\nDo not share.");
        let md = generate(&i).final_markdown;
        assert!(md.contains("---\n\n> For my table only.\n> Do not share.\n\n# Part One\n"));
        assert!(!md.contains("<!--"));
    }

    #[test]
    fn report_lists_degraded_pages_and_tally() {
        let (s, m, inv, map) = (skeleton(), metrics(), FontInventory::default(), FontMapping::default());
        let pages = vec![ExtractedPage {
            page: 2,
            spans: vec![],
            images: vec![],
            degraded: Some("image 1 could not be decoded".into()),
        }];
        let mut log = IssueLog::new(vec![issue(1, 2, Severity::Warning)]);
        log.resolve(1, Resolution::Dismissed).unwrap();
        let r = generate(&input(&s, &m, &pages, &inv, &map, &log, ReviewMode::Interactive));
        assert!(r.conversion_report.contains("- Page 2: image 1 could not be decoded"));
        assert!(r.conversion_report.contains("- dismissed: 1"));
        assert!(r.resolution_log.contains("→ dismissed"));
    }

    #[test]
    fn checklist_mode_carries_accepted_issues_forward() {
        let (s, m, inv, map) = (skeleton(), metrics(), FontInventory::default(), FontMapping::default());
        let mut log = IssueLog::new(vec![issue(1, 2, Severity::Warning), issue(2, 5, Severity::Warning)]);
        log.resolve(1, Resolution::Accepted).unwrap();
        log.resolve(2, Resolution::Custom("The end.".into())).unwrap();
        let checklist = generate(&input(&s, &m, &[], &inv, &map, &log, ReviewMode::Checklist));
        assert!(checklist.resolution_log.contains("## Accepted as-is"));
        assert!(checklist.resolution_log.contains("- [ ] ISSUE-001"));
        assert!(!checklist.resolution_log.contains("- [ ] ISSUE-002"));
        assert!(checklist.resolution_log.contains("  > The end."));

        let interactive = generate(&input(&s, &m, &[], &inv, &map, &log, ReviewMode::Interactive));
        assert!(!interactive.resolution_log.contains("Accepted as-is"));
    }

    #[test]
    fn output_is_stable() {
        let (s, m, inv, map) = (skeleton(), metrics(), FontInventory::default(), FontMapping::default());
        let log = IssueLog::default();
        let a = generate(&input(&s, &m, &[], &inv, &map, &log, ReviewMode::Interactive));
        let b = generate(&input(&s, &m, &[], &inv, &map, &log, ReviewMode::Interactive));
        assert_eq!(a, b);
    }
}
