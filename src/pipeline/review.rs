//! Issue resolution (phase 9): the issue log, the checklist transport and
//! the revision step.
//!
//! Resolutions never touch the skeleton directly. They are recorded in the
//! [`IssueLog`] (`.pipeline/issues.json`) and only change the Markdown when
//! [`revise`] applies them, once every issue has one.

use super::headings::{render_blocks, Block, BlockKind, Skeleton};
use crate::error::ConvertError;
use crate::model::{Issue, Resolution, SuggestedFix};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

pub const CUSTOM_BEGIN: &str = "<!-- custom:begin -->";
pub const CUSTOM_END: &str = "<!-- custom:end -->";

/// Checklist options in the order they are offered.
pub const OPTIONS: [&str; 4] = ["accept", "fix", "dismiss", "custom"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueEntry {
    pub issue: Issue,
    pub resolution: Option<Resolution>,
}

/// Every issue found in phase 9 and how it was resolved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssueLog {
    pub entries: Vec<IssueEntry>,
}

impl IssueLog {
    pub fn new(issues: Vec<Issue>) -> Self {
        Self {
            entries: issues
                .into_iter()
                .map(|issue| IssueEntry {
                    issue,
                    resolution: None,
                })
                .collect(),
        }
    }

    /// Carry resolutions over from `previous` for the given 1-based steps,
    /// provided the issue at that position is unchanged.
    pub fn carry_over(&mut self, previous: &IssueLog, steps: impl Fn(usize) -> bool) {
        for (i, entry) in self.entries.iter_mut().enumerate() {
            if !steps(i + 1) {
                continue;
            }
            if let Some(old) = previous.entries.get(i) {
                if old.issue == entry.issue {
                    entry.resolution = old.resolution.clone();
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_resolved(&self) -> bool {
        self.entries.iter().all(|e| e.resolution.is_some())
    }

    /// 1-based positions still waiting for a resolution.
    pub fn unresolved(&self) -> Vec<usize> {
        self.positions(false)
    }

    /// 1-based positions that have a resolution.
    pub fn resolved(&self) -> Vec<usize> {
        self.positions(true)
    }

    fn positions(&self, resolved: bool) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.resolution.is_some() == resolved)
            .map(|(i, _)| i + 1)
            .collect()
    }

    /// Record a resolution for the issue at 1-based `position`.
    pub fn resolve(&mut self, position: usize, resolution: Resolution) -> Result<(), ConvertError> {
        let entry = position
            .checked_sub(1)
            .and_then(|i| self.entries.get_mut(i))
            .ok_or_else(|| ConvertError::Internal(format!("no issue at position {position}")))?;
        if resolution == Resolution::Fixed && entry.issue.suggested_fix.is_none() {
            return Err(ConvertError::rejected(
                format!("fix {}", entry.issue.id),
                "the issue has no suggested fix",
            ));
        }
        entry.resolution = Some(resolution);
        Ok(())
    }

    /// Count of each resolution label, for the report.
    pub fn tally(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.entries {
            let label = entry.resolution.as_ref().map_or("unresolved", |r| r.label());
            *counts.entry(label).or_insert(0) += 1;
        }
        counts
    }
}

// ── Checklist transport ──────────────────────────────────────────────────

/// Render the unresolved issues as an annotatable checklist.
pub fn render_checklist(log: &IssueLog, name: &str) -> String {
    let mut out = format!("# Review checklist: {name}\n\n");
    out.push_str(
        "Tick exactly one box per issue by changing `[ ]` to `[x]`.\n\
         For `custom`, write the replacement Markdown between the custom markers.\n\
         Then run `pdf2md --resume`.\n",
    );
    for entry in log.entries.iter().filter(|e| e.resolution.is_none()) {
        let issue = &entry.issue;
        out.push_str(&format!(
            "\n## {} · {} · {}\n\n",
            issue.id,
            issue.kind.slug(),
            issue.severity
        ));
        out.push_str(&format!(
            "- Location: page {}, line {}\n",
            issue.location.page, issue.location.line
        ));
        out.push_str(&format!("- Excerpt: `{}`\n", issue.location.excerpt));
        out.push_str(&format!("- Problem: {}\n", issue.message));
        if let Some(ref fix) = issue.suggested_fix {
            out.push_str(&format!("- Suggested fix: {fix}\n"));
        }
        out.push('\n');
        for option in OPTIONS {
            if option == "fix" && issue.suggested_fix.is_none() {
                continue;
            }
            out.push_str(&format!("- [ ] {option}\n"));
        }
        out.push_str(&format!("\n{CUSTOM_BEGIN}\n{CUSTOM_END}\n"));
    }
    out
}

#[derive(Debug, Default)]
struct Section {
    ticked: Vec<String>,
    custom: Vec<String>,
    in_custom: bool,
}

/// Parse an annotated checklist against `log`.
///
/// Returns the resolutions in detection order, or every problem found:
/// missing, duplicated or unknown sections, zero or several ticks,
/// unknown options, and contradictory custom text.
pub fn parse_checklist(text: &str, log: &IssueLog) -> Result<Vec<(usize, Resolution)>, Vec<String>> {
    let mut sections: BTreeMap<String, Section> = BTreeMap::new();
    let mut problems = Vec::new();
    let mut current: Option<String> = None;

    for line in text.lines() {
        let trimmed = line.trim();
        // Custom text is free Markdown and may carry its own headings.
        if let Some(section) = current
            .as_ref()
            .and_then(|id| sections.get_mut(id))
            .filter(|s| s.in_custom)
        {
            if trimmed == CUSTOM_END {
                section.in_custom = false;
            } else {
                section.custom.push(line.to_string());
            }
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("## ") {
            let id = rest.split_whitespace().next().unwrap_or("").to_string();
            if sections.contains_key(&id) {
                problems.push(format!("{id} appears more than once"));
                current = None;
            } else {
                sections.insert(id.clone(), Section::default());
                current = Some(id);
            }
            continue;
        }
        let Some(section) = current.as_ref().and_then(|id| sections.get_mut(id)) else {
            continue;
        };
        if trimmed == CUSTOM_BEGIN {
            section.in_custom = true;
        } else if let Some(option) = ticked_option(trimmed) {
            section.ticked.push(option);
        }
    }

    let positions: BTreeMap<&str, usize> = log
        .entries
        .iter()
        .enumerate()
        .map(|(i, e)| (e.issue.id.as_str(), i + 1))
        .collect();
    for id in sections.keys() {
        if !positions.contains_key(id.as_str()) {
            problems.push(format!("{id} is not a known issue"));
        }
    }

    let mut resolutions = Vec::new();
    for (i, entry) in log.entries.iter().enumerate() {
        if entry.resolution.is_some() {
            continue;
        }
        let id = &entry.issue.id;
        let Some(section) = sections.get(id) else {
            problems.push(format!("{id} is missing from the checklist"));
            continue;
        };
        let custom = section.custom.join("\n").trim().to_string();
        let resolution = match section.ticked.as_slice() {
            [] => {
                problems.push(format!("{id}: no option ticked"));
                continue;
            }
            [one] => one.as_str(),
            many => {
                problems.push(format!(
                    "{id}: {} options ticked ({}); tick exactly one",
                    many.len(),
                    many.join(", ")
                ));
                continue;
            }
        };
        let parsed = match resolution {
            "accept" => Resolution::Accepted,
            "dismiss" => Resolution::Dismissed,
            "fix" if entry.issue.suggested_fix.is_none() => {
                problems.push(format!("{id}: fix ticked but the issue has no suggested fix"));
                continue;
            }
            "fix" => Resolution::Fixed,
            "custom" if custom.is_empty() => {
                problems.push(format!("{id}: custom ticked but the custom block is empty"));
                continue;
            }
            "custom" => Resolution::Custom(custom.clone()),
            other => {
                problems.push(format!("{id}: unknown option '{other}'"));
                continue;
            }
        };
        if !custom.is_empty() && !matches!(parsed, Resolution::Custom(_)) {
            problems.push(format!(
                "{id}: custom text given but '{resolution}' ticked"
            ));
            continue;
        }
        resolutions.push((i + 1, parsed));
    }

    if problems.is_empty() {
        debug!("Checklist parsed: {} resolutions", resolutions.len());
        Ok(resolutions)
    } else {
        Err(problems)
    }
}

/// `- [x] accept` → `Some("accept")`; unticked boxes and other lines → `None`.
fn ticked_option(line: &str) -> Option<String> {
    let rest = line.strip_prefix("- ").or_else(|| line.strip_prefix("* "))?;
    let rest = rest
        .strip_prefix("[x]")
        .or_else(|| rest.strip_prefix("[X]"))?;
    let option = rest.trim().split_whitespace().next()?.to_ascii_lowercase();
    Some(option)
}

// ── Revision step ────────────────────────────────────────────────────────

/// Apply `fixed` and `custom` resolutions to a copy of the skeleton blocks.
///
/// Resolutions are applied in detection order. Once a custom resolution has
/// replaced a block, later resolutions for the same block are skipped.
pub fn revise(skeleton: &Skeleton, log: &IssueLog) -> Result<Vec<Block>, ConvertError> {
    if !log.is_resolved() {
        return Err(ConvertError::RevisionFailed(format!(
            "{} issue(s) still unresolved",
            log.unresolved().len()
        )));
    }
    let mut blocks = skeleton.blocks.clone();
    let mut replaced = HashSet::new();

    for entry in &log.entries {
        let issue = &entry.issue;
        let index = issue.location.block;
        let Some(resolution) = entry.resolution.as_ref() else {
            continue;
        };
        if !matches!(resolution, Resolution::Fixed | Resolution::Custom(_)) {
            continue;
        }
        if replaced.contains(&index) {
            warn!("{}: block {index} was already replaced; skipping", issue.id);
            continue;
        }
        let block = blocks.get_mut(index).ok_or_else(|| {
            ConvertError::RevisionFailed(format!("{}: block {index} does not exist", issue.id))
        })?;
        match resolution {
            Resolution::Custom(text) => {
                block.kind = BlockKind::Raw;
                block.text = text.clone();
                replaced.insert(index);
            }
            Resolution::Fixed => {
                let fix = issue.suggested_fix.as_ref().ok_or_else(|| {
                    ConvertError::RevisionFailed(format!("{} has no suggested fix", issue.id))
                })?;
                apply_fix(block, fix).map_err(|reason| {
                    ConvertError::RevisionFailed(format!("{}: {reason}", issue.id))
                })?;
            }
            _ => {}
        }
    }

    blocks.retain(|b| !(b.kind == BlockKind::Raw && b.text.trim().is_empty()));
    Ok(blocks)
}

fn apply_fix(block: &mut Block, fix: &SuggestedFix) -> Result<(), String> {
    match (fix, &block.kind) {
        (SuggestedFix::Demote, BlockKind::Heading { .. }) => {
            block.kind = BlockKind::Paragraph;
        }
        (SuggestedFix::SetLevel { level }, BlockKind::Heading { .. }) => {
            block.kind = BlockKind::Heading { level: *level };
        }
        (SuggestedFix::Retag { kind }, BlockKind::Callout { .. }) => {
            block.kind = BlockKind::Callout {
                kind: *kind,
                ambiguous: false,
            };
        }
        (fix, kind) => return Err(format!("cannot {fix} on a {kind:?} block")),
    }
    Ok(())
}

/// Render revised blocks to Markdown.
pub fn render_revised(blocks: &[Block]) -> String {
    render_blocks(blocks).0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CalloutKind, IssueKind, IssueLocation, Severity};

    fn issue(n: usize, kind: IssueKind, block: usize, fix: Option<SuggestedFix>) -> Issue {
        Issue {
            id: format!("ISSUE-{n:03}"),
            kind,
            severity: Severity::Warning,
            location: IssueLocation {
                page: 1,
                block,
                line: 1,
                excerpt: "x".into(),
            },
            message: "problem".into(),
            suggested_fix: fix,
        }
    }

    fn skeleton() -> Skeleton {
        Skeleton {
            blocks: vec![
                Block {
                    kind: BlockKind::Heading { level: 1 },
                    text: "Empty".into(),
                    page: 1,
                    font: None,
                },
                Block {
                    kind: BlockKind::Heading { level: 3 },
                    text: "Deep".into(),
                    page: 1,
                    font: None,
                },
                Block {
                    kind: BlockKind::Callout {
                        kind: CalloutKind::GmOnly,
                        ambiguous: true,
                    },
                    text: "Boxed".into(),
                    page: 1,
                    font: None,
                },
                Block {
                    kind: BlockKind::Paragraph,
                    text: "Body".into(),
                    page: 1,
                    font: None,
                },
            ],
            unmapped_fonts: vec![],
        }
    }

    fn log() -> IssueLog {
        IssueLog::new(vec![
            issue(1, IssueKind::OrphanedHeading, 0, Some(SuggestedFix::Demote)),
            issue(2, IssueKind::HeadingLevelGap, 1, Some(SuggestedFix::SetLevel { level: 2 })),
            issue(
                3,
                IssueKind::AmbiguousCallout,
                2,
                Some(SuggestedFix::Retag {
                    kind: CalloutKind::ReadAloud,
                }),
            ),
            issue(4, IssueKind::BrokenTransition, 3, None),
        ])
    }

    #[test]
    fn fix_requires_a_suggestion() {
        let mut l = log();
        assert!(l.resolve(4, Resolution::Fixed).is_err());
        l.resolve(4, Resolution::Dismissed).unwrap();
        assert_eq!(l.unresolved(), vec![1, 2, 3]);
    }

    #[test]
    fn resolved_and_unresolved_partition_the_log() {
        let mut l = log();
        l.resolve(2, Resolution::Accepted).unwrap();
        l.resolve(4, Resolution::Dismissed).unwrap();
        assert_eq!(l.resolved(), vec![2, 4]);
        assert_eq!(l.unresolved(), vec![1, 3]);
        assert!(!l.is_resolved());
    }

    #[test]
    fn revision_applies_fixes_and_custom_text() {
        let mut l = log();
        l.resolve(1, Resolution::Fixed).unwrap();
        l.resolve(2, Resolution::Fixed).unwrap();
        l.resolve(3, Resolution::Fixed).unwrap();
        l.resolve(4, Resolution::Custom("Body, corrected.".into())).unwrap();
        let s = skeleton();
        let revised = revise(&s, &l).unwrap();
        assert_eq!(
            render_revised(&revised),
            "Empty\n\n## Deep\n\n> [!read-aloud]\n> Boxed\n\nBody, corrected.\n"
        );
        // The skeleton itself is untouched.
        assert_eq!(s.blocks[0].kind, BlockKind::Heading { level: 1 });
    }

    #[test]
    fn accepted_and_dismissed_change_nothing() {
        let mut l = log();
        for p in 1..=4 {
            l.resolve(p, if p % 2 == 0 { Resolution::Accepted } else { Resolution::Dismissed })
                .unwrap();
        }
        let s = skeleton();
        assert_eq!(revise(&s, &l).unwrap(), s.blocks);
        assert_eq!(l.tally().get("accepted"), Some(&2));
    }

    #[test]
    fn revision_refuses_unresolved_log() {
        assert!(matches!(
            revise(&skeleton(), &log()),
            Err(ConvertError::RevisionFailed(_))
        ));
    }

    #[test]
    fn empty_custom_text_removes_block() {
        let mut l = IssueLog::new(vec![issue(1, IssueKind::BrokenTransition, 3, None)]);
        l.resolve(1, Resolution::Custom("   ".into())).unwrap();
        let revised = revise(&skeleton(), &l).unwrap();
        assert_eq!(revised.len(), 3);
    }

    fn tick(checklist: &str, id: &str, option: &str) -> String {
        let mut out = String::new();
        let mut in_section = false;
        for line in checklist.lines() {
            if line.starts_with("## ") {
                in_section = line.contains(id);
            }
            if in_section && line == format!("- [ ] {option}") {
                out.push_str(&format!("- [x] {option}\n"));
            } else {
                out.push_str(line);
                out.push('\n');
            }
        }
        out
    }

    #[test]
    fn checklist_roundtrip_with_custom() {
        let l = log();
        let mut text = render_checklist(&l, "mod");
        assert!(!text.contains("[x]"));
        text = tick(&text, "ISSUE-001", "fix");
        text = tick(&text, "ISSUE-002", "accept");
        text = tick(&text, "ISSUE-003", "dismiss");
        text = tick(&text, "ISSUE-004", "custom");
        text = text.replacen(
            &format!("{CUSTOM_BEGIN}\n{CUSTOM_END}"),
            "PLACEHOLDER",
            3,
        );
        text = text.replacen(
            &format!("{CUSTOM_BEGIN}\n{CUSTOM_END}"),
            &format!("{CUSTOM_BEGIN}\nSee the *map* instead.\n{CUSTOM_END}"),
            1,
        );
        text = text.replace("PLACEHOLDER", &format!("{CUSTOM_BEGIN}\n{CUSTOM_END}"));

        let parsed = parse_checklist(&text, &l).unwrap();
        assert_eq!(
            parsed,
            vec![
                (1, Resolution::Fixed),
                (2, Resolution::Accepted),
                (3, Resolution::Dismissed),
                (4, Resolution::Custom("See the *map* instead.".into())),
            ]
        );
    }

    #[test]
    fn checklist_without_fix_option_when_none_suggested() {
        let text = render_checklist(&log(), "mod");
        let section = text.split("## ISSUE-004").nth(1).unwrap();
        assert!(!section.contains("- [ ] fix"));
        assert!(section.contains("- [ ] custom"));
    }

    #[test]
    fn checklist_problems_are_all_reported() {
        let l = log();
        let mut text = render_checklist(&l, "mod");
        text = tick(&text, "ISSUE-001", "accept");
        text = tick(&text, "ISSUE-001", "dismiss");
        // ISSUE-002: nothing ticked
        text = tick(&text, "ISSUE-003", "custom");
        text = text.replace("## ISSUE-004", "## ISSUE-099");
        let problems = parse_checklist(&text, &l).unwrap_err();
        assert!(problems.iter().any(|p| p.contains("ISSUE-001: 2 options ticked")));
        assert!(problems.iter().any(|p| p == "ISSUE-002: no option ticked"));
        assert!(problems.iter().any(|p| p.contains("ISSUE-003: custom ticked but the custom block is empty")));
        assert!(problems.iter().any(|p| p == "ISSUE-004 is missing from the checklist"));
        assert!(problems.iter().any(|p| p == "ISSUE-099 is not a known issue"));
    }

    #[test]
    fn duplicate_and_contradictory_sections() {
        let l = IssueLog::new(vec![issue(1, IssueKind::BrokenTransition, 3, None)]);
        let text = format!(
            "## ISSUE-001\n- [x] accept\n{CUSTOM_BEGIN}\nreplacement\n{CUSTOM_END}\n## ISSUE-001\n- [x] dismiss\n"
        );
        let problems = parse_checklist(&text, &l).unwrap_err();
        assert!(problems.iter().any(|p| p == "ISSUE-001 appears more than once"));
        assert!(problems.iter().any(|p| p.contains("custom text given but 'accept' ticked")));
    }

    #[test]
    fn custom_text_may_contain_headings() {
        let l = IssueLog::new(vec![issue(1, IssueKind::OrphanedHeading, 0, Some(SuggestedFix::Demote))]);
        let mut text = tick(&render_checklist(&l, "mod"), "ISSUE-001", "custom");
        text = text.replace(
            &format!("{CUSTOM_BEGIN}\n{CUSTOM_END}"),
            &format!("{CUSTOM_BEGIN}\n## Empty Hall\n\nThe hall is bare.\n{CUSTOM_END}"),
        );
        let parsed = parse_checklist(&text, &l).unwrap();
        assert_eq!(
            parsed,
            vec![(1, Resolution::Custom("## Empty Hall\n\nThe hall is bare.".into()))]
        );
    }

    #[test]
    fn resolved_issues_are_left_out_of_the_checklist() {
        let mut l = log();
        l.resolve(1, Resolution::Accepted).unwrap();
        let text = render_checklist(&l, "mod");
        assert!(!text.contains("ISSUE-001"));
        let mut annotated = text.clone();
        for id in ["ISSUE-002", "ISSUE-003", "ISSUE-004"] {
            annotated = tick(&annotated, id, "accept");
        }
        let parsed = parse_checklist(&annotated, &l).unwrap();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0].0, 2);
    }

    #[test]
    fn carry_over_keeps_matching_positions_only() {
        let mut old = log();
        old.resolve(1, Resolution::Fixed).unwrap();
        old.resolve(2, Resolution::Accepted).unwrap();
        let mut fresh = log();
        fresh.carry_over(&old, |step| step < 2);
        assert_eq!(fresh.entries[0].resolution, Some(Resolution::Fixed));
        assert_eq!(fresh.entries[1].resolution, None);
    }
}
