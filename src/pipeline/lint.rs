//! The lint battery run at the start of phase 9.
//!
//! One ordered pass over the skeleton blocks. Issues are numbered in the
//! order they are detected, which is also the order they are presented and
//! applied in.

use super::headings::{BlockKind, Skeleton};
use crate::model::{CalloutKind, Issue, IssueKind, IssueLocation, Severity, SuggestedFix};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

const EXCERPT_CHARS: usize = 60;

static RE_TRANSITION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:see|go to|turn to|proceed to)\s+(section|chapter|area|page)\s+([A-Za-z0-9][A-Za-z0-9.\-]*[A-Za-z0-9]|[A-Za-z0-9])")
        .unwrap()
});

/// Run every check over `skeleton`. `page_count` bounds page references.
pub fn lint(skeleton: &Skeleton, page_count: usize) -> Vec<Issue> {
    let blocks = &skeleton.blocks;
    let (_, lines) = skeleton.render_with_lines();
    let heading_words: Vec<HashSet<String>> = blocks
        .iter()
        .filter(|b| b.heading_level().is_some())
        .map(|b| words(&b.text))
        .collect();
    let unmapped: HashSet<_> = skeleton.unmapped_fonts.iter().collect();
    let mut raised_fonts = HashSet::new();

    let mut issues = Vec::new();
    let mut push = |kind, severity, index: usize, message: String, fix: Option<SuggestedFix>| {
        let block = &blocks[index];
        issues.push(Issue {
            id: format!("ISSUE-{:03}", issues.len() + 1),
            kind,
            severity,
            location: IssueLocation {
                page: block.page,
                block: index,
                line: lines.get(index).copied().unwrap_or(0),
                excerpt: excerpt(&block.text),
            },
            message,
            suggested_fix: fix,
        });
    };

    let mut previous_level: Option<u8> = None;
    let mut seen_heading = false;

    for (index, block) in blocks.iter().enumerate() {
        match &block.kind {
            BlockKind::Heading { level } => {
                let level = *level;
                if let Some(prev) = previous_level {
                    if level > prev + 1 {
                        push(
                            IssueKind::HeadingLevelGap,
                            Severity::Warning,
                            index,
                            format!("Heading jumps from level {prev} to level {level}"),
                            Some(SuggestedFix::SetLevel { level: prev + 1 }),
                        );
                    }
                }
                if is_orphaned(skeleton, index, level) {
                    push(
                        IssueKind::OrphanedHeading,
                        Severity::Warning,
                        index,
                        "Heading has no content before the next heading of the same or higher level"
                            .to_string(),
                        Some(SuggestedFix::Demote),
                    );
                }
                previous_level = Some(level);
                seen_heading = true;
            }
            BlockKind::Callout { ambiguous, .. } => {
                if !seen_heading {
                    push(
                        IssueKind::UnownedCallout,
                        Severity::Warning,
                        index,
                        "Call-out appears before any heading and belongs to no section".to_string(),
                        None,
                    );
                }
                if *ambiguous {
                    push(
                        IssueKind::AmbiguousCallout,
                        Severity::Info,
                        index,
                        "Boxed text had no border; it was tagged gm-only by default".to_string(),
                        Some(SuggestedFix::Retag {
                            kind: CalloutKind::ReadAloud,
                        }),
                    );
                }
            }
            _ => {}
        }

        if matches!(
            block.kind,
            BlockKind::Paragraph | BlockKind::Callout { .. } | BlockKind::Raw
        ) {
            for caps in RE_TRANSITION.captures_iter(&block.text) {
                let target_kind = caps[1].to_ascii_lowercase();
                let target = &caps[2];
                let resolved = if target_kind == "page" {
                    target
                        .parse::<usize>()
                        .is_ok_and(|p| p >= 1 && p <= page_count)
                } else {
                    let needle = target.to_lowercase();
                    heading_words.iter().any(|w| w.contains(&needle))
                };
                if !resolved {
                    push(
                        IssueKind::BrokenTransition,
                        Severity::Warning,
                        index,
                        format!("Reference to {target_kind} {target} has no matching target"),
                        None,
                    );
                }
            }
        }

        if let Some(ref font) = block.font {
            if unmapped.contains(font) && raised_fonts.insert(font.clone()) {
                push(
                    IssueKind::UnmappedFont,
                    Severity::Info,
                    index,
                    format!("Font {font} has no role in the mapping; its text was kept as body"),
                    None,
                );
            }
        }
    }

    issues
}

/// Nothing follows the heading before the next heading at its own level or
/// above. A deeper heading opens a subsection and counts as content.
fn is_orphaned(skeleton: &Skeleton, index: usize, level: u8) -> bool {
    match skeleton.blocks.get(index + 1).map(|b| b.heading_level()) {
        None => true,
        Some(Some(next)) => next <= level,
        Some(None) => false,
    }
}

fn words(text: &str) -> HashSet<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '.' || c == '-'))
        .map(|w| w.trim_matches(|c| c == '.' || c == '-').to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

fn excerpt(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or("");
    if first_line.chars().count() > EXCERPT_CHARS {
        let cut: String = first_line.chars().take(EXCERPT_CHARS).collect();
        format!("{cut}…")
    } else {
        first_line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FontSignature;
    use crate::pipeline::headings::Block;

    fn heading(level: u8, text: &str) -> Block {
        Block {
            kind: BlockKind::Heading { level },
            text: text.into(),
            page: 1,
            font: None,
        }
    }

    fn para(text: &str) -> Block {
        Block {
            kind: BlockKind::Paragraph,
            text: text.into(),
            page: 1,
            font: None,
        }
    }

    fn callout(ambiguous: bool) -> Block {
        Block {
            kind: BlockKind::Callout {
                kind: CalloutKind::GmOnly,
                ambiguous,
            },
            text: "Boxed text".into(),
            page: 1,
            font: None,
        }
    }

    fn skeleton(blocks: Vec<Block>) -> Skeleton {
        Skeleton {
            blocks,
            unmapped_fonts: vec![],
        }
    }

    #[test]
    fn clean_document_has_no_issues() {
        let s = skeleton(vec![
            heading(1, "Part One"),
            heading(2, "Area B3"),
            para("Go to area B3 or see page 2."),
            heading(2, "The Inn"),
            para("Warm and bright."),
        ]);
        assert!(lint(&s, 4).is_empty());
    }

    #[test]
    fn orphaned_heading_gets_demote_fix() {
        let s = skeleton(vec![heading(1, "Empty"), heading(1, "Full"), para("text")]);
        let issues = lint(&s, 1);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::OrphanedHeading);
        assert_eq!(issues[0].suggested_fix, Some(SuggestedFix::Demote));
        assert_eq!(issues[0].location.block, 0);
        assert_eq!(issues[0].id, "ISSUE-001");
    }

    #[test]
    fn trailing_heading_is_orphaned() {
        let s = skeleton(vec![heading(1, "A"), para("x"), heading(2, "Appendix")]);
        let issues = lint(&s, 1);
        assert_eq!(issues[0].kind, IssueKind::OrphanedHeading);
        assert_eq!(issues[0].location.line, 5);
    }

    #[test]
    fn level_gap_suggests_previous_plus_one() {
        let s = skeleton(vec![heading(1, "A"), para("x"), heading(3, "C"), para("y")]);
        let issues = lint(&s, 1);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::HeadingLevelGap);
        assert_eq!(issues[0].suggested_fix, Some(SuggestedFix::SetLevel { level: 2 }));
    }

    #[test]
    fn callouts_before_headings_and_ambiguous_ones() {
        let s = skeleton(vec![callout(true), heading(1, "A"), callout(false)]);
        let issues = lint(&s, 1);
        let kinds: Vec<_> = issues.iter().map(|i| i.kind).collect();
        assert_eq!(kinds, vec![IssueKind::UnownedCallout, IssueKind::AmbiguousCallout]);
        assert_eq!(issues[1].severity, Severity::Info);
        assert_eq!(issues[1].id, "ISSUE-002");
    }

    #[test]
    fn broken_transitions() {
        let s = skeleton(vec![
            heading(1, "Chapter 1: Arrival"),
            para("Turn to page 40. Then see chapter 1, and go to area X9."),
        ]);
        let issues = lint(&s, 12);
        let messages: Vec<_> = issues.iter().map(|i| i.message.as_str()).collect();
        assert_eq!(issues.len(), 2);
        assert!(messages[0].contains("page 40"));
        assert!(messages[1].contains("area X9"));
        assert!(issues.iter().all(|i| i.kind == IssueKind::BrokenTransition));
    }

    #[test]
    fn unmapped_font_raised_once_at_first_use() {
        let font = FontSignature::new("Odd", 11.0);
        let mut a = para("first");
        a.font = Some(font.clone());
        let mut b = para("second");
        b.font = Some(font.clone());
        let s = Skeleton {
            blocks: vec![heading(1, "H"), a, b],
            unmapped_fonts: vec![font],
        };
        let issues = lint(&s, 1);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueKind::UnmappedFont);
        assert_eq!(issues[0].location.block, 1);
    }

    #[test]
    fn long_excerpts_are_cut() {
        let e = excerpt(&"a".repeat(100));
        assert_eq!(e.chars().count(), EXCERPT_CHARS + 1);
    }
}
