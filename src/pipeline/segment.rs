//! Structural segmentation (phase 4).
//!
//! Raw text segments become [`StructuralSpan`]s in three passes:
//!
//! 1. segments sharing a vertical midpoint are merged into lines;
//! 2. consecutive lines with the same style and a small vertical gap are
//!    merged into paragraphs;
//! 3. each paragraph is tagged `callout`, `heading-candidate` or
//!    `paragraph` from its geometry and style.

use super::extract::PageImagesArtifact;
use crate::backend::{PageLayout, TextSegment};
use crate::model::{BoundingBox, CalloutKind, ExtractedPage, FontSignature, SpanKind, StructuralSpan};
use tracing::debug;

/// Points a paragraph may overhang a border and still count as inside it.
const BORDER_SLACK: f32 = 2.0;
/// Indentation (points past the page's left margin) that marks a side note.
const INDENT_THRESHOLD: f32 = 18.0;
/// A heading candidate must be at least this much larger than the page median.
const HEADING_SIZE_RATIO: f32 = 1.15;
/// Longer single lines are treated as prose even when set large.
const MAX_HEADING_CHARS: usize = 120;
/// Boxes covering nearly the whole page are page frames, not call-outs.
const FRAME_COVERAGE: f32 = 0.9;

#[derive(Debug, Clone)]
struct Line {
    text: String,
    bbox: BoundingBox,
    font: FontSignature,
    size: f32,
    bold: bool,
    italic: bool,
}

#[derive(Debug, Clone)]
struct Paragraph {
    lines: Vec<Line>,
    bbox: BoundingBox,
}

impl Paragraph {
    fn first(&self) -> &Line {
        &self.lines[0]
    }

    fn text(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            if out.is_empty() {
                out.push_str(&line.text);
            } else if out.ends_with('-')
                && line.text.chars().next().is_some_and(|c| c.is_lowercase())
            {
                out.pop();
                out.push_str(&line.text);
            } else {
                out.push(' ');
                out.push_str(&line.text);
            }
        }
        out
    }
}

/// Segment one page. `images` may be `None` when phase 2 produced nothing
/// for the page.
pub fn segment_page(layout: &PageLayout, images: Option<&PageImagesArtifact>) -> ExtractedPage {
    let lines = build_lines(&layout.segments);
    let paragraphs = build_paragraphs(lines);
    let median = median_size(&paragraphs);
    let margin = paragraphs
        .iter()
        .map(|p| p.bbox.left)
        .fold(f32::INFINITY, f32::min);
    let borders: Vec<&BoundingBox> = layout
        .boxes
        .iter()
        .filter(|b| {
            !(layout.width > 0.0
                && layout.height > 0.0
                && b.width() >= FRAME_COVERAGE * layout.width
                && b.height() >= FRAME_COVERAGE * layout.height)
        })
        .collect();

    let spans: Vec<StructuralSpan> = paragraphs
        .iter()
        .enumerate()
        .map(|(order, para)| {
            let first = para.first();
            let kind = classify(para, median, margin, &borders);
            StructuralSpan {
                page: layout.page,
                order,
                kind,
                text: para.text(),
                font: first.font.clone(),
                bold: first.bold,
                italic: first.italic,
                bbox: para.bbox,
            }
        })
        .collect();

    debug!(
        "Page {}: {} spans ({} call-outs, {} heading candidates)",
        layout.page,
        spans.len(),
        spans.iter().filter(|s| matches!(s.kind, SpanKind::Callout { .. })).count(),
        spans.iter().filter(|s| s.kind == SpanKind::HeadingCandidate).count(),
    );

    let degraded = [
        layout.degraded.as_deref(),
        images.and_then(|i| i.degraded.as_deref()),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>();

    ExtractedPage {
        page: layout.page,
        spans,
        images: images.map(|i| i.images.clone()).unwrap_or_default(),
        degraded: (!degraded.is_empty()).then(|| degraded.join("; ")),
    }
}

fn classify(para: &Paragraph, median: f32, margin: f32, borders: &[&BoundingBox]) -> SpanKind {
    if borders.iter().any(|b| b.encloses(&para.bbox, BORDER_SLACK)) {
        return SpanKind::Callout {
            kind: CalloutKind::ReadAloud,
            ambiguous: false,
        };
    }
    let first = para.first();
    let indented = para.bbox.left - margin >= INDENT_THRESHOLD;
    if indented && para.lines.iter().all(|l| l.italic) {
        return SpanKind::Callout {
            kind: CalloutKind::GmOnly,
            ambiguous: true,
        };
    }
    let short = para.lines.len() == 1 && first.text.chars().count() <= MAX_HEADING_CHARS;
    let larger = first.size > median * HEADING_SIZE_RATIO;
    let bold_at_median = first.bold && (first.size - median).abs() < 0.5;
    if short && (larger || bold_at_median) {
        return SpanKind::HeadingCandidate;
    }
    SpanKind::Paragraph
}

/// Merge segments into lines, top of the page first.
fn build_lines(segments: &[TextSegment]) -> Vec<Line> {
    let mut sorted: Vec<&TextSegment> = segments.iter().filter(|s| !s.text.trim().is_empty()).collect();
    sorted.sort_by(|a, b| {
        b.bbox
            .mid_y()
            .total_cmp(&a.bbox.mid_y())
            .then(a.bbox.left.total_cmp(&b.bbox.left))
    });

    let mut groups: Vec<Vec<&TextSegment>> = Vec::new();
    for seg in sorted {
        let joins = groups.last().is_some_and(|group| {
            let anchor = group[0];
            let tolerance = anchor.bbox.height().max(seg.bbox.height()) * 0.5;
            (anchor.bbox.mid_y() - seg.bbox.mid_y()).abs() <= tolerance
        });
        if joins {
            if let Some(group) = groups.last_mut() {
                group.push(seg);
            }
        } else {
            groups.push(vec![seg]);
        }
    }

    groups
        .into_iter()
        .filter_map(|mut group| {
            group.sort_by(|a, b| a.bbox.left.total_cmp(&b.bbox.left));
            // The segment carrying the most characters sets the line's style.
            let dominant = *group.iter().max_by_key(|s| s.text.trim().chars().count())?;
            let bbox = group
                .iter()
                .skip(1)
                .fold(group[0].bbox, |acc, s| acc.merge(&s.bbox));
            let text = group
                .iter()
                .map(|s| s.text.trim())
                .collect::<Vec<_>>()
                .join(" ");
            Some(Line {
                text,
                bbox,
                font: FontSignature::new(&dominant.font_name, dominant.font_size),
                size: dominant.font_size,
                bold: dominant.bold,
                italic: dominant.italic,
            })
        })
        .collect()
}

/// Merge consecutive lines of the same style into paragraphs.
fn build_paragraphs(lines: Vec<Line>) -> Vec<Paragraph> {
    let mut paragraphs: Vec<Paragraph> = Vec::new();
    for line in lines {
        let joins = paragraphs.last().is_some_and(|para| {
            let prev = &para.lines[para.lines.len() - 1];
            let gap = prev.bbox.bottom - line.bbox.top;
            prev.font == line.font
                && prev.bold == line.bold
                && prev.italic == line.italic
                && gap <= line.size.max(prev.size) * 0.9
                && (prev.bbox.left - line.bbox.left).abs() <= INDENT_THRESHOLD
        });
        match paragraphs.last_mut() {
            Some(para) if joins => {
                para.bbox = para.bbox.merge(&line.bbox);
                para.lines.push(line);
            }
            _ => paragraphs.push(Paragraph {
                bbox: line.bbox,
                lines: vec![line],
            }),
        }
    }
    paragraphs
}

/// Character-weighted median font size, so a single large title cannot
/// drag the median up on a sparse page.
fn median_size(paragraphs: &[Paragraph]) -> f32 {
    let mut sizes: Vec<(f32, usize)> = paragraphs
        .iter()
        .flat_map(|p| &p.lines)
        .map(|l| (l.size, l.text.chars().filter(|c| !c.is_whitespace()).count()))
        .collect();
    if sizes.is_empty() {
        return 0.0;
    }
    sizes.sort_by(|a, b| a.0.total_cmp(&b.0));
    let total: usize = sizes.iter().map(|(_, n)| n).sum();
    let mut seen = 0;
    for (size, n) in &sizes {
        seen += n;
        if seen * 2 >= total {
            return *size;
        }
    }
    sizes[sizes.len() - 1].0
}

/// Segment every page. `layouts` and `images` are in page order.
pub fn segment_document(layouts: &[PageLayout], images: &[PageImagesArtifact]) -> Vec<ExtractedPage> {
    layouts
        .iter()
        .map(|layout| {
            let page_images = images.iter().find(|i| i.page == layout.page);
            segment_page(layout, page_images)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryPage;
    use crate::model::ImageRef;

    fn layout_of(page: MemoryPage) -> PageLayout {
        PageLayout {
            page: 1,
            width: 612.0,
            height: 792.0,
            segments: page.segments,
            boxes: page.boxes,
            degraded: None,
        }
    }

    #[test]
    fn lines_merge_into_one_paragraph() {
        let page = MemoryPage::new()
            .line("The bridge is old and the", "Body", 10.0, 700.0)
            .line("river runs fast beneath it.", "Body", 10.0, 688.0);
        let out = segment_page(&layout_of(page), None);
        assert_eq!(out.spans.len(), 1);
        assert_eq!(
            out.spans[0].text,
            "The bridge is old and the river runs fast beneath it."
        );
        assert_eq!(out.spans[0].kind, SpanKind::Paragraph);
    }

    #[test]
    fn hyphenated_words_are_rejoined() {
        let page = MemoryPage::new()
            .line("An ancient drag-", "Body", 10.0, 700.0)
            .line("on sleeps here.", "Body", 10.0, 688.0);
        let out = segment_page(&layout_of(page), None);
        assert_eq!(out.spans[0].text, "An ancient dragon sleeps here.");
    }

    #[test]
    fn segments_on_one_baseline_form_a_line() {
        let page = MemoryPage::new()
            .styled("Left half", "Body", 10.0, 700.0, 72.0, false, false)
            .styled("right half", "Body", 10.0, 700.0, 200.0, false, false);
        let out = segment_page(&layout_of(page), None);
        assert_eq!(out.spans[0].text, "Left half right half");
    }

    #[test]
    fn large_short_line_is_heading_candidate() {
        let page = MemoryPage::new()
            .line("The Sunken Vault", "Title", 18.0, 720.0)
            .line("Water drips from the ceiling onto the floor tiles.", "Body", 10.0, 690.0)
            .line("A faint glow comes from the eastern passage beyond.", "Body", 10.0, 678.0);
        let out = segment_page(&layout_of(page), None);
        assert_eq!(out.spans.len(), 2);
        assert_eq!(out.spans[0].kind, SpanKind::HeadingCandidate);
        assert_eq!(out.spans[1].kind, SpanKind::Paragraph);
    }

    #[test]
    fn bold_line_at_body_size_is_heading_candidate() {
        let page = MemoryPage::new()
            .bold_line("Treasure", "Body-Bold", 10.0, 720.0)
            .line("The chest holds 200 gold pieces and a silver key.", "Body", 10.0, 700.0);
        let out = segment_page(&layout_of(page), None);
        assert_eq!(out.spans[0].kind, SpanKind::HeadingCandidate);
    }

    #[test]
    fn bordered_text_is_read_aloud() {
        let page = MemoryPage::new()
            .line("You enter a damp cave.", "Body", 10.0, 600.0)
            .boxed(BoundingBox::new(60.0, 620.0, 500.0, 580.0))
            .line("Outside the box entirely, more text follows.", "Body", 10.0, 500.0);
        let out = segment_page(&layout_of(page), None);
        assert_eq!(
            out.spans[0].kind,
            SpanKind::Callout {
                kind: CalloutKind::ReadAloud,
                ambiguous: false
            }
        );
        assert_eq!(out.spans[1].kind, SpanKind::Paragraph);
    }

    #[test]
    fn page_frame_is_not_a_border() {
        let page = MemoryPage::new()
            .line("Ordinary body text on a framed page.", "Body", 10.0, 600.0)
            .boxed(BoundingBox::new(5.0, 790.0, 610.0, 2.0));
        let out = segment_page(&layout_of(page), None);
        assert_eq!(out.spans[0].kind, SpanKind::Paragraph);
    }

    #[test]
    fn indented_italic_is_ambiguous_gm_note() {
        let page = MemoryPage::new()
            .line("The guards change shift at midnight each day.", "Body", 10.0, 700.0)
            .italic_line_at(110.0, "If the party waits, they slip past.", "Body-Italic", 10.0, 680.0);
        let out = segment_page(&layout_of(page), None);
        assert_eq!(
            out.spans[1].kind,
            SpanKind::Callout {
                kind: CalloutKind::GmOnly,
                ambiguous: true
            }
        );
    }

    #[test]
    fn degraded_reasons_are_combined_and_images_attached() {
        let mut layout = layout_of(MemoryPage::new().line("Some text", "Body", 10.0, 700.0));
        layout.degraded = Some("text layer partial".into());
        let images = PageImagesArtifact {
            page: 1,
            images: vec![ImageRef {
                file: "images/page-0001-01.png".into(),
                page: 1,
                sequence: 1,
                bbox: None,
            }],
            degraded: Some("1 image(s) could not be decoded".into()),
        };
        let out = segment_page(&layout, Some(&images));
        assert_eq!(out.images.len(), 1);
        assert_eq!(
            out.degraded.as_deref(),
            Some("text layer partial; 1 image(s) could not be decoded")
        );
    }

    #[test]
    fn spans_are_numbered_in_reading_order() {
        let page = MemoryPage::new()
            .line("Second paragraph sits lower on the page.", "Body", 10.0, 500.0)
            .line("First paragraph sits at the top.", "Body", 10.0, 700.0);
        let out = segment_page(&layout_of(page), None);
        assert!(out.spans[0].text.starts_with("First"));
        assert_eq!(out.spans[1].order, 1);
    }
}
