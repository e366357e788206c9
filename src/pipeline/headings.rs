//! Heading insertion (phase 8): pages + confirmed mapping → Markdown skeleton.
//!
//! The skeleton is a flat list of [`Block`]s. It is rendered to Markdown on
//! demand, and the same renderer is used for the revised document, so line
//! numbers reported by the linter always match `skeleton.md`.

use crate::model::{CalloutKind, ExtractedPage, FontMapping, FontRole, FontSignature, SpanKind};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Spans longer than this are never headings, whatever their font.
pub const MAX_HEADING_CHARS: usize = 160;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BlockKind {
    Heading { level: u8 },
    Paragraph,
    Callout { kind: CalloutKind, ambiguous: bool },
    Image { file: String },
    /// Reviewer-supplied Markdown, emitted verbatim.
    Raw,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub kind: BlockKind,
    pub text: String,
    pub page: usize,
    pub font: Option<FontSignature>,
}

impl Block {
    pub fn heading_level(&self) -> Option<u8> {
        match self.kind {
            BlockKind::Heading { level } => Some(level),
            _ => None,
        }
    }

    pub fn is_content(&self) -> bool {
        !matches!(self.kind, BlockKind::Heading { .. })
    }

    fn render(&self) -> String {
        match &self.kind {
            BlockKind::Heading { level } => {
                format!("{} {}", "#".repeat(*level as usize), self.text)
            }
            BlockKind::Paragraph => self.text.lines().map(escape_line).collect::<Vec<_>>().join("\n"),
            BlockKind::Raw => self.text.clone(),
            BlockKind::Callout { kind, .. } => {
                let mut out = format!("> [!{}]", kind.tag());
                for line in self.text.lines() {
                    out.push_str("\n> ");
                    out.push_str(&escape_line(line));
                }
                out
            }
            BlockKind::Image { file } => format!("![{}]({file})", self.text),
        }
    }
}

/// Body text must never read as a heading or quote once rendered.
fn escape_line(line: &str) -> String {
    let indent = line.len() - line.trim_start().len();
    let (lead, rest) = line.split_at(indent);
    if rest.starts_with('#') || rest.starts_with('>') {
        format!("{lead}\\{rest}")
    } else {
        line.to_string()
    }
}

/// The heading-annotated document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Skeleton {
    pub blocks: Vec<Block>,
    /// Signatures that had no role in the mapping, in order of first use.
    pub unmapped_fonts: Vec<FontSignature>,
}

impl Skeleton {
    /// Build the skeleton. Spans whose signature is missing from `mapping`
    /// always become body text.
    pub fn build(pages: &[ExtractedPage], mapping: &FontMapping) -> Skeleton {
        let mut blocks = Vec::new();
        let mut unmapped: Vec<FontSignature> = Vec::new();

        for page in pages {
            let mut images: Vec<_> = page.images.iter().collect();
            images.sort_by(|a, b| {
                let ta = a.bbox.map_or(f32::NEG_INFINITY, |b| b.top);
                let tb = b.bbox.map_or(f32::NEG_INFINITY, |b| b.top);
                tb.total_cmp(&ta).then(a.sequence.cmp(&b.sequence))
            });
            let mut pending = images.into_iter().peekable();

            for span in &page.spans {
                while let Some(img) = pending.next_if(|i| i.bbox.is_some_and(|b| b.top >= span.bbox.top)) {
                    blocks.push(image_block(img.file.clone(), img.page, img.sequence));
                }

                let role = mapping.role_of(&span.font);
                if role.is_none() && !unmapped.contains(&span.font) {
                    unmapped.push(span.font.clone());
                }

                let kind = match (span.kind, role) {
                    (SpanKind::Callout { kind, ambiguous }, _) => BlockKind::Callout { kind, ambiguous },
                    (_, Some(FontRole::Heading(level)))
                        if span.text.chars().count() <= MAX_HEADING_CHARS =>
                    {
                        BlockKind::Heading { level }
                    }
                    _ => BlockKind::Paragraph,
                };
                blocks.push(Block {
                    kind,
                    text: span.text.clone(),
                    page: span.page,
                    font: Some(span.font.clone()),
                });
            }

            for img in pending {
                blocks.push(image_block(img.file.clone(), img.page, img.sequence));
            }
        }

        debug!(
            "Skeleton: {} blocks, {} headings, {} unmapped signatures",
            blocks.len(),
            blocks.iter().filter(|b| b.heading_level().is_some()).count(),
            unmapped.len()
        );
        Skeleton {
            blocks,
            unmapped_fonts: unmapped,
        }
    }

    /// Render to Markdown; also returns the 1-based starting line of each block.
    pub fn render_with_lines(&self) -> (String, Vec<usize>) {
        render_blocks(&self.blocks)
    }

    pub fn render(&self) -> String {
        self.render_with_lines().0
    }
}

fn image_block(file: String, page: usize, sequence: usize) -> Block {
    Block {
        kind: BlockKind::Image { file },
        text: format!("Page {page} image {sequence}"),
        page,
        font: None,
    }
}

/// Blocks separated by one blank line; the output ends with a newline.
pub fn render_blocks(blocks: &[Block]) -> (String, Vec<usize>) {
    let mut out = String::new();
    let mut lines = Vec::with_capacity(blocks.len());
    let mut line = 1;
    for (i, block) in blocks.iter().enumerate() {
        if i > 0 {
            out.push('\n');
            line += 1;
        }
        lines.push(line);
        let text = block.render();
        line += text.lines().count().max(1);
        out.push_str(&text);
        out.push('\n');
    }
    (out, lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BoundingBox, ImageRef, StructuralSpan};

    fn span(order: usize, text: &str, face: &str, size: f32, kind: SpanKind, top: f32) -> StructuralSpan {
        StructuralSpan {
            page: 1,
            order,
            kind,
            text: text.into(),
            font: FontSignature::new(face, size),
            bold: false,
            italic: false,
            bbox: BoundingBox::new(72.0, top, 400.0, top - size),
        }
    }

    fn mapping() -> FontMapping {
        let mut m = FontMapping::default();
        m.assign(FontSignature::new("Title", 24.0), FontRole::Heading(1));
        m.assign(FontSignature::new("Body", 10.0), FontRole::Body);
        m
    }

    fn page(spans: Vec<StructuralSpan>, images: Vec<ImageRef>) -> ExtractedPage {
        ExtractedPage {
            page: 1,
            spans,
            images,
            degraded: None,
        }
    }

    #[test]
    fn mapped_heading_and_body() {
        let p = page(
            vec![
                span(0, "The Keep", "Title", 24.0, SpanKind::HeadingCandidate, 700.0),
                span(1, "Stone walls rise.", "Body", 10.0, SpanKind::Paragraph, 650.0),
            ],
            vec![],
        );
        let s = Skeleton::build(&[p], &mapping());
        assert_eq!(s.render(), "# The Keep\n\nStone walls rise.\n");
        assert!(s.unmapped_fonts.is_empty());
    }

    #[test]
    fn unmapped_font_is_body_and_recorded() {
        let p = page(
            vec![
                span(0, "Strange Title", "Mystery", 30.0, SpanKind::HeadingCandidate, 700.0),
                span(1, "Again", "Mystery", 30.0, SpanKind::HeadingCandidate, 600.0),
            ],
            vec![],
        );
        let s = Skeleton::build(&[p], &mapping());
        assert!(s.blocks.iter().all(|b| b.kind == BlockKind::Paragraph));
        assert_eq!(s.unmapped_fonts, vec![FontSignature::new("Mystery", 30.0)]);
    }

    #[test]
    fn body_text_that_looks_like_markup_stays_body() {
        let p = page(
            vec![
                span(0, "# of goblins: 2d4", "Body", 10.0, SpanKind::Paragraph, 700.0),
                span(1, "> not a quote", "Body", 10.0, SpanKind::Paragraph, 650.0),
                span(
                    2,
                    "## Boxed",
                    "Body",
                    10.0,
                    SpanKind::Callout {
                        kind: CalloutKind::GmOnly,
                        ambiguous: false,
                    },
                    600.0,
                ),
            ],
            vec![],
        );
        let s = Skeleton::build(&[p], &mapping());
        let md = crate::pipeline::postprocess::clean_markdown(&s.render());
        assert_eq!(
            md,
            "\\# of goblins: 2d4\n\n\\> not a quote\n\n> [!gm-only]\n> \\## Boxed\n"
        );
        assert!(!md.lines().any(|l| l.starts_with('#')));
    }

    #[test]
    fn callout_wins_over_heading_font() {
        let p = page(
            vec![span(
                0,
                "Read this aloud",
                "Title",
                24.0,
                SpanKind::Callout {
                    kind: CalloutKind::ReadAloud,
                    ambiguous: false,
                },
                700.0,
            )],
            vec![],
        );
        let s = Skeleton::build(&[p], &mapping());
        assert_eq!(s.render(), "> [!read-aloud]\n> Read this aloud\n");
    }

    #[test]
    fn overlong_heading_font_span_is_paragraph() {
        let long = "word ".repeat(40);
        let p = page(
            vec![span(0, long.trim(), "Title", 24.0, SpanKind::Paragraph, 700.0)],
            vec![],
        );
        let s = Skeleton::build(&[p], &mapping());
        assert_eq!(s.blocks[0].kind, BlockKind::Paragraph);
    }

    #[test]
    fn images_interleave_by_position() {
        let img = |seq: usize, top: Option<f32>| ImageRef {
            file: format!("images/page-0001-{seq:02}.png"),
            page: 1,
            sequence: seq,
            bbox: top.map(|t| BoundingBox::new(72.0, t, 300.0, t - 100.0)),
        };
        let p = page(
            vec![
                span(0, "The Keep", "Title", 24.0, SpanKind::HeadingCandidate, 700.0),
                span(1, "Below the map.", "Body", 10.0, SpanKind::Paragraph, 400.0),
            ],
            vec![img(2, None), img(1, Some(600.0))],
        );
        let s = Skeleton::build(&[p], &mapping());
        let kinds: Vec<_> = s.blocks.iter().map(|b| b.text.as_str()).collect();
        assert_eq!(
            kinds,
            vec!["The Keep", "Page 1 image 1", "Below the map.", "Page 1 image 2"]
        );
    }

    #[test]
    fn line_numbers_follow_rendering() {
        let p = page(
            vec![
                span(0, "The Keep", "Title", 24.0, SpanKind::HeadingCandidate, 700.0),
                span(
                    1,
                    "line one\nline two",
                    "Body",
                    10.0,
                    SpanKind::Callout {
                        kind: CalloutKind::GmOnly,
                        ambiguous: true,
                    },
                    650.0,
                ),
                span(2, "After", "Body", 10.0, SpanKind::Paragraph, 600.0),
            ],
            vec![],
        );
        let (md, lines) = Skeleton::build(&[p], &mapping()).render_with_lines();
        assert_eq!(lines, vec![1, 3, 7]);
        assert_eq!(md.lines().nth(6), Some("After"));
    }
}
