//! Font inventory (phase 5) and mapping proposal (phase 6).

use crate::model::{ExtractedPage, FontMapping, FontRole, FontSignature, SpanKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Deepest Markdown heading level.
pub const MAX_HEADING_LEVEL: u8 = 6;
/// Characters of sample text kept per signature.
const SAMPLE_CHARS: usize = 48;

/// Usage of one font signature across the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontStats {
    pub font: FontSignature,
    /// Non-whitespace characters.
    pub chars: usize,
    pub spans: usize,
    /// Spans tagged `heading-candidate` by segmentation.
    pub heading_spans: usize,
    /// Characters inside those spans.
    pub heading_chars: usize,
    /// Spans set in a bold weight.
    pub bold_spans: usize,
    /// Distinct pages the signature appears on.
    pub pages: usize,
    /// Text of the first span set in this signature.
    pub sample: String,
}

impl FontStats {
    pub fn mostly_bold(&self) -> bool {
        self.bold_spans * 2 > self.spans || self.font.looks_bold()
    }

    pub fn mostly_headings(&self) -> bool {
        self.heading_chars * 2 > self.chars
    }
}

/// Every signature seen in the extracted spans, most used first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FontInventory {
    pub fonts: Vec<FontStats>,
}

impl FontInventory {
    pub fn build(pages: &[ExtractedPage]) -> FontInventory {
        let mut stats: BTreeMap<FontSignature, FontStats> = BTreeMap::new();
        let mut seen_on: BTreeMap<FontSignature, BTreeSet<usize>> = BTreeMap::new();

        for span in pages.iter().flat_map(|p| &p.spans) {
            let chars = span.text.chars().filter(|c| !c.is_whitespace()).count();
            let entry = stats.entry(span.font.clone()).or_insert_with(|| FontStats {
                font: span.font.clone(),
                chars: 0,
                spans: 0,
                heading_spans: 0,
                heading_chars: 0,
                bold_spans: 0,
                pages: 0,
                sample: span.text.chars().take(SAMPLE_CHARS).collect(),
            });
            entry.chars += chars;
            entry.spans += 1;
            if span.kind == SpanKind::HeadingCandidate {
                entry.heading_spans += 1;
                entry.heading_chars += chars;
            }
            if span.bold {
                entry.bold_spans += 1;
            }
            seen_on.entry(span.font.clone()).or_default().insert(span.page);
        }

        let mut fonts: Vec<FontStats> = stats
            .into_values()
            .map(|mut s| {
                s.pages = seen_on.get(&s.font).map_or(0, |p| p.len());
                s
            })
            .collect();
        fonts.sort_by(|a, b| b.chars.cmp(&a.chars).then_with(|| a.font.cmp(&b.font)));
        FontInventory { fonts }
    }

    /// The body-text signature: the one carrying the most characters.
    pub fn body(&self) -> Option<&FontStats> {
        self.fonts.first()
    }

    pub fn get(&self, font: &FontSignature) -> Option<&FontStats> {
        self.fonts.iter().find(|s| &s.font == font)
    }
}

/// Propose a role for every signature in the inventory.
///
/// Sizes above the body size are ranked largest first onto levels 1..=6; a
/// bold body-size face used mostly for headings sits one level below the
/// smallest larger size. Everything else is body text.
pub fn propose_mapping(inventory: &FontInventory) -> FontMapping {
    let mut mapping = FontMapping::default();
    let Some(body) = inventory.body() else {
        return mapping;
    };
    let body_key = size_key(body.font.size);

    let mut larger: Vec<i64> = inventory
        .fonts
        .iter()
        .map(|s| size_key(s.font.size))
        .filter(|k| *k > body_key)
        .collect();
    larger.sort_unstable_by(|a, b| b.cmp(a));
    larger.dedup();
    let level_of = |key: i64| -> u8 {
        let rank = larger.iter().position(|k| *k == key).unwrap_or(0) + 1;
        rank.min(MAX_HEADING_LEVEL as usize) as u8
    };
    let below_smallest = (larger.len().min(MAX_HEADING_LEVEL as usize - 1) + 1) as u8;

    for stats in &inventory.fonts {
        let key = size_key(stats.font.size);
        let role = if key > body_key {
            FontRole::Heading(level_of(key))
        } else if key == body_key
            && stats.font != body.font
            && stats.mostly_bold()
            && stats.mostly_headings()
        {
            FontRole::Heading(below_smallest)
        } else {
            FontRole::Body
        };
        mapping.assign(stats.font.clone(), role);
    }
    mapping
}

fn size_key(size: f32) -> i64 {
    (size * 2.0).round() as i64
}

/// Signatures present in the inventory but absent from `mapping`.
pub fn unmapped(inventory: &FontInventory, mapping: &FontMapping) -> Vec<FontSignature> {
    inventory
        .fonts
        .iter()
        .filter(|s| mapping.role_of(&s.font).is_none())
        .map(|s| s.font.clone())
        .collect()
}

/// Numbered table shown at the mapping checkpoint.
pub fn mapping_table(inventory: &FontInventory, mapping: &FontMapping) -> String {
    let mut out = String::from("  #  role   chars  pages  signature / sample\n");
    for (i, stats) in inventory.fonts.iter().enumerate() {
        let role = mapping
            .role_of(&stats.font)
            .map_or_else(|| "—".to_string(), |r| r.to_string());
        out.push_str(&format!(
            "{:>3}  {:<5} {:>6} {:>6}  {}\n           \"{}\"\n",
            i + 1,
            role,
            stats.chars,
            stats.pages,
            stats.font,
            stats.sample
        ));
    }
    out
}
