//! Complexity assessment: a pure function from document metrics to the
//! report shown at the pre-flight gate.

use crate::backend::DocumentInfo;
use crate::model::DocumentMetrics;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// More distinct font signatures than this suggests an ornate layout.
pub const MAX_SIMPLE_FONTS: usize = 8;
/// Documents longer than this take noticeably longer to review.
pub const MAX_SIMPLE_PAGES: usize = 200;
/// A table of contents with fewer entries is not useful for navigation.
pub const MIN_TOC_ENTRIES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tier {
    Simple,
    Complex,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Tier::Simple => "simple",
            Tier::Complex => "complex",
        })
    }
}

/// Outcome of [`assess`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub tier: Tier,
    pub toc_usable: bool,
    /// One line per complexity point.
    pub reasons: Vec<String>,
    pub recommendation: String,
}

pub fn assess(metrics: &DocumentMetrics) -> Assessment {
    let toc_usable = metrics.toc_detected && metrics.toc_entries >= MIN_TOC_ENTRIES;
    let mut reasons = Vec::new();

    if !toc_usable {
        reasons.push(if metrics.toc_detected {
            format!("table of contents has only {} entry", metrics.toc_entries)
        } else {
            "no table of contents".to_string()
        });
    }
    if metrics.fonts.len() > MAX_SIMPLE_FONTS {
        reasons.push(format!(
            "{} distinct font signatures (more than {MAX_SIMPLE_FONTS})",
            metrics.fonts.len()
        ));
    }
    if metrics.image_count > metrics.page_count {
        reasons.push(format!(
            "{} images across {} pages",
            metrics.image_count, metrics.page_count
        ));
    }
    if metrics.page_count > MAX_SIMPLE_PAGES {
        reasons.push(format!(
            "{} pages (more than {MAX_SIMPLE_PAGES})",
            metrics.page_count
        ));
    }

    let tier = if reasons.len() < 2 {
        Tier::Simple
    } else {
        Tier::Complex
    };
    let recommendation = match tier {
        Tier::Simple => "Straightforward document; expect a short font-mapping review.".to_string(),
        Tier::Complex => {
            "Complex document; expect to adjust the font mapping and resolve several lint issues."
                .to_string()
        }
    };

    Assessment {
        tier,
        toc_usable,
        reasons,
        recommendation,
    }
}

/// What the operator sees at the pre-flight gate. Also persisted as
/// `.pipeline/preflight.json` once the operator proceeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreflightReport {
    pub source: PathBuf,
    pub metrics: DocumentMetrics,
    pub info: DocumentInfo,
    pub assessment: Assessment,
}

impl PreflightReport {
    pub fn tier(&self) -> Tier {
        self.assessment.tier
    }

    /// Plain-text summary for the terminal.
    pub fn summary(&self) -> String {
        let m = &self.metrics;
        let mut out = String::new();
        out.push_str(&format!("Source:      {}\n", self.source.display()));
        if let Some(ref title) = self.info.title {
            out.push_str(&format!("Title:       {title}\n"));
        }
        out.push_str(&format!("Pages:       {}\n", m.page_count));
        out.push_str(&format!("Images:      {}\n", m.image_count));
        out.push_str(&format!("Fonts:       {} signatures\n", m.fonts.len()));
        out.push_str(&format!(
            "TOC:         {}\n",
            if self.assessment.toc_usable {
                format!("usable ({} entries)", m.toc_entries)
            } else if m.toc_detected {
                format!("unusable ({} entries)", m.toc_entries)
            } else {
                "none".to_string()
            }
        ));
        out.push_str(&format!("Complexity:  {}\n", self.assessment.tier));
        for reason in &self.assessment.reasons {
            out.push_str(&format!("  - {reason}\n"));
        }
        for usage in m.fonts.iter().take(6) {
            out.push_str(&format!("  {:>8} chars  {}\n", usage.usage, usage.font));
        }
        if m.fonts.len() > 6 {
            out.push_str(&format!("  … and {} more\n", m.fonts.len() - 6));
        }
        out.push_str(&self.assessment.recommendation);
        out.push('\n');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FontSignature;
    use std::collections::BTreeMap;

    fn metrics(pages: usize, fonts: usize, images: usize, toc: usize) -> DocumentMetrics {
        let counts: BTreeMap<_, _> = (0..fonts)
            .map(|i| (FontSignature::new(format!("Font{i}"), 10.0), 100))
            .collect();
        DocumentMetrics::from_counts(pages, counts, images, toc)
    }

    #[test]
    fn clean_document_is_simple() {
        let a = assess(&metrics(10, 4, 3, 12));
        assert_eq!(a.tier, Tier::Simple);
        assert!(a.toc_usable);
        assert!(a.reasons.is_empty());
    }

    #[test]
    fn one_point_is_still_simple() {
        let a = assess(&metrics(10, 4, 3, 0));
        assert_eq!(a.tier, Tier::Simple);
        assert_eq!(a.reasons, vec!["no table of contents".to_string()]);
    }

    #[test]
    fn two_points_is_complex() {
        let a = assess(&metrics(300, 4, 3, 0));
        assert_eq!(a.tier, Tier::Complex);
        assert_eq!(a.reasons.len(), 2);
    }

    #[test]
    fn single_entry_toc_is_not_usable() {
        let a = assess(&metrics(10, 12, 3, 1));
        assert!(!a.toc_usable);
        assert_eq!(a.tier, Tier::Complex);
    }

    #[test]
    fn image_heavy_counts() {
        let a = assess(&metrics(10, 2, 11, 5));
        assert_eq!(a.reasons.len(), 1);
        assert!(a.reasons[0].contains("11 images"));
    }

    #[test]
    fn summary_mentions_tier() {
        let report = PreflightReport {
            source: PathBuf::from("/x/mod.pdf"),
            metrics: metrics(10, 4, 3, 12),
            info: DocumentInfo::default(),
            assessment: assess(&metrics(10, 4, 3, 12)),
        };
        let s = report.summary();
        assert!(s.contains("Complexity:  simple"));
        assert!(s.contains("usable (12 entries)"));
    }
}
