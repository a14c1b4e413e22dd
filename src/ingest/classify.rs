//! Heuristic document classifier.
//!
//! An ordered regex table is consulted in three passes:
//! - an explicit override (typed subfolder or caller-supplied kind) always wins
//! - the first table entry matching the filename wins
//! - otherwise the entry with the most matches in the first 3000 characters of
//!   the content wins, ties going to the earlier entry
//!
//! Zero matches anywhere yields [`DocumentKind::Unclassified`].

use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Number of leading content characters considered when scoring.
pub const CONTENT_SCAN_CHARS: usize = 3000;

/// Closed vocabulary of document kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentKind {
    BloodPanel,
    UrineAnalysis,
    GeneticReport,
    SemenAnalysis,
    ClinicalConclusion,
    Prescription,
    WellnessCheckup,
    MedicalImage,
    Unclassified,
}

impl DocumentKind {
    /// Every kind, in table order.
    pub const ALL: [DocumentKind; 9] = [
        DocumentKind::BloodPanel,
        DocumentKind::UrineAnalysis,
        DocumentKind::GeneticReport,
        DocumentKind::SemenAnalysis,
        DocumentKind::ClinicalConclusion,
        DocumentKind::Prescription,
        DocumentKind::WellnessCheckup,
        DocumentKind::MedicalImage,
        DocumentKind::Unclassified,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::BloodPanel => "blood-panel",
            DocumentKind::UrineAnalysis => "urine-analysis",
            DocumentKind::GeneticReport => "genetic-report",
            DocumentKind::SemenAnalysis => "semen-analysis",
            DocumentKind::ClinicalConclusion => "clinical-conclusion",
            DocumentKind::Prescription => "prescription",
            DocumentKind::WellnessCheckup => "wellness-checkup",
            DocumentKind::MedicalImage => "medical-image",
            DocumentKind::Unclassified => "unclassified",
        }
    }

    /// Human-readable heading used in reports.
    pub fn title(&self) -> &'static str {
        match self {
            DocumentKind::BloodPanel => "Blood Panel",
            DocumentKind::UrineAnalysis => "Urine Analysis",
            DocumentKind::GeneticReport => "Genetic Report",
            DocumentKind::SemenAnalysis => "Semen Analysis",
            DocumentKind::ClinicalConclusion => "Clinical Conclusion",
            DocumentKind::Prescription => "Prescription",
            DocumentKind::WellnessCheckup => "Wellness Checkup",
            DocumentKind::MedicalImage => "Medical Image",
            DocumentKind::Unclassified => "Unclassified Document",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocumentKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown document kind: {s}"))
    }
}

/// One entry of the ordered classification table.
#[derive(Debug, Clone)]
pub struct KindRule {
    pub kind: DocumentKind,
    pub regex: Regex,
}

/// Default table, in precedence order.
const DEFAULT_TABLE: &[(DocumentKind, &str)] = &[
    (
        DocumentKind::BloodPanel,
        r"(?i)(blood[\s_-]?(test|panel|work|analysis|results|report)|hemo(glo|gram)|cbc|complete[\s_-]?blood|lipid[\s_-]?panel|hemato)",
    ),
    (
        DocumentKind::UrineAnalysis,
        r"(?i)(urine[\s_-]?(test|analysis|sample|results|report)|urinalysis)",
    ),
    (
        DocumentKind::GeneticReport,
        r"(?i)(genetic[\s_-]?(test|analysis|report|screen|results)|dna[\s_-]?test|genom|23andme|ancestry|snp|karyotype)",
    ),
    (
        DocumentKind::SemenAnalysis,
        r"(?i)(sperm[\s_-]?(test|analysis|count|motil|report|results)|spermogram|semen[\s_-]?analysis|seminogram)",
    ),
    (
        DocumentKind::ClinicalConclusion,
        r"(?i)(doctor[\s_-]?(conclusion|report)|medical[\s_-]?(conclusion|report)|diagnosis|clinical[\s_-]?summary|discharge[\s_-]?summary|consultation[\s_-]?report)",
    ),
    (
        DocumentKind::Prescription,
        r"(?i)(prescription|ordonnance|rx[\s_-]|prescribed[\s_-]?medic|treatment[\s_-]?plan|medication[\s_-]?list)",
    ),
    (
        DocumentKind::WellnessCheckup,
        r"(?i)(health[\s_-]?check|medical[\s_-]?check[\s_-]?up|annual[\s_-]?check[\s_-]?up|general[\s_-]?check[\s_-]?up|routine[\s_-]?exam|preventive[\s_-]?exam|wellness[\s_-]?exam|physical[\s_-]?exam|full[\s_-]?body[\s_-]?check|comprehensive[\s_-]?exam|check[\s_-]?up|annual[\s_-]?exam)",
    ),
];

/// Ordered-table classifier.
#[derive(Debug, Clone)]
pub struct ReportClassifier {
    rules: Vec<KindRule>,
}

impl ReportClassifier {
    /// Compile the default table.
    pub fn new() -> Result<Self, regex::Error> {
        let rules = DEFAULT_TABLE
            .iter()
            .map(|(kind, pattern)| {
                Ok(KindRule {
                    kind: *kind,
                    regex: Regex::new(pattern)?,
                })
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self { rules })
    }

    /// A classifier with no rules (everything is unclassified).
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Append a rule at the lowest precedence.
    pub fn add_rule(&mut self, kind: DocumentKind, pattern: &str) -> Result<(), regex::Error> {
        self.rules.push(KindRule {
            kind,
            regex: Regex::new(pattern)?,
        });
        Ok(())
    }

    /// Classify from filename and optional content.
    pub fn classify(&self, filename: &str, content: Option<&str>) -> DocumentKind {
        self.classify_with_override(None, filename, content)
    }

    /// Classify, honouring an explicit override first.
    pub fn classify_with_override(
        &self,
        override_kind: Option<DocumentKind>,
        filename: &str,
        content: Option<&str>,
    ) -> DocumentKind {
        if let Some(kind) = override_kind {
            return kind;
        }

        if let Some(rule) = self.rules.iter().find(|r| r.regex.is_match(filename)) {
            debug!(file = %filename, kind = %rule.kind, "Classified by filename");
            return rule.kind;
        }

        let Some(content) = content.filter(|c| !c.is_empty()) else {
            return DocumentKind::Unclassified;
        };
        let head = leading_chars(content, CONTENT_SCAN_CHARS);

        let mut best: Option<(DocumentKind, usize)> = None;
        for rule in &self.rules {
            let score = rule.regex.find_iter(head).count();
            if score == 0 {
                continue;
            }
            // Strictly greater keeps the earlier entry on ties.
            if best.is_none_or(|(_, top)| score > top) {
                best = Some((rule.kind, score));
            }
        }

        match best {
            Some((kind, score)) => {
                debug!(file = %filename, kind = %kind, score, "Classified by content");
                kind
            }
            None => DocumentKind::Unclassified,
        }
    }
}

/// Slice the first `n` characters of `s` on a char boundary.
fn leading_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> ReportClassifier {
        ReportClassifier::new().unwrap()
    }

    #[test]
    fn filename_match() {
        let c = classifier();
        assert_eq!(c.classify("blood_panel_2024.pdf", None), DocumentKind::BloodPanel);
        assert_eq!(c.classify("Urinalysis-march.pdf", None), DocumentKind::UrineAnalysis);
        assert_eq!(c.classify("23andme_raw.pdf", None), DocumentKind::GeneticReport);
        assert_eq!(c.classify("spermogram.pdf", None), DocumentKind::SemenAnalysis);
        assert_eq!(c.classify("ordonnance_jan.pdf", None), DocumentKind::Prescription);
        assert_eq!(c.classify("annual checkup.pdf", None), DocumentKind::WellnessCheckup);
    }

    #[test]
    fn filename_beats_content() {
        let c = classifier();
        let content = "Urinalysis results. Urine sample collected. Urine test normal.";
        assert_eq!(
            c.classify("blood_panel_2024.pdf", Some(content)),
            DocumentKind::BloodPanel
        );
    }

    #[test]
    fn override_beats_everything() {
        let c = classifier();
        let kind = c.classify_with_override(
            Some(DocumentKind::GeneticReport),
            "blood_panel_2024.pdf",
            Some("hemoglobin cbc"),
        );
        assert_eq!(kind, DocumentKind::GeneticReport);
    }

    #[test]
    fn content_scoring_picks_most_matches() {
        let c = classifier();
        let content = "Prescription issued. Diagnosis: mild. Diagnosis confirmed. Clinical summary attached.";
        assert_eq!(
            c.classify("scan_0001.pdf", Some(content)),
            DocumentKind::ClinicalConclusion
        );
    }

    #[test]
    fn content_tie_goes_to_earlier_entry() {
        let c = classifier();
        let content = "Diagnosis pending. Prescription renewed.";
        assert_eq!(
            c.classify("doc.pdf", Some(content)),
            DocumentKind::ClinicalConclusion
        );
        let content = "urinalysis and hemoglobin";
        assert_eq!(c.classify("doc.pdf", Some(content)), DocumentKind::BloodPanel);
    }

    #[test]
    fn content_beyond_window_is_ignored() {
        let c = classifier();
        let mut content = "x".repeat(CONTENT_SCAN_CHARS);
        content.push_str(" hemoglobin hemoglobin");
        assert_eq!(
            c.classify("doc.pdf", Some(&content)),
            DocumentKind::Unclassified
        );
    }

    #[test]
    fn no_signal_is_unclassified() {
        let c = classifier();
        assert_eq!(c.classify("IMG_2031.pdf", None), DocumentKind::Unclassified);
        assert_eq!(
            c.classify("IMG_2031.pdf", Some("lorem ipsum")),
            DocumentKind::Unclassified
        );
        assert_eq!(c.classify("IMG_2031.pdf", Some("")), DocumentKind::Unclassified);
    }

    #[test]
    fn deterministic() {
        let c = classifier();
        let content = "Treatment plan and medication list. Health check scheduled.";
        let first = c.classify("notes.pdf", Some(content));
        for _ in 0..10 {
            assert_eq!(c.classify("notes.pdf", Some(content)), first);
        }
    }

    #[test]
    fn empty_classifier_honours_override_only() {
        let c = ReportClassifier::empty();
        assert_eq!(c.classify("blood_panel.pdf", None), DocumentKind::Unclassified);
        assert_eq!(
            c.classify_with_override(Some(DocumentKind::MedicalImage), "x.png", None),
            DocumentKind::MedicalImage
        );
    }

    #[test]
    fn custom_rule_appended_last() {
        let mut c = ReportClassifier::empty();
        c.add_rule(DocumentKind::MedicalImage, r"(?i)mri").unwrap();
        assert_eq!(c.classify("knee_mri.pdf", None), DocumentKind::MedicalImage);
    }

    #[test]
    fn kind_labels_round_trip() {
        for kind in DocumentKind::ALL {
            assert_eq!(kind.as_str().parse::<DocumentKind>().unwrap(), kind);
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
        assert!("bogus".parse::<DocumentKind>().is_err());
    }
}
