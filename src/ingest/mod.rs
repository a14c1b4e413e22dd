//! Document ingestion: classification, extraction, the sync ledger and the
//! remote scan that ties them together.

pub mod classify;
pub mod extract;
pub mod images;
pub mod ledger;
pub mod local;
pub mod scan;

pub use classify::{DocumentKind, ReportClassifier};
pub use extract::{Extracted, PdfTextExtractor, TextExtractor};
pub use images::{MedicalImageDetector, Severity};
pub use ledger::SyncLedger;
pub use local::ingest_local_document;
pub use scan::{DriveScanner, ScanOutcome, ScanReport};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A classified, text-extracted document. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedDocument {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub kind: DocumentKind,
    /// The day the document was ingested for.
    pub date: NaiveDate,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl ClassifiedDocument {
    pub fn new(
        kind: DocumentKind,
        date: NaiveDate,
        text: impl Into<String>,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            date,
            text: text.into(),
            metadata,
            created_at: Utc::now(),
        }
    }

    /// Original file name, when the document came from a file.
    pub fn source_name(&self) -> Option<&str> {
        self.metadata.get("original_name").and_then(|v| v.as_str())
    }
}

/// Result of a vision analysis of one medical image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAnalysis {
    pub date: NaiveDate,
    pub filename: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub analysis: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub remote_file_id: Option<String>,
    #[serde(default = "Utc::now")]
    pub generated_at: DateTime<Utc>,
}

impl ImageAnalysis {
    /// Artifact stem: `scan_<name without extension>_<date>`.
    pub fn artifact_stem(&self) -> String {
        let stem = self
            .filename
            .rsplit_once('.')
            .map(|(s, _)| s)
            .unwrap_or(&self.filename);
        format!("scan_{}_{}", stem, self.date)
    }

    /// Plain-text rendering used for remote uploads.
    pub fn to_text(&self) -> String {
        format!(
            "Medical Image Analysis: {}\nDate: {}\nSeverity: {}\nModel: {}\n\n{}\n",
            self.filename, self.date, self.severity, self.model, self.analysis
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_deserializes_with_defaults() {
        let raw = r#"{"kind": "blood-panel", "date": "2024-05-01"}"#;
        let doc: ClassifiedDocument = serde_json::from_str(raw).unwrap();
        assert_eq!(doc.kind, DocumentKind::BloodPanel);
        assert!(doc.text.is_empty());
        assert!(doc.metadata.is_empty());
    }

    #[test]
    fn analysis_artifact_stem_drops_extension() {
        let analysis = ImageAnalysis {
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            filename: "knee.mri.png".into(),
            severity: Severity::Normal,
            analysis: String::new(),
            model: "m".into(),
            remote_file_id: None,
            generated_at: Utc::now(),
        };
        assert_eq!(analysis.artifact_stem(), "scan_knee.mri_2024-05-01");
        assert!(analysis.to_text().contains("Severity: NORMAL"));
    }
}
