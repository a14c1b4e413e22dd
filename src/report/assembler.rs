//! Merge stored artifacts into one context for a day.

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::biometrics::DailySummary;
use crate::error::DatabaseError;
use crate::ingest::{ClassifiedDocument, DocumentKind, ImageAnalysis};
use crate::report::ContextSummary;
use crate::report::analytics::DailyAnalytics;
use crate::store::HealthStore;

/// Maximum characters of document text kept in the context.
pub const DOCUMENT_TEXT_LIMIT: usize = 3000;
/// Genetic reports are denser and get more room.
pub const GENETIC_TEXT_LIMIT: usize = 5000;
/// Maximum characters of one image analysis.
pub const IMAGE_TEXT_LIMIT: usize = 2000;

const TRUNCATION_MARKER: &str = "\n... [truncated]";

/// Truncate to `max_chars` characters, appending a marker when cut.
pub fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}{TRUNCATION_MARKER}", &text[..byte_idx]),
        None => text.to_string(),
    }
}

/// Text limit applied to documents of `kind`.
pub fn text_limit(kind: DocumentKind) -> usize {
    match kind {
        DocumentKind::GeneticReport => GENETIC_TEXT_LIMIT,
        _ => DOCUMENT_TEXT_LIMIT,
    }
}

/// Everything the report generator sees for one day.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyReportContext {
    pub date: NaiveDate,
    pub biometrics: Option<DailySummary>,
    /// At most one per kind, texts already truncated.
    pub documents: Vec<ClassifiedDocument>,
    /// Analyses already truncated.
    pub image_analyses: Vec<ImageAnalysis>,
}

impl DailyReportContext {
    pub fn new(
        date: NaiveDate,
        biometrics: Option<DailySummary>,
        documents: Vec<ClassifiedDocument>,
        image_analyses: Vec<ImageAnalysis>,
    ) -> Self {
        let mut seen = Vec::new();
        let documents = documents
            .into_iter()
            .filter(|d| {
                if seen.contains(&d.kind) {
                    false
                } else {
                    seen.push(d.kind);
                    true
                }
            })
            .map(|mut d| {
                d.text = truncate(&d.text, text_limit(d.kind));
                d
            })
            .collect();
        let image_analyses = image_analyses
            .into_iter()
            .map(|mut a| {
                a.analysis = truncate(&a.analysis, IMAGE_TEXT_LIMIT);
                a
            })
            .collect();
        Self {
            date,
            biometrics,
            documents,
            image_analyses,
        }
    }

    /// Assessments for the day, when biometrics are present.
    pub fn analytics(&self) -> Option<DailyAnalytics> {
        self.biometrics.as_ref().map(DailyAnalytics::from_summary)
    }

    pub fn summary(&self) -> ContextSummary {
        ContextSummary {
            biometrics_available: self.biometrics.is_some(),
            documents_count: self.documents.len(),
            document_kinds: self.documents.iter().map(|d| d.kind).collect(),
            image_analyses_count: self.image_analyses.len(),
            image_severities: self
                .image_analyses
                .iter()
                .map(|a| format!("{}: {}", a.filename, a.severity))
                .collect(),
        }
    }
}

/// Loads a [`DailyReportContext`] from a store.
pub struct ReportAssembler<'a> {
    store: &'a dyn HealthStore,
}

impl<'a> ReportAssembler<'a> {
    pub fn new(store: &'a dyn HealthStore) -> Self {
        Self { store }
    }

    /// Biometrics are required to load; a failure listing documents or
    /// analyses degrades to an empty section.
    pub async fn assemble(&self, date: NaiveDate) -> Result<DailyReportContext, DatabaseError> {
        let biometrics = self.store.get_daily_summary(date).await?;

        let documents = self.store.latest_documents().await.unwrap_or_else(|e| {
            warn!("Could not load documents: {e}");
            Vec::new()
        });
        let image_analyses = self.store.list_image_analyses().await.unwrap_or_else(|e| {
            warn!("Could not load image analyses: {e}");
            Vec::new()
        });

        debug!(
            date = %date,
            biometrics = biometrics.is_some(),
            documents = documents.len(),
            images = image_analyses.len(),
            "Report context assembled"
        );
        Ok(DailyReportContext::new(
            date,
            biometrics,
            documents,
            image_analyses,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::Severity;
    use crate::store::FileStore;
    use chrono::Utc;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    #[test]
    fn truncate_appends_marker() {
        assert_eq!(truncate("abcdef", 3), "abc\n... [truncated]");
        assert_eq!(truncate("abc", 3), "abc");
        assert_eq!(truncate("ééé", 2), "éé\n... [truncated]");
    }

    #[test]
    fn genetic_reports_get_more_room() {
        let long = "x".repeat(6000);
        let docs = vec![
            ClassifiedDocument::new(DocumentKind::BloodPanel, day(), long.clone(), Default::default()),
            ClassifiedDocument::new(DocumentKind::GeneticReport, day(), long, Default::default()),
        ];
        let ctx = DailyReportContext::new(day(), None, docs, Vec::new());
        assert_eq!(ctx.documents[0].text.chars().count(), 3000 + TRUNCATION_MARKER.len());
        assert_eq!(ctx.documents[1].text.chars().count(), 5000 + TRUNCATION_MARKER.len());
    }

    #[test]
    fn at_most_one_document_per_kind() {
        let docs = vec![
            ClassifiedDocument::new(DocumentKind::BloodPanel, day(), "a", Default::default()),
            ClassifiedDocument::new(DocumentKind::BloodPanel, day(), "b", Default::default()),
        ];
        let ctx = DailyReportContext::new(day(), None, docs, Vec::new());
        assert_eq!(ctx.documents.len(), 1);
        assert_eq!(ctx.documents[0].text, "a");
    }

    #[tokio::test]
    async fn assembles_from_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store
            .append_document(&ClassifiedDocument::new(
                DocumentKind::SemenAnalysis,
                day(),
                "motility 45%",
                Default::default(),
            ))
            .await
            .unwrap();
        store
            .save_image_analysis(&ImageAnalysis {
                date: day(),
                filename: "knee.png".into(),
                severity: Severity::Normal,
                analysis: "y".repeat(2500),
                model: "m".into(),
                remote_file_id: None,
                generated_at: Utc::now(),
            })
            .await
            .unwrap();

        let ctx = ReportAssembler::new(&store).assemble(day()).await.unwrap();
        assert!(ctx.biometrics.is_none());
        assert!(ctx.analytics().is_none());
        assert_eq!(ctx.documents.len(), 1);
        assert!(ctx.image_analyses[0].analysis.ends_with("[truncated]"));

        let summary = ctx.summary();
        assert!(!summary.biometrics_available);
        assert_eq!(summary.document_kinds, vec![DocumentKind::SemenAnalysis]);
        assert_eq!(summary.image_severities, vec!["knee.png: NORMAL".to_string()]);
    }
}
