//! Backend-agnostic persistence trait for health artifacts.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::biometrics::DailySummary;
use crate::error::DatabaseError;
use crate::ingest::{ClassifiedDocument, ImageAnalysis};
use crate::report::DailyReport;

/// Single async interface over every stored artifact.
#[async_trait]
pub trait HealthStore: Send + Sync {
    // ── Biometrics ──────────────────────────────────────────────────

    /// Insert or replace the summary for `summary.date`.
    async fn upsert_daily_summary(&self, summary: &DailySummary) -> Result<(), DatabaseError>;

    /// Summary for one day, if synced.
    async fn get_daily_summary(
        &self,
        date: NaiveDate,
    ) -> Result<Option<DailySummary>, DatabaseError>;

    // ── Documents ───────────────────────────────────────────────────

    /// Append a classified document. Documents are never updated.
    async fn append_document(&self, doc: &ClassifiedDocument) -> Result<(), DatabaseError>;

    /// Most recently created document of each kind, in kind order.
    async fn latest_documents(&self) -> Result<Vec<ClassifiedDocument>, DatabaseError>;

    // ── Artifacts ───────────────────────────────────────────────────

    /// Save an image analysis, replacing one with the same artifact stem.
    async fn save_image_analysis(&self, analysis: &ImageAnalysis) -> Result<(), DatabaseError>;

    /// Every stored image analysis, ordered by artifact stem.
    async fn list_image_analyses(&self) -> Result<Vec<ImageAnalysis>, DatabaseError>;

    /// Save the report for `report.date`, replacing any earlier one.
    async fn save_report(&self, report: &DailyReport) -> Result<(), DatabaseError>;

    async fn get_report(&self, date: NaiveDate) -> Result<Option<DailyReport>, DatabaseError>;
}

/// Keep the newest document per kind and order the result by kind.
pub(crate) fn newest_per_kind(docs: Vec<ClassifiedDocument>) -> Vec<ClassifiedDocument> {
    let mut newest: std::collections::BTreeMap<_, ClassifiedDocument> =
        std::collections::BTreeMap::new();
    for doc in docs {
        match newest.get(&doc.kind) {
            Some(existing) if existing.created_at >= doc.created_at => {}
            _ => {
                newest.insert(doc.kind, doc);
            }
        }
    }
    newest.into_values().collect()
}
