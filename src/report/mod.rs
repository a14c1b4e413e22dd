//! Daily report: context assembly, assessments and LLM generation.

pub mod advisor;
pub mod analytics;
pub mod assembler;

pub use advisor::{ReportAdvisor, build_user_prompt, fallback_report};
pub use analytics::{ActivityAssessment, DailyAnalytics, RecoveryAssessment, SleepAssessment};
pub use assembler::{DailyReportContext, ReportAssembler};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::ingest::DocumentKind;

/// What went into a report, for the delivery footer and logs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextSummary {
    pub biometrics_available: bool,
    pub documents_count: usize,
    pub document_kinds: Vec<DocumentKind>,
    pub image_analyses_count: usize,
    /// `"<filename>: <SEVERITY>"` per analysis.
    pub image_severities: Vec<String>,
}

/// A generated (or fallback) daily report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyReport {
    pub date: NaiveDate,
    #[serde(default = "Utc::now")]
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub advice: String,
    #[serde(default)]
    pub context_summary: ContextSummary,
    /// Set when generation failed and `advice` describes the failure.
    #[serde(default)]
    pub fallback: bool,
}

impl DailyReport {
    /// Artifact stem: `daily_advice_<date>`.
    pub fn artifact_stem(&self) -> String {
        format!("daily_advice_{}", self.date)
    }

    /// Plain-text rendering used for remote uploads.
    pub fn to_text(&self) -> String {
        format!(
            "Daily Health Plan \u{2014} {}\nGenerated: {}\nModel: {}\n\n{}\n",
            self.date,
            self.generated_at.to_rfc3339(),
            self.model,
            self.advice
        )
    }
}
