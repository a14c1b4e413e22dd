//! Daily plan generation over the assembled context.

use std::fmt;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::info;

use crate::error::LlmError;
use crate::llm::LlmProvider;
use crate::report::assembler::DailyReportContext;
use crate::report::{ContextSummary, DailyReport};

/// System prompt; `{date}` is replaced with the report date.
pub const SYSTEM_PROMPT: &str = "\
You are the patient's general practitioner, with a particular interest in \
reproductive health. The patient is a man trying to conceive. Your two goals are \
better sperm quality (motility first) and high, steady daily energy.

Each morning you receive the patient's wearable data (sleep, HRV, resting heart \
rate, activity), the latest medical reports on file (blood panels, urine and \
semen analyses, genetic reports, clinical conclusions, prescriptions, check-ups) \
and any radiology reads of their medical images.

When genetic results are present, let them shape every recommendation. Variants \
such as MTHFR, COMT, SOD2, VDR, HFE or APOE change how folate, caffeine, \
antioxidants, vitamin D, iron and dietary fat should be handled; say so when a \
variant drives an action.

Write a concrete plan for today in exactly this shape:

## Daily Health Plan \u{2014} {date}

### Top 3 actions today
Three numbered items, each with a bold title and specific guidance (doses, \
timings, durations) and the link to motility or energy.

### Key metrics to watch
Which of today's numbers look good and which need attention, with reference \
ranges for a man optimizing fertility.

### Nutrition focus
One meal or supplement recommendation tied to today's data.

### What to avoid today
One concrete thing to avoid, justified by the data.

### Genetic considerations
Only when genetic data is on file: how today's plan reflects it.

Be direct and practical, speak as a trusted doctor, no disclaimers. Stay under \
600 words.";

/// Render the user prompt from the context.
pub fn build_user_prompt(ctx: &DailyReportContext) -> String {
    let mut sections = vec![biometrics_section(ctx), documents_section(ctx)];
    if let Some(images) = images_section(ctx) {
        sections.push(images);
    }
    sections.join("\n\n")
}

fn biometrics_section(ctx: &DailyReportContext) -> String {
    let Some(b) = &ctx.biometrics else {
        return "## Wearable data\nNo data available for today.".to_string();
    };
    let mut section = format!(
        "## Today's wearable data ({date})\n\
         - Sleep: {hours} hours, quality score {quality}/10\n\
         - Resting heart rate: {rhr} bpm\n\
         - Heart rate variability (HRV): {hrv} ms\n\
         - Steps: {steps}\n\
         - Active minutes: {active}",
        date = ctx.date,
        hours = b.sleep_hours,
        quality = b.sleep_quality,
        rhr = b.resting_hr,
        hrv = b.hrv,
        steps = b.steps,
        active = b.active_minutes,
    );
    if let Some(analytics) = ctx.analytics() {
        section.push_str(&format!("\n- Assessment: {}", analytics.summary()));
    }
    section
}

fn documents_section(ctx: &DailyReportContext) -> String {
    if ctx.documents.is_empty() {
        return "## Available health reports\nNo lab reports on file.".to_string();
    }
    let parts: Vec<String> = ctx
        .documents
        .iter()
        .map(|d| format!("### {} (date: {})\n{}", d.kind, d.date, d.text))
        .collect();
    format!("## Available health reports\n{}", parts.join("\n\n"))
}

fn images_section(ctx: &DailyReportContext) -> Option<String> {
    if ctx.image_analyses.is_empty() {
        return None;
    }
    let parts: Vec<String> = ctx
        .image_analyses
        .iter()
        .map(|a| {
            format!(
                "### {} (date: {}, severity: {})\n{}",
                a.filename, a.date, a.severity, a.analysis
            )
        })
        .collect();
    Some(format!(
        "## Medical image analyses (MRI / X-ray / CT)\n{}",
        parts.join("\n\n")
    ))
}

/// Report describing a failed generation, so delivery can still inform the user.
pub fn fallback_report(date: NaiveDate, error: &dyn fmt::Display) -> DailyReport {
    DailyReport {
        date,
        generated_at: Utc::now(),
        model: "N/A".into(),
        advice: format!(
            "## Daily Health Plan \u{2014} {date}\n\n\
             **Advisor generation failed.**\n\n\
             Error: {error}\n\n\
             Check the pipeline logs and the LLM provider status for details."
        ),
        context_summary: ContextSummary::default(),
        fallback: true,
    }
}

/// Generates the daily report with one LLM call.
pub struct ReportAdvisor {
    llm: Arc<dyn LlmProvider>,
}

impl ReportAdvisor {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    pub async fn generate(&self, ctx: &DailyReportContext) -> Result<DailyReport, LlmError> {
        let system = SYSTEM_PROMPT.replace("{date}", &ctx.date.to_string());
        let user = build_user_prompt(ctx);
        let advice = self.llm.generate(&system, &user).await?;

        let context_summary = ctx.summary();
        info!(
            date = %ctx.date,
            chars = advice.len(),
            biometrics = context_summary.biometrics_available,
            documents = context_summary.documents_count,
            images = context_summary.image_analyses_count,
            "Daily report generated"
        );
        Ok(DailyReport {
            date: ctx.date,
            generated_at: Utc::now(),
            model: self.llm.model_name().to_string(),
            advice,
            context_summary,
            fallback: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::biometrics::DailySummary;
    use crate::ingest::{ClassifiedDocument, DocumentKind, ImageAnalysis, Severity};
    use crate::llm::{CompletionRequest, CompletionResponse, FinishReason};
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    fn summary() -> DailySummary {
        DailySummary {
            date: day(),
            sleep_hours: 8.0,
            sleep_quality: 8,
            steps: 10_500,
            active_minutes: 50,
            resting_hr: 58,
            hrv: 70.0,
            source: "oura".into(),
        }
    }

    struct RecordingLlm {
        last: Mutex<Option<CompletionRequest>>,
    }

    #[async_trait]
    impl LlmProvider for RecordingLlm {
        fn model_name(&self) -> &str {
            "stub-model"
        }

        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            *self.last.lock().unwrap() = Some(request);
            Ok(CompletionResponse {
                content: "## Plan\nWalk.".into(),
                input_tokens: 0,
                output_tokens: 0,
                finish_reason: FinishReason::Stop,
            })
        }
    }

    #[test]
    fn prompt_without_data() {
        let ctx = DailyReportContext::new(day(), None, Vec::new(), Vec::new());
        assert_eq!(
            build_user_prompt(&ctx),
            "## Wearable data\nNo data available for today.\n\n\
             ## Available health reports\nNo lab reports on file."
        );
    }

    #[test]
    fn prompt_with_all_sections() {
        let docs = vec![ClassifiedDocument::new(
            DocumentKind::BloodPanel,
            day(),
            "Ferritin 80",
            Default::default(),
        )];
        let images = vec![ImageAnalysis {
            date: day(),
            filename: "knee.png".into(),
            severity: Severity::MinorFindings,
            analysis: "mild effusion".into(),
            model: "m".into(),
            remote_file_id: None,
            generated_at: Utc::now(),
        }];
        let ctx = DailyReportContext::new(day(), Some(summary()), docs, images);
        let prompt = build_user_prompt(&ctx);

        assert!(prompt.starts_with("## Today's wearable data (2024-05-01)\n- Sleep: 8 hours"));
        assert!(prompt.contains("- Assessment: Sleep: 8h (score 8/10), Excellent."));
        assert!(prompt.contains("### blood-panel (date: 2024-05-01)\nFerritin 80"));
        assert!(prompt.contains(
            "## Medical image analyses (MRI / X-ray / CT)\n\
             ### knee.png (date: 2024-05-01, severity: MINOR FINDINGS)\nmild effusion"
        ));
    }

    #[tokio::test]
    async fn generate_fills_report_and_substitutes_date() {
        let llm = Arc::new(RecordingLlm {
            last: Mutex::new(None),
        });
        let advisor = ReportAdvisor::new(llm.clone());
        let ctx = DailyReportContext::new(day(), Some(summary()), Vec::new(), Vec::new());

        let report = advisor.generate(&ctx).await.unwrap();
        assert_eq!(report.model, "stub-model");
        assert_eq!(report.advice, "## Plan\nWalk.");
        assert!(report.context_summary.biometrics_available);
        assert!(!report.fallback);

        let request = llm.last.lock().unwrap().clone().unwrap();
        let system = request.system.unwrap();
        assert!(system.contains("## Daily Health Plan \u{2014} 2024-05-01"));
        assert!(!system.contains("{date}"));
        assert_eq!(request.max_tokens, crate::llm::DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn fallback_describes_failure() {
        let report = fallback_report(day(), &"rate limited");
        assert!(report.fallback);
        assert_eq!(report.model, "N/A");
        assert!(report.advice.contains("**Advisor generation failed.**"));
        assert!(report.advice.contains("Error: rate limited"));
        assert_eq!(report.context_summary, ContextSummary::default());
    }
}
