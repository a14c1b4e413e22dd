//! The daily run: biometric sync, remote scan, report generation, delivery.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::NaiveDate;
use tracing::{info, warn};

use super::runner::{PipelineStep, RunResult, StepRunner};
use crate::biometrics::{BiometricSource, DailySummary, OuraClient};
use crate::config::{RetryPolicy, SyncConfig};
use crate::delivery::{Delivery, SmtpDelivery};
use crate::error::{Error, PipelineError};
use crate::ingest::{DriveScanner, PdfTextExtractor, SyncLedger};
use crate::llm::{LlmProvider, create_provider};
use crate::remote::{GoogleDriveStore, RemoteStore, upload_to_calendar};
use crate::report::{DailyAnalytics, DailyReport, ReportAdvisor, ReportAssembler, fallback_report};
use crate::store::{HealthStore, open_store};

pub const STEP_BIOMETRICS: &str = "biometric-sync";
pub const STEP_SCAN: &str = "remote-scan";
pub const STEP_REPORT: &str = "report-generation";
pub const STEP_DELIVERY: &str = "delivery";

type ReportSlot = Mutex<Option<DailyReport>>;

/// Stateless entry point for one day's run. Every collaborator is optional;
/// a missing one turns its step into a skip.
pub struct DailyPipeline {
    store: Arc<dyn HealthStore>,
    biometrics: Option<Arc<dyn BiometricSource>>,
    biometric_retry: RetryPolicy,
    remote: Option<(Arc<dyn RemoteStore>, String)>,
    scanner: Option<DriveScanner>,
    llm: Option<Arc<dyn LlmProvider>>,
    delivery: Option<Arc<dyn Delivery>>,
}

impl DailyPipeline {
    pub fn new(store: Arc<dyn HealthStore>) -> Self {
        Self {
            store,
            biometrics: None,
            biometric_retry: RetryPolicy::once(),
            remote: None,
            scanner: None,
            llm: None,
            delivery: None,
        }
    }

    pub fn with_biometrics(mut self, source: Arc<dyn BiometricSource>, retry: RetryPolicy) -> Self {
        self.biometrics = Some(source);
        self.biometric_retry = retry;
        self
    }

    /// Upload target for analytics, analyses and reports.
    pub fn with_remote(mut self, remote: Arc<dyn RemoteStore>, root_path: impl Into<String>) -> Self {
        self.remote = Some((remote, root_path.into()));
        self
    }

    pub fn with_scanner(mut self, scanner: DriveScanner) -> Self {
        self.scanner = Some(scanner);
        self
    }

    pub fn with_llm(mut self, llm: Option<Arc<dyn LlmProvider>>) -> Self {
        self.llm = llm;
        self
    }

    pub fn with_delivery(mut self, delivery: Arc<dyn Delivery>) -> Self {
        self.delivery = Some(delivery);
        self
    }

    /// Wire the concrete clients selected by configuration.
    pub async fn from_config(config: &SyncConfig) -> Result<Self, Error> {
        let store = open_store(config).await?;
        let llm = config.llm.as_ref().map(create_provider).transpose()?;
        let mut pipeline = Self::new(Arc::clone(&store)).with_llm(llm.clone());

        if let Some(oura) = &config.oura {
            pipeline = pipeline.with_biometrics(Arc::new(OuraClient::new(oura)?), config.biometric_retry);
        }

        if let Some(drive) = &config.drive {
            let remote: Arc<dyn RemoteStore> = Arc::new(GoogleDriveStore::new(drive)?);
            let scanner = DriveScanner::new(
                Arc::clone(&remote),
                drive.root_path.clone(),
                SyncLedger::new(&config.data_dir),
                store,
                Arc::new(PdfTextExtractor),
            )
            .map_err(|e| PipelineError::Scan(format!("pattern compilation failed: {e}")))?
            .with_llm(llm);
            pipeline = pipeline
                .with_remote(remote, drive.root_path.clone())
                .with_scanner(scanner);
        }

        if let Some(email) = &config.email {
            pipeline = pipeline.with_delivery(Arc::new(SmtpDelivery::new(email.clone())));
        }

        Ok(pipeline)
    }

    /// Run every step once for `date`.
    pub async fn run(&self, date: NaiveDate) -> RunResult {
        info!(date = %date, "Daily pipeline starting");
        let report_slot: ReportSlot = Mutex::new(None);
        StepRunner::new()
            .run(self.steps(date, &report_slot))
            .await
    }

    /// Run only the named steps, in pipeline order.
    ///
    /// Without the delivery step, the run succeeds only if every selected
    /// step succeeded; a skipped step counts as a failure here.
    pub async fn run_only(&self, date: NaiveDate, names: &[&str]) -> RunResult {
        info!(date = %date, steps = ?names, "Partial pipeline run");
        let report_slot: ReportSlot = Mutex::new(None);
        let steps: Vec<PipelineStep<'_>> = self
            .steps(date, &report_slot)
            .into_iter()
            .filter(|step| names.iter().any(|n| *n == step.name()))
            .collect();
        let mut result = StepRunner::new().run(steps).await;
        if !names.contains(&STEP_DELIVERY) {
            result.success = !result.steps.is_empty()
                && result.steps.iter().all(|s| s.outcome.is_success());
        }
        result
    }

    fn steps<'a>(&'a self, date: NaiveDate, slot: &'a ReportSlot) -> Vec<PipelineStep<'a>> {
        vec![
            PipelineStep::new(STEP_BIOMETRICS, move || Box::pin(self.sync_biometrics(date)))
                .with_retry(self.biometric_retry)
                .requires("wearable source not configured", move || {
                    self.biometrics.is_some()
                }),
            PipelineStep::new(STEP_SCAN, move || Box::pin(self.scan_remote(date)))
                .requires("remote store not configured", move || self.scanner.is_some()),
            PipelineStep::new(STEP_REPORT, move || {
                Box::pin(self.generate_report(date, slot))
            })
            .requires("LLM not configured", move || self.llm.is_some()),
            PipelineStep::new(STEP_DELIVERY, move || Box::pin(self.deliver(slot)))
                .critical()
                .delivers()
                .requires("delivery not configured", move || self.delivery.is_some())
                .requires("no report to deliver", move || {
                    slot.lock().unwrap_or_else(PoisonError::into_inner).is_some()
                }),
        ]
    }

    async fn sync_biometrics(&self, date: NaiveDate) -> Result<String, String> {
        let source = self
            .biometrics
            .as_ref()
            .ok_or("wearable source not configured")?;
        let raw = source
            .fetch_summary(date)
            .await
            .map_err(|e| e.to_string())?;
        let summary = DailySummary::from_oura(date, &raw);
        self.store
            .upsert_daily_summary(&summary)
            .await
            .map_err(|e| format!("storage write failed: {e}"))?;

        let analytics = DailyAnalytics::from_summary(&summary);
        self.upload(date, &analytics.artifact_name(), &analytics.to_text())
            .await;
        Ok(analytics.summary())
    }

    async fn scan_remote(&self, date: NaiveDate) -> Result<String, String> {
        let scanner = self.scanner.as_ref().ok_or("remote store not configured")?;
        let report = scanner.scan(date).await.map_err(|e| e.to_string())?;
        Ok(report.describe())
    }

    /// On failure the slot receives a fallback report and the step fails.
    async fn generate_report(&self, date: NaiveDate, slot: &ReportSlot) -> Result<String, String> {
        let llm = self.llm.as_ref().ok_or("LLM not configured")?;
        match self.build_report(Arc::clone(llm), date).await {
            Ok(report) => {
                if let Err(e) = self.store.save_report(&report).await {
                    warn!(date = %date, "Could not save report: {e}");
                }
                self.upload(
                    date,
                    &format!("{}.txt", report.artifact_stem()),
                    &report.to_text(),
                )
                .await;
                let detail = format!(
                    "generated {} chars with {}",
                    report.advice.len(),
                    report.model
                );
                fill_slot(slot, report);
                Ok(detail)
            }
            Err(e) => {
                fill_slot(slot, fallback_report(date, &e));
                Err(format!("{e}; fallback report prepared"))
            }
        }
    }

    async fn build_report(
        &self,
        llm: Arc<dyn LlmProvider>,
        date: NaiveDate,
    ) -> Result<DailyReport, Error> {
        let ctx = ReportAssembler::new(self.store.as_ref())
            .assemble(date)
            .await?;
        Ok(ReportAdvisor::new(llm).generate(&ctx).await?)
    }

    async fn deliver(&self, slot: &ReportSlot) -> Result<String, String> {
        let delivery = self.delivery.as_ref().ok_or("delivery not configured")?;
        let report = slot.lock().unwrap_or_else(PoisonError::into_inner).clone();
        let report = report.ok_or("no report to deliver")?;
        delivery
            .deliver(&report)
            .await
            .map_err(|e| e.to_string())?;
        Ok(format!("report for {} sent via {}", report.date, delivery.name()))
    }

    /// Upload failures are logged and never fail the calling step.
    async fn upload(&self, date: NaiveDate, name: &str, content: &str) {
        let Some((remote, root)) = &self.remote else {
            return;
        };
        match upload_to_calendar(remote.as_ref(), root, date, name, content).await {
            Ok(id) => info!(file = name, id = %id, "Uploaded to remote store"),
            Err(e) => warn!(file = name, "Remote upload failed: {e}"),
        }
    }
}

fn fill_slot(slot: &ReportSlot, report: DailyReport) {
    *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(report);
}
