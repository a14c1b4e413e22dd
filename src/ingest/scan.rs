//! Remote scan: discover new files, classify or analyze them, store the
//! result and record each file in the sync ledger.
//!
//! Files run strictly one after another. A file is recorded only after its
//! storage write succeeded; a file that fails is logged, left out of the
//! ledger and retried on the next scan.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::images::{IMAGE_SYSTEM_PROMPT, image_user_prompt, is_processable};
use super::{
    ClassifiedDocument, DocumentKind, Extracted, ImageAnalysis, MedicalImageDetector,
    ReportClassifier, Severity, SyncLedger, TextExtractor,
};
use crate::error::Error;
use crate::llm::LlmProvider;
use crate::remote::{RemoteFile, RemoteStore, TreeWalker, upload_to_calendar};
use crate::store::HealthStore;

const PDF_MIME: &str = "application/pdf";

/// What happened to one new file.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    /// Extracted, classified and stored as a document.
    Stored {
        file_id: String,
        name: String,
        kind: DocumentKind,
    },
    /// Medical image sent through vision analysis and stored.
    Analyzed {
        file_id: String,
        name: String,
        severity: Severity,
    },
    /// Medical image recorded without analysis.
    Unanalyzed {
        file_id: String,
        name: String,
        reason: String,
    },
    /// Not stored and not recorded; retried next scan.
    Failed {
        file_id: String,
        name: String,
        reason: String,
    },
}

impl ScanOutcome {
    pub fn file_id(&self) -> &str {
        match self {
            ScanOutcome::Stored { file_id, .. }
            | ScanOutcome::Analyzed { file_id, .. }
            | ScanOutcome::Unanalyzed { file_id, .. }
            | ScanOutcome::Failed { file_id, .. } => file_id,
        }
    }

    /// Whether the file now sits in the ledger.
    pub fn is_recorded(&self) -> bool {
        !matches!(self, ScanOutcome::Failed { .. })
    }
}

/// Summary of one scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanReport {
    pub discovered: usize,
    pub already_processed: usize,
    pub unsupported: usize,
    pub outcomes: Vec<ScanOutcome>,
}

impl ScanReport {
    pub fn recorded_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_recorded()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.len() - self.recorded_count()
    }

    /// One-line description for logs and step outcomes.
    pub fn describe(&self) -> String {
        if self.outcomes.is_empty() {
            return format!("no new files ({} discovered)", self.discovered);
        }
        format!(
            "processed {} file(s), {} failed ({} discovered, {} already processed, {} unsupported)",
            self.recorded_count(),
            self.failed_count(),
            self.discovered,
            self.already_processed,
            self.unsupported
        )
    }
}

/// Scans the remote document tree.
pub struct DriveScanner {
    remote: Arc<dyn RemoteStore>,
    root_path: String,
    walker: TreeWalker,
    ledger: SyncLedger,
    store: Arc<dyn HealthStore>,
    extractor: Arc<dyn TextExtractor>,
    classifier: ReportClassifier,
    detector: MedicalImageDetector,
    llm: Option<Arc<dyn LlmProvider>>,
    kind_override: Option<DocumentKind>,
}

impl DriveScanner {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        root_path: impl Into<String>,
        ledger: SyncLedger,
        store: Arc<dyn HealthStore>,
        extractor: Arc<dyn TextExtractor>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            remote,
            root_path: root_path.into(),
            walker: TreeWalker::default(),
            ledger,
            store,
            extractor,
            classifier: ReportClassifier::new()?,
            detector: MedicalImageDetector::new()?,
            llm: None,
            kind_override: None,
        })
    }

    /// Enable vision analysis of medical images.
    pub fn with_llm(mut self, llm: Option<Arc<dyn LlmProvider>>) -> Self {
        self.llm = llm;
        self
    }

    /// Force every stored document to this kind.
    pub fn with_kind_override(mut self, kind: Option<DocumentKind>) -> Self {
        self.kind_override = kind;
        self
    }

    pub fn with_walker(mut self, walker: TreeWalker) -> Self {
        self.walker = walker;
        self
    }

    /// Scan once for `day`. Listing and ledger errors abort the scan;
    /// per-file errors do not.
    pub async fn scan(&self, day: NaiveDate) -> Result<ScanReport, Error> {
        // Ids recorded during this scan are added too, so a file listed
        // under two parents is handled once.
        let mut processed: BTreeSet<String> = self.ledger.load().await?;
        let files = self
            .walker
            .walk(self.remote.as_ref(), &self.root_path)
            .await?;

        let mut report = ScanReport {
            discovered: files.len(),
            ..Default::default()
        };

        for file in files {
            if processed.contains(&file.id) {
                report.already_processed += 1;
                continue;
            }
            if !is_processable(&file.mime_type) {
                debug!(file = %file.name, mime = %file.mime_type, "Skipping unsupported file");
                report.unsupported += 1;
                continue;
            }

            let outcome = if self.detector.is_medical_image(&file.name, &file.mime_type) {
                self.process_image(&file, day).await
            } else {
                self.process_document(&file, day).await
            };

            let outcome = match outcome {
                Ok(outcome) => match self.ledger.record(&file.id).await {
                    Ok(newly_recorded) => {
                        if !newly_recorded {
                            warn!(file = %file.name, id = %file.id, "File was already in the ledger");
                        }
                        processed.insert(file.id.clone());
                        outcome
                    }
                    Err(e) => failed(&file, format!("ledger write failed: {e}")),
                },
                Err(reason) => failed(&file, reason),
            };
            if let ScanOutcome::Failed { reason, .. } = &outcome {
                warn!(file = %file.name, id = %file.id, "File not processed: {reason}");
            }
            report.outcomes.push(outcome);
        }

        info!(
            discovered = report.discovered,
            processed = report.recorded_count(),
            failed = report.failed_count(),
            "Remote scan complete"
        );
        Ok(report)
    }

    async fn process_image(&self, file: &RemoteFile, day: NaiveDate) -> Result<ScanOutcome, String> {
        let Some(llm) = &self.llm else {
            info!(file = %file.name, "Medical image recorded without analysis: LLM not configured");
            return Ok(ScanOutcome::Unanalyzed {
                file_id: file.id.clone(),
                name: file.name.clone(),
                reason: "LLM not configured".into(),
            });
        };

        let bytes = self
            .remote
            .download(&file.id)
            .await
            .map_err(|e| format!("download failed: {e}"))?;
        let analysis = llm
            .analyze_image(
                IMAGE_SYSTEM_PROMPT,
                &image_user_prompt(&file.name),
                &file.mime_type,
                bytes,
            )
            .await
            .map_err(|e| format!("image analysis failed: {e}"))?;

        let analysis = ImageAnalysis {
            date: day,
            filename: file.name.clone(),
            severity: Severity::from_analysis(&analysis),
            analysis,
            model: llm.model_name().to_string(),
            remote_file_id: Some(file.id.clone()),
            generated_at: Utc::now(),
        };
        self.store
            .save_image_analysis(&analysis)
            .await
            .map_err(|e| format!("storage write failed: {e}"))?;
        info!(file = %file.name, severity = %analysis.severity, "Image analysis stored");

        let name = format!("{}.txt", analysis.artifact_stem());
        if let Err(e) = upload_to_calendar(
            self.remote.as_ref(),
            &self.root_path,
            day,
            &name,
            &analysis.to_text(),
        )
        .await
        {
            warn!(file = %file.name, "Image analysis upload failed: {e}");
        }

        Ok(ScanOutcome::Analyzed {
            file_id: file.id.clone(),
            name: file.name.clone(),
            severity: analysis.severity,
        })
    }

    async fn process_document(
        &self,
        file: &RemoteFile,
        day: NaiveDate,
    ) -> Result<ScanOutcome, String> {
        let bytes = self
            .remote
            .download(&file.id)
            .await
            .map_err(|e| format!("download failed: {e}"))?;

        let mut metadata = Map::new();
        metadata.insert("drive_file_id".into(), Value::from(file.id.clone()));
        metadata.insert("original_name".into(), Value::from(file.name.clone()));
        metadata.insert("mime_type".into(), Value::from(file.mime_type.clone()));
        metadata.insert(
            "modified_time".into(),
            Value::from(
                file.modified_time
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default(),
            ),
        );
        if let Some(tag) = &file.subfolder {
            metadata.insert("subfolder".into(), Value::from(tag.name.clone()));
        }

        let text = if file.mime_type == PDF_MIME {
            let extracted = self.extract(&file.name, bytes).await;
            metadata.insert("pages".into(), Value::from(extracted.page_count));
            extracted.text
        } else {
            String::new()
        };

        let kind = self.classifier.classify_with_override(
            self.kind_override.or(file.subfolder_kind()),
            &file.name,
            Some(&text),
        );
        metadata.insert("kind".into(), Value::from(kind.as_str()));

        let doc = ClassifiedDocument::new(kind, day, text, metadata);
        self.store
            .append_document(&doc)
            .await
            .map_err(|e| format!("storage write failed: {e}"))?;
        info!(file = %file.name, kind = %kind, "Document stored");

        Ok(ScanOutcome::Stored {
            file_id: file.id.clone(),
            name: file.name.clone(),
            kind,
        })
    }

    /// Extraction failures yield empty text; the document is still stored.
    async fn extract(&self, name: &str, bytes: Vec<u8>) -> Extracted {
        let extractor = Arc::clone(&self.extractor);
        match tokio::task::spawn_blocking(move || extractor.extract(&bytes)).await {
            Ok(Ok(extracted)) => extracted,
            Ok(Err(e)) => {
                warn!(file = %name, "Text extraction failed, storing empty text: {e}");
                Extracted::default()
            }
            Err(e) => {
                warn!(file = %name, "Extraction task failed, storing empty text: {e}");
                Extracted::default()
            }
        }
    }
}

fn failed(file: &RemoteFile, reason: String) -> ScanOutcome {
    ScanOutcome::Failed {
        file_id: file.id.clone(),
        name: file.name.clone(),
        reason,
    }
}
