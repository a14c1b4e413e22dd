//! JSON-file backend rooted at the data directory.
//!
//! Layout:
//! - `daily_<date>.json`
//! - `documents/<kind>_<date>_<id>.json`
//! - `image_analysis/scan_<stem>_<date>.json`
//! - `advisor/daily_advice_<date>.json`
//!
//! Unreadable files are skipped with a warning when listing.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs;
use tracing::{debug, warn};

use crate::biometrics::DailySummary;
use crate::error::DatabaseError;
use crate::ingest::{ClassifiedDocument, ImageAnalysis};
use crate::report::DailyReport;
use crate::store::traits::{HealthStore, newest_per_kind};

const DOCUMENTS_DIR: &str = "documents";
const IMAGE_ANALYSIS_DIR: &str = "image_analysis";
const ADVISOR_DIR: &str = "advisor";

pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn daily_path(&self, date: NaiveDate) -> PathBuf {
        self.root.join(format!("daily_{date}.json"))
    }

    fn report_path(&self, date: NaiveDate) -> PathBuf {
        self.root
            .join(ADVISOR_DIR)
            .join(format!("daily_advice_{date}.json"))
    }
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), DatabaseError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let body = serde_json::to_string_pretty(value)
        .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, body).await?;
    fs::rename(&tmp, path).await?;
    debug!(path = %path.display(), "Artifact written");
    Ok(())
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, DatabaseError> {
    let raw = match fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| DatabaseError::Serialization(format!("{}: {e}", path.display())))
}

/// Parse every `*.json` in `dir` whose name starts with `prefix`, sorted by name.
async fn read_dir_json<T: DeserializeOwned>(
    dir: &Path,
    prefix: &str,
) -> Result<Vec<T>, DatabaseError> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(prefix) && n.ends_with(".json"));
        if matches {
            paths.push(path);
        }
    }
    paths.sort();

    let mut values = Vec::with_capacity(paths.len());
    for path in paths {
        match read_json(&path).await {
            Ok(Some(v)) => values.push(v),
            Ok(None) => {}
            Err(e) => warn!(path = %path.display(), "Skipping unreadable artifact: {e}"),
        }
    }
    Ok(values)
}

#[async_trait]
impl HealthStore for FileStore {
    async fn upsert_daily_summary(&self, summary: &DailySummary) -> Result<(), DatabaseError> {
        write_json(&self.daily_path(summary.date), summary).await
    }

    async fn get_daily_summary(
        &self,
        date: NaiveDate,
    ) -> Result<Option<DailySummary>, DatabaseError> {
        read_json(&self.daily_path(date)).await
    }

    async fn append_document(&self, doc: &ClassifiedDocument) -> Result<(), DatabaseError> {
        let name = format!("{}_{}_{}.json", doc.kind, doc.date, doc.id.simple());
        write_json(&self.root.join(DOCUMENTS_DIR).join(name), doc).await
    }

    async fn latest_documents(&self) -> Result<Vec<ClassifiedDocument>, DatabaseError> {
        let docs = read_dir_json(&self.root.join(DOCUMENTS_DIR), "").await?;
        Ok(newest_per_kind(docs))
    }

    async fn save_image_analysis(&self, analysis: &ImageAnalysis) -> Result<(), DatabaseError> {
        let path = self
            .root
            .join(IMAGE_ANALYSIS_DIR)
            .join(format!("{}.json", analysis.artifact_stem()));
        write_json(&path, analysis).await
    }

    async fn list_image_analyses(&self) -> Result<Vec<ImageAnalysis>, DatabaseError> {
        read_dir_json(&self.root.join(IMAGE_ANALYSIS_DIR), "scan_").await
    }

    async fn save_report(&self, report: &DailyReport) -> Result<(), DatabaseError> {
        write_json(&self.report_path(report.date), report).await
    }

    async fn get_report(&self, date: NaiveDate) -> Result<Option<DailyReport>, DatabaseError> {
        read_json(&self.report_path(date)).await
    }
}
