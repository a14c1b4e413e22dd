//! libSQL backend for [`HealthStore`].
//!
//! Supports local file and in-memory databases. Summaries, image analyses and
//! reports are stored as JSON payloads keyed by date or stem; documents get
//! real columns so the newest-per-kind query can use the index.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::biometrics::DailySummary;
use crate::error::DatabaseError;
use crate::ingest::{ClassifiedDocument, DocumentKind, ImageAnalysis};
use crate::report::DailyReport;
use crate::store::migrations;
use crate::store::traits::{HealthStore, newest_per_kind};

/// libSQL store. One connection reused for every operation.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;
        let store = Self::from_database(db).await?;
        info!(path = %path.display(), "Database opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Fetch a single JSON payload column.
    async fn query_payload<T: DeserializeOwned>(
        &self,
        op: &str,
        sql: &str,
        key: String,
    ) -> Result<Option<T>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, params![key])
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let payload: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("{op}: row parse: {e}")))?;
                from_json(&payload).map(Some)
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("{op}: {e}"))),
        }
    }

    /// Run `sql` and map every row. A row that fails to map is skipped with a
    /// warning; a failed query or cursor error is returned.
    async fn query_rows<T>(
        &self,
        op: &str,
        sql: &str,
        map: impl Fn(&libsql::Row) -> Result<T, DatabaseError>,
    ) -> Result<Vec<T>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(sql, ())
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?;

        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("{op}: {e}")))?
        {
            match map(&row) {
                Ok(item) => out.push(item),
                Err(e) => warn!(op, "Skipping row: {e}"),
            }
        }
        Ok(out)
    }
}

// ── Helper functions ────────────────────────────────────────────────

fn to_json<T: Serialize>(value: &T) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

fn from_json<T: DeserializeOwned>(raw: &str) -> Result<T, DatabaseError> {
    serde_json::from_str(raw).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

/// Fixed-width RFC 3339 so lexical order matches time order.
fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

const DOCUMENT_COLUMNS: &str = "id, kind, date, text, metadata, created_at";

/// Map a libsql Row to a ClassifiedDocument. Column order matches DOCUMENT_COLUMNS.
fn row_to_document(row: &libsql::Row) -> Result<ClassifiedDocument, DatabaseError> {
    let parse = |e: libsql::Error| DatabaseError::Query(format!("row parse: {e}"));
    let id: String = row.get(0).map_err(parse)?;
    let kind: String = row.get(1).map_err(parse)?;
    let date: String = row.get(2).map_err(parse)?;
    let text: String = row.get(3).map_err(parse)?;
    let metadata: String = row.get(4).map_err(parse)?;
    let created_at: String = row.get(5).map_err(parse)?;

    Ok(ClassifiedDocument {
        id: Uuid::parse_str(&id).map_err(|e| DatabaseError::Serialization(e.to_string()))?,
        kind: kind
            .parse::<DocumentKind>()
            .unwrap_or(DocumentKind::Unclassified),
        date: NaiveDate::parse_from_str(&date, "%Y-%m-%d")
            .map_err(|e| DatabaseError::Serialization(format!("date {date}: {e}")))?,
        text,
        metadata: from_json(&metadata)?,
        created_at: parse_datetime(&created_at),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl HealthStore for LibSqlStore {
    async fn upsert_daily_summary(&self, summary: &DailySummary) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO daily_summaries (date, payload, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT (date) DO UPDATE SET payload = ?2, updated_at = ?3",
                params![
                    summary.date.to_string(),
                    to_json(summary)?,
                    timestamp(&Utc::now())
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_daily_summary: {e}")))?;
        debug!(date = %summary.date, "Daily summary upserted");
        Ok(())
    }

    async fn get_daily_summary(
        &self,
        date: NaiveDate,
    ) -> Result<Option<DailySummary>, DatabaseError> {
        self.query_payload(
            "get_daily_summary",
            "SELECT payload FROM daily_summaries WHERE date = ?1",
            date.to_string(),
        )
        .await
    }

    async fn append_document(&self, doc: &ClassifiedDocument) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO documents (id, kind, date, text, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    doc.id.to_string(),
                    doc.kind.as_str(),
                    doc.date.to_string(),
                    doc.text.as_str(),
                    to_json(&doc.metadata)?,
                    timestamp(&doc.created_at)
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("append_document: {e}")))?;
        debug!(id = %doc.id, kind = %doc.kind, "Document appended");
        Ok(())
    }

    async fn latest_documents(&self) -> Result<Vec<ClassifiedDocument>, DatabaseError> {
        let docs = self
            .query_rows(
                "latest_documents",
                &format!(
                    "SELECT {DOCUMENT_COLUMNS} FROM documents d
                     WHERE created_at = (SELECT MAX(created_at) FROM documents WHERE kind = d.kind)"
                ),
                row_to_document,
            )
            .await?;
        Ok(newest_per_kind(docs))
    }

    async fn save_image_analysis(&self, analysis: &ImageAnalysis) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO image_analyses (stem, date, payload) VALUES (?1, ?2, ?3)
                 ON CONFLICT (stem) DO UPDATE SET date = ?2, payload = ?3",
                params![
                    analysis.artifact_stem(),
                    analysis.date.to_string(),
                    to_json(analysis)?
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_image_analysis: {e}")))?;
        Ok(())
    }

    async fn list_image_analyses(&self) -> Result<Vec<ImageAnalysis>, DatabaseError> {
        self.query_rows(
            "list_image_analyses",
            "SELECT payload FROM image_analyses ORDER BY stem ASC",
            |row| {
                let payload: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("row parse: {e}")))?;
                from_json::<ImageAnalysis>(&payload)
            },
        )
        .await
    }

    async fn save_report(&self, report: &DailyReport) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO reports (date, payload, generated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT (date) DO UPDATE SET payload = ?2, generated_at = ?3",
                params![
                    report.date.to_string(),
                    to_json(report)?,
                    timestamp(&report.generated_at)
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_report: {e}")))?;
        Ok(())
    }

    async fn get_report(&self, date: NaiveDate) -> Result<Option<DailyReport>, DatabaseError> {
        self.query_payload(
            "get_report",
            "SELECT payload FROM reports WHERE date = ?1",
            date.to_string(),
        )
        .await
    }
}
