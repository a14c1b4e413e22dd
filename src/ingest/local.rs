//! Ingest a document from the local filesystem.

use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::{Map, Value};
use tracing::{info, warn};

use super::{ClassifiedDocument, DocumentKind, ReportClassifier, TextExtractor};
use crate::error::{Error, ExtractError};
use crate::store::HealthStore;

/// Extract, classify and store one local file.
///
/// PDFs go through `extractor` on the blocking pool; `.txt` and `.md` files
/// are read as UTF-8.
/// A PDF that cannot be parsed is stored with empty text. Any other file
/// type is rejected.
pub async fn ingest_local_document(
    path: &Path,
    kind_override: Option<DocumentKind>,
    date: NaiveDate,
    extractor: Arc<dyn TextExtractor>,
    classifier: &ReportClassifier,
    store: &dyn HealthStore,
) -> Result<ClassifiedDocument, Error> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let bytes = tokio::fs::read(path)
        .await
        .map_err(crate::error::DatabaseError::from)?;

    let mut metadata = Map::new();
    metadata.insert("original_name".into(), Value::from(name.clone()));
    metadata.insert("source_path".into(), Value::from(path.display().to_string()));

    let text = match extension.as_str() {
        "pdf" => match tokio::task::spawn_blocking(move || extractor.extract(&bytes)).await {
            Ok(Ok(extracted)) => {
                metadata.insert("pages".into(), Value::from(extracted.page_count));
                extracted.text
            }
            Ok(Err(e)) => {
                warn!(file = %name, "Text extraction failed, storing empty text: {e}");
                String::new()
            }
            Err(e) => {
                warn!(file = %name, "Extraction task failed, storing empty text: {e}");
                String::new()
            }
        },
        "txt" | "md" => String::from_utf8_lossy(&bytes).into_owned(),
        other => {
            return Err(ExtractError::Unsupported(format!("{name}: .{other}")).into());
        }
    };

    let kind = classifier.classify_with_override(kind_override, &name, Some(&text));
    metadata.insert("kind".into(), Value::from(kind.as_str()));

    let doc = ClassifiedDocument::new(kind, date, text, metadata);
    store.append_document(&doc).await?;
    info!(file = %name, kind = %kind, "Local document stored");
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{Extracted, PdfTextExtractor};
    use crate::store::FileStore;

    struct FixedExtractor(&'static str);

    impl TextExtractor for FixedExtractor {
        fn extract(&self, _bytes: &[u8]) -> Result<Extracted, ExtractError> {
            Ok(Extracted {
                text: self.0.to_string(),
                page_count: 2,
            })
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    #[tokio::test]
    async fn pdf_is_classified_by_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.pdf");
        std::fs::write(&path, b"%PDF-1.4").unwrap();
        let store = FileStore::new(dir.path().join("data"));
        let classifier = ReportClassifier::new().unwrap();

        let doc = ingest_local_document(
            &path,
            None,
            day(),
            Arc::new(FixedExtractor("spermogram: motility 40%, sperm count normal")),
            &classifier,
            &store,
        )
        .await
        .unwrap();
        assert_eq!(doc.kind, DocumentKind::SemenAnalysis);
        assert_eq!(doc.metadata["pages"], 2);
        assert_eq!(store.latest_documents().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn override_wins_and_broken_pdf_keeps_empty_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blood_test.pdf");
        std::fs::write(&path, b"not really a pdf").unwrap();
        let store = FileStore::new(dir.path());

        let doc = ingest_local_document(
            &path,
            Some(DocumentKind::ClinicalConclusion),
            day(),
            Arc::new(PdfTextExtractor),
            &ReportClassifier::new().unwrap(),
            &store,
        )
        .await
        .unwrap();
        assert_eq!(doc.kind, DocumentKind::ClinicalConclusion);
        assert!(doc.text.is_empty());
    }

    struct PanickingExtractor;

    impl TextExtractor for PanickingExtractor {
        fn extract(&self, _bytes: &[u8]) -> Result<Extracted, ExtractError> {
            panic!("decoder crashed");
        }
    }

    #[tokio::test]
    async fn crashed_extraction_stores_empty_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blood_panel.pdf");
        std::fs::write(&path, b"%PDF-1.4").unwrap();
        let store = FileStore::new(dir.path().join("data"));

        let doc = ingest_local_document(
            &path,
            None,
            day(),
            Arc::new(PanickingExtractor),
            &ReportClassifier::new().unwrap(),
            &store,
        )
        .await
        .unwrap();
        assert!(doc.text.is_empty());
        assert!(doc.metadata.get("pages").is_none());
        assert_eq!(doc.kind, DocumentKind::BloodPanel);
        assert_eq!(store.latest_documents().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unsupported_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.heic");
        std::fs::write(&path, b"...").unwrap();
        let store = FileStore::new(dir.path());

        let err = ingest_local_document(
            &path,
            None,
            day(),
            Arc::new(PdfTextExtractor),
            &ReportClassifier::new().unwrap(),
            &store,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Extract(ExtractError::Unsupported(_))));
    }
}
