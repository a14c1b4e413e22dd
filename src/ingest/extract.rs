//! Text extraction from downloaded documents.

use crate::error::ExtractError;

/// Extracted text plus page count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extracted {
    pub text: String,
    pub page_count: usize,
}

/// Pulls plain text out of raw document bytes.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8]) -> Result<Extracted, ExtractError>;
}

/// PDF text extractor using the pdf-extract crate.
///
/// Handles digital PDFs with embedded text layers; scanned PDFs come back
/// with empty page text.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfTextExtractor;

impl TextExtractor for PdfTextExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<Extracted, ExtractError> {
        if !bytes.starts_with(b"%PDF") {
            return Err(ExtractError::PdfParsing("missing %PDF header".into()));
        }
        let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
            .map_err(|e| ExtractError::PdfParsing(e.to_string()))?;
        let page_count = pages.len();
        let text = pages
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        Ok(Extracted { text, page_count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_pdf_bytes() {
        let err = PdfTextExtractor.extract(b"hello world").unwrap_err();
        assert!(matches!(err, ExtractError::PdfParsing(_)));
    }
}
