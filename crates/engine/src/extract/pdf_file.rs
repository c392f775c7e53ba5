//! PDF-file extractor: page-by-page text extraction.

use std::path::Path;

use super::ExtractResult;
use crate::error::EngineError;
use crate::TranscriptLabel;

pub fn extract(path: &Path) -> Result<ExtractResult, EngineError> {
    let pages = pdf_extract::extract_text_by_pages(path)
        .map_err(|e| EngineError::TranscriptUnavailable(format!("pdf extraction failed: {e}")))?;

    let page_count = pages.len();
    let text = pages
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    if text.trim().is_empty() {
        return Err(EngineError::TranscriptUnavailable(
            "pdf contains no extractable text".into(),
        ));
    }

    Ok(ExtractResult::text(
        TranscriptLabel::Pdf,
        text,
        serde_json::json!({ "page_count": page_count }),
    ))
}
