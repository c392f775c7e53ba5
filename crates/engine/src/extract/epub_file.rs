//! EPUB-file extractor: iterates document items in
//! spine order, strips markup, and records chapter count. Title is taken
//! from embedded metadata when present, else the file's basename.

use std::path::Path;

use epub::doc::EpubDoc;
use scraper::Html;

use super::ExtractResult;
use crate::error::EngineError;
use crate::TranscriptLabel;

fn strip_markup(html: &str) -> String {
    Html::parse_fragment(html)
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn extract(path: &Path) -> Result<ExtractResult, EngineError> {
    let mut doc = EpubDoc::new(path)
        .map_err(|e| EngineError::TranscriptUnavailable(format!("epub open failed: {e}")))?;

    let chapter_count = doc.spine.len();
    let mut chapters = Vec::with_capacity(chapter_count);

    for _ in 0..chapter_count {
        if let Some((content, _mime)) = doc.get_current_str() {
            let text = strip_markup(&content);
            if !text.is_empty() {
                chapters.push(text);
            }
        }
        if !doc.go_next() {
            break;
        }
    }

    let text = chapters.join("\n\n");
    if text.trim().is_empty() {
        return Err(EngineError::TranscriptUnavailable(
            "epub contains no extractable text".into(),
        ));
    }

    let title = doc.mdata("title").unwrap_or_else(|| {
        path.file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "untitled".to_string())
    });

    Ok(ExtractResult::text(
        TranscriptLabel::Epub,
        text,
        serde_json::json!({ "chapter_count": chapter_count, "title": title }),
    ))
}
