//! Article-URL extractor.
//!
//! Percent-encodes the URL path and query preserving reserved characters,
//! fetches the page, and extracts its readable body text.

use percent_encoding::{AsciiSet, CONTROLS};
use scraper::{Html, Selector};

use super::ExtractResult;
use crate::error::EngineError;
use crate::TranscriptLabel;

/// Characters that must pass through percent-encoding unescaped (the
/// reserved set).
const RESERVED: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'|')
    .add(b'\\')
    .add(b'^');

/// Percent-encode a URL's path and query, leaving the reserved characters
/// `: / ? # [ ] @ ! $ & ' ( ) * + , ; =` untouched.
pub fn encode_url(url: &str) -> String {
    percent_encoding::utf8_percent_encode(url, RESERVED).to_string()
}

const BLOCK_TAGS: &[&str] = &["p", "h1", "h2", "h3", "h4", "h5", "h6", "li", "blockquote"];

fn extract_body_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut blocks = Vec::new();
    for tag in BLOCK_TAGS {
        let selector = match Selector::parse(tag) {
            Ok(s) => s,
            Err(_) => continue,
        };
        for element in document.select(&selector) {
            let text: String = element.text().collect::<Vec<_>>().join(" ");
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                blocks.push(trimmed.to_string());
            }
        }
    }
    blocks.join("\n\n")
}

pub async fn extract(http: &reqwest::Client, url: &str) -> Result<ExtractResult, EngineError> {
    let encoded = encode_url(url);
    let resp = http
        .get(&encoded)
        .send()
        .await
        .map_err(|e| EngineError::TranscriptUnavailable(format!("article fetch failed: {e}")))?;

    if !resp.status().is_success() {
        return Err(EngineError::TranscriptUnavailable(format!(
            "article fetch returned {}",
            resp.status()
        )));
    }

    let html = resp
        .text()
        .await
        .map_err(|e| EngineError::TranscriptUnavailable(format!("article body read failed: {e}")))?;

    let text = extract_body_text(&html);
    if text.trim().is_empty() {
        return Err(EngineError::TranscriptUnavailable(
            "article extraction yielded no text".into(),
        ));
    }

    Ok(ExtractResult::text(
        TranscriptLabel::Web,
        text,
        serde_json::json!({ "source_url": url }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_reserved_characters() {
        let encoded = encode_url("https://example.com/a/b?x=1&y=2#frag");
        assert_eq!(encoded, "https://example.com/a/b?x=1&y=2#frag");
    }

    #[test]
    fn encodes_spaces_in_path() {
        let encoded = encode_url("https://example.com/a b");
        assert!(encoded.contains("%20"));
    }

    #[test]
    fn extracts_paragraph_and_heading_text() {
        let html = "<html><body><h1>Title</h1><p>First.</p><script>ignored()</script><p>Second.</p></body></html>";
        let text = extract_body_text(html);
        assert_eq!(text, "Title\n\nFirst.\n\nSecond.");
    }

    #[test]
    fn empty_body_yields_empty_text() {
        assert_eq!(extract_body_text("<html><body></body></html>"), "");
    }
}
