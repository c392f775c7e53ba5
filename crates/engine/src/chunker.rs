//! Transcript chunker.
//!
//! Splits a transcript into overlapping token windows so the map phase can
//! fan out over bounded-size inputs regardless of transcript length.

use crate::tokenizer::Tokenizer;
use crate::{CHUNK_OVERLAP, CHUNK_WINDOW};

/// One chunk of the source transcript, carrying its position so map-phase
/// results can be re-sorted deterministically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
}

/// Split `text` into overlapping windows of `window` tokens, sliding by
/// `window - overlap`. The final partial window is emitted as-is. A
/// zero-token input is emitted as a single chunk equal to the raw text.
pub fn chunk_transcript(
    tokenizer: &Tokenizer,
    text: &str,
    window: usize,
    overlap: usize,
) -> anyhow::Result<Vec<Chunk>> {
    let tokens = tokenizer.encode(text);
    if tokens.is_empty() {
        return Ok(vec![Chunk {
            index: 0,
            text: text.to_string(),
        }]);
    }

    let stride = window.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut index = 0usize;

    while start < tokens.len() {
        let end = (start + window).min(tokens.len());
        let slice = &tokens[start..end];
        chunks.push(Chunk {
            index,
            text: tokenizer.decode(slice)?,
        });
        index += 1;
        if end == tokens.len() {
            break;
        }
        start += stride;
    }

    Ok(chunks)
}

/// Convenience wrapper using the default chunk window/overlap.
pub fn chunk_transcript_default(tokenizer: &Tokenizer, text: &str) -> anyhow::Result<Vec<Chunk>> {
    chunk_transcript(tokenizer, text, CHUNK_WINDOW, CHUNK_OVERLAP)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_yields_single_chunk() {
        let tok = Tokenizer::cl100k().unwrap();
        let chunks = chunk_transcript(&tok, "", 10, 2).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "");
    }

    #[test]
    fn sliding_windows_overlap_and_cover_all_tokens() {
        let tok = Tokenizer::cl100k().unwrap();
        let text = (0..500)
            .map(|n| format!("token{n}"))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunk_transcript(&tok, &text, 50, 10).unwrap();
        assert!(chunks.len() > 1);
        // every chunk after the first should overlap with its predecessor
        for pair in chunks.windows(2) {
            let prev_tail = tok.encode(&pair[0].text);
            let next_head = tok.encode(&pair[1].text);
            assert!(!prev_tail.is_empty() && !next_head.is_empty());
        }
        // the final chunk is a partial window, not padded
        let last = chunks.last().unwrap();
        assert!(tok.count(&last.text) <= 50);
    }

    #[test]
    fn chunks_are_indexed_in_order() {
        let tok = Tokenizer::cl100k().unwrap();
        let text = "word ".repeat(1000);
        let chunks = chunk_transcript_default(&tok, &text).unwrap();
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i);
        }
    }
}
