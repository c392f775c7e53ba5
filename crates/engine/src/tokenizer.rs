//! Deterministic token counting and (de)coding, backing the chunker's
//! window/overlap arithmetic and the validator's input truncation.

use tiktoken_rs::CoreBPE;

/// Thin wrapper around the `cl100k_base` byte-pair encoding used throughout
/// the chunking and truncation paths.
pub struct Tokenizer {
    bpe: CoreBPE,
}

impl Tokenizer {
    pub fn cl100k() -> anyhow::Result<Self> {
        let bpe = tiktoken_rs::cl100k_base()?;
        Ok(Self { bpe })
    }

    pub fn encode(&self, text: &str) -> Vec<u32> {
        self.bpe.encode_with_special_tokens(text)
    }

    pub fn decode(&self, tokens: &[u32]) -> anyhow::Result<String> {
        self.bpe
            .decode(tokens.to_vec())
            .map_err(|e| anyhow::anyhow!("token decode failed: {e}"))
    }

    pub fn count(&self, text: &str) -> usize {
        self.encode(text).len()
    }

    /// Truncate `text` to the first `max_tokens` tokens, returning the
    /// original text unchanged if it already fits.
    pub fn truncate(&self, text: &str, max_tokens: usize) -> anyhow::Result<(String, bool)> {
        let tokens = self.encode(text);
        if tokens.len() <= max_tokens {
            return Ok((text.to_string(), false));
        }
        let truncated = self.decode(&tokens[..max_tokens])?;
        Ok((truncated, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_and_round_trip() {
        let tok = Tokenizer::cl100k().unwrap();
        let text = "the quick brown fox jumps over the lazy dog";
        let n = tok.count(text);
        assert!(n > 0);
        let encoded = tok.encode(text);
        let decoded = tok.decode(&encoded).unwrap();
        assert_eq!(decoded, text);
    }

    #[test]
    fn truncate_reports_whether_it_cut_anything() {
        let tok = Tokenizer::cl100k().unwrap();
        let (same, truncated) = tok.truncate("short text", 1000).unwrap();
        assert_eq!(same, "short text");
        assert!(!truncated);

        let long_text = "word ".repeat(5000);
        let (cut, truncated) = tok.truncate(&long_text, 10).unwrap();
        assert!(truncated);
        assert!(tok.count(&cut) <= 10);
    }
}
