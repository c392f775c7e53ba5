//! Error taxonomy and classification.

use thiserror::Error;

/// Errors raised by engine collaborators (extractor, transcriber,
/// generator, validator) and the orchestrator itself.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("video_too_long: duration {duration_secs}s exceeds {max_secs}s limit")]
    VideoTooLong { duration_secs: u64, max_secs: u64 },

    #[error("too_many_chunks: {count} exceeds {max} limit")]
    TooManyChunks { count: usize, max: usize },

    #[error("transcript_unavailable: {0}")]
    TranscriptUnavailable(String),

    #[error("llm error: {0}")]
    LlmError(String),

    #[error("job {0} not found")]
    JobNotFound(uuid::Uuid),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("internal_error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// The five persisted error codes.
pub const CODE_VIDEO_TOO_LONG: &str = "video_too_long";
pub const CODE_TOO_MANY_CHUNKS: &str = "too_many_chunks";
pub const CODE_TRANSCRIPT_UNAVAILABLE: &str = "transcript_unavailable";
pub const CODE_LLM_ERROR: &str = "llm_error";
pub const CODE_INTERNAL_ERROR: &str = "internal_error";

/// Classify an error message into one of the five persisted codes:
/// messages containing the literal tokens `video_too_long`, `too_many_chunks`, or
/// `transcript_unavailable` are promoted to that code; messages matching
/// `/llm|openai/i` become `llm_error`; everything else becomes
/// `internal_error`.
pub fn classify(message: &str) -> &'static str {
    if message.contains(CODE_VIDEO_TOO_LONG) {
        CODE_VIDEO_TOO_LONG
    } else if message.contains(CODE_TOO_MANY_CHUNKS) {
        CODE_TOO_MANY_CHUNKS
    } else if message.contains(CODE_TRANSCRIPT_UNAVAILABLE) {
        CODE_TRANSCRIPT_UNAVAILABLE
    } else if message.to_lowercase().contains("llm") || message.to_lowercase().contains("openai") {
        CODE_LLM_ERROR
    } else {
        CODE_INTERNAL_ERROR
    }
}

impl EngineError {
    /// The code this error classifies to, independent of `classify`'s
    /// string-matching (used when the error is already a typed variant).
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::VideoTooLong { .. } => CODE_VIDEO_TOO_LONG,
            EngineError::TooManyChunks { .. } => CODE_TOO_MANY_CHUNKS,
            EngineError::TranscriptUnavailable(_) => CODE_TRANSCRIPT_UNAVAILABLE,
            EngineError::LlmError(_) => CODE_LLM_ERROR,
            EngineError::Http(_) => CODE_LLM_ERROR,
            _ => classify(&self.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_substrings() {
        assert_eq!(
            classify("video_too_long: duration 9000s exceeds 7200s limit"),
            CODE_VIDEO_TOO_LONG
        );
        assert_eq!(
            classify("too_many_chunks: 130 exceeds 120 limit"),
            CODE_TOO_MANY_CHUNKS
        );
        assert_eq!(
            classify("transcript_unavailable: PDF contains no extractable text"),
            CODE_TRANSCRIPT_UNAVAILABLE
        );
    }

    #[test]
    fn classifies_llm_case_insensitively() {
        assert_eq!(classify("OpenAI request timed out"), CODE_LLM_ERROR);
        assert_eq!(classify("LLM adapter raised"), CODE_LLM_ERROR);
    }

    #[test]
    fn falls_back_to_internal_error() {
        assert_eq!(classify("disk full"), CODE_INTERNAL_ERROR);
    }

    #[test]
    fn typed_variant_codes_match_classifier() {
        let err = EngineError::VideoTooLong {
            duration_secs: 9000,
            max_secs: 7200,
        };
        assert_eq!(err.code(), CODE_VIDEO_TOO_LONG);
    }
}
