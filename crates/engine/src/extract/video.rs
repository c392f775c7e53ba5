//! Video-host extractor.
//!
//! Parses an 11-character video identifier from the URL, prefers prepared
//! captions (Russian, then English, then any available track), and falls
//! back to downloading audio for transcription when no captions exist.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

use super::ExtractResult;
use crate::error::EngineError;
use crate::TranscriptLabel;

/// The external video-host integration (caption retrieval, audio download).
/// A true external collaborator — its concrete implementation (a
/// `yt-dlp`-style gateway or hosted API client) is not specified here.
#[async_trait]
pub trait VideoHostGateway: Send + Sync {
    /// Fetch prepared captions for `video_id` in `language` (e.g. `"ru"`,
    /// `"en"`), or any available track when `language` is `None`. Returns
    /// `(text, language_tag)` on success.
    async fn fetch_captions(
        &self,
        video_id: &str,
        language: Option<&str>,
    ) -> anyhow::Result<Option<(String, String)>>;

    /// Probe the source media's duration in seconds without downloading it.
    async fn probe_duration(&self, video_id: &str) -> anyhow::Result<u64>;

    /// Download the audio track to `dest_dir`, returning its local path.
    async fn download_audio(&self, video_id: &str, dest_dir: &Path) -> anyhow::Result<PathBuf>;
}

static VIDEO_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:v=|youtu\.be/)([\w-]{11})").expect("valid regex"));

/// Parse the 11-character video identifier out of a video-host URL.
pub fn parse_video_id(url: &str) -> Option<String> {
    VIDEO_ID_RE
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

pub async fn extract(
    gateway: &dyn VideoHostGateway,
    url: &str,
    work_dir: &Path,
    duration_cap_secs: u64,
) -> Result<ExtractResult, EngineError> {
    let video_id = parse_video_id(url)
        .ok_or_else(|| EngineError::TranscriptUnavailable(format!("no video id in url: {url}")))?;

    for lang in [Some("ru"), Some("en"), None] {
        if let Some((text, language)) = gateway
            .fetch_captions(&video_id, lang)
            .await
            .map_err(|e| EngineError::Internal(format!("caption fetch failed: {e}")))?
        {
            if text.trim().is_empty() {
                continue;
            }
            return Ok(ExtractResult {
                label: TranscriptLabel::Captions,
                text,
                meta: serde_json::json!({ "language": language }),
                needs_transcription: false,
                audio_path: None,
            });
        }
    }

    let duration_secs = gateway
        .probe_duration(&video_id)
        .await
        .map_err(|e| EngineError::Internal(format!("duration probe failed: {e}")))?;
    if duration_secs > duration_cap_secs {
        return Err(EngineError::VideoTooLong {
            duration_secs,
            max_secs: duration_cap_secs,
        });
    }

    let audio_path = gateway
        .download_audio(&video_id, work_dir)
        .await
        .map_err(|e| EngineError::TranscriptUnavailable(format!("audio download failed: {e}")))?;

    Ok(ExtractResult {
        label: TranscriptLabel::Whisper,
        text: String::new(),
        meta: serde_json::json!({ "video_id": video_id, "duration_secs": duration_secs }),
        needs_transcription: true,
        audio_path: Some(audio_path),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_watch_url() {
        assert_eq!(
            parse_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn parses_short_url() {
        assert_eq!(
            parse_video_id("https://youtu.be/dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
    }

    #[test]
    fn returns_none_for_non_video_url() {
        assert_eq!(parse_video_id("https://example.com/article"), None);
    }
}
