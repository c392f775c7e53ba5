//! Transcriber: converts an audio file to text, splitting oversized files
//! into size-bounded segments before handing each one to the transcription
//! model.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::EngineError;
use crate::CMAX;

/// The transcription model adapter (e.g. a hosted Whisper endpoint). A true
/// external collaborator, not owned by this crate.
#[async_trait]
pub trait AudioTranscriptionClient: Send + Sync {
    async fn transcribe(&self, audio_path: &Path) -> anyhow::Result<String>;
}

/// Local media inspection/splitting (duration probing, stream-copy
/// segmentation). A thin collaborator boundary over an external tool such
/// as `ffmpeg`/`ffprobe`; the transcriber never re-encodes, so segment
/// boundaries don't introduce decode artifacts.
#[async_trait]
pub trait MediaProbe: Send + Sync {
    async fn duration_secs(&self, path: &Path) -> anyhow::Result<f64>;

    /// Cut `path` into sequential segments of `chunk_seconds` each, writing
    /// them under `dest_dir`, returning their paths in order.
    async fn split_into_segments(
        &self,
        path: &Path,
        chunk_seconds: u64,
        dest_dir: &Path,
    ) -> anyhow::Result<Vec<PathBuf>>;
}

pub struct Transcriber {
    client: std::sync::Arc<dyn AudioTranscriptionClient>,
    probe: std::sync::Arc<dyn MediaProbe>,
    byte_cap: u64,
}

impl Transcriber {
    pub fn new(
        client: std::sync::Arc<dyn AudioTranscriptionClient>,
        probe: std::sync::Arc<dyn MediaProbe>,
        byte_cap: u64,
    ) -> Self {
        Self {
            client,
            probe,
            byte_cap,
        }
    }

    /// Compute the per-segment duration from the byte cap and the file's
    /// measured bytes-per-second, with a 10s floor.
    pub fn chunk_seconds(byte_cap: u64, file_bytes: u64, duration_secs: f64) -> u64 {
        if duration_secs <= 0.0 || file_bytes == 0 {
            return 10;
        }
        let bytes_per_sec = file_bytes as f64 / duration_secs;
        let seconds = (0.95 * byte_cap as f64 / bytes_per_sec).floor();
        (seconds as u64).max(10)
    }

    #[tracing::instrument(skip(self, audio_path, dest_dir), fields(audio_path = %audio_path.display()))]
    pub async fn transcribe(
        &self,
        audio_path: &Path,
        dest_dir: &Path,
    ) -> Result<(String, serde_json::Value), EngineError> {
        let file_bytes = tokio::fs::metadata(audio_path)
            .await
            .map_err(|e| EngineError::Internal(format!("audio stat failed: {e}")))?
            .len();

        if file_bytes <= self.byte_cap {
            let text = self
                .client
                .transcribe(audio_path)
                .await
                .map_err(|e| EngineError::LlmError(format!("transcription failed: {e}")))?;
            return Ok((text, serde_json::json!({})));
        }

        let duration_secs = self
            .probe
            .duration_secs(audio_path)
            .await
            .map_err(|e| EngineError::Internal(format!("duration probe failed: {e}")))?;
        let chunk_secs = Self::chunk_seconds(self.byte_cap, file_bytes, duration_secs);

        let segments = self
            .probe
            .split_into_segments(audio_path, chunk_secs, dest_dir)
            .await
            .map_err(|e| EngineError::Internal(format!("audio segmentation failed: {e}")))?;

        if segments.len() > CMAX {
            return Err(EngineError::TooManyChunks {
                count: segments.len(),
                max: CMAX,
            });
        }

        let mut texts = Vec::with_capacity(segments.len());
        for segment in &segments {
            let text = self
                .client
                .transcribe(segment)
                .await
                .map_err(|e| EngineError::LlmError(format!("segment transcription failed: {e}")))?;
            texts.push(text);
        }

        let joined = texts.join(" ");
        Ok((
            joined,
            serde_json::json!({ "whisper_chunks": segments.len() }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_seconds_respects_floor() {
        // tiny file over a long duration -> formula would floor below 10s
        let secs = Transcriber::chunk_seconds(20 * 1024 * 1024, 1024, 100_000.0);
        assert_eq!(secs, 10);
    }

    #[test]
    fn chunk_seconds_scales_with_bitrate() {
        // 100 MiB file over 3600s => ~28.4 KiB/s; 0.95 * 20MiB / bitrate
        let file_bytes = 100 * 1024 * 1024u64;
        let duration = 3600.0;
        let secs = Transcriber::chunk_seconds(20 * 1024 * 1024, file_bytes, duration);
        assert!(secs > 10);
        // sanity: segment byte estimate should stay under the cap
        let bitrate = file_bytes as f64 / duration;
        assert!((secs as f64) * bitrate <= 20.0 * 1024.0 * 1024.0);
    }
}
