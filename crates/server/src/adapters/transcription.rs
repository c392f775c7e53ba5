//! Concrete `AudioTranscriptionClient` and `MediaProbe` implementations.
//! `WhisperHttpClient` follows the same bearer/multipart shape as
//! `pipeline_engine::llm::RemoteLlmClient`; `FfmpegMediaProbe` shells out
//! to `ffprobe`/`ffmpeg` to probe duration and split segments.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use pipeline_engine::transcribe::{AudioTranscriptionClient, MediaProbe};
use serde::Deserialize;
use tokio::process::Command;

/// A hosted, OpenAI-Whisper-shaped transcription endpoint.
pub struct WhisperHttpClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl WhisperHttpClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key,
            model: model.into(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[async_trait]
impl AudioTranscriptionClient for WhisperHttpClient {
    async fn transcribe(&self, audio_path: &Path) -> anyhow::Result<String> {
        let bytes = tokio::fs::read(audio_path).await?;
        let filename = audio_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio.mp3".to_string());

        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename);
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone());

        let url = format!("{}/audio/transcriptions", self.base_url.trim_end_matches('/'));
        let mut req = self.http.post(&url).multipart(form);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("transcription request returned {status}: {body}");
        }

        let body: TranscriptionResponse = resp.json().await?;
        Ok(body.text)
    }
}

pub struct FfmpegMediaProbe {
    ffprobe_binary: String,
    ffmpeg_binary: String,
}

impl FfmpegMediaProbe {
    pub fn new(ffprobe_binary: impl Into<String>, ffmpeg_binary: impl Into<String>) -> Self {
        Self {
            ffprobe_binary: ffprobe_binary.into(),
            ffmpeg_binary: ffmpeg_binary.into(),
        }
    }
}

#[async_trait]
impl MediaProbe for FfmpegMediaProbe {
    async fn duration_secs(&self, path: &Path) -> anyhow::Result<f64> {
        let output = Command::new(&self.ffprobe_binary)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .output()
            .await?;

        if !output.status.success() {
            anyhow::bail!(
                "ffprobe exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            );
        }

        let text = String::from_utf8_lossy(&output.stdout);
        text.trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("failed to parse ffprobe duration `{}`: {e}", text.trim()))
    }

    async fn split_into_segments(
        &self,
        path: &Path,
        chunk_seconds: u64,
        dest_dir: &Path,
    ) -> anyhow::Result<Vec<PathBuf>> {
        // `dest_dir` is the job's working directory and may already hold the
        // downloaded source audio (e.g. `audio.mp3`); segments go in their
        // own subdirectory so a `read_dir` sweep for `*.mp3` can't pick the
        // source file back up as a spurious extra segment.
        let segment_dir = dest_dir.join("segments");
        tokio::fs::create_dir_all(&segment_dir).await?;
        let pattern = segment_dir.join("segment_%04d.mp3");

        let output = Command::new(&self.ffmpeg_binary)
            .args(["-y", "-i"])
            .arg(path)
            .args([
                "-f",
                "segment",
                "-segment_time",
                &chunk_seconds.to_string(),
                "-c",
                "copy",
            ])
            .arg(&pattern)
            .output()
            .await?;

        if !output.status.success() {
            anyhow::bail!(
                "ffmpeg segmentation exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            );
        }

        let mut segments = Vec::new();
        let mut entries = tokio::fs::read_dir(&segment_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let p = entry.path();
            if p.extension().and_then(|e| e.to_str()) == Some("mp3") {
                segments.push(p);
            }
        }
        segments.sort();
        Ok(segments)
    }
}
