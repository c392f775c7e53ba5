//! `yt-dlp`-backed `VideoHostGateway` implementation: shells out and
//! parses JSON output, using `tokio::process::Command` since every call
//! site here is async.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pipeline_engine::extract::VideoHostGateway;
use serde::Deserialize;
use tokio::process::Command;

pub struct YtDlpGateway {
    binary: String,
}

impl YtDlpGateway {
    pub fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }

    fn video_url(video_id: &str) -> String {
        format!("https://www.youtube.com/watch?v={video_id}")
    }

    async fn dump_json(&self, video_id: &str) -> anyhow::Result<YtDlpInfo> {
        let output = Command::new(&self.binary)
            .args(["--dump-json", "--no-playlist", "--skip-download"])
            .arg(Self::video_url(video_id))
            .output()
            .await?;

        if !output.status.success() {
            anyhow::bail!(
                "yt-dlp exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            );
        }

        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    duration: Option<f64>,
    #[serde(default)]
    subtitles: std::collections::HashMap<String, Vec<YtDlpSubtitleTrack>>,
    #[serde(default)]
    automatic_captions: std::collections::HashMap<String, Vec<YtDlpSubtitleTrack>>,
}

#[derive(Debug, Deserialize)]
struct YtDlpSubtitleTrack {
    url: String,
}

#[async_trait]
impl VideoHostGateway for YtDlpGateway {
    async fn fetch_captions(
        &self,
        video_id: &str,
        language: Option<&str>,
    ) -> anyhow::Result<Option<(String, String)>> {
        let info = self.dump_json(video_id).await?;

        let pick = |tracks: &std::collections::HashMap<String, Vec<YtDlpSubtitleTrack>>,
                     lang: Option<&str>| {
            if let Some(lang) = lang {
                tracks.get(lang).and_then(|t| t.first()).map(|t| (lang.to_string(), t.url.clone()))
            } else {
                tracks.iter().next().and_then(|(lang, t)| {
                    t.first().map(|t| (lang.clone(), t.url.clone()))
                })
            }
        };

        let Some((lang, url)) = pick(&info.subtitles, language).or_else(|| pick(&info.automatic_captions, language))
        else {
            return Ok(None);
        };

        let body = reqwest::get(&url).await?.text().await?;
        Ok(Some((strip_vtt(&body), lang)))
    }

    async fn probe_duration(&self, video_id: &str) -> anyhow::Result<u64> {
        let info = self.dump_json(video_id).await?;
        Ok(info.duration.unwrap_or(0.0).round() as u64)
    }

    async fn download_audio(&self, video_id: &str, dest_dir: &Path) -> anyhow::Result<PathBuf> {
        let template = dest_dir.join("audio.%(ext)s");
        let output = Command::new(&self.binary)
            .args(["-x", "--audio-format", "mp3", "--no-playlist", "-o"])
            .arg(&template)
            .arg(Self::video_url(video_id))
            .output()
            .await?;

        if !output.status.success() {
            anyhow::bail!(
                "yt-dlp audio download exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            );
        }

        let mut entries = tokio::fs::read_dir(dest_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("mp3") {
                return Ok(path);
            }
        }
        anyhow::bail!("yt-dlp reported success but produced no audio file in {}", dest_dir.display())
    }
}

/// Strip WebVTT cue markup down to plain spoken text: drop the header,
/// cue-timing lines, and numeric cue identifiers, keeping only text lines.
fn strip_vtt(body: &str) -> String {
    body.lines()
        .filter(|line| {
            let trimmed = line.trim();
            !trimmed.is_empty()
                && trimmed != "WEBVTT"
                && !trimmed.contains("-->")
                && trimmed.parse::<u64>().is_err()
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_vtt_keeps_only_caption_text() {
        let vtt = "WEBVTT\n\n1\n00:00:00.000 --> 00:00:02.000\nHello there\n\n2\n00:00:02.000 --> 00:00:04.000\ngeneral kenobi\n";
        assert_eq!(strip_vtt(vtt), "Hello there general kenobi");
    }
}
