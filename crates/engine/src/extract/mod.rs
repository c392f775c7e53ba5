//! Extractor registry: dispatches a job's source
//! descriptor to one of {video-host, article-url, pdf-file, epub-file} and
//! returns either extracted text plus metadata, or a path to an audio file
//! requiring transcription.

mod article;
mod epub_file;
mod pdf_file;
mod video;

pub use video::VideoHostGateway;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::EngineError;
use crate::{Job, SourceKind, TranscriptLabel};

/// The common extractor outcome.
#[derive(Debug, Clone)]
pub struct ExtractResult {
    pub label: TranscriptLabel,
    pub text: String,
    pub meta: serde_json::Value,
    pub needs_transcription: bool,
    pub audio_path: Option<PathBuf>,
}

impl ExtractResult {
    fn text(label: TranscriptLabel, text: String, meta: serde_json::Value) -> Self {
        Self {
            label,
            text,
            meta,
            needs_transcription: false,
            audio_path: None,
        }
    }
}

/// Dispatches a job's source kind to the matching extractor implementation.
/// The video-host extractor's network access to the external video
/// platform is abstracted behind [`VideoHostGateway`] (a true external
/// collaborator); the other three extractors perform their own HTTP/file
/// I/O directly, since only the video-host integration needs a third-party
/// downloader.
pub struct ExtractorRegistry {
    http: reqwest::Client,
    video_gateway: Arc<dyn VideoHostGateway>,
    media_duration_cap_secs: u64,
}

impl ExtractorRegistry {
    pub fn new(http: reqwest::Client, video_gateway: Arc<dyn VideoHostGateway>, media_duration_cap_secs: u64) -> Self {
        Self {
            http,
            video_gateway,
            media_duration_cap_secs,
        }
    }

    #[tracing::instrument(skip(self, job, work_dir), fields(job_id = %job.id, source_kind = %job.source_kind))]
    pub async fn extract(&self, job: &Job, work_dir: &Path) -> Result<ExtractResult, EngineError> {
        match job.source_kind {
            SourceKind::VideoHost => {
                let url = job
                    .url
                    .as_deref()
                    .ok_or_else(|| EngineError::Internal("video-host job missing url".into()))?;
                video::extract(
                    self.video_gateway.as_ref(),
                    url,
                    work_dir,
                    self.media_duration_cap_secs,
                )
                .await
            }
            SourceKind::ArticleUrl => {
                let url = job
                    .url
                    .as_deref()
                    .ok_or_else(|| EngineError::Internal("article-url job missing url".into()))?;
                article::extract(&self.http, url).await
            }
            SourceKind::PdfFile => {
                let path = job
                    .file_path
                    .as_deref()
                    .ok_or_else(|| EngineError::Internal("pdf-file job missing file_path".into()))?;
                pdf_file::extract(Path::new(path))
            }
            SourceKind::EpubFile => {
                let path = job
                    .file_path
                    .as_deref()
                    .ok_or_else(|| EngineError::Internal("epub-file job missing file_path".into()))?;
                epub_file::extract(Path::new(path))
            }
        }
    }
}
