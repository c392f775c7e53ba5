//! Pipeline orchestrator: the state machine tying extraction,
//! transcription, chunking, generation, and validation together, writing
//! durable progress after every stage, performing a one-shot autofix, and
//! supporting explicit client-driven regeneration.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::chunker::{chunk_transcript_default, Chunk};
use crate::error::EngineError;
use crate::extract::ExtractorRegistry;
use crate::generator::{failed_channels, Generator};
use crate::tokenizer::Tokenizer;
use crate::transcribe::Transcriber;
use crate::validator::Validator;
use crate::{
    GeneratedContent, Job, JobStatus, PersistenceStore, SourceKind, Transcript, TranscriptLabel,
    Validation, Verdict, REDUCE_SUMMARY_KEY,
};

pub struct Orchestrator {
    store: Arc<dyn PersistenceStore>,
    extractors: Arc<ExtractorRegistry>,
    transcriber: Arc<Transcriber>,
    tokenizer: Arc<Tokenizer>,
    generator: Arc<Generator>,
    validator: Arc<Validator>,
    working_dir_root: PathBuf,
    chunk_cap: usize,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn PersistenceStore>,
        extractors: Arc<ExtractorRegistry>,
        transcriber: Arc<Transcriber>,
        tokenizer: Arc<Tokenizer>,
        generator: Arc<Generator>,
        validator: Arc<Validator>,
        working_dir_root: PathBuf,
        chunk_cap: usize,
    ) -> Self {
        Self {
            store,
            extractors,
            transcriber,
            tokenizer,
            generator,
            validator,
            working_dir_root,
            chunk_cap,
        }
    }

    fn work_dir(&self, job_id: Uuid) -> PathBuf {
        self.working_dir_root.join(job_id.to_string())
    }

    /// Drive a freshly-queued job from `extracting` through a terminal
    /// state. Never propagates an error — failures are written to the job
    /// row instead. The job's working directory is always removed on exit.
    #[tracing::instrument(skip(self), fields(job_id = %job_id))]
    pub async fn run_fresh_pipeline(&self, job_id: Uuid) {
        let work_dir = self.work_dir(job_id);
        if let Err(err) = self.run_fresh_inner(job_id, &work_dir).await {
            self.fail_job(job_id, &err).await;
        }
        if let Err(e) = tokio::fs::remove_dir_all(&work_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(job_id = %job_id, error = %e, "failed to remove job working directory");
            }
        }
    }

    /// Drive a client-requested regeneration. Preconditions (job exists,
    /// status in {needs-review, reducing}) are checked internally; failing
    /// them is a silent no-op.
    #[tracing::instrument(skip(self), fields(job_id = %job_id))]
    pub async fn run_regeneration(&self, job_id: Uuid) {
        let work_dir = self.work_dir(job_id);
        if let Err(err) = self.run_regeneration_inner(job_id, &work_dir).await {
            self.fail_job(job_id, &err).await;
        }
        if let Err(e) = tokio::fs::remove_dir_all(&work_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(job_id = %job_id, error = %e, "failed to remove job working directory");
            }
        }
    }

    async fn fail_job(&self, job_id: Uuid, err: &EngineError) {
        let message = err.to_string();
        let code = err.code();
        tracing::error!(job_id = %job_id, code, %message, "job failed");
        if let Err(store_err) = self.store.set_failed(job_id, code, &message).await {
            tracing::error!(job_id = %job_id, error = %store_err, "failed to persist failure");
        }
    }

    async fn run_fresh_inner(&self, job_id: Uuid, work_dir: &std::path::Path) -> Result<(), EngineError> {
        let job = match self.store.get_job(job_id).await? {
            Some(job) => job,
            None => {
                tracing::warn!(job_id = %job_id, "job not found, nothing to run");
                return Ok(());
            }
        };

        tokio::fs::create_dir_all(work_dir).await?;

        // --- extracting ---
        self.store.set_progress(job_id, JobStatus::Extracting, 0, None).await?;

        let cached = if matches!(job.source_kind, SourceKind::VideoHost) {
            match &job.url {
                Some(url) => self.store.find_cached_transcript_by_url(url, job_id).await?,
                None => None,
            }
        } else {
            None
        };

        let (label, raw_text, mut meta, audio_path) = match cached {
            Some(transcript) => (transcript.label, transcript.raw_text, transcript.meta, None),
            None => {
                let extracted = self.extractors.extract(&job, work_dir).await?;
                if extracted.needs_transcription {
                    (extracted.label, String::new(), extracted.meta, extracted.audio_path)
                } else {
                    (extracted.label, extracted.text, extracted.meta, None)
                }
            }
        };

        let title = meta
            .get("title")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .or_else(|| {
                job.file_path
                    .as_deref()
                    .and_then(|p| std::path::Path::new(p).file_name())
                    .map(|s| s.to_string_lossy().to_string())
            })
            .or_else(|| job.url.clone());

        self.store
            .set_progress(job_id, JobStatus::Extracting, 10, title.as_deref())
            .await?;

        // --- transcribing ---
        self.store.set_progress(job_id, JobStatus::Transcribing, 10, None).await?;

        let (final_text, final_label) = if let Some(audio_path) = audio_path {
            let (text, whisper_meta) = self.transcriber.transcribe(&audio_path, work_dir).await?;
            if let serde_json::Value::Object(extra) = whisper_meta {
                if let serde_json::Value::Object(ref mut map) = meta {
                    map.extend(extra);
                } else {
                    meta = serde_json::Value::Object(extra);
                }
            }
            (text, TranscriptLabel::Whisper)
        } else {
            (raw_text, label)
        };

        if final_text.trim().is_empty() {
            return Err(EngineError::TranscriptUnavailable(
                "extraction/transcription produced no text".into(),
            ));
        }

        let transcript = Transcript {
            job_id,
            label: final_label,
            raw_text: final_text.clone(),
            meta,
        };
        self.store.insert_transcript(&transcript).await?;
        self.store.set_progress(job_id, JobStatus::Transcribing, 30, None).await?;

        // --- chunking ---
        self.store.set_progress(job_id, JobStatus::Chunking, 30, None).await?;
        let chunks = self.chunk(&final_text)?;
        self.store.set_progress(job_id, JobStatus::Chunking, 35, None).await?;

        // --- mapping ---
        self.store.set_progress(job_id, JobStatus::Mapping, 35, None).await?;
        let summaries = self.generator.map_chunks(&chunks).await?;
        self.store.set_progress(job_id, JobStatus::Mapping, 60, None).await?;

        // --- reducing ---
        self.store.set_progress(job_id, JobStatus::Reducing, 60, None).await?;
        let payload = self.generator.reduce(&summaries, None, None, None).await?;
        let mut content = GeneratedContent { payload };
        self.store.put_generated_content(job_id, &content).await?;
        self.store.set_progress(job_id, JobStatus::Reducing, 85, None).await?;

        // --- validating ---
        self.store.set_progress(job_id, JobStatus::Validating, 85, None).await?;
        let source_for_validation = validation_source(&content, &final_text);
        let report = self
            .validator
            .validate(&content.payload, &source_for_validation, None)
            .await?;
        let mut verdict = Validation::verdict_of(&report);
        self.store
            .append_validation(&Validation {
                job_id,
                overall_verdict: verdict,
                report: report.clone(),
                created_at: chrono::Utc::now(),
            })
            .await?;

        // --- autofix gate (exactly once) ---
        if verdict == Verdict::NeedsRevision && job.regen_count == 0 {
            let failed = failed_channels(&report);
            if !failed.is_empty() {
                self.store.set_regen_count(job_id, 1).await?;
                self.store.set_progress(job_id, JobStatus::Reducing, 60, None).await?;

                let revised_payload = self
                    .generator
                    .reduce(&summaries, Some(&report), Some(&content.payload), Some(&failed))
                    .await?;
                content.merge(revised_payload);
                self.store.put_generated_content(job_id, &content).await?;

                self.store.set_progress(job_id, JobStatus::Validating, 85, None).await?;
                let revalidation_source = validation_source(&content, &final_text);
                let new_report = self
                    .validator
                    .validate(&content.payload, &revalidation_source, Some(&failed))
                    .await?;
                let merged_report = Validator::merge_reports(report, new_report);
                verdict = Validation::verdict_of(&merged_report);
                self.store
                    .append_validation(&Validation {
                        job_id,
                        overall_verdict: verdict,
                        report: merged_report,
                        created_at: chrono::Utc::now(),
                    })
                    .await?;
            }
        }

        // --- terminal transition ---
        let terminal = match verdict {
            Verdict::Approved => JobStatus::Approved,
            Verdict::NeedsRevision => JobStatus::NeedsReview,
        };
        self.store.set_progress(job_id, terminal, 100, None).await?;
        Ok(())
    }

    async fn run_regeneration_inner(&self, job_id: Uuid, work_dir: &std::path::Path) -> Result<(), EngineError> {
        let job = match self.store.get_job(job_id).await? {
            Some(job) => job,
            None => {
                tracing::warn!(job_id = %job_id, "job not found, nothing to regenerate");
                return Ok(());
            }
        };
        if !matches!(job.status, JobStatus::NeedsReview | JobStatus::Reducing) {
            tracing::warn!(job_id = %job_id, status = %job.status, "regeneration preconditions not met");
            return Ok(());
        }

        let latest = match self.store.get_latest_validation(job_id).await? {
            Some(v) => v,
            None => return Ok(()),
        };
        let failed = failed_channels(&latest.report);
        if failed.is_empty() {
            return Ok(());
        }

        let transcript = self
            .store
            .get_transcript(job_id)
            .await?
            .ok_or_else(|| EngineError::TranscriptUnavailable("no transcript to regenerate from".into()))?;
        let mut content = self.store.get_generated_content(job_id).await?.unwrap_or_default();
        let previous_texts = content.payload.clone();

        tokio::fs::create_dir_all(work_dir).await?;

        self.store.set_progress(job_id, JobStatus::Chunking, 30, None).await?;
        let chunks = self.chunk(&transcript.raw_text)?;
        self.store.set_progress(job_id, JobStatus::Chunking, 35, None).await?;

        self.store.set_progress(job_id, JobStatus::Mapping, 35, None).await?;
        let summaries = self.generator.map_chunks(&chunks).await?;
        self.store.set_progress(job_id, JobStatus::Mapping, 60, None).await?;

        self.store.set_progress(job_id, JobStatus::Reducing, 60, None).await?;
        let revised_payload = self
            .generator
            .reduce(&summaries, Some(&latest.report), Some(&previous_texts), Some(&failed))
            .await?;
        content.merge(revised_payload);
        self.store.put_generated_content(job_id, &content).await?;
        self.store.set_progress(job_id, JobStatus::Reducing, 85, None).await?;

        self.store.set_progress(job_id, JobStatus::Validating, 85, None).await?;
        let source_for_validation = validation_source(&content, &transcript.raw_text);
        let new_report = self
            .validator
            .validate(&content.payload, &source_for_validation, Some(&failed))
            .await?;
        let merged_report = Validator::merge_reports(latest.report, new_report);
        let verdict = Validation::verdict_of(&merged_report);
        self.store
            .append_validation(&Validation {
                job_id,
                overall_verdict: verdict,
                report: merged_report,
                created_at: chrono::Utc::now(),
            })
            .await?;

        let terminal = match verdict {
            Verdict::Approved => JobStatus::Approved,
            Verdict::NeedsRevision => JobStatus::NeedsReview,
        };
        self.store.set_progress(job_id, terminal, 100, None).await?;
        Ok(())
    }

    fn chunk(&self, text: &str) -> Result<Vec<Chunk>, EngineError> {
        let chunks = chunk_transcript_default(&self.tokenizer, text)
            .map_err(|e| EngineError::Internal(format!("chunking failed: {e}")))?;
        if chunks.len() > self.chunk_cap {
            return Err(EngineError::TooManyChunks {
                count: chunks.len(),
                max: self.chunk_cap,
            });
        }
        Ok(chunks)
    }
}

/// The validator's input text: the reduce-phase summary concatenation, or
/// the raw transcript when that's empty.
fn validation_source(content: &GeneratedContent, raw_transcript: &str) -> String {
    match content.payload.get(REDUCE_SUMMARY_KEY).and_then(|v| v.as_str()) {
        Some(text) if !text.trim().is_empty() => text.to_string(),
        _ => raw_transcript.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_source_prefers_reduce_summary() {
        let mut payload = HashMap::new();
        payload.insert(
            REDUCE_SUMMARY_KEY.to_string(),
            serde_json::Value::String("summary text".into()),
        );
        let content = GeneratedContent { payload };
        assert_eq!(validation_source(&content, "raw"), "summary text");
    }

    #[test]
    fn validation_source_falls_back_to_raw_transcript() {
        let content = GeneratedContent::default();
        assert_eq!(validation_source(&content, "raw"), "raw");
    }
}
