//! Pipeline Engine: durable state machine for ingest → transcribe → generate → validate
//!
//! # Overview
//!
//! This crate implements the job state machine, durable progress model, and
//! map/reduce generation-and-validation loop that turns a long-form source
//! (a video-host URL, an article URL, or an uploaded PDF/EPUB) into a set of
//! platform-targeted derivative artifacts. It transforms an ephemeral
//! submission into a durable row, enabling crash-visible resumption,
//! atomic job claims, and a bounded, validation-gated autofix pass.
//!
//! # Features
//!
//! - **Idempotent claims**: atomic "queued → claimed" transitions via a
//!   single `UPDATE ... RETURNING` statement.
//! - **Durable progress**: every stage transition is committed before the
//!   next stage begins.
//! - **Map/reduce generation**: bounded fan-out per phase, deterministic
//!   reassembly.
//! - **Validation-gated autofix**: one partial regeneration pass restricted
//!   to channels that failed their first validation.
//!
//! # Example
//!
//! ```no_run
//! use pipeline_engine::{PersistenceStore, SourceKind};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = pipeline_engine::open("pipeline.db").await?;
//!     let job_id = uuid::Uuid::new_v4();
//!     store
//!         .create_job(job_id, SourceKind::ArticleUrl, Some("https://example.com/post".into()), None)
//!         .await?;
//!     let job = store.get_job(job_id).await?.expect("just created");
//!     println!("queued job {} at status {:?}", job.id, job.status);
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

pub mod backends;
pub mod chunker;
pub mod config;
pub mod error;
pub mod extract;
pub mod generator;
pub mod llm;
pub mod orchestrator;
pub mod tokenizer;
pub mod transcribe;
pub mod validator;

pub use backends::sqlite::SqliteStore;
pub use error::EngineError;

/// Upper bound on client-visible and autofix regenerations, combined.
pub const RMAX: u32 = 3;
/// Upper bound on chunk/segment count before a job is failed with `too_many_chunks`.
pub const CMAX: usize = 120;
/// Upper bound on source media duration, in seconds, before `video_too_long`.
pub const DMAX: u64 = 7200;
/// Audio files at or below this size are transcribed in one request.
pub const BMAX: u64 = 20 * 1024 * 1024;
/// Validation input is truncated to this many tokens.
pub const VMAX: usize = 60_000;
/// Map-phase fan-out bound.
pub const WMAP: usize = 8;
/// Reduce-phase fan-out bound.
pub const WRED: usize = 5;
/// Chunker window size, in tokens.
pub const CHUNK_WINDOW: usize = 3000;
/// Chunker overlap, in tokens.
pub const CHUNK_OVERLAP: usize = 200;

/// The kind of source a job was submitted with.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    VideoHost,
    ArticleUrl,
    PdfFile,
    EpubFile,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::VideoHost => write!(f, "video-host"),
            SourceKind::ArticleUrl => write!(f, "article-url"),
            SourceKind::PdfFile => write!(f, "pdf-file"),
            SourceKind::EpubFile => write!(f, "epub-file"),
        }
    }
}

impl std::str::FromStr for SourceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video-host" | "video_host" | "youtube" => Ok(SourceKind::VideoHost),
            "article-url" | "article_url" | "web" => Ok(SourceKind::ArticleUrl),
            "pdf-file" | "pdf_file" | "pdf" => Ok(SourceKind::PdfFile),
            "epub-file" | "epub_file" | "epub" => Ok(SourceKind::EpubFile),
            other => Err(anyhow::anyhow!("invalid source kind: {other}")),
        }
    }
}

/// Job execution status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Extracting,
    Transcribing,
    Chunking,
    Mapping,
    Reducing,
    Validating,
    Approved,
    NeedsReview,
    Failed,
}

impl JobStatus {
    /// Terminal statuses are not advanced by the orchestrator except via an
    /// explicit regeneration.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Approved | JobStatus::NeedsReview | JobStatus::Failed
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Queued => "queued",
            JobStatus::Extracting => "extracting",
            JobStatus::Transcribing => "transcribing",
            JobStatus::Chunking => "chunking",
            JobStatus::Mapping => "mapping",
            JobStatus::Reducing => "reducing",
            JobStatus::Validating => "validating",
            JobStatus::Approved => "approved",
            JobStatus::NeedsReview => "needs_review",
            JobStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for JobStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "extracting" => Ok(JobStatus::Extracting),
            "transcribing" => Ok(JobStatus::Transcribing),
            "chunking" => Ok(JobStatus::Chunking),
            "mapping" => Ok(JobStatus::Mapping),
            "reducing" => Ok(JobStatus::Reducing),
            "validating" => Ok(JobStatus::Validating),
            "approved" => Ok(JobStatus::Approved),
            "needs_review" => Ok(JobStatus::NeedsReview),
            "failed" => Ok(JobStatus::Failed),
            other => Err(anyhow::anyhow!("invalid job status: {other}")),
        }
    }
}

/// Durable stage/percent pair, as surfaced to HTTP clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Progress {
    pub stage: String,
    pub percent: u8,
}

/// The submission record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: Uuid,
    pub source_kind: SourceKind,
    pub url: Option<String>,
    pub file_path: Option<String>,
    pub title: Option<String>,
    pub status: JobStatus,
    pub progress_stage: String,
    pub progress_percent: u8,
    pub regen_count: u32,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Transcript label, recording provenance of the canonical text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptLabel {
    Captions,
    Whisper,
    Pdf,
    Epub,
    Web,
}

impl fmt::Display for TranscriptLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TranscriptLabel::Captions => "captions",
            TranscriptLabel::Whisper => "whisper",
            TranscriptLabel::Pdf => "pdf",
            TranscriptLabel::Epub => "epub",
            TranscriptLabel::Web => "web",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TranscriptLabel {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "captions" => Ok(TranscriptLabel::Captions),
            "whisper" => Ok(TranscriptLabel::Whisper),
            "pdf" => Ok(TranscriptLabel::Pdf),
            "epub" => Ok(TranscriptLabel::Epub),
            "web" => Ok(TranscriptLabel::Web),
            other => Err(anyhow::anyhow!("invalid transcript label: {other}")),
        }
    }
}

/// The canonical textual transcript for a job. At most one
/// per job; created once and never mutated afterward.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transcript {
    pub job_id: Uuid,
    pub label: TranscriptLabel,
    pub raw_text: String,
    pub meta: serde_json::Value,
}

/// Channel payload keys, fixed by the generator's channel catalog.
pub const CHANNEL_KEYS: [&str; 5] = [
    "medium_text",
    "habr_text",
    "linkedin_text",
    "research_article",
    "banana_video_prompt",
];

/// The reserved key under which the concatenated map-phase summaries are
/// stored for diagnostic reuse and as the validation fallback input.
pub const REDUCE_SUMMARY_KEY: &str = "reduce_summary_text";

/// Generated artifacts for a job. Created on first
/// reduce; subsequently mutated in place by partial regenerations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct GeneratedContent {
    /// channel-key -> artifact (string for textual channels, object for
    /// `banana_video_prompt`), plus `reduce_summary_text`.
    pub payload: HashMap<String, serde_json::Value>,
}

impl GeneratedContent {
    pub fn merge(&mut self, other: HashMap<String, serde_json::Value>) {
        self.payload.extend(other);
    }
}

/// One named check result within a platform's validation entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub details: String,
}

/// A single channel's validation entry — either a list of named checks
/// (textual channels) or a single pass/fail verdict (schema-only channels).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ChannelReport {
    Checked { checks: Vec<CheckResult> },
    Schema { passed: bool, details: String },
}

impl ChannelReport {
    /// A channel is failed iff it has `checks` with any `passed=false`, or
    /// lacks `checks` and has `passed=false`.
    pub fn is_failed(&self) -> bool {
        match self {
            ChannelReport::Checked { checks } => checks.iter().any(|c| !c.passed),
            ChannelReport::Schema { passed, .. } => !passed,
        }
    }
}

/// Overall verdict across a validation pass.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approved,
    NeedsRevision,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Approved => write!(f, "approved"),
            Verdict::NeedsRevision => write!(f, "needs_revision"),
        }
    }
}

/// One append-only validation row. The newest row for a
/// job is authoritative for display.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Validation {
    pub job_id: Uuid,
    pub overall_verdict: Verdict,
    pub report: HashMap<String, ChannelReport>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Validation {
    /// Recompute the overall verdict from a report map: approved iff every
    /// entry has no failing check.
    pub fn verdict_of(report: &HashMap<String, ChannelReport>) -> Verdict {
        if report.values().any(|r| r.is_failed()) {
            Verdict::NeedsRevision
        } else {
            Verdict::Approved
        }
    }
}

/// Summary of a job's queue position and listing row, used by `GET /api/sources`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobPage {
    pub items: Vec<Job>,
    pub total: i64,
}

/// Outcome of the regenerate-atomicity conditional update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegenerateOutcome {
    Started,
    NotFound,
    StatusConflict,
    RegenerateLimit,
}

/// Persistence contract consumed by the orchestrator and the HTTP surface.
///
/// Implementations must make `claim_next_queued` and
/// `conditional_regenerate` atomic with respect to concurrent callers —
/// this is the soft lock that prevents two workers from claiming the same
/// job and two HTTP clients from racing to queue two regenerations.
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    /// Insert a new job row in `queued` status under the given `id`.
    /// Exactly one of `url` / `file_path` must be populated (enforced by
    /// the caller per the source kind). The caller supplies the id (rather
    /// than the store generating one) so that uploads can stage a file
    /// under the job's working directory before the row exists.
    async fn create_job(
        &self,
        id: Uuid,
        source_kind: SourceKind,
        url: Option<String>,
        file_path: Option<String>,
    ) -> anyhow::Result<Uuid>;

    async fn get_job(&self, job_id: Uuid) -> anyhow::Result<Option<Job>>;

    async fn list_jobs(&self, limit: i64, offset: i64) -> anyhow::Result<JobPage>;

    async fn delete_job(&self, job_id: Uuid) -> anyhow::Result<()>;

    /// Atomically claim the oldest queued job, transitioning it to
    /// `extracting` with `progress_percent=0`. Returns `None` if no job is
    /// queued.
    async fn claim_next_queued(&self) -> anyhow::Result<Option<Job>>;

    /// Commit a stage transition: status, stage label, percent, and
    /// optionally title. Must be durable before the caller proceeds to the
    /// next stage.
    async fn set_progress(
        &self,
        job_id: Uuid,
        status: JobStatus,
        percent: u8,
        title: Option<&str>,
    ) -> anyhow::Result<()>;

    /// Commit a terminal failure with a classified error code/message, and
    /// reset progress percent to 0.
    async fn set_failed(
        &self,
        job_id: Uuid,
        error_code: &str,
        error_message: &str,
    ) -> anyhow::Result<()>;

    /// Set the job's regen-count directly (used by the fresh-pipeline
    /// autofix gate, which sets it to 1 itself on its one allowed pass).
    async fn set_regen_count(&self, job_id: Uuid, regen_count: u32) -> anyhow::Result<()>;

    /// Insert the job's (unique) transcript row.
    async fn insert_transcript(&self, transcript: &Transcript) -> anyhow::Result<()>;

    async fn get_transcript(&self, job_id: Uuid) -> anyhow::Result<Option<Transcript>>;

    /// Find the most recent transcript belonging to a *different* job whose
    /// source URL matches exactly.
    async fn find_cached_transcript_by_url(
        &self,
        url: &str,
        exclude_job_id: Uuid,
    ) -> anyhow::Result<Option<Transcript>>;

    /// Insert-or-replace the job's generated content row in full.
    async fn put_generated_content(
        &self,
        job_id: Uuid,
        content: &GeneratedContent,
    ) -> anyhow::Result<()>;

    async fn get_generated_content(&self, job_id: Uuid) -> anyhow::Result<Option<GeneratedContent>>;

    /// Append a new validation row.
    async fn append_validation(&self, validation: &Validation) -> anyhow::Result<()>;

    /// The most recently created validation row for a job.
    async fn get_latest_validation(&self, job_id: Uuid) -> anyhow::Result<Option<Validation>>;

    /// The single conditional update backing `POST /api/sources/{id}/regenerate`
    ///: `status='needs_review' AND regen_count<RMAX`
    /// -> `status='reducing', regen_count+=1`.
    async fn conditional_regenerate(&self, job_id: Uuid) -> anyhow::Result<RegenerateOutcome>;
}

/// Open a SQLite-backed persistence store at the given path, running
/// pending migrations.
pub async fn open(path: &str) -> anyhow::Result<SqliteStore> {
    SqliteStore::open(path).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_display_and_parse_round_trip() {
        for status in [
            JobStatus::Queued,
            JobStatus::Extracting,
            JobStatus::Transcribing,
            JobStatus::Chunking,
            JobStatus::Mapping,
            JobStatus::Reducing,
            JobStatus::Validating,
            JobStatus::Approved,
            JobStatus::NeedsReview,
            JobStatus::Failed,
        ] {
            let s = status.to_string();
            let parsed: JobStatus = s.parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn terminal_statuses() {
        assert!(JobStatus::Approved.is_terminal());
        assert!(JobStatus::NeedsReview.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Mapping.is_terminal());
    }

    #[test]
    fn source_kind_parses_http_aliases() {
        assert_eq!(
            "youtube".parse::<SourceKind>().unwrap(),
            SourceKind::VideoHost
        );
        assert_eq!("web".parse::<SourceKind>().unwrap(), SourceKind::ArticleUrl);
    }

    #[test]
    fn channel_report_failed_detection() {
        let checked = ChannelReport::Checked {
            checks: vec![CheckResult {
                name: "hallucination".into(),
                passed: false,
                details: "invented a statistic".into(),
            }],
        };
        assert!(checked.is_failed());

        let schema_ok = ChannelReport::Schema {
            passed: true,
            details: String::new(),
        };
        assert!(!schema_ok.is_failed());
    }

    #[test]
    fn verdict_of_report_requires_all_channels_passing() {
        let mut report = HashMap::new();
        report.insert(
            "medium".to_string(),
            ChannelReport::Schema {
                passed: true,
                details: String::new(),
            },
        );
        assert_eq!(Validation::verdict_of(&report), Verdict::Approved);

        report.insert(
            "habr".to_string(),
            ChannelReport::Schema {
                passed: false,
                details: "tone mismatch".into(),
            },
        );
        assert_eq!(Validation::verdict_of(&report), Verdict::NeedsRevision);
    }
}
