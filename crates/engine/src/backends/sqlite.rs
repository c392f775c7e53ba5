//! SQLite-backed implementation of [`PersistenceStore`].
//!
//! Uses WAL mode for concurrent readers/writers and models the claim and
//! regenerate operations as single atomic `UPDATE ... RETURNING` statements
//! so concurrent workers/clients can't race each other.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{migrate::MigrateDatabase, Row};
use std::str::FromStr;
use uuid::Uuid;

use crate::{
    ChannelReport, GeneratedContent, Job, JobPage, JobStatus, PersistenceStore, RegenerateOutcome,
    SourceKind, Transcript, TranscriptLabel, Validation, RMAX,
};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn open(path: &str) -> anyhow::Result<Self> {
        let db_url = if path.starts_with("sqlite://") {
            path.to_string()
        } else {
            format!("sqlite://{path}")
        };

        if !sqlx::Sqlite::database_exists(&db_url).await.unwrap_or(false) {
            sqlx::Sqlite::create_database(&db_url).await?;
        }

        let options = SqliteConnectOptions::from_str(&db_url)?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .foreign_keys(true)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn row_to_job(row: &sqlx::sqlite::SqliteRow) -> anyhow::Result<Job> {
    let source_kind: String = row.try_get("source_kind")?;
    let status: String = row.try_get("status")?;
    let id: String = row.try_get("id")?;
    Ok(Job {
        id: Uuid::parse_str(&id)?,
        source_kind: SourceKind::from_str(&source_kind)?,
        url: row.try_get("url")?,
        file_path: row.try_get("file_path")?,
        title: row.try_get("title")?,
        status: JobStatus::from_str(&status)?,
        progress_stage: row.try_get("progress_stage")?,
        progress_percent: row.try_get::<i64, _>("progress_percent")? as u8,
        regen_count: row.try_get::<i64, _>("regen_count")? as u32,
        error_code: row.try_get("error_code")?,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_transcript(row: &sqlx::sqlite::SqliteRow) -> anyhow::Result<Transcript> {
    let label: String = row.try_get("label")?;
    let meta_text: String = row.try_get("meta")?;
    let job_id: String = row.try_get("job_id")?;
    Ok(Transcript {
        job_id: Uuid::parse_str(&job_id)?,
        label: TranscriptLabel::from_str(&label)?,
        raw_text: row.try_get("raw_text")?,
        meta: serde_json::from_str(&meta_text)?,
    })
}

/// The progress-stage label displayed for a status; a terminal success job
/// reports `{stage:"done", percent:100}`.
fn stage_label(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Queued => "queued",
        JobStatus::Extracting => "extracting",
        JobStatus::Transcribing => "transcribing",
        JobStatus::Chunking => "chunking",
        JobStatus::Mapping => "mapping",
        JobStatus::Reducing => "reducing",
        JobStatus::Validating => "validating",
        JobStatus::Approved | JobStatus::NeedsReview => "done",
        JobStatus::Failed => "failed",
    }
}

#[async_trait]
impl PersistenceStore for SqliteStore {
    async fn create_job(
        &self,
        id: Uuid,
        source_kind: SourceKind,
        url: Option<String>,
        file_path: Option<String>,
    ) -> anyhow::Result<Uuid> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO jobs (id, source_kind, url, file_path, status, progress_stage, \
             progress_percent, regen_count, created_at, updated_at) \
             VALUES (?, ?, ?, ?, 'queued', 'queued', 0, 0, ?, ?)",
        )
        .bind(id.to_string())
        .bind(source_kind.to_string())
        .bind(url)
        .bind(file_path)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    async fn get_job(&self, job_id: Uuid) -> anyhow::Result<Option<Job>> {
        let row = sqlx::query("SELECT * FROM jobs WHERE id = ?")
            .bind(job_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_job).transpose()
    }

    async fn list_jobs(&self, limit: i64, offset: i64) -> anyhow::Result<JobPage> {
        let rows = sqlx::query("SELECT * FROM jobs ORDER BY created_at DESC LIMIT ? OFFSET ?")
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        let items = rows.iter().map(row_to_job).collect::<anyhow::Result<Vec<_>>>()?;
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM jobs")
            .fetch_one(&self.pool)
            .await?;
        Ok(JobPage { items, total })
    }

    async fn delete_job(&self, job_id: Uuid) -> anyhow::Result<()> {
        // Ownership cascade: transcripts/generated_content/validations
        // reference jobs.id ON DELETE CASCADE.
        sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(job_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn claim_next_queued(&self) -> anyhow::Result<Option<Job>> {
        let now = Utc::now();
        let row = sqlx::query(
            "UPDATE jobs SET status = 'extracting', progress_stage = 'extracting', \
             progress_percent = 0, updated_at = ? \
             WHERE id = ( \
                 SELECT id FROM jobs WHERE status = 'queued' ORDER BY created_at ASC LIMIT 1 \
             ) \
             RETURNING *",
        )
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_job).transpose()
    }

    async fn set_progress(
        &self,
        job_id: Uuid,
        status: JobStatus,
        percent: u8,
        title: Option<&str>,
    ) -> anyhow::Result<()> {
        let now = Utc::now();
        let stage = stage_label(status);
        if let Some(title) = title {
            sqlx::query(
                "UPDATE jobs SET status = ?, progress_stage = ?, progress_percent = ?, \
                 title = ?, updated_at = ? WHERE id = ?",
            )
            .bind(status.to_string())
            .bind(stage)
            .bind(percent as i64)
            .bind(title)
            .bind(now)
            .bind(job_id.to_string())
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query(
                "UPDATE jobs SET status = ?, progress_stage = ?, progress_percent = ?, \
                 updated_at = ? WHERE id = ?",
            )
            .bind(status.to_string())
            .bind(stage)
            .bind(percent as i64)
            .bind(now)
            .bind(job_id.to_string())
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn set_failed(&self, job_id: Uuid, error_code: &str, error_message: &str) -> anyhow::Result<()> {
        let now = Utc::now();
        sqlx::query(
            "UPDATE jobs SET status = 'failed', progress_stage = 'failed', progress_percent = 0, \
             error_code = ?, error_message = ?, updated_at = ? WHERE id = ?",
        )
        .bind(error_code)
        .bind(error_message)
        .bind(now)
        .bind(job_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_regen_count(&self, job_id: Uuid, regen_count: u32) -> anyhow::Result<()> {
        sqlx::query("UPDATE jobs SET regen_count = ?, updated_at = ? WHERE id = ?")
            .bind(regen_count as i64)
            .bind(Utc::now())
            .bind(job_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_transcript(&self, transcript: &Transcript) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO transcripts (job_id, label, raw_text, meta, created_at) VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT (job_id) DO UPDATE SET label = excluded.label, raw_text = excluded.raw_text, \
             meta = excluded.meta",
        )
        .bind(transcript.job_id.to_string())
        .bind(transcript.label.to_string())
        .bind(&transcript.raw_text)
        .bind(serde_json::to_string(&transcript.meta)?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_transcript(&self, job_id: Uuid) -> anyhow::Result<Option<Transcript>> {
        let row = sqlx::query("SELECT * FROM transcripts WHERE job_id = ?")
            .bind(job_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_transcript).transpose()
    }

    async fn find_cached_transcript_by_url(
        &self,
        url: &str,
        exclude_job_id: Uuid,
    ) -> anyhow::Result<Option<Transcript>> {
        let row = sqlx::query(
            "SELECT t.* FROM transcripts t JOIN jobs j ON j.id = t.job_id \
             WHERE j.url = ? AND t.job_id != ? \
             ORDER BY t.created_at DESC LIMIT 1",
        )
        .bind(url)
        .bind(exclude_job_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(row_to_transcript).transpose()
    }

    async fn put_generated_content(&self, job_id: Uuid, content: &GeneratedContent) -> anyhow::Result<()> {
        let payload = serde_json::to_string(&content.payload)?;
        sqlx::query(
            "INSERT INTO generated_content (job_id, payload, updated_at) VALUES (?, ?, ?) \
             ON CONFLICT (job_id) DO UPDATE SET payload = excluded.payload, updated_at = excluded.updated_at",
        )
        .bind(job_id.to_string())
        .bind(payload)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_generated_content(&self, job_id: Uuid) -> anyhow::Result<Option<GeneratedContent>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT payload FROM generated_content WHERE job_id = ?")
                .bind(job_id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        row.map(|(payload,)| -> anyhow::Result<GeneratedContent> {
            Ok(GeneratedContent {
                payload: serde_json::from_str(&payload)?,
            })
        })
        .transpose()
    }

    async fn append_validation(&self, validation: &Validation) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO validations (job_id, overall_verdict, report, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(validation.job_id.to_string())
        .bind(validation.overall_verdict.to_string())
        .bind(serde_json::to_string(&validation.report)?)
        .bind(validation.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_latest_validation(&self, job_id: Uuid) -> anyhow::Result<Option<Validation>> {
        let row: Option<(String, String, chrono::DateTime<Utc>)> = sqlx::query_as(
            "SELECT overall_verdict, report, created_at FROM validations \
             WHERE job_id = ? ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(job_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(verdict, report, created_at)| -> anyhow::Result<Validation> {
            let overall_verdict = if verdict == "approved" {
                crate::Verdict::Approved
            } else {
                crate::Verdict::NeedsRevision
            };
            Ok(Validation {
                job_id,
                overall_verdict,
                report: serde_json::from_str::<std::collections::HashMap<String, ChannelReport>>(&report)?,
                created_at,
            })
        })
        .transpose()
    }

    async fn conditional_regenerate(&self, job_id: Uuid) -> anyhow::Result<RegenerateOutcome> {
        let now = Utc::now();
        let updated = sqlx::query(
            "UPDATE jobs SET status = 'reducing', progress_stage = 'reducing', progress_percent = 60, \
             regen_count = regen_count + 1, updated_at = ? \
             WHERE id = ? AND status = 'needs_review' AND regen_count < ? \
             RETURNING id",
        )
        .bind(now)
        .bind(job_id.to_string())
        .bind(RMAX as i64)
        .fetch_optional(&self.pool)
        .await?;

        if updated.is_some() {
            return Ok(RegenerateOutcome::Started);
        }

        match self.get_job(job_id).await? {
            None => Ok(RegenerateOutcome::NotFound),
            Some(job) if job.status != JobStatus::NeedsReview => Ok(RegenerateOutcome::StatusConflict),
            Some(job) if job.regen_count >= RMAX => Ok(RegenerateOutcome::RegenerateLimit),
            Some(_) => Ok(RegenerateOutcome::StatusConflict),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    async fn open_tmp() -> SqliteStore {
        let tmp = NamedTempFile::new().unwrap();
        SqliteStore::open(tmp.path().to_str().unwrap()).await.unwrap()
    }

    #[tokio::test]
    async fn create_and_get_job_round_trips() {
        let store = open_tmp().await;
        let id = store
            .create_job(Uuid::new_v4(), SourceKind::ArticleUrl, Some("https://example.com".into()), None)
            .await
            .unwrap();
        let job = store.get_job(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.url.as_deref(), Some("https://example.com"));
        assert_eq!(job.regen_count, 0);
    }

    #[tokio::test]
    async fn claim_next_queued_is_atomic_and_ordered() {
        let store = open_tmp().await;
        let first = store.create_job(Uuid::new_v4(), SourceKind::ArticleUrl, Some("https://a".into()), None).await.unwrap();
        let claimed = store.claim_next_queued().await.unwrap().unwrap();
        assert_eq!(claimed.id, first);
        assert_eq!(claimed.status, JobStatus::Extracting);
        assert!(store.claim_next_queued().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn conditional_regenerate_enforces_rmax() {
        let store = open_tmp().await;
        let id = store.create_job(Uuid::new_v4(), SourceKind::ArticleUrl, Some("https://a".into()), None).await.unwrap();
        store.set_progress(id, JobStatus::NeedsReview, 100, None).await.unwrap();

        for _ in 0..RMAX {
            let outcome = store.conditional_regenerate(id).await.unwrap();
            assert_eq!(outcome, RegenerateOutcome::Started);
            store.set_progress(id, JobStatus::NeedsReview, 100, None).await.unwrap();
        }

        let outcome = store.conditional_regenerate(id).await.unwrap();
        assert_eq!(outcome, RegenerateOutcome::RegenerateLimit);
    }

    #[tokio::test]
    async fn conditional_regenerate_missing_job_is_not_found() {
        let store = open_tmp().await;
        let outcome = store.conditional_regenerate(Uuid::new_v4()).await.unwrap();
        assert_eq!(outcome, RegenerateOutcome::NotFound);
    }

    #[tokio::test]
    async fn conditional_regenerate_wrong_status_is_conflict() {
        let store = open_tmp().await;
        let id = store.create_job(Uuid::new_v4(), SourceKind::ArticleUrl, Some("https://a".into()), None).await.unwrap();
        let outcome = store.conditional_regenerate(id).await.unwrap();
        assert_eq!(outcome, RegenerateOutcome::StatusConflict);
    }

    #[tokio::test]
    async fn transcript_cache_finds_other_jobs_sharing_url() {
        let store = open_tmp().await;
        let url = "https://video.example/watch?v=abcdefghijk";
        let old_job = store.create_job(Uuid::new_v4(), SourceKind::VideoHost, Some(url.into()), None).await.unwrap();
        store
            .insert_transcript(&Transcript {
                job_id: old_job,
                label: TranscriptLabel::Captions,
                raw_text: "cached text".into(),
                meta: serde_json::json!({"language": "en"}),
            })
            .await
            .unwrap();

        let new_job = store.create_job(Uuid::new_v4(), SourceKind::VideoHost, Some(url.into()), None).await.unwrap();
        let cached = store.find_cached_transcript_by_url(url, new_job).await.unwrap().unwrap();
        assert_eq!(cached.raw_text, "cached text");
    }

    #[tokio::test]
    async fn delete_job_cascades_to_owned_rows() {
        let store = open_tmp().await;
        let id = store.create_job(Uuid::new_v4(), SourceKind::ArticleUrl, Some("https://a".into()), None).await.unwrap();
        store
            .insert_transcript(&Transcript {
                job_id: id,
                label: TranscriptLabel::Web,
                raw_text: "text".into(),
                meta: serde_json::json!({}),
            })
            .await
            .unwrap();
        store.delete_job(id).await.unwrap();
        assert!(store.get_job(id).await.unwrap().is_none());
        assert!(store.get_transcript(id).await.unwrap().is_none());
    }
}
