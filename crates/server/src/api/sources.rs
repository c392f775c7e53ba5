//! HTTP surface: handlers for `/api/sources` and `/api/health`.
//!
//! The GET response attaches `content_payload` only for `approved` jobs
//! and `validation_report` only for `needs_review` jobs, keeping a client
//! from ever seeing generated content that hasn't cleared validation.

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::extract::{ConnectInfo, Multipart, Path, Query, State};
use axum::Json;
use pipeline_engine::{JobStatus, RegenerateOutcome, SourceKind};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::{WebError, WebResult};
use crate::state::AppState;
use crate::validation;

/// `SourceKind`'s `Display` impl renders the engine's own hyphenated
/// vocabulary (`"video-host"`); the HTTP surface speaks the client's
/// public vocabulary (`youtube`, `web`, plus the two upload extensions).
fn public_source_type(kind: SourceKind) -> &'static str {
    match kind {
        SourceKind::VideoHost => "youtube",
        SourceKind::ArticleUrl => "web",
        SourceKind::PdfFile => "pdf",
        SourceKind::EpubFile => "epub",
    }
}

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct HealthResponse {
    status: &'static str,
}

/// Liveness probe.
#[cfg_attr(feature = "utoipa", utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
))]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

fn default_limit() -> i64 {
    20
}

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct SourceListItem {
    pub source_id: Uuid,
    pub title: Option<String>,
    pub source_type: String,
    pub status: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct SourceListResponse {
    pub items: Vec<SourceListItem>,
    pub total: i64,
}

/// List submitted sources, newest first.
#[cfg_attr(feature = "utoipa", utoipa::path(
    get,
    path = "/api/sources",
    params(
        ("limit" = Option<i64>, Query, description = "Page size, 1..=100, default 20"),
        ("offset" = Option<i64>, Query, description = "Page offset, default 0"),
    ),
    responses(
        (status = 200, description = "Page of sources", body = SourceListResponse)
    )
))]
#[tracing::instrument(skip(state), fields(limit = query.limit, offset = query.offset))]
pub async fn list_sources(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> WebResult<Json<SourceListResponse>> {
    let limit = query.limit.clamp(1, 100);
    let offset = query.offset.max(0);
    let page = state.store.list_jobs(limit, offset).await?;
    let items = page
        .items
        .into_iter()
        .map(|j| SourceListItem {
            source_id: j.id,
            title: j.title,
            source_type: public_source_type(j.source_kind).to_string(),
            status: j.status.to_string(),
            created_at: j.created_at,
        })
        .collect();
    Ok(Json(SourceListResponse {
        items,
        total: page.total,
    }))
}

#[derive(Debug, Serialize, Default)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct ProgressInfo {
    pub stage: String,
    pub percent: u8,
}

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

/// Response body for a source; fields that don't apply are omitted rather
/// than serialized as null.
#[derive(Debug, Serialize, Default)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct SourceResponse {
    pub source_id: Uuid,
    pub source_type: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "utoipa", schema(value_type = Object))]
    pub content_payload: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "utoipa", schema(value_type = Object))]
    pub validation_report: Option<serde_json::Value>,
}

async fn build_source_response(state: &AppState, job: pipeline_engine::Job) -> WebResult<SourceResponse> {
    let mut response = SourceResponse {
        source_id: job.id,
        source_type: public_source_type(job.source_kind).to_string(),
        status: job.status.to_string(),
        progress: Some(ProgressInfo {
            stage: job.progress_stage.clone(),
            percent: job.progress_percent,
        }),
        ..Default::default()
    };

    if job.status == JobStatus::Failed {
        response.error = Some(ErrorInfo {
            code: job.error_code.clone().unwrap_or_else(|| "internal_error".to_string()),
            message: job.error_message.clone().unwrap_or_else(|| "unknown error".to_string()),
        });
    }

    if job.status == JobStatus::Approved {
        if let Some(content) = state.store.get_generated_content(job.id).await? {
            response.content_payload = Some(serde_json::to_value(content.payload).map_err(anyhow::Error::from)?);
        }
    }

    if job.status == JobStatus::NeedsReview {
        if let Some(validation) = state.store.get_latest_validation(job.id).await? {
            response.validation_report = Some(serde_json::to_value(validation.report).map_err(anyhow::Error::from)?);
        }
    }

    Ok(response)
}

#[derive(Debug, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct CreateSourceRequest {
    pub url: String,
    pub source_type: String,
}

/// Submit a URL source (video-host or article) for ingestion.
#[cfg_attr(feature = "utoipa", utoipa::path(
    post,
    path = "/api/sources",
    request_body = CreateSourceRequest,
    responses(
        (status = 201, description = "Source queued", body = SourceResponse),
        (status = 422, description = "Invalid URL or source_type"),
        (status = 429, description = "Rate limit exceeded"),
    )
))]
#[tracing::instrument(skip(state, req), fields(source_type = %req.source_type, client_ip = %addr.ip()))]
pub async fn create_source(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<CreateSourceRequest>,
) -> WebResult<(axum::http::StatusCode, Json<SourceResponse>)> {
    AppState::check_rate_limit(&state.create_limiter, addr.ip())?;

    validation::validate_source_url(&req.url, &req.source_type)?;
    let source_kind: SourceKind = match req.source_type.as_str() {
        "youtube" => SourceKind::VideoHost,
        "web" => SourceKind::ArticleUrl,
        other => {
            return Err(WebError::unprocessable(
                "invalid_source_type",
                format!("unknown source_type `{other}`"),
            ))
        }
    };

    let job_id = Uuid::new_v4();
    state
        .store
        .create_job(job_id, source_kind, Some(req.url), None)
        .await?;
    state.dispatch_notify.notify_one();

    let response = SourceResponse {
        source_id: job_id,
        source_type: public_source_type(source_kind).to_string(),
        status: JobStatus::Queued.to_string(),
        progress: Some(ProgressInfo {
            stage: "queued".to_string(),
            percent: 0,
        }),
        ..Default::default()
    };
    Ok((axum::http::StatusCode::CREATED, Json(response)))
}

/// Upload a PDF or EPUB file for ingestion.
#[cfg_attr(feature = "utoipa", utoipa::path(
    post,
    path = "/api/sources/upload",
    responses(
        (status = 201, description = "Source queued", body = SourceResponse),
        (status = 413, description = "File too large"),
        (status = 422, description = "Invalid file type or content"),
        (status = 429, description = "Rate limit exceeded"),
    )
))]
#[tracing::instrument(skip(state, multipart), fields(client_ip = %addr.ip()))]
pub async fn upload_source(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut multipart: Multipart,
) -> WebResult<(axum::http::StatusCode, Json<SourceResponse>)> {
    AppState::check_rate_limit(&state.upload_limiter, addr.ip())?;

    let mut filename: Option<String> = None;
    let mut contents: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| WebError::unprocessable("invalid_multipart", e.to_string()))?
    {
        if field.name() == Some("file") {
            filename = field.file_name().map(|s| s.to_string());
            let bytes = field
                .bytes()
                .await
                .map_err(|e| WebError::payload_too_large(e.to_string()))?;
            if bytes.len() as u64 > state.upload_byte_cap {
                return Err(WebError::payload_too_large(format!(
                    "file too large. max {} bytes",
                    state.upload_byte_cap
                )));
            }
            contents = Some(bytes.to_vec());
        }
    }

    let filename = filename.ok_or_else(|| WebError::unprocessable("missing_filename", "filename is required"))?;
    let contents = contents.ok_or_else(|| WebError::unprocessable("missing_file", "file is required"))?;

    let safe_name = validation::safe_basename(&filename);
    let kind = validation::upload_kind_from_filename(&safe_name)?;
    validation::verify_magic(&contents, kind)?;

    let job_id = Uuid::new_v4();
    let work_dir: PathBuf = state.working_dir_root.join(job_id.to_string());
    tokio::fs::create_dir_all(&work_dir)
        .await
        .map_err(|e| WebError::Internal(e.into()))?;
    let file_path = work_dir.join(&safe_name);

    let write_result = async {
        let mut f = tokio::fs::File::create(&file_path).await?;
        f.write_all(&contents).await?;
        Ok::<(), std::io::Error>(())
    }
    .await;

    if let Err(e) = write_result {
        let _ = tokio::fs::remove_dir_all(&work_dir).await;
        return Err(WebError::Internal(e.into()));
    }

    let source_kind = kind.source_kind();
    let create_result = state
        .store
        .create_job(job_id, source_kind, None, Some(file_path.to_string_lossy().to_string()))
        .await;

    if let Err(e) = create_result {
        let _ = tokio::fs::remove_dir_all(&work_dir).await;
        return Err(WebError::Internal(e));
    }
    state.dispatch_notify.notify_one();

    let response = SourceResponse {
        source_id: job_id,
        source_type: public_source_type(source_kind).to_string(),
        status: JobStatus::Queued.to_string(),
        progress: Some(ProgressInfo {
            stage: "queued".to_string(),
            percent: 0,
        }),
        ..Default::default()
    };
    Ok((axum::http::StatusCode::CREATED, Json(response)))
}

/// Fetch a source's current status, gated content, or validation report.
#[cfg_attr(feature = "utoipa", utoipa::path(
    get,
    path = "/api/sources/{source_id}",
    params(("source_id" = Uuid, Path, description = "Source identifier")),
    responses(
        (status = 200, description = "Source status", body = SourceResponse),
        (status = 404, description = "Source not found"),
    )
))]
pub async fn get_source(
    State(state): State<AppState>,
    Path(source_id): Path<Uuid>,
) -> WebResult<Json<SourceResponse>> {
    let job = state
        .store
        .get_job(source_id)
        .await?
        .ok_or_else(|| WebError::not_found("source_not_found", "source not found"))?;
    Ok(Json(build_source_response(&state, job).await?))
}

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct RegenerateResponse {
    pub source_id: Uuid,
    pub status: &'static str,
}

/// Trigger a bounded partial regeneration of a `needs_review` source.
#[cfg_attr(feature = "utoipa", utoipa::path(
    post,
    path = "/api/sources/{source_id}/regenerate",
    params(("source_id" = Uuid, Path, description = "Source identifier")),
    responses(
        (status = 200, description = "Regeneration started", body = RegenerateResponse),
        (status = 404, description = "Source not found"),
        (status = 409, description = "Status conflict or regeneration limit reached"),
    )
))]
pub async fn regenerate_source(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(source_id): Path<Uuid>,
) -> WebResult<Json<RegenerateResponse>> {
    AppState::check_rate_limit(&state.regenerate_limiter, addr.ip())?;

    match state.store.conditional_regenerate(source_id).await? {
        RegenerateOutcome::Started => {
            // `conditional_regenerate` already transitioned the row to
            // `reducing`; it never re-enters `queued`, so the dispatch
            // loop's `claim_next_queued` would never pick it up. Run it
            // directly instead.
            let orchestrator = state.orchestrator.clone();
            tokio::spawn(async move {
                orchestrator.run_regeneration(source_id).await;
            });
            Ok(Json(RegenerateResponse {
                source_id,
                status: "reducing",
            }))
        }
        RegenerateOutcome::NotFound => Err(WebError::not_found("source_not_found", "source not found")),
        RegenerateOutcome::StatusConflict => Err(WebError::conflict(
            "status_conflict",
            "source must be in needs_review status",
        )),
        RegenerateOutcome::RegenerateLimit => {
            Err(WebError::conflict("regenerate_limit", "regeneration limit reached"))
        }
    }
}
