//! HTTP error envelope.
//!
//! `WebError` is a distinct, smaller enum than `pipeline_engine::EngineError`
//! — handlers construct it directly. The HTTP surface never receives a live
//! `EngineError` synchronously: job failures are observed asynchronously via
//! the job row's `error_code`/`error_message` once the background task
//! completes. Every variant renders through the same envelope,
//! `{"detail":{"error":{"code":...,"message":...}}}`, used consistently
//! across every error status this crate returns.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WebError {
    #[error("{message}")]
    NotFound { code: &'static str, message: String },

    #[error("{message}")]
    Conflict { code: &'static str, message: String },

    #[error("{message}")]
    UnprocessableEntity { code: &'static str, message: String },

    #[error("{message}")]
    PayloadTooLarge { code: &'static str, message: String },

    #[error("rate limit exceeded")]
    TooManyRequests,

    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl WebError {
    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        WebError::NotFound {
            code,
            message: message.into(),
        }
    }

    pub fn conflict(code: &'static str, message: impl Into<String>) -> Self {
        WebError::Conflict {
            code,
            message: message.into(),
        }
    }

    pub fn unprocessable(code: &'static str, message: impl Into<String>) -> Self {
        WebError::UnprocessableEntity {
            code,
            message: message.into(),
        }
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        WebError::PayloadTooLarge {
            code: "payload_too_large",
            message: message.into(),
        }
    }

    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            WebError::NotFound { code, message } => (StatusCode::NOT_FOUND, code, message.clone()),
            WebError::Conflict { code, message } => (StatusCode::CONFLICT, code, message.clone()),
            WebError::UnprocessableEntity { code, message } => {
                (StatusCode::UNPROCESSABLE_ENTITY, code, message.clone())
            }
            WebError::PayloadTooLarge { code, message } => {
                (StatusCode::PAYLOAD_TOO_LARGE, code, message.clone())
            }
            WebError::TooManyRequests => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                "rate limit exceeded".to_string(),
            ),
            WebError::Internal(err) => {
                tracing::error!(error = %err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal server error".to_string(),
                )
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    detail: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    error: ErrorInfo,
}

#[derive(Serialize)]
struct ErrorInfo {
    code: &'static str,
    message: String,
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        let body = ErrorBody {
            detail: ErrorDetail {
                error: ErrorInfo { code, message },
            },
        };
        (status, Json(body)).into_response()
    }
}

pub type WebResult<T> = Result<T, WebError>;
