//! API endpoints module

pub mod sources;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;

use crate::state::AppState;

/// Multipart request-body overhead (boundary, headers, filename field)
/// allowed above the declared `upload_byte_cap` before the body-limit layer
/// rejects the request outright (413), ahead of the in-handler upload-size
/// check which reports the same limit precisely.
const UPLOAD_BODY_SLACK_BYTES: usize = 64 * 1024;

/// Mounts the HTTP surface under `/api`. `upload_byte_cap` overrides
/// axum's 2 MiB `DefaultBodyLimit` on the upload route only — every other
/// route keeps the default, since only the upload route carries a
/// multipart body.
pub fn router(upload_byte_cap: u64) -> Router<AppState> {
    let upload_body_limit = upload_byte_cap as usize + UPLOAD_BODY_SLACK_BYTES;

    Router::new()
        .route("/api/health", get(sources::health))
        .route("/api/sources", get(sources::list_sources).post(sources::create_source))
        .route(
            "/api/sources/upload",
            post(sources::upload_source)
                // axum's own 2 MiB default would reject before the multipart
                // extractor ever sees the body; disable it here and let the
                // tower-http layer enforce the real, configurable limit.
                .route_layer(DefaultBodyLimit::disable())
                .route_layer(RequestBodyLimitLayer::new(upload_body_limit)),
        )
        .route("/api/sources/:id", get(sources::get_source))
        .route("/api/sources/:id/regenerate", post(sources::regenerate_source))
}
