//! HTTP ingress and job dispatch loop for the longform content pipeline
//! engine: a router built from `pipeline_engine::PersistenceStore` state,
//! and a background dispatch loop sharing the same `Notify`.

pub mod adapters;
pub mod api;
pub mod error;
pub mod rate_limit;
pub mod reactor;
pub mod state;
pub mod validation;

pub use error::{WebError, WebResult};
pub use state::AppState;

use std::net::SocketAddr;

use axum::http::{HeaderValue, Method};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Builds the CORS layer from a comma-separated allowed-origin list.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| o.parse::<HeaderValue>().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([axum::http::header::CONTENT_TYPE])
}

/// Assembles the full Axum application: routes, CORS, and request tracing.
pub fn build_app(state: AppState, cors_origins: &[String]) -> axum::Router {
    api::router(state.upload_byte_cap)
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Runs the HTTP server to completion (never returns under normal
/// operation). The caller is responsible for spawning the dispatch loop
/// alongside this future.
pub async fn serve(app: axum::Router, host: &str, port: u16) -> anyhow::Result<()> {
    let addr = format!("{host}:{port}");
    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
