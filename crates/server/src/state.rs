//! Shared application state handed to every handler: configuration and
//! collaborators are resolved once at startup and passed through, rather
//! than read from mutable globals.

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use pipeline_engine::orchestrator::Orchestrator;
use pipeline_engine::PersistenceStore;
use tokio::sync::Notify;

use crate::rate_limit::IpRateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PersistenceStore>,
    pub orchestrator: Arc<Orchestrator>,
    /// Wakes the dispatch loop immediately after a fresh job is queued.
    pub dispatch_notify: Arc<Notify>,
    pub working_dir_root: PathBuf,
    pub upload_byte_cap: u64,
    pub create_limiter: Arc<IpRateLimiter>,
    pub upload_limiter: Arc<IpRateLimiter>,
    pub regenerate_limiter: Arc<IpRateLimiter>,
}

impl AppState {
    pub fn check_rate_limit(limiter: &IpRateLimiter, ip: IpAddr) -> Result<(), crate::error::WebError> {
        limiter
            .check_key(&ip)
            .map_err(|_| crate::error::WebError::TooManyRequests)
    }
}
