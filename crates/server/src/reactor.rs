//! The dispatch loop: claims queued jobs and hands each to the orchestrator.
//! Same claim/notify/heartbeat shape as a typical queue-backed worker loop,
//! dispatching into `pipeline_engine::orchestrator::Orchestrator`.

use std::sync::Arc;
use std::time::Duration;

use pipeline_engine::orchestrator::Orchestrator;
use pipeline_engine::PersistenceStore;
use tokio::sync::Notify;
use tracing::{error, info, instrument};

const HEARTBEAT: Duration = Duration::from_secs(10);
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Bounds how many jobs this process runs concurrently: one process, a
/// bounded worker pool for fresh-pipeline dispatch — regenerations
/// piggyback on the same claim.
const MAX_CONCURRENT_JOBS: usize = 4;

pub struct Reactor {
    store: Arc<dyn PersistenceStore>,
    orchestrator: Arc<Orchestrator>,
    notify: Arc<Notify>,
}

impl Reactor {
    pub fn new(store: Arc<dyn PersistenceStore>, orchestrator: Arc<Orchestrator>, notify: Arc<Notify>) -> Self {
        Self {
            store,
            orchestrator,
            notify,
        }
    }

    /// Main event loop — runs forever.
    pub async fn run(self) {
        info!("dispatch loop online, waiting for queued jobs");

        let semaphore = Arc::new(tokio::sync::Semaphore::new(MAX_CONCURRENT_JOBS));

        loop {
            let permit = semaphore.clone().acquire_owned().await.expect("semaphore not closed");

            match self.store.claim_next_queued().await {
                Ok(Some(job)) => {
                    info!(job_id = %job.id, source_kind = %job.source_kind, "claimed job");
                    let orchestrator = self.orchestrator.clone();
                    let job_id = job.id;
                    tokio::spawn(async move {
                        let _permit = permit;
                        Self::run_job(orchestrator, job_id).await;
                    });
                }
                Ok(None) => {
                    drop(permit);
                    tokio::select! {
                        _ = self.notify.notified() => {
                            tracing::debug!("dispatch loop woken by new submission");
                        }
                        _ = tokio::time::sleep(HEARTBEAT) => {
                            tracing::trace!("dispatch loop heartbeat");
                        }
                    }
                }
                Err(e) => {
                    drop(permit);
                    error!(error = %e, "persistence error claiming next job");
                    tokio::time::sleep(ERROR_BACKOFF).await;
                }
            }
        }
    }

    #[instrument(skip(orchestrator), fields(%job_id))]
    async fn run_job(orchestrator: Arc<Orchestrator>, job_id: uuid::Uuid) {
        orchestrator.run_fresh_pipeline(job_id).await;
        info!("job run finished");
    }
}
