use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use datastory_infra::{
    AppConfig, Orchestrator, OrchestratorSettings,
    storage::{InMemoryObjectStorage, LocalFsStorage, ObjectStorage},
    store::{InMemoryJobStore, InMemoryQuotaLedger, InMemoryStoryStore, PostgresStore},
    worker::{HttpWorkerClient, WorkerClient},
};

/// Wire the orchestrator from configuration.
///
/// `DATABASE_URL` selects the Postgres stores (schema applied on start),
/// `STORAGE_DIR` selects filesystem object storage; each falls back to its
/// in-memory adapter when unset.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<Arc<Orchestrator>> {
    let worker: Arc<dyn WorkerClient> = Arc::new(
        HttpWorkerClient::new(&config.worker_url, config.dispatch_timeout)
            .context("failed to build worker client")?,
    );

    let storage: Arc<dyn ObjectStorage> = match &config.storage_dir {
        Some(dir) => {
            info!(dir = %dir.display(), "using filesystem object storage");
            Arc::new(LocalFsStorage::new(dir.clone()))
        }
        None => {
            warn!("STORAGE_DIR not set; uploads are kept in memory");
            InMemoryObjectStorage::arc()
        }
    };

    let settings = OrchestratorSettings::from_config(config);

    let Some(url) = &config.database_url else {
        warn!("DATABASE_URL not set; falling back to in-memory stores");
        return Ok(build_in_memory_services(settings, storage, worker));
    };

    let store = Arc::new(
        PostgresStore::connect(url)
            .await
            .context("failed to connect to DATABASE_URL")?,
    );
    store.migrate().await.context("failed to apply schema")?;
    info!("using postgres stores");

    Ok(Arc::new(Orchestrator::new(
        store.clone(),
        store.clone(),
        store,
        storage,
        worker,
        settings,
    )))
}

/// In-memory stores (dev/test) with the given storage and worker client.
pub fn build_in_memory_services(
    settings: OrchestratorSettings,
    storage: Arc<dyn ObjectStorage>,
    worker: Arc<dyn WorkerClient>,
) -> Arc<Orchestrator> {
    Arc::new(Orchestrator::new(
        InMemoryJobStore::arc(),
        InMemoryStoryStore::arc(),
        InMemoryQuotaLedger::arc(),
        storage,
        worker,
        settings,
    ))
}
