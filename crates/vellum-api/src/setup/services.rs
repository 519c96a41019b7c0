//! Service wiring: repositories, queue, orchestrator, tracker and workers

use anyhow::{Context, Result};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use vellum_core::Config;
use vellum_db::{ImageRepository, InMemoryImageRepository, PgImageRepository};
use vellum_processing::{ImageValidator, MalwareScanner, OutputFormat, QualityPreset, VariantGenerator};
use vellum_storage::Storage;
use vellum_worker::{
    InMemoryJobQueue, JobQueue, PgJobQueue, ProcessingWorker, Reconciler, WorkerPool,
    WorkerPoolConfig,
};

use super::BackgroundTasks;
use crate::auth::OwnerOrPublicPolicy;
use crate::services::status::StatusTracker;
use crate::services::upload::UploadOrchestrator;
use crate::state::AppState;

/// Pick Postgres or in-memory persistence and assemble the state
pub fn initialize_services(
    config: &Config,
    pool: Option<PgPool>,
    storage: Arc<dyn Storage>,
) -> Result<Arc<AppState>> {
    let scanner =
        vellum_services::create_scanner(config).context("Failed to configure malware scanner")?;
    let visibility_timeout = Duration::from_secs(config.queue.visibility_timeout_secs);

    let (images, queue): (Arc<dyn ImageRepository>, Arc<dyn JobQueue>) = match &pool {
        Some(pool) => (
            Arc::new(PgImageRepository::new(pool.clone())),
            Arc::new(PgJobQueue::new(pool.clone(), visibility_timeout)),
        ),
        None => (
            Arc::new(InMemoryImageRepository::new()),
            Arc::new(InMemoryJobQueue::new(visibility_timeout)),
        ),
    };

    Ok(build_state(config.clone(), pool, storage, scanner, images, queue))
}

pub fn build_state(
    config: Config,
    pool: Option<PgPool>,
    storage: Arc<dyn Storage>,
    scanner: Arc<dyn MalwareScanner>,
    images: Arc<dyn ImageRepository>,
    queue: Arc<dyn JobQueue>,
) -> Arc<AppState> {
    let uploads = UploadOrchestrator::new(
        ImageValidator::new(config.validation.clone()),
        scanner,
        storage.clone(),
        images.clone(),
        queue.clone(),
    );
    let status = StatusTracker::new(images.clone(), storage.clone(), Arc::new(OwnerOrPublicPolicy));

    Arc::new(AppState {
        config,
        uploads,
        status,
        images,
        storage,
        queue,
        pool,
    })
}

/// Start the worker pool and, unless disabled, the reconciliation sweep
pub fn start_background(config: &Config, state: &AppState) -> Result<BackgroundTasks> {
    let format = OutputFormat::from_kind(config.variant_format)
        .context("VARIANT_FORMAT is not an encodable format")?;
    let quality = QualityPreset::parse(&config.variant_quality)?;
    let generator = VariantGenerator::new(format, quality, &config.validation);

    let handler = Arc::new(ProcessingWorker::new(
        state.images.clone(),
        state.storage.clone(),
        generator,
        Duration::from_secs(config.worker.transform_timeout_secs),
    ));

    let pool_config = WorkerPoolConfig::from(&config.worker);
    tracing::info!(
        max_workers = pool_config.max_workers,
        max_attempts = pool_config.max_attempts,
        "Starting worker pool"
    );
    let workers = WorkerPool::start(state.queue.clone(), handler, pool_config);

    let reconciler = Arc::new(Reconciler::new(
        state.images.clone(),
        state.queue.clone(),
        config.reconcile.clone(),
    ))
    .spawn();

    Ok(BackgroundTasks {
        workers,
        reconciler,
    })
}
