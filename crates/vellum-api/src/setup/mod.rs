//! Application setup and initialization
//!
//! Everything main.rs needs to go from a `Config` to a running router and its
//! background tasks, split out so integration tests can assemble the same pieces.

pub mod database;
pub mod routes;
pub mod server;
pub mod services;
pub mod storage;

use crate::state::AppState;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use vellum_core::Config;
use vellum_worker::{ReconcilerHandle, WorkerPool};

/// Worker pool and reconciliation sweep started alongside the server
pub struct BackgroundTasks {
    pub workers: WorkerPool,
    pub reconciler: Option<ReconcilerHandle>,
}

impl BackgroundTasks {
    /// Stop the sweep, then drain in-flight jobs for up to `grace`
    pub async fn shutdown(self, grace: Duration) {
        if let Some(reconciler) = self.reconciler {
            reconciler.shutdown().await;
        }
        self.workers.shutdown(grace).await;
    }
}

pub struct Application {
    pub state: Arc<AppState>,
    pub router: axum::Router,
    pub background: BackgroundTasks,
}

/// Initialize the entire application
pub async fn initialize_app(config: Config) -> Result<Application> {
    config.validate().context("Configuration validation failed")?;

    crate::telemetry::init_telemetry(&config.log_format)
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    tracing::info!(
        environment = %config.environment,
        "Configuration loaded and validated successfully"
    );

    let pool = database::setup_database(&config).await?;

    let storage = storage::setup_storage(&config).await?;

    let state = services::initialize_services(&config, pool, storage)?;

    let background = services::start_background(&config, &state)?;

    let router = routes::setup_routes(&config, state.clone());

    Ok(Application {
        state,
        router,
        background,
    })
}
