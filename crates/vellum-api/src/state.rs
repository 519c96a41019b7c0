//! Application state shared by every handler

use sqlx::PgPool;
use std::sync::Arc;
use vellum_core::Config;
use vellum_db::ImageRepository;
use vellum_storage::Storage;
use vellum_worker::JobQueue;

use crate::services::status::StatusTracker;
use crate::services::upload::UploadOrchestrator;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub uploads: UploadOrchestrator,
    pub status: StatusTracker,
    pub images: Arc<dyn ImageRepository>,
    pub storage: Arc<dyn Storage>,
    pub queue: Arc<dyn JobQueue>,
    /// `None` in in-memory mode
    pub pool: Option<PgPool>,
}
