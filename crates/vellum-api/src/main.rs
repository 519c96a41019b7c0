use std::time::Duration;

use vellum_api::setup::{initialize_app, server::start_server};
use vellum_core::Config;

/// How long in-flight jobs may run after the server stops
const WORKER_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = Config::from_env()?;

    // Database, storage, services, workers and routes
    let app = initialize_app(config.clone()).await?;

    let served = start_server(&config, app.router).await;

    app.background.shutdown(WORKER_SHUTDOWN_GRACE).await;
    tracing::info!("Shutdown complete");

    served
}
