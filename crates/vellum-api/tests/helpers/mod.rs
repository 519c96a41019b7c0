//! Test helpers: build AppState, router and workers for integration tests.
//!
//! Everything runs in-process: local storage in a temp dir, the in-memory image
//! repository and job queue, the built-in signature scanner and a live worker pool.
//! Run with `cargo test -p vellum-api`.

#![allow(dead_code)]

pub mod fixtures;
pub mod storage;

use axum_test::multipart::{MultipartForm, Part};
use axum_test::{TestResponse, TestServer};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;
use vellum_api::constants::{self, USER_ID_HEADER};
use vellum_api::setup::{routes, services, BackgroundTasks};
use vellum_api::state::AppState;
use vellum_core::{Config, StorageBackend};
use vellum_db::InMemoryImageRepository;
use vellum_processing::SignatureScanner;
use vellum_storage::LocalStorage;
use vellum_worker::InMemoryJobQueue;

use self::storage::FlakyStorage;

/// API path prefix for tests (e.g. `/api/v0`).
pub fn api_path(path: &str) -> String {
    format!("{}{}", constants::API_PREFIX, path)
}

/// Test application: server, state and owned resources.
pub struct TestApp {
    pub server: TestServer,
    pub state: Arc<AppState>,
    pub images: Arc<InMemoryImageRepository>,
    pub queue: Arc<InMemoryJobQueue>,
    pub storage: Arc<FlakyStorage>,
    pub background: Option<BackgroundTasks>,
    pub _temp_dir: TempDir,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }

    pub fn media_root(&self) -> &std::path::Path {
        self._temp_dir.path()
    }

    /// Number of regular files under `media_root()/{prefix}`
    pub fn stored_files(&self, prefix: &str) -> usize {
        fn walk(dir: &std::path::Path) -> usize {
            let Ok(entries) = std::fs::read_dir(dir) else {
                return 0;
            };
            entries
                .flatten()
                .map(|entry| {
                    let path = entry.path();
                    if path.is_dir() {
                        walk(&path)
                    } else {
                        1
                    }
                })
                .sum()
        }
        walk(&self.media_root().join(prefix))
    }

    pub async fn upload(&self, user: Uuid, data: Vec<u8>, filename: &str) -> TestResponse {
        self.upload_form(user, data, filename, |form| form).await
    }

    pub async fn upload_form(
        &self,
        user: Uuid,
        data: Vec<u8>,
        filename: &str,
        extra: impl FnOnce(MultipartForm) -> MultipartForm,
    ) -> TestResponse {
        let part = Part::bytes(bytes::Bytes::from(data))
            .file_name(filename.to_string())
            .mime_type("application/octet-stream");
        let form = extra(MultipartForm::new().add_part("file", part));
        self.server
            .post(&api_path("/images"))
            .add_header(USER_ID_HEADER, user.to_string())
            .multipart(form)
            .await
    }

    pub async fn status(&self, user: Uuid, id: Uuid) -> TestResponse {
        self.server
            .get(&api_path(&format!("/images/{}/status", id)))
            .add_header(USER_ID_HEADER, user.to_string())
            .await
    }

    /// Poll the status endpoint until the image leaves `processing`
    pub async fn wait_for_terminal(&self, user: Uuid, id: Uuid, timeout: Duration) -> Value {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let body: Value = self.status(user, id).await.json();
            if body["status"] != "processing" {
                return body;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("image {} still processing after {:?}", id, timeout);
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }

    pub async fn shutdown(mut self) {
        if let Some(background) = self.background.take() {
            background.shutdown(Duration::from_secs(5)).await;
        }
    }
}

/// Config tuned for fast tests: short polls, tiny retry backoff, no sweep.
pub fn test_config(media_root: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.storage_backend = StorageBackend::Local;
    config.local_storage_path = Some(media_root.to_string_lossy().to_string());
    config.local_storage_base_url = Some("http://localhost:4000/media".to_string());
    config.worker.max_workers = 2;
    config.worker.poll_interval_ms = 20;
    config.worker.retry_base_ms = 10;
    config.worker.max_attempts = 3;
    config.reconcile.interval_secs = 0;
    config
}

/// Setup test app with the default test config and running workers.
pub async fn setup_test_app() -> TestApp {
    setup_test_app_with(|_| {}, storage::FailurePlan::none(), true).await
}

/// Setup test app, letting the caller adjust config and storage failures.
pub async fn setup_test_app_with(
    configure: impl FnOnce(&mut Config),
    failures: storage::FailurePlan,
    start_workers: bool,
) -> TestApp {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
    let mut config = test_config(temp_dir.path());
    configure(&mut config);

    let local = LocalStorage::new(
        temp_dir.path(),
        config
            .local_storage_base_url
            .clone()
            .unwrap_or_default(),
    )
    .await
    .expect("Failed to create local storage");
    let storage = Arc::new(FlakyStorage::new(local, failures));

    let images = Arc::new(InMemoryImageRepository::new());
    let queue = Arc::new(InMemoryJobQueue::new(Duration::from_secs(
        config.queue.visibility_timeout_secs,
    )));

    let state = services::build_state(
        config.clone(),
        None,
        storage.clone(),
        Arc::new(SignatureScanner::default()),
        images.clone(),
        queue.clone(),
    );

    let background = if start_workers {
        Some(services::start_background(&config, &state).expect("Failed to start workers"))
    } else {
        None
    };

    let app = routes::setup_routes(&config, state.clone());
    let server = TestServer::new(app.into_make_service()).expect("Failed to create test server");

    TestApp {
        server,
        state,
        images,
        queue,
        storage,
        background,
        _temp_dir: temp_dir,
    }
}
