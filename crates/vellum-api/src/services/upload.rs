//! Upload orchestration
//!
//! Validate, persist the original, record the image, then hand it to the queue.
//! Nothing is written until validation passes, and a job is only enqueued once
//! the image row exists.

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;
use vellum_core::{AppError, Image, ImageStatus, NewImage, ProcessingJob, Visibility};
use vellum_db::ImageRepository;
use vellum_processing::{ImageValidator, MalwareScanner};
use vellum_storage::{original_key, Storage};
use vellum_worker::JobQueue;

use crate::constants::API_PREFIX;
use crate::utils::upload::sanitize_filename;

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub owner_id: Uuid,
    pub data: Bytes,
    pub filename: String,
    pub title: Option<String>,
    pub visibility: Visibility,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadReceipt {
    pub id: Uuid,
    pub status: ImageStatus,
    pub status_url: String,
}

pub fn status_url(id: Uuid) -> String {
    format!("{}/images/{}/status", API_PREFIX, id)
}

#[derive(Clone)]
pub struct UploadOrchestrator {
    validator: ImageValidator,
    scanner: Arc<dyn MalwareScanner>,
    storage: Arc<dyn Storage>,
    images: Arc<dyn ImageRepository>,
    queue: Arc<dyn JobQueue>,
}

impl UploadOrchestrator {
    pub fn new(
        validator: ImageValidator,
        scanner: Arc<dyn MalwareScanner>,
        storage: Arc<dyn Storage>,
        images: Arc<dyn ImageRepository>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            validator,
            scanner,
            storage,
            images,
            queue,
        }
    }

    #[tracing::instrument(
        skip(self, request),
        fields(owner_id = %request.owner_id, size_bytes = request.data.len(), image_id)
    )]
    pub async fn upload(&self, request: UploadRequest) -> Result<UploadReceipt, AppError> {
        let started = std::time::Instant::now();

        let validated = self
            .validator
            .validate(request.data.clone(), &request.filename, self.scanner.as_ref())
            .await
            .map_err(|e| {
                tracing::info!(reason = %e.reason(), error = %e, "Upload rejected");
                AppError::from(e)
            })?;

        let image_id = Uuid::new_v4();
        tracing::Span::current().record("image_id", tracing::field::display(image_id));

        let key = original_key(request.owner_id, image_id, validated.format);
        self.storage
            .put(&key, request.data, validated.mime_type)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, key = %key, "Failed to store original");
                AppError::Storage(e.to_string())
            })?;

        let image = Image::new(
            NewImage {
                id: image_id,
                owner_id: request.owner_id,
                original_filename: sanitize_filename(&request.filename),
                mime_type: validated.mime_type.to_string(),
                byte_size: validated.byte_size,
                width: validated.width,
                height: validated.height,
                original_key: key.clone(),
                title: request.title,
                visibility: request.visibility,
                tags: request.tags,
            },
            Utc::now(),
        );

        if let Err(e) = self.images.insert(&image).await {
            tracing::error!(error = %e, "Failed to record image, removing original");
            if let Err(delete_err) = self.storage.delete(&key).await {
                tracing::warn!(error = %delete_err, key = %key, "Failed to remove orphaned original");
            }
            return Err(e);
        }

        // The image row exists from here on; if the job is lost the reconciler requeues it
        self.queue
            .enqueue(ProcessingJob::new(image_id, key.clone()))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to enqueue processing job");
                AppError::from(e)
            })?;

        tracing::info!(
            key = %key,
            format = %validated.format,
            width = validated.width,
            height = validated.height,
            duration_ms = started.elapsed().as_millis() as u64,
            "Upload accepted"
        );

        Ok(UploadReceipt {
            id: image_id,
            status: image.status(),
            status_url: status_url(image_id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::DateTime;
    use std::io::Cursor;
    use tempfile::TempDir;
    use vellum_core::{RejectionReason, ValidationSettings};
    use vellum_db::InMemoryImageRepository;
    use vellum_processing::scan::EICAR_SIGNATURE;
    use vellum_processing::{ScanError, ScanVerdict, SignatureScanner};
    use vellum_storage::LocalStorage;
    use vellum_worker::{InMemoryJobQueue, QueueError};

    struct Fixture {
        orchestrator: UploadOrchestrator,
        images: Arc<InMemoryImageRepository>,
        queue: Arc<InMemoryJobQueue>,
        storage: Arc<LocalStorage>,
        dir: TempDir,
    }

    async fn fixture_with(
        images: Option<Arc<dyn ImageRepository>>,
        queue: Option<Arc<dyn JobQueue>>,
        scanner: Arc<dyn MalwareScanner>,
    ) -> Fixture {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(
            LocalStorage::new(dir.path(), "http://localhost/media".to_string())
                .await
                .unwrap(),
        );
        let memory_images = Arc::new(InMemoryImageRepository::new());
        let memory_queue = Arc::new(InMemoryJobQueue::default());
        let orchestrator = UploadOrchestrator::new(
            ImageValidator::new(ValidationSettings::default()),
            scanner,
            storage.clone(),
            images.unwrap_or_else(|| memory_images.clone() as Arc<dyn ImageRepository>),
            queue.unwrap_or_else(|| memory_queue.clone() as Arc<dyn JobQueue>),
        );
        Fixture {
            orchestrator,
            images: memory_images,
            queue: memory_queue,
            storage,
            dir,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(None, None, Arc::new(SignatureScanner::default())).await
    }

    fn png(width: u32, height: u32) -> Bytes {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([10, 120, 200]));
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, image::ImageFormat::Png).unwrap();
        Bytes::from(buffer.into_inner())
    }

    fn request(data: Bytes, filename: &str) -> UploadRequest {
        UploadRequest {
            owner_id: Uuid::new_v4(),
            data,
            filename: filename.to_string(),
            title: Some("Sunset".to_string()),
            visibility: Visibility::Public,
            tags: vec!["sky".to_string()],
        }
    }

    struct FailingImages;

    #[async_trait]
    impl ImageRepository for FailingImages {
        async fn insert(&self, _image: &Image) -> Result<(), AppError> {
            Err(AppError::Database(sqlx::Error::PoolTimedOut))
        }
        async fn get(&self, _id: Uuid) -> Result<Option<Image>, AppError> {
            Ok(None)
        }
        async fn save(&self, _image: &Image) -> Result<bool, AppError> {
            Ok(false)
        }
        async fn list_stale_processing(
            &self,
            _updated_before: DateTime<Utc>,
            _limit: i64,
        ) -> Result<Vec<Image>, AppError> {
            Ok(Vec::new())
        }
        async fn touch(&self, _id: Uuid, _now: DateTime<Utc>) -> Result<bool, AppError> {
            Ok(false)
        }
    }

    struct ClosedQueue;

    #[async_trait]
    impl JobQueue for ClosedQueue {
        async fn enqueue(&self, _job: ProcessingJob) -> Result<(), QueueError> {
            Err(QueueError::Unavailable("broker down".to_string()))
        }
        async fn consume(&self) -> Result<Option<vellum_worker::Delivery>, QueueError> {
            Ok(None)
        }
        async fn ack(&self, _delivery: &vellum_worker::Delivery) -> Result<(), QueueError> {
            Ok(())
        }
        async fn retry(
            &self,
            _delivery: &vellum_worker::Delivery,
            _delay: std::time::Duration,
            _reason: &str,
        ) -> Result<(), QueueError> {
            Ok(())
        }
        async fn fail(&self, _delivery: &vellum_worker::Delivery, _reason: &str) -> Result<(), QueueError> {
            Ok(())
        }
        async fn has_pending(&self, _image_id: Uuid) -> Result<bool, QueueError> {
            Err(QueueError::Unavailable("broker down".to_string()))
        }
    }

    struct OfflineScanner;

    #[async_trait]
    impl MalwareScanner for OfflineScanner {
        async fn scan(&self, _data: &[u8]) -> Result<ScanVerdict, ScanError> {
            Err(ScanError::Unavailable("connection refused".to_string()))
        }
        fn name(&self) -> &'static str {
            "offline"
        }
    }

    #[tokio::test]
    async fn test_accepted_upload_is_recorded_and_enqueued() {
        let f = fixture().await;
        let receipt = f.orchestrator.upload(request(png(64, 48), "sunset.png")).await.unwrap();

        assert_eq!(receipt.status, ImageStatus::Processing);
        assert_eq!(receipt.status_url, format!("/api/v0/images/{}/status", receipt.id));

        let image = f.images.get(receipt.id).await.unwrap().unwrap();
        assert_eq!(image.status(), ImageStatus::Processing);
        assert_eq!((image.width, image.height), (64, 48));
        assert_eq!(image.mime_type, "image/png");
        assert_eq!(image.title.as_deref(), Some("Sunset"));
        assert!(image.original_key.ends_with(&format!("{}.png", receipt.id)));
        assert!(f.storage.exists(&image.original_key).await.unwrap());

        assert_eq!(f.queue.enqueued_total().await, 1);
        let delivery = f.queue.consume().await.unwrap().unwrap();
        assert_eq!(delivery.job.image_id, receipt.id);
        assert_eq!(delivery.job.attempt, 0);
    }

    #[tokio::test]
    async fn test_rejection_has_no_side_effects() {
        let f = fixture().await;

        let mut infected = png(16, 16).to_vec();
        infected.extend_from_slice(EICAR_SIGNATURE);
        let err = f
            .orchestrator
            .upload(request(Bytes::from(infected), "clip.png"))
            .await
            .unwrap_err();
        assert_eq!(err.rejection_reason(), Some(RejectionReason::MalwareDetected));

        let err = f
            .orchestrator
            .upload(request(Bytes::from_static(b"GIF89a nope"), "x.gif"))
            .await
            .unwrap_err();
        assert!(err.rejection_reason().is_some());

        assert!(f.images.is_empty().await);
        assert_eq!(f.queue.enqueued_total().await, 0);
    }

    #[tokio::test]
    async fn test_scanner_outage_fails_closed() {
        let f = fixture_with(None, None, Arc::new(OfflineScanner)).await;
        let err = f.orchestrator.upload(request(png(8, 8), "a.png")).await.unwrap_err();

        assert!(matches!(err, AppError::ScannerUnavailable(_)));
        assert_eq!(err.rejection_reason(), Some(RejectionReason::MalwareDetected));
        assert!(f.images.is_empty().await);
    }

    #[tokio::test]
    async fn test_insert_failure_removes_original_and_skips_queue() {
        let f = fixture_with(
            Some(Arc::new(FailingImages)),
            None,
            Arc::new(SignatureScanner::default()),
        )
        .await;
        let req = request(png(8, 8), "a.png");
        let owner = req.owner_id;

        let err = f.orchestrator.upload(req).await.unwrap_err();
        assert!(matches!(err, AppError::Database(_)));
        assert_eq!(f.queue.enqueued_total().await, 0);

        let owner_dir = f.dir.path().join("originals").join(owner.to_string());
        let leftovers = std::fs::read_dir(&owner_dir).map(|d| d.count()).unwrap_or(0);
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_enqueue_failure_is_queue_unavailable() {
        let f = fixture_with(
            None,
            Some(Arc::new(ClosedQueue)),
            Arc::new(SignatureScanner::default()),
        )
        .await;

        let err = f.orchestrator.upload(request(png(8, 8), "a.png")).await.unwrap_err();
        assert!(matches!(err, AppError::QueueUnavailable(_)));

        // Row stays in processing for the reconciler
        assert_eq!(f.images.len().await, 1);
    }
}
