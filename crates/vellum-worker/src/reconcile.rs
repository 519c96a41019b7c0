//! Reconciliation sweep
//!
//! Recovers `processing` images whose job was lost: a queue restart without
//! durability, an enqueue that failed after the image was committed, or a handler
//! that never managed to record its failure. Each sweep either re-enqueues a job or,
//! past the maximum age, fails the image so nothing stays `processing` forever.
//! Images whose job is still queued, backing off or leased are left to that job.
//! The sweep also purges parked jobs past their retention.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use vellum_core::{AppError, ProcessingJob, ReconcileSettings};
use vellum_db::ImageRepository;

use crate::queue::JobQueue;

/// Stored as the failure reason of images that aged out
pub const STALE_FAILURE_REASON: &str = "processing did not complete";

const SWEEP_BATCH_SIZE: i64 = 100;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub requeued: usize,
    pub failed: usize,
    pub purged: u64,
}

pub struct Reconciler {
    images: Arc<dyn ImageRepository>,
    queue: Arc<dyn JobQueue>,
    settings: ReconcileSettings,
}

impl Reconciler {
    pub fn new(
        images: Arc<dyn ImageRepository>,
        queue: Arc<dyn JobQueue>,
        settings: ReconcileSettings,
    ) -> Self {
        Self {
            images,
            queue,
            settings,
        }
    }

    /// One pass over stale `processing` images
    #[tracing::instrument(skip(self))]
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<ReconcileReport, AppError> {
        let stale_before = now - ChronoDuration::seconds(self.settings.stale_after_secs);
        let max_age = ChronoDuration::seconds(self.settings.max_age_secs);

        let stale = self
            .images
            .list_stale_processing(stale_before, SWEEP_BATCH_SIZE)
            .await?;

        let mut report = ReconcileReport::default();
        for mut image in stale {
            if now - image.created_at > max_age {
                image.mark_failed(STALE_FAILURE_REASON, now)?;
                if self.images.save(&image).await? {
                    tracing::warn!(image_id = %image.id, "Image exceeded processing age, marked failed");
                    report.failed += 1;
                }
                continue;
            }

            match self.queue.has_pending(image.id).await {
                Ok(false) => {}
                Ok(true) => {
                    tracing::debug!(image_id = %image.id, "Stale image still has a pending job, skipping");
                    continue;
                }
                Err(e) => {
                    tracing::error!(image_id = %image.id, error = %e, "Failed to check pending jobs");
                    continue;
                }
            }

            let job = ProcessingJob::new(image.id, image.original_key.clone());
            if let Err(e) = self.queue.enqueue(job).await {
                tracing::error!(image_id = %image.id, error = %e, "Failed to re-enqueue stale image");
                continue;
            }
            report.requeued += 1;
            // Stays out of the next sweeps until the new job has had time to run
            if let Err(e) = self.images.touch(image.id, now).await {
                tracing::error!(image_id = %image.id, error = %e, "Failed to touch re-enqueued image");
                continue;
            }
            tracing::info!(image_id = %image.id, "Re-enqueued stale image");
        }

        let retention = ChronoDuration::seconds(self.settings.failed_job_retention_secs);
        match self.queue.purge_failed(now - retention).await {
            Ok(purged) => report.purged = purged,
            Err(e) => tracing::error!(error = %e, "Failed to purge parked jobs"),
        }

        if report != ReconcileReport::default() {
            tracing::info!(
                requeued = report.requeued,
                failed = report.failed,
                purged = report.purged,
                "Reconciliation sweep finished"
            );
        }
        Ok(report)
    }

    /// Run the sweep on an interval until the returned handle is shut down.
    /// Returns `None` when the interval is 0.
    pub fn spawn(self: Arc<Self>) -> Option<ReconcilerHandle> {
        if self.settings.interval_secs == 0 {
            tracing::info!("Reconciliation sweep disabled");
            return None;
        }

        let period = Duration::from_secs(self.settings.interval_secs);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = self.run_once(Utc::now()).await {
                            tracing::error!(error = %e, "Reconciliation sweep failed");
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
        });

        Some(ReconcilerHandle {
            shutdown_tx,
            handle,
        })
    }
}

pub struct ReconcilerHandle {
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl ReconcilerHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "Reconciliation task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::InMemoryJobQueue;
    use uuid::Uuid;
    use vellum_core::{Image, ImageStatus, NewImage, Visibility};
    use vellum_db::InMemoryImageRepository;

    fn settings() -> ReconcileSettings {
        ReconcileSettings {
            interval_secs: 60,
            stale_after_secs: 600,
            max_age_secs: 86_400,
            failed_job_retention_secs: 604_800,
        }
    }

    fn processing_image(created_at: DateTime<Utc>) -> Image {
        Image::new(
            NewImage {
                id: Uuid::new_v4(),
                owner_id: Uuid::new_v4(),
                original_filename: "a.jpg".to_string(),
                mime_type: "image/jpeg".to_string(),
                byte_size: 10,
                width: 10,
                height: 10,
                original_key: "originals/o/a.jpg".to_string(),
                title: None,
                visibility: Visibility::Private,
                tags: Vec::new(),
            },
            created_at,
        )
    }

    fn reconciler(
        images: &Arc<InMemoryImageRepository>,
        queue: &Arc<InMemoryJobQueue>,
    ) -> Reconciler {
        Reconciler::new(images.clone(), queue.clone(), settings())
    }

    #[tokio::test]
    async fn test_stale_image_is_requeued_and_touched() {
        let images = Arc::new(InMemoryImageRepository::new());
        let queue = Arc::new(InMemoryJobQueue::default());
        let now = Utc::now();
        let image = processing_image(now - ChronoDuration::hours(1));
        images.insert(&image).await.unwrap();

        let report = reconciler(&images, &queue).run_once(now).await.unwrap();
        assert_eq!(report, ReconcileReport { requeued: 1, failed: 0, purged: 0 });

        let delivery = queue.consume().await.unwrap().unwrap();
        assert_eq!(delivery.job.image_id, image.id);

        let stored = images.get(image.id).await.unwrap().unwrap();
        assert_eq!(stored.updated_at(), now);

        // Touched images are not picked up again by the next sweep
        let report = reconciler(&images, &queue).run_once(now).await.unwrap();
        assert_eq!(report, ReconcileReport::default());
    }

    #[tokio::test]
    async fn test_stale_image_with_live_job_is_not_duplicated() {
        let images = Arc::new(InMemoryImageRepository::new());
        let queue = Arc::new(InMemoryJobQueue::default());
        let now = Utc::now();
        let image = processing_image(now - ChronoDuration::hours(1));
        images.insert(&image).await.unwrap();
        queue
            .enqueue(ProcessingJob::new(image.id, image.original_key.clone()))
            .await
            .unwrap();

        // Leased and then backing off after a transient failure
        let delivery = queue.consume().await.unwrap().unwrap();
        let report = reconciler(&images, &queue).run_once(now).await.unwrap();
        assert_eq!(report, ReconcileReport::default());

        queue
            .retry(&delivery, Duration::from_secs(300), "storage unavailable")
            .await
            .unwrap();
        let report = reconciler(&images, &queue).run_once(now).await.unwrap();
        assert_eq!(report, ReconcileReport::default());
        assert_eq!(queue.enqueued_total().await, 1);

        let stored = images.get(image.id).await.unwrap().unwrap();
        assert_eq!(stored.updated_at(), image.updated_at());
    }

    /// Delegates to the in-memory repository but refuses every `touch`
    struct UntouchableImages(InMemoryImageRepository);

    #[async_trait::async_trait]
    impl ImageRepository for UntouchableImages {
        async fn insert(&self, image: &Image) -> Result<(), AppError> {
            self.0.insert(image).await
        }
        async fn get(&self, id: Uuid) -> Result<Option<Image>, AppError> {
            self.0.get(id).await
        }
        async fn save(&self, image: &Image) -> Result<bool, AppError> {
            self.0.save(image).await
        }
        async fn list_stale_processing(
            &self,
            updated_before: DateTime<Utc>,
            limit: i64,
        ) -> Result<Vec<Image>, AppError> {
            self.0.list_stale_processing(updated_before, limit).await
        }
        async fn touch(&self, _id: Uuid, _now: DateTime<Utc>) -> Result<bool, AppError> {
            Err(AppError::Internal("database unavailable".to_string()))
        }
    }

    #[tokio::test]
    async fn test_touch_failure_does_not_stop_the_batch() {
        let images = Arc::new(UntouchableImages(InMemoryImageRepository::new()));
        let queue = Arc::new(InMemoryJobQueue::default());
        let now = Utc::now();
        for _ in 0..3 {
            images
                .insert(&processing_image(now - ChronoDuration::hours(1)))
                .await
                .unwrap();
        }

        let report = Reconciler::new(images, queue.clone(), settings())
            .run_once(now)
            .await
            .unwrap();
        assert_eq!(report.requeued, 3);
        assert_eq!(queue.enqueued_total().await, 3);
    }

    #[tokio::test]
    async fn test_recent_image_is_left_alone() {
        let images = Arc::new(InMemoryImageRepository::new());
        let queue = Arc::new(InMemoryJobQueue::default());
        let now = Utc::now();
        images
            .insert(&processing_image(now - ChronoDuration::seconds(30)))
            .await
            .unwrap();

        let report = reconciler(&images, &queue).run_once(now).await.unwrap();
        assert_eq!(report, ReconcileReport::default());
        assert_eq!(queue.enqueued_total().await, 0);
    }

    #[tokio::test]
    async fn test_image_past_max_age_is_failed() {
        let images = Arc::new(InMemoryImageRepository::new());
        let queue = Arc::new(InMemoryJobQueue::default());
        let now = Utc::now();
        let image = processing_image(now - ChronoDuration::days(2));
        images.insert(&image).await.unwrap();

        let report = reconciler(&images, &queue).run_once(now).await.unwrap();
        assert_eq!(report, ReconcileReport { requeued: 0, failed: 1, purged: 0 });

        let stored = images.get(image.id).await.unwrap().unwrap();
        assert_eq!(stored.status(), ImageStatus::Failed);
        assert_eq!(stored.failure_reason(), Some(STALE_FAILURE_REASON));
        assert_eq!(queue.enqueued_total().await, 0);
    }

    #[tokio::test]
    async fn test_zero_interval_disables_sweep() {
        let images = Arc::new(InMemoryImageRepository::new());
        let queue = Arc::new(InMemoryJobQueue::default());
        let mut s = settings();
        s.interval_secs = 0;

        let reconciler = Arc::new(Reconciler::new(images, queue, s));
        assert!(reconciler.spawn().is_none());
    }
}
