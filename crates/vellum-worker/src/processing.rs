//! Image processing job handler
//!
//! Loads the image, fetches the original, generates every rendition off the async
//! runtime, stores them under deterministic keys and moves the image to `active`.

use anyhow::anyhow;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use vellum_core::{Image, JobError, JobResultExt, ProcessingJob, Variant};
use vellum_db::ImageRepository;
use vellum_processing::{EncodedVariant, VariantGenerator};
use vellum_storage::{variant_key, Storage, StorageError};

use crate::context::JobHandler;

/// Failure reasons are stored on the image; keep them readable
const MAX_FAILURE_REASON_LEN: usize = 500;

pub struct ProcessingWorker {
    images: Arc<dyn ImageRepository>,
    storage: Arc<dyn Storage>,
    generator: VariantGenerator,
    transform_timeout: Duration,
}

impl ProcessingWorker {
    pub fn new(
        images: Arc<dyn ImageRepository>,
        storage: Arc<dyn Storage>,
        generator: VariantGenerator,
        transform_timeout: Duration,
    ) -> Self {
        Self {
            images,
            storage,
            generator,
            transform_timeout,
        }
    }

    async fn load(&self, job: &ProcessingJob) -> Result<Image, JobError> {
        self.images
            .get(job.image_id)
            .await
            .transient()?
            .ok_or_else(|| JobError::permanent(anyhow!("Image {} no longer exists", job.image_id)))
    }

    async fn fetch_original(&self, key: &str) -> Result<Bytes, JobError> {
        match self.storage.get(key).await {
            Ok(data) => Ok(data),
            Err(StorageError::NotFound(_)) => Err(JobError::permanent(anyhow!(
                "Original {} is missing from storage",
                key
            ))),
            Err(e) if e.is_transient() => Err(JobError::transient(e)),
            Err(e) => Err(JobError::permanent(e)),
        }
    }

    /// CPU-bound work runs on the blocking pool. The cancellation token is
    /// tripped when this future finishes or is dropped, so a timed-out transform
    /// stops at its next checkpoint instead of running to completion.
    async fn generate(&self, original: Bytes) -> Result<Vec<EncodedVariant>, JobError> {
        let cancel = CancellationToken::new();
        let _guard = cancel.clone().drop_guard();

        let generator = self.generator.clone();
        let task_cancel = cancel.clone();
        let handle =
            tokio::task::spawn_blocking(move || generator.generate(&original, &task_cancel));

        match tokio::time::timeout(self.transform_timeout, handle).await {
            Ok(Ok(Ok(variants))) => Ok(variants),
            Ok(Ok(Err(e))) if e.is_transient() => Err(JobError::transient(e)),
            Ok(Ok(Err(e))) => Err(JobError::permanent(e)),
            Ok(Err(join_err)) => Err(JobError::permanent(anyhow!(
                "Variant generation aborted: {}",
                join_err
            ))),
            Err(_) => {
                cancel.cancel();
                Err(JobError::transient(anyhow!(
                    "Variant generation timed out after {}s",
                    self.transform_timeout.as_secs()
                )))
            }
        }
    }
}

fn failure_reason(error: &JobError) -> String {
    let reason = format!("processing failed: {}", error);
    if reason.len() <= MAX_FAILURE_REASON_LEN {
        return reason;
    }
    let mut end = MAX_FAILURE_REASON_LEN;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    reason[..end].to_string()
}

#[async_trait]
impl JobHandler for ProcessingWorker {
    #[tracing::instrument(skip(self, job), fields(image_id = %job.image_id, attempt = job.attempt))]
    async fn handle(&self, job: &ProcessingJob) -> Result<(), JobError> {
        let start = Instant::now();

        let mut image = self.load(job).await?;
        if image.status().is_terminal() {
            tracing::info!(status = %image.status(), "Image already processed, skipping redelivered job");
            return Ok(());
        }

        let original = self.fetch_original(&job.original_key).await?;
        let encoded = self.generate(original).await?;

        for rendition in encoded {
            let key = variant_key(image.owner_id, image.id, rendition.class, rendition.format);
            let byte_size = rendition.data.len() as u64;

            self.storage
                .put(&key, rendition.data, rendition.format.mime_type())
                .await
                .map_err(|e| {
                    if e.is_transient() {
                        JobError::transient(e)
                    } else {
                        JobError::permanent(e)
                    }
                })?;

            image
                .add_variant(Variant {
                    class: rendition.class,
                    key,
                    width: rendition.width,
                    height: rendition.height,
                    byte_size,
                    format: rendition.format,
                })
                .permanent()?;
        }

        image.mark_active(Utc::now()).permanent()?;

        if !self.images.save(&image).await.transient()? {
            tracing::info!("Image left processing while the job ran, result discarded");
            return Ok(());
        }

        tracing::info!(
            variants = image.variants().len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Image processed"
        );
        Ok(())
    }

    #[tracing::instrument(skip(self, job, error), fields(image_id = %job.image_id))]
    async fn give_up(&self, job: &ProcessingJob, error: &JobError) -> Result<(), JobError> {
        let Some(mut image) = self.images.get(job.image_id).await.transient()? else {
            return Ok(());
        };
        if image.status().is_terminal() {
            return Ok(());
        }

        let reason = failure_reason(error);
        image.mark_failed(reason.clone(), Utc::now()).permanent()?;
        if self.images.save(&image).await.transient()? {
            tracing::warn!(reason = %reason, "Image marked failed");
        }
        Ok(())
    }
}
