use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;
use vellum_core::ProcessingJob;
use vellum_db::{JobRepository, JOB_NOTIFY_CHANNEL};

use super::{Delivery, JobQueue, QueueError};

/// Durable queue on the `processing_jobs` table
pub struct PgJobQueue {
    repository: JobRepository,
    visibility_timeout: Duration,
    notify: Arc<Notify>,
}

impl PgJobQueue {
    /// Also spawns a LISTEN task so consumers wake as soon as a job is inserted.
    /// Must be called from within a tokio runtime.
    pub fn new(pool: PgPool, visibility_timeout: Duration) -> Self {
        let notify = Arc::new(Notify::new());
        Self::spawn_listener(pool.clone(), notify.clone());

        Self {
            repository: JobRepository::new(pool),
            visibility_timeout,
            notify,
        }
    }

    fn spawn_listener(pool: PgPool, notify: Arc<Notify>) {
        tokio::spawn(async move {
            loop {
                match sqlx::postgres::PgListener::connect_with(&pool).await {
                    Ok(mut listener) => {
                        if let Err(e) = listener.listen(JOB_NOTIFY_CHANNEL).await {
                            tracing::warn!(error = %e, "LISTEN failed, will retry");
                            tokio::time::sleep(Duration::from_secs(5)).await;
                            continue;
                        }
                        while listener.recv().await.is_ok() {
                            notify.notify_one();
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "PgListener connect failed, will retry");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        });
    }
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(&self, job: ProcessingJob) -> Result<(), QueueError> {
        self.repository.enqueue(&job).await?;
        Ok(())
    }

    async fn consume(&self) -> Result<Option<Delivery>, QueueError> {
        let row = self.repository.claim(self.visibility_timeout).await?;
        Ok(row.map(|row| Delivery {
            id: row.id,
            job: row.job(),
            lease: u32::try_from(row.deliveries).unwrap_or(0),
        }))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let settled = self.repository.ack(delivery.id, lease(delivery)).await?;
        warn_if_lost(delivery, settled);
        Ok(())
    }

    async fn retry(
        &self,
        delivery: &Delivery,
        delay: Duration,
        reason: &str,
    ) -> Result<(), QueueError> {
        let settled = self
            .repository
            .retry(delivery.id, lease(delivery), delay, reason)
            .await?;
        warn_if_lost(delivery, settled);
        Ok(())
    }

    async fn fail(&self, delivery: &Delivery, reason: &str) -> Result<(), QueueError> {
        let settled = self
            .repository
            .fail(delivery.id, lease(delivery), reason)
            .await?;
        warn_if_lost(delivery, settled);
        Ok(())
    }

    async fn has_pending(&self, image_id: Uuid) -> Result<bool, QueueError> {
        Ok(self.repository.has_pending(image_id).await?)
    }

    async fn purge_failed(&self, before: DateTime<Utc>) -> Result<u64, QueueError> {
        Ok(self.repository.purge_failed(before).await?)
    }

    fn wakeup(&self) -> Option<Arc<Notify>> {
        Some(self.notify.clone())
    }
}

fn lease(delivery: &Delivery) -> i32 {
    i32::try_from(delivery.lease).unwrap_or(i32::MAX)
}

fn warn_if_lost(delivery: &Delivery, settled: bool) {
    if !settled {
        tracing::warn!(
            job_id = %delivery.id,
            lease = delivery.lease,
            "Lease lost to a redelivery, ignoring"
        );
    }
}
