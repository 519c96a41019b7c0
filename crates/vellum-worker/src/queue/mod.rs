//! Processing job queue
//!
//! At-least-once delivery: a consumed job stays leased until it is acked, retried
//! or failed, and a lease that runs past the visibility timeout makes the job
//! deliverable again. Handlers must therefore be idempotent.
//!
//! Every delivery carries a lease token. Settling a delivery whose lease was lost to
//! a redelivery leaves the current holder's job untouched.

mod memory;
mod pg;

pub use memory::InMemoryJobQueue;
pub use pg::PgJobQueue;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;
use vellum_core::{AppError, ProcessingJob};

/// One leased hand-off of a job to a consumer
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Queue-side identifier of the job, stable across redeliveries
    pub id: Uuid,
    /// Payload with `attempt` set for this delivery
    pub job: ProcessingJob,
    /// Delivery count when this lease was granted. Ack, retry and fail only act
    /// while the job still carries this count.
    pub lease: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Job queue unavailable: {0}")]
    Unavailable(String),
}

impl From<QueueError> for AppError {
    fn from(err: QueueError) -> Self {
        AppError::QueueUnavailable(err.to_string())
    }
}

impl From<anyhow::Error> for QueueError {
    fn from(err: anyhow::Error) -> Self {
        QueueError::Unavailable(format!("{:#}", err))
    }
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: ProcessingJob) -> Result<(), QueueError>;

    /// Lease the next ready job, if any. Never blocks waiting for work.
    async fn consume(&self) -> Result<Option<Delivery>, QueueError>;

    /// The job is done and must not be delivered again
    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Release the lease; the job becomes deliverable again after `delay`
    async fn retry(
        &self,
        delivery: &Delivery,
        delay: Duration,
        reason: &str,
    ) -> Result<(), QueueError>;

    /// Park the job for good
    async fn fail(&self, delivery: &Delivery, reason: &str) -> Result<(), QueueError>;

    /// True while a job for the image is queued, waiting out a retry delay or leased
    async fn has_pending(&self, image_id: Uuid) -> Result<bool, QueueError>;

    /// Drop parked jobs failed before `before`. Returns how many were removed.
    async fn purge_failed(&self, _before: DateTime<Utc>) -> Result<u64, QueueError> {
        Ok(0)
    }

    /// Signalled whenever new work may be available. Consumers fall back to
    /// polling, so a queue without one is still correct.
    fn wakeup(&self) -> Option<Arc<Notify>> {
        None
    }
}
