//! Worker pool: bounded concurrency, wake-up or polling, timeouts and retry.
//!
//! Shutdown: [`WorkerPool::shutdown`] stops claiming new jobs, then waits up to a
//! grace period for in-flight jobs. Jobs still running after that keep their lease
//! until it expires and are redelivered on the next start.

use anyhow::anyhow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, Notify, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use vellum_core::{JobError, WorkerSettings};

use crate::context::JobHandler;
use crate::queue::{Delivery, JobQueue};

/// Maximum delay in seconds before a failed job is redelivered. Caps exponential
/// backoff so that late attempts do not wait excessively long.
pub const MAX_RETRY_BACKOFF_SECS: u64 = 300;

/// Backoff for the retry that follows delivery `attempt` (zero-based).
#[inline]
pub(crate) fn compute_retry_backoff(base: Duration, attempt: u32) -> Duration {
    let factor = 2_u32.checked_pow(attempt).unwrap_or(u32::MAX);
    base.saturating_mul(factor)
        .min(Duration::from_secs(MAX_RETRY_BACKOFF_SECS))
}

#[derive(Clone, Debug)]
pub struct WorkerPoolConfig {
    pub max_workers: usize,
    pub poll_interval: Duration,
    /// Outer limit on one delivery, including storage and database round trips
    pub job_timeout: Duration,
    /// Deliveries allowed before the handler gives up on a job
    pub max_attempts: u32,
    pub retry_base: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self::from(&WorkerSettings::default())
    }
}

impl From<&WorkerSettings> for WorkerPoolConfig {
    fn from(settings: &WorkerSettings) -> Self {
        Self {
            max_workers: settings.max_workers,
            poll_interval: Duration::from_millis(settings.poll_interval_ms),
            job_timeout: Duration::from_secs(settings.job_timeout_secs),
            max_attempts: settings.max_attempts,
            retry_base: Duration::from_millis(settings.retry_base_ms),
        }
    }
}

pub struct WorkerPool {
    config: WorkerPoolConfig,
    semaphore: Arc<Semaphore>,
    permits: u32,
    shutdown_tx: mpsc::Sender<()>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawn the pool loop. Must be called from within a tokio runtime.
    pub fn start(
        queue: Arc<dyn JobQueue>,
        handler: Arc<dyn JobHandler>,
        config: WorkerPoolConfig,
    ) -> Self {
        let permits = u32::try_from(config.max_workers.max(1)).unwrap_or(u32::MAX);
        let semaphore = Arc::new(Semaphore::new(permits as usize));
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let handle = tokio::spawn(Self::worker_pool(
            queue,
            handler,
            config.clone(),
            semaphore.clone(),
            shutdown_rx,
        ));

        Self {
            config,
            semaphore,
            permits,
            shutdown_tx,
            handle: Mutex::new(Some(handle)),
        }
    }

    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    async fn worker_pool(
        queue: Arc<dyn JobQueue>,
        handler: Arc<dyn JobHandler>,
        config: WorkerPoolConfig,
        semaphore: Arc<Semaphore>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        let wakeup = queue.wakeup();
        tracing::info!(
            max_workers = config.max_workers,
            poll_interval_ms = config.poll_interval.as_millis() as u64,
            job_timeout_secs = config.job_timeout.as_secs(),
            max_attempts = config.max_attempts,
            wakeup = wakeup.is_some(),
            "Worker pool started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Worker pool shutting down");
                    break;
                }
                _ = Self::wait_for_wakeup(wakeup.as_deref()) => {
                    Self::claim_and_dispatch(&queue, &handler, &config, &semaphore).await;
                }
                _ = sleep(config.poll_interval) => {
                    Self::claim_and_dispatch(&queue, &handler, &config, &semaphore).await;
                }
            }
        }

        tracing::info!("Worker pool stopped");
    }

    async fn wait_for_wakeup(notify: Option<&Notify>) {
        match notify {
            Some(notify) => notify.notified().await,
            None => std::future::pending().await,
        }
    }

    /// Claim jobs until the queue is empty or every worker is busy
    async fn claim_and_dispatch(
        queue: &Arc<dyn JobQueue>,
        handler: &Arc<dyn JobHandler>,
        config: &WorkerPoolConfig,
        semaphore: &Arc<Semaphore>,
    ) {
        loop {
            let permit = match semaphore.clone().try_acquire_owned() {
                Ok(p) => p,
                Err(_) => {
                    tracing::trace!("All workers busy, skipping claim");
                    return;
                }
            };

            match queue.consume().await {
                Ok(Some(delivery)) => {
                    let queue = queue.clone();
                    let handler = handler.clone();
                    let config = config.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        Self::process_delivery(&queue, &handler, &config, delivery).await;
                        if let Some(notify) = queue.wakeup() {
                            notify.notify_one();
                        }
                    });
                }
                Ok(None) => {
                    tracing::trace!("No jobs available in queue");
                    return;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to claim job from queue");
                    return;
                }
            }
        }
    }

    #[tracing::instrument(skip_all, fields(job_id = %delivery.id, image_id = %delivery.job.image_id, attempt = delivery.job.attempt))]
    async fn process_delivery(
        queue: &Arc<dyn JobQueue>,
        handler: &Arc<dyn JobHandler>,
        config: &WorkerPoolConfig,
        delivery: Delivery,
    ) {
        let outcome =
            match tokio::time::timeout(config.job_timeout, handler.handle(&delivery.job)).await {
                Ok(result) => result,
                Err(_) => Err(JobError::transient(anyhow!(
                    "Job timed out after {}s",
                    config.job_timeout.as_secs()
                ))),
            };

        let error = match outcome {
            Ok(()) => {
                if let Err(e) = queue.ack(&delivery).await {
                    tracing::error!(error = %e, "Failed to ack job, it will be redelivered");
                } else {
                    tracing::info!("Job completed");
                }
                return;
            }
            Err(error) => error,
        };

        let attempt = delivery.job.attempt;
        if error.is_transient() && attempt + 1 < config.max_attempts {
            let delay = compute_retry_backoff(config.retry_base, attempt);
            tracing::warn!(
                error = %error,
                max_attempts = config.max_attempts,
                backoff_ms = delay.as_millis() as u64,
                "Job failed, scheduling retry"
            );
            if let Err(e) = queue.retry(&delivery, delay, &error.to_string()).await {
                tracing::error!(error = %e, "Failed to reschedule job, it will be redelivered after its lease");
            }
            return;
        }

        tracing::error!(
            error = %error,
            transient = error.is_transient(),
            max_attempts = config.max_attempts,
            "Job failed, will not retry"
        );
        if let Err(e) = handler.give_up(&delivery.job, &error).await {
            tracing::error!(error = %e, "Failed to record job failure on the image");
        }
        if let Err(e) = queue.fail(&delivery, &error.to_string()).await {
            tracing::error!(error = %e, "Failed to mark job failed in queue");
        }
    }

    /// Stop claiming new jobs and wait up to `grace` for in-flight ones.
    pub async fn shutdown(&self, grace: Duration) {
        tracing::info!("Initiating worker pool shutdown");
        let _ = self.shutdown_tx.send(()).await;

        if let Some(handle) = self.handle.lock().await.take() {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Worker pool loop ended abnormally");
            }
        }

        match tokio::time::timeout(grace, self.semaphore.acquire_many(self.permits)).await {
            Ok(_) => tracing::info!("In-flight jobs drained"),
            Err(_) => tracing::warn!(
                grace_secs = grace.as_secs(),
                "In-flight jobs still running after grace period"
            ),
        }
    }
}
