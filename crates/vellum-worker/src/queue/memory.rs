use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use uuid::Uuid;
use vellum_core::ProcessingJob;

use super::{Delivery, JobQueue, QueueError};

/// Parked jobs kept for inspection; the oldest are dropped past this.
pub const MAX_FAILED_JOBS: usize = 1000;

#[derive(Debug)]
struct Entry {
    id: Uuid,
    job: ProcessingJob,
    deliveries: u32,
    available_at: Instant,
}

#[derive(Debug, Default)]
struct State {
    ready: VecDeque<Entry>,
    leased: HashMap<Uuid, (Entry, Instant)>,
    failed: VecDeque<(ProcessingJob, String)>,
    enqueued_total: usize,
}

impl State {
    /// Expired leases go back to the front of the line
    fn reclaim_expired(&mut self, now: Instant) {
        let expired: Vec<Uuid> = self
            .leased
            .iter()
            .filter(|(_, (_, lease_until))| *lease_until <= now)
            .map(|(id, _)| *id)
            .collect();

        for id in expired {
            if let Some((entry, _)) = self.leased.remove(&id) {
                tracing::warn!(
                    job_id = %id,
                    image_id = %entry.job.image_id,
                    deliveries = entry.deliveries,
                    "Lease expired, job is visible again"
                );
                self.ready.push_front(entry);
            }
        }
    }

    /// Take the leased entry only if `delivery` still holds its lease
    fn take_lease(&mut self, delivery: &Delivery) -> Option<Entry> {
        let current = self.leased.get(&delivery.id).map(|(entry, _)| entry.deliveries)?;
        if current != delivery.lease {
            tracing::warn!(
                job_id = %delivery.id,
                lease = delivery.lease,
                current_lease = current,
                "Lease lost to a redelivery, ignoring"
            );
            return None;
        }
        self.leased.remove(&delivery.id).map(|(entry, _)| entry)
    }
}

/// Process-local queue for development and tests. Not durable: pending jobs are
/// lost on restart, and the reconciliation sweep re-enqueues their images.
pub struct InMemoryJobQueue {
    state: Mutex<State>,
    visibility_timeout: Duration,
    notify: Arc<Notify>,
}

impl InMemoryJobQueue {
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(State::default()),
            visibility_timeout,
            notify: Arc::new(Notify::new()),
        }
    }

    /// Jobs waiting for a consumer, including delayed retries
    pub async fn ready_len(&self) -> usize {
        self.state.lock().await.ready.len()
    }

    pub async fn leased_len(&self) -> usize {
        self.state.lock().await.leased.len()
    }

    /// Jobs parked by `fail`, with their reason
    pub async fn failed_jobs(&self) -> Vec<(ProcessingJob, String)> {
        self.state.lock().await.failed.iter().cloned().collect()
    }

    /// Number of `enqueue` calls ever accepted
    pub async fn enqueued_total(&self) -> usize {
        self.state.lock().await.enqueued_total
    }

    /// True when nothing is ready or in flight
    pub async fn is_idle(&self) -> bool {
        let state = self.state.lock().await;
        state.ready.is_empty() && state.leased.is_empty()
    }
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new(Duration::from_secs(900))
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: ProcessingJob) -> Result<(), QueueError> {
        let entry = Entry {
            id: Uuid::new_v4(),
            job,
            deliveries: 0,
            available_at: Instant::now(),
        };
        tracing::debug!(job_id = %entry.id, image_id = %entry.job.image_id, "Processing job enqueued");

        {
            let mut state = self.state.lock().await;
            state.ready.push_back(entry);
            state.enqueued_total += 1;
        }
        self.notify.notify_one();
        Ok(())
    }

    async fn consume(&self) -> Result<Option<Delivery>, QueueError> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        state.reclaim_expired(now);

        let Some(index) = state.ready.iter().position(|e| e.available_at <= now) else {
            return Ok(None);
        };
        let Some(mut entry) = state.ready.remove(index) else {
            return Ok(None);
        };

        entry.deliveries += 1;
        let mut job = entry.job.clone();
        job.attempt = entry.deliveries - 1;
        let delivery = Delivery {
            id: entry.id,
            job,
            lease: entry.deliveries,
        };

        state
            .leased
            .insert(entry.id, (entry, now + self.visibility_timeout));

        Ok(Some(delivery))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        self.state.lock().await.take_lease(delivery);
        Ok(())
    }

    async fn retry(
        &self,
        delivery: &Delivery,
        delay: Duration,
        reason: &str,
    ) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        // A lease that already expired was put back by `reclaim_expired`
        if let Some(mut entry) = state.take_lease(delivery) {
            tracing::debug!(job_id = %entry.id, delay_ms = delay.as_millis() as u64, reason = %reason, "Job rescheduled");
            entry.available_at = Instant::now() + delay;
            state.ready.push_back(entry);
        }
        Ok(())
    }

    async fn fail(&self, delivery: &Delivery, reason: &str) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        if let Some(entry) = state.take_lease(delivery) {
            if state.failed.len() >= MAX_FAILED_JOBS {
                state.failed.pop_front();
            }
            state.failed.push_back((entry.job, reason.to_string()));
        }
        Ok(())
    }

    async fn has_pending(&self, image_id: Uuid) -> Result<bool, QueueError> {
        let state = self.state.lock().await;
        Ok(state.ready.iter().any(|e| e.job.image_id == image_id)
            || state
                .leased
                .values()
                .any(|(e, _)| e.job.image_id == image_id))
    }

    fn wakeup(&self) -> Option<Arc<Notify>> {
        Some(self.notify.clone())
    }
}
