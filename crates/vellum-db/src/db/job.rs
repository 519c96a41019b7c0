use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres};
use std::time::Duration;
use uuid::Uuid;
use vellum_core::ProcessingJob;

/// A claimed row of `processing_jobs`
#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    pub id: Uuid,
    pub image_id: Uuid,
    pub payload: Json<ProcessingJob>,
    pub status: String,
    /// Number of times the row has been handed to a worker, including this one
    pub deliveries: i32,
    pub available_at: DateTime<Utc>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRow {
    /// Payload with the zero-based attempt number of this delivery
    pub fn job(&self) -> ProcessingJob {
        let mut job = self.payload.0.clone();
        job.attempt = u32::try_from(self.deliveries.saturating_sub(1)).unwrap_or(0);
        job
    }
}

/// Channel for PostgreSQL LISTEN/NOTIFY when a job is enqueued.
pub const JOB_NOTIFY_CHANNEL: &str = "vellum_new_job";

const JOB_COLUMNS: &str = "id, image_id, payload, status, deliveries, available_at, \
     lease_expires_at, last_error, created_at, updated_at";

/// Durable job table. A leased row whose lease expired is claimable again,
/// which gives at-least-once delivery.
#[derive(Clone)]
pub struct JobRepository {
    pool: PgPool,
}

impl JobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a queued job and wake listening workers
    #[tracing::instrument(skip(self, job), fields(db.table = "processing_jobs", db.operation = "insert", image_id = %job.image_id))]
    pub async fn enqueue(&self, job: &ProcessingJob) -> Result<Uuid> {
        let id = Uuid::new_v4();

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction for job creation")?;

        sqlx::query(
            r#"
            INSERT INTO processing_jobs (id, image_id, payload, status, available_at)
            VALUES ($1, $2, $3, 'queued', NOW())
            "#,
        )
        .bind(id)
        .bind(job.image_id)
        .bind(Json(job))
        .execute(&mut *tx)
        .await
        .context("Failed to insert processing job")?;

        // Workers also poll, so a failed notify only delays pickup
        if let Err(e) = sqlx::query("SELECT pg_notify($1, '')")
            .bind(JOB_NOTIFY_CHANNEL)
            .execute(&mut *tx)
            .await
        {
            tracing::warn!(
                error = %e,
                job_id = %id,
                "Failed to send pg_notify for new job, workers will discover it via polling"
            );
        }

        tx.commit()
            .await
            .context("Failed to commit job creation")?;

        tracing::debug!(job_id = %id, image_id = %job.image_id, "Processing job enqueued");

        Ok(id)
    }

    /// Claim the oldest ready job and lease it for `visibility_timeout`
    ///
    /// Uses FOR UPDATE SKIP LOCKED so concurrent workers never claim the same row.
    #[tracing::instrument(skip(self))]
    pub async fn claim(&self, visibility_timeout: Duration) -> Result<Option<JobRow>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        let candidate: Option<(Uuid,)> = sqlx::query_as::<Postgres, (Uuid,)>(
            r#"
            SELECT id
            FROM processing_jobs
            WHERE (status = 'queued' AND available_at <= NOW())
               OR (status = 'leased' AND lease_expires_at <= NOW())
            ORDER BY available_at ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to fetch next job")?;

        let Some((id,)) = candidate else {
            tx.rollback().await.ok();
            return Ok(None);
        };

        let row = sqlx::query_as::<Postgres, JobRow>(&format!(
            r#"
            UPDATE processing_jobs
            SET status = 'leased',
                deliveries = deliveries + 1,
                lease_expires_at = NOW() + make_interval(secs => $2),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(id)
        .bind(visibility_timeout.as_secs_f64())
        .fetch_one(&mut *tx)
        .await
        .context("Failed to lease job")?;

        tx.commit().await.context("Failed to commit transaction")?;

        tracing::debug!(
            job_id = %row.id,
            image_id = %row.image_id,
            deliveries = row.deliveries,
            "Job claimed"
        );

        Ok(Some(row))
    }

    /// Remove a finished job. Returns false when `lease` no longer holds the row.
    #[tracing::instrument(skip(self))]
    pub async fn ack(&self, id: Uuid, lease: i32) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM processing_jobs WHERE id = $1 AND status = 'leased' AND deliveries = $2",
        )
        .bind(id)
        .bind(lease)
        .execute(&self.pool)
        .await
        .context("Failed to delete job")?;
        Ok(result.rows_affected() > 0)
    }

    /// Release the lease and make the job visible again after `delay`
    #[tracing::instrument(skip(self))]
    pub async fn retry(&self, id: Uuid, lease: i32, delay: Duration, error: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE processing_jobs
            SET status = 'queued',
                available_at = NOW() + make_interval(secs => $3),
                lease_expires_at = NULL,
                last_error = $4,
                updated_at = NOW()
            WHERE id = $1 AND status = 'leased' AND deliveries = $2
            "#,
        )
        .bind(id)
        .bind(lease)
        .bind(delay.as_secs_f64())
        .bind(error)
        .execute(&self.pool)
        .await
        .context("Failed to reschedule job")?;
        Ok(result.rows_affected() > 0)
    }

    /// Park a job that will not be retried; kept for inspection until purged
    #[tracing::instrument(skip(self))]
    pub async fn fail(&self, id: Uuid, lease: i32, error: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE processing_jobs
            SET status = 'failed',
                lease_expires_at = NULL,
                last_error = $3,
                updated_at = NOW()
            WHERE id = $1 AND status = 'leased' AND deliveries = $2
            "#,
        )
        .bind(id)
        .bind(lease)
        .bind(error)
        .execute(&self.pool)
        .await
        .context("Failed to mark job failed")?;
        Ok(result.rows_affected() > 0)
    }

    /// Whether the image has a queued or leased job. Expired leases count, since
    /// the next claim picks them up again.
    #[tracing::instrument(skip(self))]
    pub async fn has_pending(&self, image_id: Uuid) -> Result<bool> {
        let (pending,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM processing_jobs
                WHERE image_id = $1 AND status IN ('queued', 'leased')
            )
            "#,
        )
        .bind(image_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to check pending jobs")?;
        Ok(pending)
    }

    /// Delete parked jobs last updated before `before`
    #[tracing::instrument(skip(self))]
    pub async fn purge_failed(&self, before: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM processing_jobs WHERE status = 'failed' AND updated_at < $1",
        )
        .bind(before)
        .execute(&self.pool)
        .await
        .context("Failed to purge failed jobs")?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(deliveries: i32) -> JobRow {
        let now = Utc::now();
        JobRow {
            id: Uuid::new_v4(),
            image_id: Uuid::new_v4(),
            payload: Json(ProcessingJob::new(Uuid::new_v4(), "originals/o/i.png")),
            status: "leased".to_string(),
            deliveries,
            available_at: now,
            lease_expires_at: Some(now),
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_attempt_is_zero_based() {
        assert_eq!(row(1).job().attempt, 0);
        assert_eq!(row(4).job().attempt, 3);
        assert_eq!(row(0).job().attempt, 0);
    }
}
