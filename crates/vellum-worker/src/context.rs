//! Job handler trait
//!
//! The pool owns delivery, timeouts and the retry budget. A handler only says
//! how one delivery went and what to do once the pool stops retrying.

use async_trait::async_trait;
use vellum_core::{JobError, ProcessingJob};

#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Process one delivery. Must be idempotent: the same job can arrive more
    /// than once, and after the image already reached a terminal state.
    async fn handle(&self, job: &ProcessingJob) -> Result<(), JobError>;

    /// Called once when the pool gives up on a job, either because the error was
    /// permanent or because the attempt budget ran out.
    async fn give_up(&self, job: &ProcessingJob, error: &JobError) -> Result<(), JobError>;
}
