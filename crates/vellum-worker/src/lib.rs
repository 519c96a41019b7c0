//! Vellum worker
//!
//! The at-least-once processing queue (Postgres or in-memory), the pool that
//! consumes it, the job handler that turns an original into variants and the
//! sweep that recovers images whose job was lost.

pub mod context;
pub mod pool;
pub mod processing;
pub mod queue;
pub mod reconcile;

pub use context::JobHandler;
pub use pool::{WorkerPool, WorkerPoolConfig, MAX_RETRY_BACKOFF_SECS};
pub use processing::ProcessingWorker;
pub use queue::{Delivery, InMemoryJobQueue, JobQueue, PgJobQueue, QueueError};
pub use reconcile::{ReconcileReport, Reconciler, ReconcilerHandle, STALE_FAILURE_REASON};
