//! Database repositories for data access layer
//
// Image aggregate persistence
pub mod image;
//
// Non-durable image store for development and tests
pub mod memory;
//
// processing_jobs table backing the Postgres job queue
pub mod job;

pub use image::{ImageRepository, PgImageRepository};
pub use job::{JobRepository, JobRow, JOB_NOTIFY_CHANNEL};
pub use memory::InMemoryImageRepository;
