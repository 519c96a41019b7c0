//! Vellum persistence
//!
//! Image aggregate repositories (Postgres and in-memory) and the Postgres-backed
//! processing job table.

pub mod db;

pub use db::{
    ImageRepository, InMemoryImageRepository, JobRepository, JobRow, PgImageRepository,
    JOB_NOTIFY_CHANNEL,
};
