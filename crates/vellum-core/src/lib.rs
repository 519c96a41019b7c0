//! Vellum Core Library
//!
//! Domain models, error types and configuration shared by every Vellum crate.

pub mod config;
pub mod error;
pub mod job_error;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::{Config, QueueSettings, ReconcileSettings, ValidationSettings, WorkerSettings};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use job_error::{JobError, JobResultExt};
pub use models::{
    Image, ImageError, ImageFormatKind, ImageStatus, NewImage, ProcessingJob, RejectionReason,
    Variant, VariantClass, Visibility,
};
pub use storage_types::StorageBackend;
