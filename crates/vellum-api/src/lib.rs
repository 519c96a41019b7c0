//! Vellum API Library
//!
//! HTTP surface of the upload pipeline: the upload orchestrator, the status
//! tracker, their axum handlers and application setup.

pub mod auth;
pub mod constants;
pub mod error;
mod handlers;
pub mod services;
pub mod setup;
pub mod state;
pub mod telemetry;
mod utils;

// Re-exports
pub use error::{ErrorResponse, HttpAppError};
pub use services::status::{ImageStatusView, StatusTracker};
pub use services::upload::{UploadOrchestrator, UploadReceipt, UploadRequest};
