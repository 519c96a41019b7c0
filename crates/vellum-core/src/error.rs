//! Error types module
//!
//! All request-path failures are unified under `AppError`. Each variant
//! self-describes its HTTP presentation through `ErrorMetadata` so the API layer
//! renders every error the same way.
//!
//! The `Database` variant and `From<sqlx::Error>` are gated behind the `sqlx` feature.

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

use crate::models::{ImageError, RejectionReason};

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable issues and security rejections
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata for error responses - defines how an error should be presented
pub trait ErrorMetadata {
    /// HTTP status code to return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "PAYLOAD_TOO_LARGE")
    fn error_code(&self) -> &'static str;

    /// Whether this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Suggested action for the client
    fn suggested_action(&self) -> Option<&'static str>;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Whether details should be hidden from clients
    fn is_sensitive(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[cfg(not(feature = "sqlx"))]
    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Upload rejected ({reason}): {message}")]
    Rejected {
        reason: RejectionReason,
        message: String,
    },

    #[error("Malware scanner unavailable: {0}")]
    ScannerUnavailable(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Job queue unavailable: {0}")]
    QueueUnavailable(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

#[cfg(feature = "sqlx")]
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        AppError::Database(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<ImageError> for AppError {
    fn from(err: ImageError) -> Self {
        AppError::InvariantViolation(err.to_string())
    }
}

type StaticMetadata = (
    u16,
    &'static str,
    bool,
    Option<&'static str>,
    bool,
    LogLevel,
);

/// Static metadata per rejection reason.
fn rejection_metadata(reason: RejectionReason) -> StaticMetadata {
    match reason {
        RejectionReason::TooLarge => (
            413,
            "PAYLOAD_TOO_LARGE",
            false,
            Some("Reduce the file size and upload again"),
            false,
            LogLevel::Debug,
        ),
        RejectionReason::UnsupportedFormat => (
            415,
            "UNSUPPORTED_MEDIA_TYPE",
            false,
            Some("Upload a JPEG, PNG, WebP or GIF whose extension matches its content"),
            false,
            LogLevel::Debug,
        ),
        RejectionReason::DimensionsExceeded => (
            422,
            "DIMENSIONS_EXCEEDED",
            false,
            Some("Downscale the image before uploading"),
            false,
            LogLevel::Debug,
        ),
        RejectionReason::PixelCountExceeded => (
            422,
            "PIXEL_COUNT_EXCEEDED",
            false,
            Some("Downscale the image before uploading"),
            false,
            LogLevel::Debug,
        ),
        RejectionReason::MalwareDetected => (
            422,
            "MALWARE_DETECTED",
            false,
            None,
            false,
            LogLevel::Warn,
        ),
        RejectionReason::DecodeFailed => (
            400,
            "VALIDATION_ERROR",
            false,
            Some("Check that the file is a valid, uncorrupted image"),
            false,
            LogLevel::Debug,
        ),
    }
}

/// Static metadata for each variant: (http_status, error_code, recoverable, suggested_action, sensitive, log_level).
fn app_error_static_metadata(err: &AppError) -> StaticMetadata {
    match err {
        AppError::Database(_) => (
            500,
            "DATABASE_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::Storage(_) => (
            503,
            "STORAGE_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::Rejected { reason, .. } => rejection_metadata(*reason),
        AppError::ScannerUnavailable(_) => (
            503,
            "SCANNER_UNAVAILABLE",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::InvalidInput(_) => (
            400,
            "INVALID_INPUT",
            false,
            Some("Check request parameters and try again"),
            false,
            LogLevel::Debug,
        ),
        AppError::Unauthorized(_) => (
            401,
            "UNAUTHORIZED",
            false,
            Some("Send a valid X-User-Id header"),
            false,
            LogLevel::Debug,
        ),
        AppError::NotFound(_) => (
            404,
            "NOT_FOUND",
            false,
            Some("Verify the resource ID exists"),
            false,
            LogLevel::Debug,
        ),
        AppError::QueueUnavailable(_) => (
            503,
            "QUEUE_UNAVAILABLE",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::InvariantViolation(_) => (
            500,
            "INVARIANT_VIOLATION",
            false,
            Some("Contact support if this error persists"),
            true,
            LogLevel::Error,
        ),
        AppError::Internal(_) | AppError::InternalWithSource { .. } => (
            500,
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
    }
}

impl AppError {
    /// Shorthand for a validation rejection.
    pub fn rejected(reason: RejectionReason, message: impl Into<String>) -> Self {
        AppError::Rejected {
            reason,
            message: message.into(),
        }
    }

    /// Validation verdict behind this error, if it came from the upload gate.
    ///
    /// An unreachable scanner counts as a malware verdict: uploads fail closed.
    pub fn rejection_reason(&self) -> Option<RejectionReason> {
        match self {
            AppError::Rejected { reason, .. } => Some(*reason),
            AppError::ScannerUnavailable(_) => Some(RejectionReason::MalwareDetected),
            _ => None,
        }
    }

    /// Get the error type name for detailed error responses
    pub fn error_type(&self) -> &str {
        match self {
            AppError::Database(_) => "Database",
            AppError::Storage(_) => "Storage",
            AppError::Rejected { .. } => "Rejected",
            AppError::ScannerUnavailable(_) => "ScannerUnavailable",
            AppError::InvalidInput(_) => "InvalidInput",
            AppError::Unauthorized(_) => "Unauthorized",
            AppError::NotFound(_) => "NotFound",
            AppError::QueueUnavailable(_) => "QueueUnavailable",
            AppError::InvariantViolation(_) => "InvariantViolation",
            AppError::Internal(_) | AppError::InternalWithSource { .. } => "Internal",
        }
    }

    /// Get detailed error information including error chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        app_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).2
    }

    fn suggested_action(&self) -> Option<&'static str> {
        app_error_static_metadata(self).3
    }

    fn is_sensitive(&self) -> bool {
        app_error_static_metadata(self).4
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).5
    }

    fn client_message(&self) -> String {
        match self {
            AppError::Database(_) => "Failed to access database".to_string(),
            AppError::Storage(_) => "Failed to access storage".to_string(),
            AppError::Rejected { message, .. } => message.clone(),
            AppError::ScannerUnavailable(_) => {
                "Upload could not be scanned for malware and was rejected".to_string()
            }
            AppError::InvalidInput(ref msg) => msg.clone(),
            AppError::Unauthorized(ref msg) => msg.clone(),
            AppError::NotFound(ref msg) => msg.clone(),
            AppError::QueueUnavailable(_) => {
                "Image stored but processing could not be scheduled".to_string()
            }
            AppError::InvariantViolation(_) => "Internal server error".to_string(),
            AppError::Internal(_) | AppError::InternalWithSource { .. } => {
                "Internal server error".to_string()
            }
        }
    }
}
