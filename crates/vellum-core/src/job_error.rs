//! Job execution error types
//!
//! Lets a job handler state whether a failure is transient (redeliver with
//! backoff) or permanent (fail the image without retrying).

use std::fmt;

/// Job execution error that is either transient or permanent
#[derive(Debug)]
pub struct JobError {
    inner: anyhow::Error,
    transient: bool,
}

impl JobError {
    /// Create a permanent job error
    ///
    /// Permanent errors fail the image immediately. Use this for:
    /// - Decode or encode failures on content that already passed validation
    /// - A missing image record or original object
    /// - Aggregate invariant violations
    pub fn permanent(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            transient: false,
        }
    }

    /// Create a transient job error
    ///
    /// Transient errors are redelivered until the attempt budget runs out. Use this for:
    /// - Storage or database temporarily unavailable
    /// - Transform timeouts
    pub fn transient(err: impl Into<anyhow::Error>) -> Self {
        Self {
            inner: err.into(),
            transient: true,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.transient
    }

    pub fn inner(&self) -> &anyhow::Error {
        &self.inner
    }

    pub fn into_inner(self) -> anyhow::Error {
        self.inner
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl std::error::Error for JobError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

impl From<anyhow::Error> for JobError {
    /// Unclassified errors are retried
    fn from(err: anyhow::Error) -> Self {
        Self::transient(err)
    }
}

/// Extension trait for classifying a `Result` error in place
pub trait JobResultExt<T> {
    fn permanent(self) -> Result<T, JobError>;

    fn transient(self) -> Result<T, JobError>;
}

impl<T, E: Into<anyhow::Error>> JobResultExt<T> for Result<T, E> {
    fn permanent(self) -> Result<T, JobError> {
        self.map_err(|e| JobError::permanent(e.into()))
    }

    fn transient(self) -> Result<T, JobError> {
        self.map_err(|e| JobError::transient(e.into()))
    }
}
