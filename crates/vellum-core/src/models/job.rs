use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unit of work carried from the upload path to the worker pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingJob {
    pub image_id: Uuid,
    pub original_key: String,
    /// Zero-based delivery attempt, maintained by the queue.
    #[serde(default)]
    pub attempt: u32,
}

impl ProcessingJob {
    pub fn new(image_id: Uuid, original_key: impl Into<String>) -> Self {
        Self {
            image_id,
            original_key: original_key.into(),
            attempt: 0,
        }
    }
}
