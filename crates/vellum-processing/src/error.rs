use vellum_core::VariantClass;

/// Failures while turning an original into variants
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("Failed to decode original: {0}")]
    Decode(String),

    #[error("Failed to encode {class} variant: {message}")]
    Encode {
        class: VariantClass,
        message: String,
    },

    #[error("{0} variant is byte-identical to the original")]
    NotReencoded(VariantClass),

    #[error("Variant generation cancelled")]
    Cancelled,
}

impl ProcessingError {
    /// Cancellation comes from a timeout and may succeed on a later attempt;
    /// everything else is a property of the bytes.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProcessingError::Cancelled)
    }
}
