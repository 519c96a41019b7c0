pub mod format;
pub mod image;
pub mod job;
pub mod rejection;

pub use format::ImageFormatKind;
pub use image::{Image, ImageError, ImageStatus, NewImage, Variant, VariantClass, Visibility};
pub use job::ProcessingJob;
pub use rejection::RejectionReason;
