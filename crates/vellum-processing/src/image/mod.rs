//! Image transformation
//!
//! - EXIF orientation (orientation)
//! - Resize geometry and filters (resize)
//! - Variant generation (processor)

pub mod orientation;
pub mod processor;
pub mod resize;

pub use orientation::ImageOrientation;
pub use processor::{EncodedVariant, VariantGenerator};
