//! Vellum Processing Library
//!
//! Everything that touches pixels:
//! - The upload gate (`validator`) and the malware-scan contract it consults (`scan`)
//! - Variant generation (`image`): orientation, resize, re-encode
//! - Output encoders (`compression`)

pub mod compression;
pub mod error;
pub mod image;
pub mod scan;
pub mod validator;

pub use compression::{ImageCompressor, OutputFormat, QualityPreset};
pub use error::ProcessingError;
pub use self::image::{EncodedVariant, VariantGenerator};
pub use scan::{MalwareScanner, ScanError, ScanVerdict, SignatureScanner};
pub use validator::{ImageValidator, ValidatedImage, ValidationError};
