//! Upload validation gate
//!
//! Decides whether untrusted bytes may enter the pipeline. Checks run in a fixed
//! order and stop at the first failure:
//!
//! 1. byte length against the size ceiling
//! 2. format sniffed from magic bytes, then cross-checked against the filename extension
//! 3. header dimensions against the dimension and pixel ceilings
//! 4. full decode under allocation limits
//! 5. malware scan of the raw bytes (async, fail closed)
//!
//! Nothing is stripped or re-encoded here; the stored original is exactly what was scanned.

use crate::scan::{MalwareScanner, ScanError};
use bytes::Bytes;
use image::{ImageFormat, ImageReader, Limits};
use std::io::Cursor;
use std::path::Path;
use vellum_core::{AppError, ImageFormatKind, RejectionReason, ValidationSettings};

/// Why an upload was refused
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("File too large: {size} bytes (max: {max} bytes)")]
    FileTooLarge { size: usize, max: usize },

    #[error("Empty file")]
    EmptyFile,

    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("File extension '{extension}' does not match detected format {detected}")]
    ExtensionMismatch {
        extension: String,
        detected: ImageFormatKind,
    },

    #[error("Image dimensions {width}x{height} exceed maximum {max}x{max}")]
    DimensionsExceeded { width: u32, height: u32, max: u32 },

    #[error("Image has {pixels} pixels (max: {max})")]
    PixelCountExceeded { pixels: u64, max: u64 },

    #[error("Image could not be decoded: {0}")]
    DecodeFailed(String),

    #[error("Malware detected: {0}")]
    MalwareDetected(String),

    #[error("Malware scan unavailable: {0}")]
    ScannerUnavailable(#[from] ScanError),
}

impl ValidationError {
    pub fn reason(&self) -> RejectionReason {
        match self {
            ValidationError::FileTooLarge { .. } => RejectionReason::TooLarge,
            ValidationError::EmptyFile | ValidationError::DecodeFailed(_) => {
                RejectionReason::DecodeFailed
            }
            ValidationError::UnsupportedFormat(_) | ValidationError::ExtensionMismatch { .. } => {
                RejectionReason::UnsupportedFormat
            }
            ValidationError::DimensionsExceeded { .. } => RejectionReason::DimensionsExceeded,
            ValidationError::PixelCountExceeded { .. } => RejectionReason::PixelCountExceeded,
            ValidationError::MalwareDetected(_) | ValidationError::ScannerUnavailable(_) => {
                RejectionReason::MalwareDetected
            }
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::ScannerUnavailable(e) => AppError::ScannerUnavailable(e.to_string()),
            other => AppError::rejected(other.reason(), other.to_string()),
        }
    }
}

/// Metadata extracted from an accepted upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedImage {
    pub format: ImageFormatKind,
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
    pub byte_size: u64,
}

#[derive(Debug, Clone)]
pub struct ImageValidator {
    settings: ValidationSettings,
}

impl ImageValidator {
    pub fn new(settings: ValidationSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ValidationSettings {
        &self.settings
    }

    /// Run every synchronous check. Pure: no I/O, no shared state.
    pub fn inspect(&self, data: &[u8], filename: &str) -> Result<ValidatedImage, ValidationError> {
        self.check_size(data)?;
        let format = self.detect_format(data, filename)?;
        let (width, height) = self.check_header_dimensions(data, format)?;
        self.decode(data, format)?;

        Ok(ValidatedImage {
            format,
            mime_type: format.mime_type(),
            width,
            height,
            byte_size: data.len() as u64,
        })
    }

    /// Full gate: `inspect` on the blocking pool, then the malware scan.
    pub async fn validate(
        &self,
        data: Bytes,
        filename: &str,
        scanner: &dyn MalwareScanner,
    ) -> Result<ValidatedImage, ValidationError> {
        let validator = self.clone();
        let owned = data.clone();
        let name = filename.to_string();
        let validated = tokio::task::spawn_blocking(move || validator.inspect(&owned, &name))
            .await
            .map_err(|e| ValidationError::DecodeFailed(format!("Decoder task failed: {}", e)))??;

        let verdict = scanner.scan(&data).await?;
        if verdict.infected {
            tracing::warn!(
                scanner = scanner.name(),
                signature = %verdict.signature,
                filename = %filename,
                "Upload rejected by malware scan"
            );
            return Err(ValidationError::MalwareDetected(verdict.signature));
        }

        Ok(validated)
    }

    fn check_size(&self, data: &[u8]) -> Result<(), ValidationError> {
        if data.is_empty() {
            return Err(ValidationError::EmptyFile);
        }
        if data.len() > self.settings.max_file_size_bytes {
            return Err(ValidationError::FileTooLarge {
                size: data.len(),
                max: self.settings.max_file_size_bytes,
            });
        }
        Ok(())
    }

    /// Format comes from content only; the extension can veto but never decide.
    fn detect_format(&self, data: &[u8], filename: &str) -> Result<ImageFormatKind, ValidationError> {
        let detected = image::guess_format(data)
            .ok()
            .and_then(format_kind)
            .ok_or_else(|| {
                ValidationError::UnsupportedFormat("unrecognized file signature".to_string())
            })?;

        if !self.settings.allowed_formats.contains(&detected) {
            return Err(ValidationError::UnsupportedFormat(detected.to_string()));
        }

        if let Some(extension) = Path::new(filename).extension().and_then(|e| e.to_str()) {
            if ImageFormatKind::from_extension(extension) != Some(detected) {
                return Err(ValidationError::ExtensionMismatch {
                    extension: extension.to_lowercase(),
                    detected,
                });
            }
        }

        Ok(detected)
    }

    /// Reads only the header, so a decompression bomb is refused before its
    /// pixel buffer is allocated.
    fn check_header_dimensions(
        &self,
        data: &[u8],
        format: ImageFormatKind,
    ) -> Result<(u32, u32), ValidationError> {
        let (width, height) = ImageReader::with_format(Cursor::new(data), image_format(format))
            .into_dimensions()
            .map_err(|e| ValidationError::DecodeFailed(e.to_string()))?;

        let max = self.settings.max_dimension;
        if width > max || height > max {
            return Err(ValidationError::DimensionsExceeded { width, height, max });
        }

        let pixels = u64::from(width) * u64::from(height);
        if pixels > self.settings.max_pixels {
            return Err(ValidationError::PixelCountExceeded {
                pixels,
                max: self.settings.max_pixels,
            });
        }

        Ok((width, height))
    }

    fn decode(&self, data: &[u8], format: ImageFormatKind) -> Result<(), ValidationError> {
        let mut reader = ImageReader::with_format(Cursor::new(data), image_format(format));
        reader.limits(self.decode_limits());
        reader
            .decode()
            .map(|_| ())
            .map_err(|e| ValidationError::DecodeFailed(e.to_string()))
    }

    fn decode_limits(&self) -> Limits {
        let mut limits = Limits::default();
        limits.max_image_width = Some(self.settings.max_dimension);
        limits.max_image_height = Some(self.settings.max_dimension);
        // Widest supported pixel is RGBA16.
        limits.max_alloc = Some(self.settings.max_pixels.saturating_mul(8));
        limits
    }
}

pub(crate) fn format_kind(format: ImageFormat) -> Option<ImageFormatKind> {
    match format {
        ImageFormat::Jpeg => Some(ImageFormatKind::Jpeg),
        ImageFormat::Png => Some(ImageFormatKind::Png),
        ImageFormat::WebP => Some(ImageFormatKind::Webp),
        ImageFormat::Gif => Some(ImageFormatKind::Gif),
        _ => None,
    }
}

pub(crate) fn image_format(kind: ImageFormatKind) -> ImageFormat {
    match kind {
        ImageFormatKind::Jpeg => ImageFormat::Jpeg,
        ImageFormatKind::Png => ImageFormat::Png,
        ImageFormatKind::Webp => ImageFormat::WebP,
        ImageFormatKind::Gif => ImageFormat::Gif,
    }
}
