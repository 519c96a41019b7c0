//! Variant generation
//!
//! Decodes a validated original once, bakes in EXIF orientation and derives every
//! variant class from it. Each rendition is resized from the next larger one to
//! keep the CPU cost of big originals down. Every output is re-encoded.
//!
//! The bounded classes never enlarge, so an original smaller than a class's edge is
//! kept at its own size. The thumbnail is the exception: it is always exactly
//! 150x150, so originals under 150 px on either side are scaled up to cover it.

use super::orientation::ImageOrientation;
use super::resize;
use crate::compression::{ImageCompressor, OutputFormat, QualityPreset};
use crate::error::ProcessingError;
use bytes::Bytes;
use image::{DynamicImage, ImageReader, Limits};
use std::io::Cursor;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use vellum_core::{ImageFormatKind, ValidationSettings, VariantClass};

/// One encoded rendition, ready to be stored
#[derive(Debug, Clone)]
pub struct EncodedVariant {
    pub class: VariantClass,
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormatKind,
}

#[derive(Debug, Clone)]
pub struct VariantGenerator {
    format: OutputFormat,
    quality: QualityPreset,
    limits: Limits,
}

impl VariantGenerator {
    pub fn new(format: OutputFormat, quality: QualityPreset, settings: &ValidationSettings) -> Self {
        let mut limits = Limits::default();
        limits.max_image_width = Some(settings.max_dimension);
        limits.max_image_height = Some(settings.max_dimension);
        limits.max_alloc = Some(settings.max_pixels.saturating_mul(8));

        Self {
            format,
            quality,
            limits,
        }
    }

    pub fn output_format(&self) -> OutputFormat {
        self.format
    }

    /// Produce one variant per class, ordered by class.
    ///
    /// Checks `cancel` between renditions so a timed-out job stops burning CPU and
    /// drops its buffers.
    pub fn generate(
        &self,
        original: &[u8],
        cancel: &CancellationToken,
    ) -> Result<Vec<EncodedVariant>, ProcessingError> {
        let start = Instant::now();
        let img = self.decode(original)?;
        let img = ImageOrientation::apply_exif_orientation(img, original);

        let large = self.checked(cancel, || resize::fit(&img, VariantClass::Large.max_edge()))?;
        drop(img);
        let medium = self.checked(cancel, || resize::fit(&large, VariantClass::Medium.max_edge()))?;
        let small = self.checked(cancel, || resize::fit(&medium, VariantClass::Small.max_edge()))?;
        let thumbnail =
            self.checked(cancel, || resize::cover(&medium, VariantClass::Thumbnail.max_edge()))?;

        let mut variants = Vec::with_capacity(VariantClass::ALL.len());
        for (class, rendition) in [
            (VariantClass::Thumbnail, &thumbnail),
            (VariantClass::Small, &small),
            (VariantClass::Medium, &medium),
            (VariantClass::Large, &large),
        ] {
            if cancel.is_cancelled() {
                return Err(ProcessingError::Cancelled);
            }
            variants.push(self.encode(class, rendition, original)?);
        }

        tracing::debug!(
            variant_count = variants.len(),
            format = ?self.format,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Generated variants"
        );

        Ok(variants)
    }

    fn decode(&self, data: &[u8]) -> Result<DynamicImage, ProcessingError> {
        let mut reader = ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .map_err(|e| ProcessingError::Decode(e.to_string()))?;
        reader.limits(self.limits.clone());
        reader
            .decode()
            .map_err(|e| ProcessingError::Decode(e.to_string()))
    }

    fn checked(
        &self,
        cancel: &CancellationToken,
        step: impl FnOnce() -> DynamicImage,
    ) -> Result<DynamicImage, ProcessingError> {
        if cancel.is_cancelled() {
            return Err(ProcessingError::Cancelled);
        }
        Ok(step())
    }

    fn encode(
        &self,
        class: VariantClass,
        img: &DynamicImage,
        original: &[u8],
    ) -> Result<EncodedVariant, ProcessingError> {
        let data = ImageCompressor::compress(img, self.format, self.quality).map_err(|e| {
            ProcessingError::Encode {
                class,
                message: e.to_string(),
            }
        })?;

        if data.as_ref() == original {
            return Err(ProcessingError::NotReencoded(class));
        }

        Ok(EncodedVariant {
            class,
            data,
            width: img.width(),
            height: img.height(),
            format: self.format.kind(),
        })
    }
}
