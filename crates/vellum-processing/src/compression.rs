use anyhow::{anyhow, Result};
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use vellum_core::ImageFormatKind;

/// Quality presets for variant encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QualityPreset {
    #[default]
    Normal, // Default quality, balanced size and quality
    Better,   // Higher quality, ≈125% file size
    Best,     // Near pristine quality, ≈170% file size
    Lighter,  // Smaller files, ≈80% file size
    Lightest, // Maximum compression, ≈50% file size
}

impl QualityPreset {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "normal" => Ok(QualityPreset::Normal),
            "better" => Ok(QualityPreset::Better),
            "best" => Ok(QualityPreset::Best),
            "lighter" => Ok(QualityPreset::Lighter),
            "lightest" => Ok(QualityPreset::Lightest),
            _ => Err(anyhow!("Invalid quality preset: {}", s)),
        }
    }

    /// Get quality value for JPEG (0-100)
    pub fn jpeg_quality(self) -> u8 {
        match self {
            QualityPreset::Normal => 75,
            QualityPreset::Better => 85,
            QualityPreset::Best => 95,
            QualityPreset::Lighter => 65,
            QualityPreset::Lightest => 50,
        }
    }

    /// Get quality value for WebP (0-100)
    pub fn webp_quality(self) -> f32 {
        match self {
            QualityPreset::Normal => 80.0,
            QualityPreset::Better => 90.0,
            QualityPreset::Best => 98.0,
            QualityPreset::Lighter => 70.0,
            QualityPreset::Lightest => 55.0,
        }
    }
}

/// Encodings a variant can be written in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
    WebP,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "png" => Ok(OutputFormat::Png),
            "webp" => Ok(OutputFormat::WebP),
            _ => Err(anyhow!("Invalid variant format: {}", s)),
        }
    }

    /// GIF is accepted on upload but never emitted.
    pub fn from_kind(kind: ImageFormatKind) -> Result<Self> {
        match kind {
            ImageFormatKind::Jpeg => Ok(OutputFormat::Jpeg),
            ImageFormatKind::Png => Ok(OutputFormat::Png),
            ImageFormatKind::Webp => Ok(OutputFormat::WebP),
            ImageFormatKind::Gif => Err(anyhow!("GIF is not a supported variant format")),
        }
    }

    pub fn kind(self) -> ImageFormatKind {
        match self {
            OutputFormat::Jpeg => ImageFormatKind::Jpeg,
            OutputFormat::Png => ImageFormatKind::Png,
            OutputFormat::WebP => ImageFormatKind::Webp,
        }
    }

    pub fn to_mime_type(self) -> &'static str {
        self.kind().mime_type()
    }
}

/// Variant encoder
pub struct ImageCompressor;

impl ImageCompressor {
    /// Encode a decoded image. Output never shares bytes with the source file.
    pub fn compress(img: &DynamicImage, format: OutputFormat, quality: QualityPreset) -> Result<Bytes> {
        match format {
            OutputFormat::Jpeg => Self::compress_jpeg(img, quality),
            OutputFormat::Png => Self::compress_png(img),
            OutputFormat::WebP => Self::compress_webp(img, quality),
        }
    }

    /// JPEG has no alpha channel, so flatten to RGB first
    fn compress_jpeg(img: &DynamicImage, quality: QualityPreset) -> Result<Bytes> {
        let rgb_img = img.to_rgb8();
        let mut buffer = Vec::new();

        let encoder = JpegEncoder::new_with_quality(&mut buffer, quality.jpeg_quality());
        rgb_img.write_with_encoder(encoder)?;

        Ok(Bytes::from(buffer))
    }

    fn compress_png(img: &DynamicImage) -> Result<Bytes> {
        let mut buffer = Vec::new();
        let mut cursor = Cursor::new(&mut buffer);

        img.write_to(&mut cursor, ImageFormat::Png)?;

        Ok(Bytes::from(buffer))
    }

    fn compress_webp(img: &DynamicImage, quality: QualityPreset) -> Result<Bytes> {
        let rgba_img = img.to_rgba8();
        let (width, height) = rgba_img.dimensions();

        let encoder = webp::Encoder::from_rgba(&rgba_img, width, height);
        let webp_data = encoder.encode(quality.webp_quality());

        Ok(Bytes::copy_from_slice(&webp_data))
    }
}
