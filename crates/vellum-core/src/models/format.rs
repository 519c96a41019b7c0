use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Raster formats the pipeline knows how to accept or emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormatKind {
    Jpeg,
    Png,
    Webp,
    Gif,
}

impl ImageFormatKind {
    pub const ALL: [ImageFormatKind; 4] = [
        ImageFormatKind::Jpeg,
        ImageFormatKind::Png,
        ImageFormatKind::Webp,
        ImageFormatKind::Gif,
    ];

    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormatKind::Jpeg => "image/jpeg",
            ImageFormatKind::Png => "image/png",
            ImageFormatKind::Webp => "image/webp",
            ImageFormatKind::Gif => "image/gif",
        }
    }

    /// Canonical file extension used when deriving storage keys.
    pub fn extension(self) -> &'static str {
        match self {
            ImageFormatKind::Jpeg => "jpg",
            ImageFormatKind::Png => "png",
            ImageFormatKind::Webp => "webp",
            ImageFormatKind::Gif => "gif",
        }
    }

    /// Map a filename extension (any case, no leading dot) to a format.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_lowercase().as_str() {
            "jpg" | "jpeg" | "jpe" | "jfif" => Some(ImageFormatKind::Jpeg),
            "png" => Some(ImageFormatKind::Png),
            "webp" => Some(ImageFormatKind::Webp),
            "gif" => Some(ImageFormatKind::Gif),
            _ => None,
        }
    }
}

impl FromStr for ImageFormatKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s.trim()).ok_or_else(|| anyhow::anyhow!("Invalid image format: {}", s))
    }
}

impl Display for ImageFormatKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ImageFormatKind::Jpeg => write!(f, "jpeg"),
            ImageFormatKind::Png => write!(f, "png"),
            ImageFormatKind::Webp => write!(f, "webp"),
            ImageFormatKind::Gif => write!(f, "gif"),
        }
    }
}
