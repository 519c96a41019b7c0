//! Image aggregate and its variant renditions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

use super::format::ImageFormatKind;

/// Processing state of an image. `Active` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageStatus {
    Processing,
    Active,
    Failed,
}

impl ImageStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ImageStatus::Processing)
    }
}

impl FromStr for ImageStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "processing" => Ok(ImageStatus::Processing),
            "active" => Ok(ImageStatus::Active),
            "failed" => Ok(ImageStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid image status: {}", s)),
        }
    }
}

impl Display for ImageStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ImageStatus::Processing => write!(f, "processing"),
            ImageStatus::Active => write!(f, "active"),
            ImageStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Fixed set of renditions derived from every upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantClass {
    Thumbnail,
    Small,
    Medium,
    Large,
}

impl VariantClass {
    pub const ALL: [VariantClass; 4] = [
        VariantClass::Thumbnail,
        VariantClass::Small,
        VariantClass::Medium,
        VariantClass::Large,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            VariantClass::Thumbnail => "thumbnail",
            VariantClass::Small => "small",
            VariantClass::Medium => "medium",
            VariantClass::Large => "large",
        }
    }

    /// Edge length of the square bounding box for this class.
    pub fn max_edge(self) -> u32 {
        match self {
            VariantClass::Thumbnail => 150,
            VariantClass::Small => 320,
            VariantClass::Medium => 800,
            VariantClass::Large => 1600,
        }
    }

    /// Thumbnails are cropped to fill the box exactly; other classes fit inside it.
    pub fn is_cover_crop(self) -> bool {
        matches!(self, VariantClass::Thumbnail)
    }
}

impl FromStr for VariantClass {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "thumbnail" => Ok(VariantClass::Thumbnail),
            "small" => Ok(VariantClass::Small),
            "medium" => Ok(VariantClass::Medium),
            "large" => Ok(VariantClass::Large),
            _ => Err(anyhow::anyhow!("Invalid variant class: {}", s)),
        }
    }
}

impl Display for VariantClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// Who may see an image. Passed through from the upload request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    Public,
}

impl FromStr for Visibility {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "private" => Ok(Visibility::Private),
            "public" => Ok(Visibility::Public),
            _ => Err(anyhow::anyhow!("Invalid visibility: {}", s)),
        }
    }
}

impl Display for Visibility {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Visibility::Private => write!(f, "private"),
            Visibility::Public => write!(f, "public"),
        }
    }
}

/// One stored rendition of an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub class: VariantClass,
    pub key: String,
    pub width: u32,
    pub height: u32,
    pub byte_size: u64,
    pub format: ImageFormatKind,
}

/// Aggregate invariant violations. These indicate a programming defect, not bad input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImageError {
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: ImageStatus, to: ImageStatus },

    #[error("Variant {0} already present")]
    DuplicateVariant(VariantClass),

    #[error("Variants are frozen in status {0}")]
    VariantsFrozen(ImageStatus),

    #[error("Missing variants: {0:?}")]
    IncompleteVariants(Vec<VariantClass>),
}

/// Attributes fixed at upload time.
#[derive(Debug, Clone)]
pub struct NewImage {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub original_filename: String,
    pub mime_type: String,
    pub byte_size: u64,
    pub width: u32,
    pub height: u32,
    pub original_key: String,
    pub title: Option<String>,
    pub visibility: Visibility,
    pub tags: Vec<String>,
}

/// Uploaded asset. Status, variants and failure reason only change through the
/// transition methods so the state machine cannot be bypassed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub original_filename: String,
    pub mime_type: String,
    pub byte_size: u64,
    pub width: u32,
    pub height: u32,
    pub original_key: String,
    pub title: Option<String>,
    pub visibility: Visibility,
    pub tags: Vec<String>,
    status: ImageStatus,
    variants: Vec<Variant>,
    failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Image {
    /// Create a freshly uploaded image in `processing`.
    pub fn new(new: NewImage, now: DateTime<Utc>) -> Self {
        Self::restore(new, ImageStatus::Processing, Vec::new(), None, now, now)
    }

    /// Rebuild an image from persisted state.
    pub fn restore(
        new: NewImage,
        status: ImageStatus,
        variants: Vec<Variant>,
        failure_reason: Option<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new.id,
            owner_id: new.owner_id,
            original_filename: new.original_filename,
            mime_type: new.mime_type,
            byte_size: new.byte_size,
            width: new.width,
            height: new.height,
            original_key: new.original_key,
            title: new.title,
            visibility: new.visibility,
            tags: new.tags,
            status,
            variants,
            failure_reason,
            created_at,
            updated_at,
        }
    }

    pub fn status(&self) -> ImageStatus {
        self.status
    }

    pub fn variants(&self) -> &[Variant] {
        &self.variants
    }

    pub fn variant(&self, class: VariantClass) -> Option<&Variant> {
        self.variants.iter().find(|v| v.class == class)
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn add_variant(&mut self, variant: Variant) -> Result<(), ImageError> {
        if self.status != ImageStatus::Processing {
            return Err(ImageError::VariantsFrozen(self.status));
        }
        if self.variant(variant.class).is_some() {
            return Err(ImageError::DuplicateVariant(variant.class));
        }
        self.variants.push(variant);
        Ok(())
    }

    /// `processing -> active`. Requires one variant for every class.
    pub fn mark_active(&mut self, now: DateTime<Utc>) -> Result<(), ImageError> {
        self.ensure_processing(ImageStatus::Active)?;

        let missing: Vec<VariantClass> = VariantClass::ALL
            .into_iter()
            .filter(|class| self.variant(*class).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(ImageError::IncompleteVariants(missing));
        }

        self.variants.sort_by_key(|v| v.class);
        self.status = ImageStatus::Active;
        self.updated_at = now;
        Ok(())
    }

    /// `processing -> failed`.
    pub fn mark_failed(
        &mut self,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), ImageError> {
        self.ensure_processing(ImageStatus::Failed)?;
        self.status = ImageStatus::Failed;
        self.failure_reason = Some(reason.into());
        self.updated_at = now;
        Ok(())
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    fn ensure_processing(&self, to: ImageStatus) -> Result<(), ImageError> {
        if self.status != ImageStatus::Processing {
            return Err(ImageError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        Ok(())
    }
}
