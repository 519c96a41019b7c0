//! Image status lookup

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;
use vellum_core::{AppError, Image, ImageFormatKind, ImageStatus, VariantClass};
use vellum_db::ImageRepository;
use vellum_storage::Storage;

use crate::auth::{AccessPolicy, Requester};

#[derive(Debug, Clone, Serialize)]
pub struct VariantView {
    pub class: VariantClass,
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub byte_size: u64,
    pub format: ImageFormatKind,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageStatusView {
    pub id: Uuid,
    pub status: ImageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variants: Option<Vec<VariantView>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

/// Read-only view of an image's lifecycle, filtered by the access policy
#[derive(Clone)]
pub struct StatusTracker {
    images: Arc<dyn ImageRepository>,
    storage: Arc<dyn Storage>,
    policy: Arc<dyn AccessPolicy>,
}

impl StatusTracker {
    pub fn new(
        images: Arc<dyn ImageRepository>,
        storage: Arc<dyn Storage>,
        policy: Arc<dyn AccessPolicy>,
    ) -> Self {
        Self {
            images,
            storage,
            policy,
        }
    }

    /// Hidden and missing images are indistinguishable to the caller
    #[tracing::instrument(skip(self), fields(image_id = %id, user_id = %requester.user_id))]
    pub async fn status(&self, id: Uuid, requester: &Requester) -> Result<ImageStatusView, AppError> {
        let image = self
            .images
            .get(id)
            .await?
            .filter(|image| self.policy.can_view(requester, image))
            .ok_or_else(|| AppError::NotFound(format!("Image {} not found", id)))?;

        Ok(self.view(&image))
    }

    fn view(&self, image: &Image) -> ImageStatusView {
        let status = image.status();
        let variants = (status == ImageStatus::Active).then(|| {
            image
                .variants()
                .iter()
                .map(|v| VariantView {
                    class: v.class,
                    url: self.storage.url(&v.key),
                    width: v.width,
                    height: v.height,
                    byte_size: v.byte_size,
                    format: v.format,
                })
                .collect()
        });
        let failure_reason = match status {
            ImageStatus::Failed => image.failure_reason().map(String::from),
            _ => None,
        };

        ImageStatusView {
            id: image.id,
            status,
            variants,
            failure_reason,
        }
    }
}
