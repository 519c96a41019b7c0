use super::image::ImageRepository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;
use vellum_core::{AppError, Image, ImageStatus};

/// Process-local image store with the same compare-and-set semantics as Postgres.
/// Nothing survives a restart.
#[derive(Default)]
pub struct InMemoryImageRepository {
    images: RwLock<HashMap<Uuid, Image>>,
}

impl InMemoryImageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.images.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.images.read().await.is_empty()
    }
}

#[async_trait]
impl ImageRepository for InMemoryImageRepository {
    async fn insert(&self, image: &Image) -> Result<(), AppError> {
        let mut images = self.images.write().await;
        if images.contains_key(&image.id) {
            return Err(AppError::Internal(format!("Image {} already exists", image.id)));
        }
        images.insert(image.id, image.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Image>, AppError> {
        Ok(self.images.read().await.get(&id).cloned())
    }

    async fn save(&self, image: &Image) -> Result<bool, AppError> {
        let mut images = self.images.write().await;
        match images.get_mut(&image.id) {
            Some(stored) if stored.status() == ImageStatus::Processing => {
                *stored = image.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_stale_processing(
        &self,
        updated_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Image>, AppError> {
        let images = self.images.read().await;
        let mut stale: Vec<Image> = images
            .values()
            .filter(|i| i.status() == ImageStatus::Processing && i.updated_at() < updated_before)
            .cloned()
            .collect();
        stale.sort_by_key(|i| i.updated_at());
        stale.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(stale)
    }

    async fn touch(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, AppError> {
        let mut images = self.images.write().await;
        match images.get_mut(&id) {
            Some(stored) if stored.status() == ImageStatus::Processing => {
                stored.touch(now);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
