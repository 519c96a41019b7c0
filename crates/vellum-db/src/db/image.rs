use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres};
use uuid::Uuid;
use vellum_core::{AppError, Image, ImageStatus, NewImage, Variant, Visibility};

/// Persistence for the Image aggregate.
///
/// `save` is a compare-and-set on `status = processing`: terminal images are never
/// overwritten, which is what makes job redelivery safe.
#[async_trait]
pub trait ImageRepository: Send + Sync {
    async fn insert(&self, image: &Image) -> Result<(), AppError>;

    async fn get(&self, id: Uuid) -> Result<Option<Image>, AppError>;

    /// Write status, variants and failure reason. Returns `false` if the stored
    /// image had already left `processing`.
    async fn save(&self, image: &Image) -> Result<bool, AppError>;

    /// `processing` images whose `updated_at` is older than `updated_before`, oldest first
    async fn list_stale_processing(
        &self,
        updated_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Image>, AppError>;

    /// Bump `updated_at` of a `processing` image. Returns `false` if it is terminal or missing.
    async fn touch(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, AppError>;
}

const IMAGE_COLUMNS: &str = "id, owner_id, original_filename, mime_type, byte_size, width, height, \
     original_key, title, visibility, tags, status, variants, failure_reason, created_at, updated_at";

#[derive(Debug, FromRow)]
struct ImageRow {
    id: Uuid,
    owner_id: Uuid,
    original_filename: String,
    mime_type: String,
    byte_size: i64,
    width: i32,
    height: i32,
    original_key: String,
    title: Option<String>,
    visibility: String,
    tags: Vec<String>,
    status: String,
    variants: Json<Vec<Variant>>,
    failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn column_error(column: &str, err: impl std::fmt::Display) -> AppError {
    AppError::Internal(format!("Invalid value in images.{}: {}", column, err))
}

impl TryFrom<ImageRow> for Image {
    type Error = AppError;

    fn try_from(row: ImageRow) -> Result<Self, Self::Error> {
        let status: ImageStatus = row.status.parse().map_err(|e| column_error("status", e))?;
        let visibility: Visibility = row
            .visibility
            .parse()
            .map_err(|e| column_error("visibility", e))?;

        let new = NewImage {
            id: row.id,
            owner_id: row.owner_id,
            original_filename: row.original_filename,
            mime_type: row.mime_type,
            byte_size: u64::try_from(row.byte_size).map_err(|e| column_error("byte_size", e))?,
            width: u32::try_from(row.width).map_err(|e| column_error("width", e))?,
            height: u32::try_from(row.height).map_err(|e| column_error("height", e))?,
            original_key: row.original_key,
            title: row.title,
            visibility,
            tags: row.tags,
        };

        Ok(Image::restore(
            new,
            status,
            row.variants.0,
            row.failure_reason,
            row.created_at,
            row.updated_at,
        ))
    }
}

fn to_i32(value: u32, column: &str) -> Result<i32, AppError> {
    i32::try_from(value).map_err(|e| column_error(column, e))
}

/// Postgres-backed image repository
#[derive(Clone)]
pub struct PgImageRepository {
    pool: PgPool,
}

impl PgImageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ImageRepository for PgImageRepository {
    #[tracing::instrument(skip(self, image), fields(db.table = "images", db.operation = "insert", image_id = %image.id))]
    async fn insert(&self, image: &Image) -> Result<(), AppError> {
        let byte_size = i64::try_from(image.byte_size).map_err(|e| column_error("byte_size", e))?;

        sqlx::query(
            r#"
            INSERT INTO images (
                id, owner_id, original_filename, mime_type, byte_size, width, height,
                original_key, title, visibility, tags, status, variants, failure_reason,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(image.id)
        .bind(image.owner_id)
        .bind(&image.original_filename)
        .bind(&image.mime_type)
        .bind(byte_size)
        .bind(to_i32(image.width, "width")?)
        .bind(to_i32(image.height, "height")?)
        .bind(&image.original_key)
        .bind(&image.title)
        .bind(image.visibility.to_string())
        .bind(&image.tags)
        .bind(image.status().to_string())
        .bind(Json(image.variants()))
        .bind(image.failure_reason())
        .bind(image.created_at)
        .bind(image.updated_at())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "images", db.operation = "select", db.record_id = %id))]
    async fn get(&self, id: Uuid) -> Result<Option<Image>, AppError> {
        let row = sqlx::query_as::<Postgres, ImageRow>(&format!(
            "SELECT {} FROM images WHERE id = $1",
            IMAGE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Image::try_from).transpose()
    }

    #[tracing::instrument(skip(self, image), fields(db.table = "images", db.operation = "update", image_id = %image.id, status = %image.status()))]
    async fn save(&self, image: &Image) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE images
            SET status = $2,
                variants = $3,
                failure_reason = $4,
                updated_at = $5
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(image.id)
        .bind(image.status().to_string())
        .bind(Json(image.variants()))
        .bind(image.failure_reason())
        .bind(image.updated_at())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(skip(self), fields(db.table = "images", db.operation = "select"))]
    async fn list_stale_processing(
        &self,
        updated_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Image>, AppError> {
        let rows = sqlx::query_as::<Postgres, ImageRow>(&format!(
            "SELECT {} FROM images \
             WHERE status = 'processing' AND updated_at < $1 \
             ORDER BY updated_at ASC LIMIT $2",
            IMAGE_COLUMNS
        ))
        .bind(updated_before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Image::try_from).collect()
    }

    #[tracing::instrument(skip(self), fields(db.table = "images", db.operation = "update", db.record_id = %id))]
    async fn touch(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE images SET updated_at = $2 WHERE id = $1 AND status = 'processing'",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
