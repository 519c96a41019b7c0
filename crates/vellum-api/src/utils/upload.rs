//! Multipart parsing for the upload endpoint

use axum::extract::multipart::MultipartError;
use axum::extract::Multipart;
use axum::http::StatusCode;
use bytes::Bytes;
use vellum_core::{AppError, RejectionReason, Visibility};

const MAX_FILENAME_LENGTH: usize = 255;
const MAX_TITLE_LENGTH: usize = 200;
const MAX_TAGS: usize = 32;

/// Fields of an upload form
#[derive(Debug)]
pub struct UploadForm {
    pub data: Bytes,
    pub filename: String,
    pub title: Option<String>,
    pub visibility: Visibility,
    pub tags: Vec<String>,
}

/// The body limit layer surfaces as a multipart error; keep it a size rejection
fn multipart_error(err: MultipartError, what: &str) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return AppError::rejected(
            RejectionReason::TooLarge,
            "Upload exceeds the maximum allowed size",
        );
    }
    AppError::InvalidInput(format!("Failed to read {}: {}", what, err.body_text()))
}

async fn field_text(field: axum::extract::multipart::Field<'_>, name: &str) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|e| multipart_error(e, &format!("field '{}'", name)))
}

/// Read the upload form. Only one field named "file" is accepted.
pub async fn extract_upload_form(mut multipart: Multipart) -> Result<UploadForm, AppError> {
    let mut data: Option<Bytes> = None;
    let mut filename: Option<String> = None;
    let mut title: Option<String> = None;
    let mut visibility = Visibility::default();
    let mut tags: Vec<String> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, "multipart"))?
    {
        let field_name = field.name().map(|s| s.to_string()).unwrap_or_default();

        match field_name.as_str() {
            "file" => {
                if data.is_some() {
                    return Err(AppError::InvalidInput(
                        "Multiple file fields are not allowed; send exactly one field named 'file'"
                            .to_string(),
                    ));
                }
                filename = field.file_name().map(|s| s.to_string());
                data = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| multipart_error(e, "file data"))?,
                );
            }
            "title" => {
                let value = field_text(field, "title").await?;
                let value = value.trim();
                if value.chars().count() > MAX_TITLE_LENGTH {
                    return Err(AppError::InvalidInput(format!(
                        "Title must be at most {} characters",
                        MAX_TITLE_LENGTH
                    )));
                }
                title = (!value.is_empty()).then(|| value.to_string());
            }
            "visibility" => {
                let value = field_text(field, "visibility").await?;
                visibility = value
                    .parse()
                    .map_err(|e: anyhow::Error| AppError::InvalidInput(e.to_string()))?;
            }
            "tags" => {
                let value = field_text(field, "tags").await?;
                tags.extend(parse_tags(&value));
            }
            other => {
                tracing::debug!(field = %other, "Ignoring unknown multipart field");
            }
        }
    }

    let data = data.ok_or_else(|| AppError::InvalidInput("No file provided".to_string()))?;

    tags.sort();
    tags.dedup();
    if tags.len() > MAX_TAGS {
        return Err(AppError::InvalidInput(format!(
            "At most {} tags are allowed",
            MAX_TAGS
        )));
    }

    Ok(UploadForm {
        data,
        filename: filename.unwrap_or_else(|| "unknown".to_string()),
        title,
        visibility,
        tags,
    })
}

/// Tags may be repeated fields or comma-separated
fn parse_tags(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split(',')
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
}

/// Strip directories and anything outside `[A-Za-z0-9._-]`.
///
/// The result is only stored as metadata; storage keys never use it.
pub fn sanitize_filename(filename: &str) -> String {
    let filename_only = filename
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(filename);

    let sanitized: String = filename_only
        .chars()
        .take(MAX_FILENAME_LENGTH)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let sanitized = sanitized.trim_start_matches('.');
    if sanitized.len() < 3 {
        "file".to_string()
    } else {
        sanitized.to_string()
    }
}
