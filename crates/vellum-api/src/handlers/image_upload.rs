use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};

use crate::auth::Requester;
use crate::error::HttpAppError;
use crate::services::upload::UploadRequest;
use crate::state::AppState;
use crate::utils::upload::extract_upload_form;

/// Upload image handler
///
/// Accepts the upload once the original is stored and a processing job is
/// queued; variants are generated asynchronously.
///
/// # Returns
/// `202 Accepted` with `{id, status: "processing", status_url}` and a
/// `Location` header pointing at the status endpoint.
///
/// # Errors
/// - `413` / `415` / `422` / `400` - Validation rejection, see `reason` in the body
/// - `401` - Missing or malformed `X-User-Id`
/// - `503` - Scanner, storage, database or queue unavailable
#[tracing::instrument(
    skip(state, multipart),
    fields(user_id = %requester.user_id, operation = "upload_image")
)]
pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    requester: Requester,
    multipart: Multipart,
) -> Result<impl IntoResponse, HttpAppError> {
    let form = extract_upload_form(multipart).await?;

    let receipt = state
        .uploads
        .upload(UploadRequest {
            owner_id: requester.user_id,
            data: form.data,
            filename: form.filename,
            title: form.title,
            visibility: form.visibility,
            tags: form.tags,
        })
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        [(header::LOCATION, receipt.status_url.clone())],
        Json(receipt),
    ))
}
