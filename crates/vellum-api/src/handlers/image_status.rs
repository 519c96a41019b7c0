use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::auth::Requester;
use crate::error::HttpAppError;
use crate::state::AppState;

#[tracing::instrument(
    skip(state),
    fields(user_id = %requester.user_id, image_id = %id, operation = "get_image_status")
)]
pub async fn get_image_status(
    Path(id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
    requester: Requester,
) -> Result<impl IntoResponse, HttpAppError> {
    let view = state.status.status(id, &requester).await?;
    Ok(Json(view))
}
