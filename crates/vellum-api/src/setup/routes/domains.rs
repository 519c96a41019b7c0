//! Image route group

use crate::constants::API_PREFIX;
use crate::handlers;
use crate::state::AppState;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

pub fn image_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            &format!("{}/images", API_PREFIX),
            post(handlers::image_upload::upload_image),
        )
        .route(
            &format!("{}/images/{{id}}/status", API_PREFIX),
            get(handlers::image_status::get_image_status),
        )
}
