//! Requester identity and image visibility
//!
//! Authentication happens upstream; the gateway forwards the user id in
//! `X-User-Id`. Anything that is not a UUID is treated as unauthenticated.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;
use vellum_core::{AppError, Image, Visibility};

use crate::constants::USER_ID_HEADER;
use crate::error::HttpAppError;

/// Authenticated caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requester {
    pub user_id: Uuid,
}

impl Requester {
    pub fn new(user_id: Uuid) -> Self {
        Self { user_id }
    }
}

fn requester_from_parts(parts: &Parts) -> Result<Requester, AppError> {
    let value = parts
        .headers
        .get(USER_ID_HEADER)
        .ok_or_else(|| AppError::Unauthorized("Missing X-User-Id header".to_string()))?;

    let user_id = value
        .to_str()
        .ok()
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
        .ok_or_else(|| AppError::Unauthorized("X-User-Id must be a UUID".to_string()))?;

    Ok(Requester::new(user_id))
}

// Extracted from request parts so it composes with Multipart
impl<S> FromRequestParts<S> for Requester
where
    S: Send + Sync,
{
    type Rejection = HttpAppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        requester_from_parts(parts).map_err(HttpAppError::from)
    }
}

/// Decides who may see an image
pub trait AccessPolicy: Send + Sync {
    fn can_view(&self, requester: &Requester, image: &Image) -> bool;
}

/// Owners see their images; everyone sees public ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct OwnerOrPublicPolicy;

impl AccessPolicy for OwnerOrPublicPolicy {
    fn can_view(&self, requester: &Requester, image: &Image) -> bool {
        image.owner_id == requester.user_id || image.visibility == Visibility::Public
    }
}
