//! API routes

pub mod health;
pub mod language;
pub mod scans;
pub mod trust;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    Json,
};
use serde::Serialize;

use crate::error::ApiError;

/// Header set by the upstream auth layer
pub const USER_ID_HEADER: &str = "x-user-id";

/// Success envelope shared by every endpoint
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

pub fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse { success: true, data })
}

/// Authenticated caller, taken from the `X-User-Id` header
pub struct UserId(pub String);

fn user_id_from_parts(parts: &Parts) -> Result<UserId, ApiError> {
    parts
        .headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| UserId(id.to_string()))
        .ok_or_else(|| ApiError::bad_request("Missing X-User-Id header"))
}

#[async_trait]
impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        user_id_from_parts(parts)
    }
}
