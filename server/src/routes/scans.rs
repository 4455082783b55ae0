//! Scan endpoints - submit, read, list, delete and community advice

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::info;

use krishilok::community::{Author, CommunityAdviceItem};
use krishilok::pipeline::{ScanDetails, ScanOutcome, ScanPage, ScanSubmission};

use crate::error::{ApiError, ApiResult};
use crate::routes::{ok, ApiResponse, UserId};
use crate::state::SharedState;

const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct LanguageQuery {
    pub language: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewAdvice {
    pub author_name: String,
    pub location: Option<String>,
    pub advice: String,
}

/// POST /scans - Classify an uploaded image and synthesize advice
///
/// Multipart fields: `image` (file), `crop`, optional `description`,
/// optional `language` (defaults to `en`).
pub async fn create_scan(
    State(state): State<SharedState>,
    UserId(user_id): UserId,
    mut multipart: Multipart,
) -> ApiResult<Json<ApiResponse<ScanOutcome>>> {
    let mut image = Vec::new();
    let mut crop = None;
    let mut description = None;
    let mut language = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("image") => image = field.bytes().await?.to_vec(),
            Some("crop") => crop = Some(field.text().await?),
            Some("description") => description = Some(field.text().await?).filter(|d| !d.trim().is_empty()),
            Some("language") => language = Some(field.text().await?),
            _ => {}
        }
    }

    if image.is_empty() {
        return Err(ApiError::bad_request("Missing image upload"));
    }
    let crop = crop.ok_or_else(|| ApiError::bad_request("Missing crop field"))?;

    info!(user_id = %user_id, crop = %crop, bytes = image.len(), "Scan submitted");
    let outcome = state
        .orchestrator()
        .submit_scan(ScanSubmission {
            user_id,
            image,
            crop,
            description,
            language: language.unwrap_or_else(|| "en".to_string()),
            image_ref: None,
        })
        .await?;

    Ok(ok(outcome))
}

/// GET /scans - The caller's scans, newest first
pub async fn list_scans(
    State(state): State<SharedState>,
    UserId(user_id): UserId,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<ApiResponse<ScanPage>>> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let page = state
        .orchestrator()
        .list_scans(&user_id, query.skip.unwrap_or(0), limit)
        .await?;
    Ok(ok(page))
}

/// GET /scans/:id - One scan, optionally translated
pub async fn get_scan(
    State(state): State<SharedState>,
    UserId(user_id): UserId,
    Path(id): Path<String>,
    Query(query): Query<LanguageQuery>,
) -> ApiResult<Json<ApiResponse<ScanDetails>>> {
    let details = state
        .orchestrator()
        .fetch_scan(&id, &user_id, query.language.as_deref())
        .await?;
    Ok(ok(details))
}

/// DELETE /scans/:id
pub async fn delete_scan(
    State(state): State<SharedState>,
    UserId(user_id): UserId,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.orchestrator().delete_scan(&id, &user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /scans/:id/advice - Share advice on a completed scan
pub async fn add_advice(
    State(state): State<SharedState>,
    UserId(user_id): UserId,
    Path(id): Path<String>,
    Json(body): Json<NewAdvice>,
) -> ApiResult<(StatusCode, Json<ApiResponse<CommunityAdviceItem>>)> {
    let author = Author {
        id: user_id,
        name: body.author_name,
        location: body.location,
    };
    let item = state.orchestrator().add_advice(&id, author, &body.advice).await?;
    Ok((StatusCode::CREATED, ok(item)))
}

/// GET /scans/:id/advice
pub async fn list_advice(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<Vec<CommunityAdviceItem>>>> {
    let items = state.orchestrator().advice_for_scan(&id).await?;
    Ok(ok(items))
}

/// POST /scans/:id/advice/:advice_id/helpful
pub async fn mark_helpful(
    State(state): State<SharedState>,
    UserId(user_id): UserId,
    Path((id, advice_id)): Path<(String, String)>,
) -> ApiResult<Json<ApiResponse<CommunityAdviceItem>>> {
    let item = state
        .orchestrator()
        .mark_helpful(&id, &advice_id, &user_id)
        .await?;
    Ok(ok(item))
}
