//! Trust score endpoints

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::routes::{ok, ApiResponse, UserId};
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    /// Rating from 1 to 5
    pub score: u8,
}

#[derive(Debug, Serialize)]
pub struct TrustScoreResponse {
    pub user_id: String,
    pub trust_score: f64,
}

/// POST /trust/feedback - Rate the advice you received
pub async fn submit_feedback(
    State(state): State<SharedState>,
    UserId(user_id): UserId,
    Json(body): Json<FeedbackRequest>,
) -> ApiResult<Json<ApiResponse<TrustScoreResponse>>> {
    let trust_score = state.orchestrator().submit_feedback(&user_id, body.score).await?;
    Ok(ok(TrustScoreResponse { user_id, trust_score }))
}

/// GET /trust/:user_id
pub async fn get_score(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<ApiResponse<TrustScoreResponse>>> {
    let trust_score = state.orchestrator().trust_score(&user_id).await?;
    Ok(ok(TrustScoreResponse { user_id, trust_score }))
}

/// POST /trust/:user_id/recompute - Rebuild the score from the event log
pub async fn recompute(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<ApiResponse<TrustScoreResponse>>> {
    let trust_score = state.orchestrator().recompute_trust(&user_id).await?;
    Ok(ok(TrustScoreResponse { user_id, trust_score }))
}
