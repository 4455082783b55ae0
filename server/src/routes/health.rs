//! Health and crop listing endpoints

use axum::{extract::State, Json};
use serde::Serialize;

use krishilok::bootstrap::HealthReport;
use krishilok::CropCategory;

use crate::routes::{ok, ApiResponse};
use crate::state::SharedState;

#[derive(Serialize)]
pub struct HealthResponse {
    #[serde(flatten)]
    pub report: HealthReport,
    pub uptime_seconds: u64,
    pub version: String,
}

/// GET /health - Service readiness
pub async fn health_check(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        report: state.services.health(),
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[derive(Serialize)]
pub struct CropInfo {
    pub crop: CropCategory,
    pub model_loaded: bool,
    pub diseases: Vec<String>,
}

/// GET /crops - Supported crops and the labels each model can produce
pub async fn list_crops(State(state): State<SharedState>) -> Json<ApiResponse<Vec<CropInfo>>> {
    let classifier = state.orchestrator().classifier();
    let crops = CropCategory::ALL
        .iter()
        .map(|&crop| CropInfo {
            crop,
            model_loaded: classifier.is_model_loaded(crop),
            diseases: classifier
                .class_names(crop)
                .map(|names| names.to_vec())
                .unwrap_or_default(),
        })
        .collect();
    ok(crops)
}
