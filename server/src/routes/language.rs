//! Language endpoints - translation, transcription and the language list

use axum::{
    extract::{Multipart, State},
    Json,
};
use serde::Deserialize;

use krishilok::language::{supported_languages, LanguageInfo, Transcription, TranslationOutcome};

use crate::error::{ApiError, ApiResult};
use crate::routes::{ok, ApiResponse};
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct TranslateRequest {
    pub texts: Vec<String>,
    #[serde(default = "default_source")]
    pub source: String,
    pub target: String,
}

fn default_source() -> String {
    "en".to_string()
}

/// POST /language/translate
pub async fn translate(
    State(state): State<SharedState>,
    Json(body): Json<TranslateRequest>,
) -> ApiResult<Json<ApiResponse<TranslationOutcome>>> {
    let outcome = state
        .services
        .translate(&body.texts, &body.source, &body.target)
        .await?;
    Ok(ok(outcome))
}

/// POST /language/transcribe - Multipart `audio` file with an optional `language` hint
pub async fn transcribe(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> ApiResult<Json<ApiResponse<Transcription>>> {
    let mut audio = Vec::new();
    let mut filename = "audio.wav".to_string();
    let mut language = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("audio") => {
                if let Some(name) = field.file_name() {
                    filename = name.to_string();
                }
                audio = field.bytes().await?.to_vec();
            }
            Some("language") => language = Some(field.text().await?),
            _ => {}
        }
    }

    if audio.is_empty() {
        return Err(ApiError::bad_request("Missing audio upload"));
    }

    let transcription = state
        .services
        .transcription
        .transcribe(audio, &filename, language.as_deref())
        .await?;
    Ok(ok(transcription))
}

/// GET /language/supported
pub async fn supported() -> Json<ApiResponse<Vec<LanguageInfo>>> {
    ok(supported_languages())
}
