//! Speech to text for voice descriptions
//!
//! Wraps a Whisper host. When no host is configured, or it cannot be
//! reached, callers get `ServiceUnavailable` rather than an empty string.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use super::Language;
use crate::service::ServiceSlot;
use crate::utils::error::{AdvisoryError, Result};

#[derive(Error, Debug)]
pub enum TranscriptionError {
    /// Backend could not be reached
    #[error("Transcription backend unreachable: {0}")]
    Unreachable(String),

    /// Backend answered but could not transcribe
    #[error("Transcription failed: {0}")]
    Failed(String),
}

impl From<TranscriptionError> for AdvisoryError {
    fn from(err: TranscriptionError) -> Self {
        match err {
            TranscriptionError::Unreachable(msg) => AdvisoryError::ServiceUnavailable(msg),
            TranscriptionError::Failed(msg) => AdvisoryError::Inference(msg),
        }
    }
}

/// Transcribed text and the language it was read as
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcription {
    pub text: String,
    pub language: String,
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    /// `language` of `None` asks the backend to detect it
    async fn transcribe(
        &self,
        audio: Vec<u8>,
        filename: &str,
        language: Option<Language>,
    ) -> std::result::Result<Transcription, TranscriptionError>;
}

/// Whisper name for languages the speech model is used with
fn whisper_language(language: Language) -> Option<&'static str> {
    match language {
        Language::En => Some("english"),
        Language::Ta => Some("tamil"),
        Language::Kn => Some("kannada"),
        _ => None,
    }
}

#[derive(Deserialize)]
struct WhisperResponse {
    text: String,
    #[serde(default)]
    language: Option<String>,
}

/// HTTP client for a Whisper host
pub struct WhisperClient {
    client: reqwest::Client,
    endpoint: String,
}

impl WhisperClient {
    pub fn new(endpoint: impl Into<String>, timeout_secs: u64) -> std::result::Result<Self, TranscriptionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| TranscriptionError::Unreachable(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Transcriber for WhisperClient {
    async fn transcribe(
        &self,
        audio: Vec<u8>,
        filename: &str,
        language: Option<Language>,
    ) -> std::result::Result<Transcription, TranscriptionError> {
        let mut form = Form::new()
            .part("file", Part::bytes(audio).file_name(filename.to_string()))
            .text("task", "transcribe");
        if let Some(name) = language.and_then(whisper_language) {
            form = form.text("language", name);
        }

        let response = self
            .client
            .post(format!("{}/transcribe", self.endpoint))
            .multipart(form)
            .send()
            .await
            .map_err(|e| TranscriptionError::Unreachable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TranscriptionError::Failed(format!(
                "Whisper host answered {}",
                response.status()
            )));
        }

        let body: WhisperResponse = response
            .json()
            .await
            .map_err(|e| TranscriptionError::Failed(e.to_string()))?;

        Ok(Transcription {
            text: body.text.trim().to_string(),
            language: body.language.unwrap_or_else(|| "unknown".to_string()),
        })
    }
}

/// Transcription entry point used by the pipeline and the host
pub struct TranscriptionService {
    backend: ServiceSlot<Arc<dyn Transcriber>>,
}

impl TranscriptionService {
    pub fn new(backend: ServiceSlot<Arc<dyn Transcriber>>) -> Self {
        Self { backend }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_ready()
    }

    pub async fn transcribe(
        &self,
        audio: Vec<u8>,
        filename: &str,
        expected: Option<&str>,
    ) -> Result<Transcription> {
        let backend = self.backend.ready("Transcription service")?;
        if audio.is_empty() {
            return Err(AdvisoryError::Validation("audio upload is empty".to_string()));
        }

        // Unknown or unsupported hints fall back to detection
        let language = expected
            .and_then(|code| code.parse::<Language>().ok())
            .filter(|lang| whisper_language(*lang).is_some());

        match backend.transcribe(audio, filename, language).await {
            Ok(transcription) => {
                info!(language = %transcription.language, chars = transcription.text.len(), "Audio transcribed");
                Ok(transcription)
            }
            Err(e) => {
                warn!("Transcription failed: {}", e);
                Err(e.into())
            }
        }
    }
}
