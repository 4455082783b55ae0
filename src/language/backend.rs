//! Translation model backends
//!
//! The translator only talks to [`TranslationModelLoader`] and
//! [`TranslationModel`]. Production uses an IndicTrans2 host over HTTP,
//! one model per direction.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use super::Language;

#[derive(Error, Debug)]
pub enum TranslationError {
    #[error("Model load failed: {0}")]
    Load(String),

    #[error("Translation request failed: {0}")]
    Request(String),

    #[error("Translation backend returned status {0}")]
    Status(u16),

    #[error("Expected {expected} translations, got {got}")]
    LengthMismatch { expected: usize, got: usize },

    #[error("Language pair {0} -> {1} is not served by this model")]
    Unsupported(Language, Language),
}

impl From<reqwest::Error> for TranslationError {
    fn from(err: reqwest::Error) -> Self {
        TranslationError::Request(err.to_string())
    }
}

/// Which of the two star-topology models a pair needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// English to an Indic language
    FromBase,
    /// An Indic language to English
    ToBase,
}

impl Direction {
    pub fn model_name(&self) -> &'static str {
        match self {
            Direction::FromBase => "ai4bharat/indictrans2-en-indic-dist-200M",
            Direction::ToBase => "ai4bharat/indictrans2-indic-en-dist-200M",
        }
    }
}

/// A loaded single-direction model
#[async_trait]
pub trait TranslationModel: Send + Sync {
    /// Translate every text, preserving order and length
    async fn translate(
        &self,
        texts: &[String],
        source: Language,
        target: Language,
    ) -> Result<Vec<String>, TranslationError>;
}

/// Loads a model the first time its direction is needed
#[async_trait]
pub trait TranslationModelLoader: Send + Sync {
    async fn load(&self, direction: Direction) -> Result<Arc<dyn TranslationModel>, TranslationError>;
}

#[derive(Serialize)]
struct LoadRequest<'a> {
    model: &'a str,
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    model: &'a str,
    src_lang: &'a str,
    tgt_lang: &'a str,
    sentences: &'a [String],
}

#[derive(Deserialize)]
struct TranslateResponse {
    translations: Vec<String>,
}

/// Loader for an IndicTrans2 model host
pub struct IndicTransLoader {
    client: reqwest::Client,
    endpoint: String,
}

impl IndicTransLoader {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, TranslationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| TranslationError::Load(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl TranslationModelLoader for IndicTransLoader {
    async fn load(&self, direction: Direction) -> Result<Arc<dyn TranslationModel>, TranslationError> {
        let model = direction.model_name();
        info!("Loading translation model {}", model);

        let response = self
            .client
            .post(format!("{}/models/load", self.endpoint))
            .json(&LoadRequest { model })
            .send()
            .await
            .map_err(|e| TranslationError::Load(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TranslationError::Load(format!(
                "{} answered {}",
                model,
                response.status()
            )));
        }

        Ok(Arc::new(IndicTransModel {
            client: self.client.clone(),
            endpoint: self.endpoint.clone(),
            direction,
        }))
    }
}

struct IndicTransModel {
    client: reqwest::Client,
    endpoint: String,
    direction: Direction,
}

#[async_trait]
impl TranslationModel for IndicTransModel {
    async fn translate(
        &self,
        texts: &[String],
        source: Language,
        target: Language,
    ) -> Result<Vec<String>, TranslationError> {
        let (Some(src_lang), Some(tgt_lang)) = (source.model_code(), target.model_code()) else {
            return Err(TranslationError::Unsupported(source, target));
        };

        let response = self
            .client
            .post(format!("{}/translate", self.endpoint))
            .json(&TranslateRequest {
                model: self.direction.model_name(),
                src_lang,
                tgt_lang,
                sentences: texts,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TranslationError::Status(response.status().as_u16()));
        }

        let body: TranslateResponse = response.json().await?;
        if body.translations.len() != texts.len() {
            return Err(TranslationError::LengthMismatch {
                expected: texts.len(),
                got: body.translations.len(),
            });
        }
        Ok(body.translations)
    }
}
