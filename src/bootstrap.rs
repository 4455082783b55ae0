//! Composition root
//!
//! Builds every service once from configuration. Anything that cannot be
//! built (missing model files, no API key, no translation host) becomes
//! an unavailable slot so the process still starts.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::advice::{AdviceSynthesizer, OpenRouterClient, TextGenerator};
use crate::backend;
use crate::config::AppConfig;
use crate::inference::ImageClassifier;
use crate::knowledge::KnowledgeRetriever;
use crate::language::{
    IndicTransLoader, Transcriber, TranscriptionService, TranslationOutcome, Translator, WhisperClient,
};
use crate::pipeline::{Orchestrator, Stores};
use crate::service::{ServiceSlot, SlotStatus};
use crate::store::MemoryStore;
use crate::utils::error::Result;

/// Readiness of every service, for the health endpoint and the CLI
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub backend: &'static str,
    pub models: BTreeMap<String, SlotStatus>,
    pub knowledge_entries: usize,
    pub generation: bool,
    pub translation: SlotStatus,
    pub transcription: bool,
}

pub struct AdvisoryServices {
    pub orchestrator: Arc<Orchestrator>,
    pub translator: ServiceSlot<Arc<Translator>>,
    pub transcription: Arc<TranscriptionService>,
}

fn generator_slot(config: &AppConfig) -> ServiceSlot<Arc<dyn TextGenerator>> {
    match OpenRouterClient::from_config(&config.generation) {
        Ok(client) => {
            info!(model = %client.model_name(), "Advice generation enabled");
            ServiceSlot::Ready(Arc::new(client))
        }
        Err(e) => {
            warn!("Advice generation disabled, knowledge fallback only: {}", e);
            ServiceSlot::unavailable(e.to_string())
        }
    }
}

fn translator_slot(config: &AppConfig) -> ServiceSlot<Arc<Translator>> {
    let Some(endpoint) = config.translation.endpoint.as_deref() else {
        warn!("No translation endpoint configured, advice stays untranslated");
        return ServiceSlot::unavailable("translation endpoint not configured");
    };
    IndicTransLoader::new(endpoint)
        .map(|loader| Arc::new(Translator::new(Arc::new(loader))))
        .into()
}

fn transcriber_slot(config: &AppConfig) -> ServiceSlot<Arc<dyn Transcriber>> {
    let Some(endpoint) = config.transcription.endpoint.as_deref() else {
        return ServiceSlot::unavailable("transcription endpoint not configured");
    };
    match WhisperClient::new(endpoint, config.transcription.timeout_secs) {
        Ok(client) => ServiceSlot::Ready(Arc::new(client)),
        Err(e) => ServiceSlot::unavailable(e.to_string()),
    }
}

impl AdvisoryServices {
    /// Build every service backed by an in-memory store
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::with_stores(config, Stores::from_memory(Arc::new(MemoryStore::new())))
    }

    pub fn with_stores(config: &AppConfig, stores: Stores) -> Result<Self> {
        let classifier = ImageClassifier::load(&config.models)?;
        let knowledge = KnowledgeRetriever::load_or_empty(&config.knowledge.path);
        let translator = translator_slot(config);

        let synthesizer = AdviceSynthesizer::from_config(
            generator_slot(config),
            translator.as_ready().cloned(),
            &config.generation,
            &config.cache,
        );

        let orchestrator = Orchestrator::new(
            Arc::new(classifier),
            Arc::new(knowledge),
            Arc::new(synthesizer),
            translator.clone(),
            stores,
        );

        Ok(Self {
            orchestrator: Arc::new(orchestrator),
            translator,
            transcription: Arc::new(TranscriptionService::new(transcriber_slot(config))),
        })
    }

    /// Translate free text; fails only when no translator was configured
    pub async fn translate(&self, texts: &[String], source: &str, target: &str) -> Result<TranslationOutcome> {
        let translator = self.translator.ready("Translation service")?;
        Ok(translator.translate_batch(texts, source, target).await)
    }

    pub fn health(&self) -> HealthReport {
        let models = self.orchestrator.classifier().model_status();
        let any_model = models.values().any(|status| status.ready);
        HealthReport {
            status: if any_model { "healthy" } else { "degraded" },
            backend: backend::backend_name(),
            models,
            knowledge_entries: self.orchestrator.knowledge().len(),
            generation: self.orchestrator.synthesizer().is_generation_available(),
            translation: self.translator.status(),
            transcription: self.transcription.is_available(),
        }
    }
}
