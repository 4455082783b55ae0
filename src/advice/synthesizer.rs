//! Advice synthesis with caching and a knowledge-only fallback
//!
//! `synthesize` never fails. A missing knowledge entry, an unconfigured
//! generator, a timeout or a bad response all end in a complete payload
//! built from whatever knowledge exists.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::cache::{AdviceCache, CachedAdvice};
use super::generator::{GenerationError, TextGenerator};
use super::parser::{fallback_payload, parse_generation};
use super::prompt::{user_prompt, SYSTEM_PROMPT};
use super::{AdvicePayload, TRANSLATED_FIELDS};
use crate::config::{CacheConfig, GenerationConfig};
use crate::knowledge::DiseaseKnowledgeEntry;
use crate::language::{Language, TranslationMode, Translator, BASE_LANGUAGE};
use crate::service::ServiceSlot;

/// Inputs to one synthesis
#[derive(Debug, Clone)]
pub struct AdviceRequest<'a> {
    /// Classifier label, the cache and knowledge key
    pub label: &'a str,
    /// English display name used in the prompt
    pub disease_name: &'a str,
    pub crop: &'a str,
    /// Rendered knowledge entry, empty when unknown
    pub knowledge_context: &'a str,
    /// Classifier confidence, 0-100
    pub confidence: f64,
    pub entry: Option<&'a DiseaseKnowledgeEntry>,
    pub language: &'a str,
}

/// A payload plus how it was produced
#[derive(Debug, Clone)]
pub struct SynthesisOutcome {
    pub payload: AdvicePayload,
    /// Generation failed and the payload came from knowledge alone
    pub degraded: bool,
    pub cached: bool,
    pub translation: Option<TranslationMode>,
}

pub struct AdviceSynthesizer {
    generator: ServiceSlot<Arc<dyn TextGenerator>>,
    translator: Option<Arc<Translator>>,
    cache: AdviceCache,
    timeout: Duration,
}

impl AdviceSynthesizer {
    pub fn new(
        generator: ServiceSlot<Arc<dyn TextGenerator>>,
        translator: Option<Arc<Translator>>,
        cache: AdviceCache,
        timeout: Duration,
    ) -> Self {
        Self {
            generator,
            translator,
            cache,
            timeout,
        }
    }

    pub fn from_config(
        generator: ServiceSlot<Arc<dyn TextGenerator>>,
        translator: Option<Arc<Translator>>,
        generation: &GenerationConfig,
        cache: &CacheConfig,
    ) -> Self {
        Self::new(
            generator,
            translator,
            AdviceCache::new(cache.capacity, Duration::from_secs(cache.ttl_hours * 3600)),
            Duration::from_secs(generation.timeout_secs),
        )
    }

    pub fn is_generation_available(&self) -> bool {
        self.generator.is_ready()
    }

    pub fn cache(&self) -> &AdviceCache {
        &self.cache
    }

    /// Target language when the payload will be machine translated
    fn translation_target(&self, language: &str) -> Option<Language> {
        let target = language.parse::<Language>().ok()?;
        (self.translator.is_some() && !target.is_base() && target.is_translatable()).then_some(target)
    }

    pub async fn synthesize(&self, request: AdviceRequest<'_>) -> SynthesisOutcome {
        let language = request.language.trim().to_lowercase();
        let key = AdviceCache::key(request.label, &language);

        if let Some(hit) = self.cache.get(&key) {
            debug!(disease = %request.label, language = %language, "Advice cache hit");
            return SynthesisOutcome {
                payload: hit.payload,
                degraded: hit.degraded,
                cached: true,
                translation: None,
            };
        }

        let translate_to = self.translation_target(&language);
        // Machine-translated payloads are generated in English
        let prompt_language = match translate_to {
            Some(_) => BASE_LANGUAGE,
            None => Language::parse_or_base(&language),
        };

        let (mut payload, degraded) = match self.generate(&request, prompt_language).await {
            Ok(text) => (parse_generation(&text, request.entry), false),
            Err(e) => {
                warn!(disease = %request.label, "Generation failed, using knowledge fallback: {}", e);
                (fallback_payload(request.entry), true)
            }
        };

        let mut translation = None;
        if let (Some(target), Some(translator)) = (translate_to, &self.translator) {
            let (translated, mode) = translate_payload(translator, &payload, BASE_LANGUAGE.code(), target.code()).await;
            payload = translated;
            translation = Some(mode);
        }

        // Fallbacks and untranslated payloads are retried on the next call
        if degraded || translation == Some(TranslationMode::Degraded) {
            debug!(disease = %request.label, language = %language, "Degraded advice not cached");
        } else {
            self.cache.insert(
                key,
                CachedAdvice {
                    payload: payload.clone(),
                    degraded,
                },
            );
        }

        info!(
            disease = %request.label,
            language = %language,
            degraded,
            "Advice synthesized"
        );
        SynthesisOutcome {
            payload,
            degraded,
            cached: false,
            translation,
        }
    }

    async fn generate(&self, request: &AdviceRequest<'_>, language: Language) -> Result<String, GenerationError> {
        let generator = self
            .generator
            .as_ready()
            .ok_or_else(|| GenerationError::Unavailable("no generation backend".to_string()))?;

        let prompt = user_prompt(
            request.disease_name,
            request.crop,
            request.confidence,
            request.knowledge_context,
            language,
        );

        match tokio::time::timeout(self.timeout, generator.generate(SYSTEM_PROMPT, &prompt)).await {
            Ok(Ok(text)) if !text.trim().is_empty() => Ok(text),
            Ok(Ok(_)) => Err(GenerationError::EmptyResponse),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(GenerationError::Timeout(self.timeout)),
        }
    }
}

/// Translate the text fields of a payload
pub async fn translate_payload(
    translator: &Translator,
    payload: &AdvicePayload,
    source: &str,
    target: &str,
) -> (AdvicePayload, TranslationMode) {
    let value = match serde_json::to_value(payload) {
        Ok(value) => value,
        Err(e) => {
            warn!("Could not prepare advice for translation: {}", e);
            return (payload.clone(), TranslationMode::Degraded);
        }
    };

    let (translated, mode) = translator
        .translate_structured(&value, &TRANSLATED_FIELDS, source, target)
        .await;

    match serde_json::from_value(translated) {
        Ok(payload) => (payload, mode),
        Err(e) => {
            warn!("Translated advice did not fit the payload shape: {}", e);
            (payload.clone(), TranslationMode::Degraded)
        }
    }
}
