//! Best-effort translation with an English hub
//!
//! Only English <-> X pairs are served directly; X -> Y goes through
//! English in two calls. Each direction's model is loaded on first use.
//! Failures never propagate: the caller gets the original text back and
//! a degraded mode flag.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use super::backend::{Direction, TranslationError, TranslationModel, TranslationModelLoader};
use super::{Language, BASE_LANGUAGE};

/// How a batch was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslationMode {
    /// Source equals target, nothing to do
    Identity,
    Direct,
    /// Through the base language
    Pivot,
    /// Unsupported pair or backend failure; texts are the input
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslationOutcome {
    pub texts: Vec<String>,
    pub mode: TranslationMode,
}

impl TranslationOutcome {
    fn unchanged(texts: &[String], mode: TranslationMode) -> Self {
        Self {
            texts: texts.to_vec(),
            mode,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.mode == TranslationMode::Degraded
    }
}

pub struct Translator {
    loader: Arc<dyn TranslationModelLoader>,
    from_base: OnceCell<Arc<dyn TranslationModel>>,
    to_base: OnceCell<Arc<dyn TranslationModel>>,
}

impl Translator {
    pub fn new(loader: Arc<dyn TranslationModelLoader>) -> Self {
        Self {
            loader,
            from_base: OnceCell::new(),
            to_base: OnceCell::new(),
        }
    }

    /// Whether the model for `direction` has been loaded yet
    pub fn is_loaded(&self, direction: Direction) -> bool {
        self.cell(direction).initialized()
    }

    fn cell(&self, direction: Direction) -> &OnceCell<Arc<dyn TranslationModel>> {
        match direction {
            Direction::FromBase => &self.from_base,
            Direction::ToBase => &self.to_base,
        }
    }

    async fn model(&self, direction: Direction) -> Result<Arc<dyn TranslationModel>, TranslationError> {
        self.cell(direction)
            .get_or_try_init(|| self.loader.load(direction))
            .await
            .cloned()
    }

    async fn direct(
        &self,
        texts: &[String],
        source: Language,
        target: Language,
    ) -> Result<Vec<String>, TranslationError> {
        let direction = if source.is_base() {
            Direction::FromBase
        } else {
            Direction::ToBase
        };
        let translated = self.model(direction).await?.translate(texts, source, target).await?;
        if translated.len() != texts.len() {
            return Err(TranslationError::LengthMismatch {
                expected: texts.len(),
                got: translated.len(),
            });
        }
        Ok(translated)
    }

    /// Translate a batch, preserving order and length
    pub async fn translate_batch(&self, texts: &[String], source: &str, target: &str) -> TranslationOutcome {
        let (src_code, tgt_code) = (source.trim().to_lowercase(), target.trim().to_lowercase());
        if src_code == tgt_code || texts.is_empty() {
            return TranslationOutcome::unchanged(texts, TranslationMode::Identity);
        }

        let pair = match (src_code.parse::<Language>(), tgt_code.parse::<Language>()) {
            (Ok(s), Ok(t)) if s.is_translatable() && t.is_translatable() => (s, t),
            _ => {
                warn!(source = %src_code, target = %tgt_code, "Unsupported language pair, returning original text");
                return TranslationOutcome::unchanged(texts, TranslationMode::Degraded);
            }
        };

        let (source, target) = pair;
        let result = if source.is_base() || target.is_base() {
            self.direct(texts, source, target)
                .await
                .map(|texts| (texts, TranslationMode::Direct))
        } else {
            debug!(source = %source, target = %target, "Pivoting through {}", BASE_LANGUAGE);
            match self.direct(texts, source, BASE_LANGUAGE).await {
                Ok(hub) => self
                    .direct(&hub, BASE_LANGUAGE, target)
                    .await
                    .map(|texts| (texts, TranslationMode::Pivot)),
                Err(e) => Err(e),
            }
        };

        match result {
            Ok((texts, mode)) => TranslationOutcome { texts, mode },
            Err(e) => {
                warn!(source = %source, target = %target, "Translation failed, returning original text: {}", e);
                TranslationOutcome::unchanged(texts, TranslationMode::Degraded)
            }
        }
    }

    /// Translate one string
    pub async fn translate_text(&self, text: &str, source: &str, target: &str) -> String {
        let outcome = self.translate_batch(&[text.to_string()], source, target).await;
        outcome.texts.into_iter().next().unwrap_or_else(|| text.to_string())
    }

    /// Translate the named fields of a JSON record in one batch
    ///
    /// Fields are dotted paths (`treatment_plan.chemical`). String fields and
    /// the string items of list fields are translated; everything else,
    /// including fields not named, is left as is.
    pub async fn translate_structured(
        &self,
        record: &Value,
        fields: &[&str],
        source: &str,
        target: &str,
    ) -> (Value, TranslationMode) {
        let pointers: Vec<String> = fields.iter().map(|f| field_pointer(f)).collect();

        let mut texts = Vec::new();
        for pointer in &pointers {
            match record.pointer(pointer) {
                Some(Value::String(s)) if !s.is_empty() => texts.push(s.clone()),
                Some(Value::Array(items)) => {
                    texts.extend(items.iter().filter_map(|i| i.as_str().map(String::from)))
                }
                _ => {}
            }
        }

        if texts.is_empty() {
            return (record.clone(), TranslationMode::Identity);
        }

        let outcome = self.translate_batch(&texts, source, target).await;
        if outcome.is_degraded() || outcome.mode == TranslationMode::Identity {
            return (record.clone(), outcome.mode);
        }

        let mut translated = record.clone();
        let mut next = outcome.texts.into_iter();
        for pointer in &pointers {
            match translated.pointer_mut(pointer) {
                Some(Value::String(s)) if !s.is_empty() => {
                    if let Some(t) = next.next() {
                        *s = t;
                    }
                }
                Some(Value::Array(items)) => {
                    for item in items.iter_mut().filter(|i| i.is_string()) {
                        if let Some(t) = next.next() {
                            *item = Value::String(t);
                        }
                    }
                }
                _ => {}
            }
        }
        (translated, outcome.mode)
    }
}

fn field_pointer(field: &str) -> String {
    field
        .split('.')
        .map(|part| format!("/{}", part.replace('~', "~0").replace('/', "~1")))
        .collect()
}
