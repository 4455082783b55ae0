//! Test doubles shared by the unit tests

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::{ImageFormat, Rgb, RgbImage};

use crate::advice::{GenerationError, TextGenerator};
use crate::backend::Device;
use crate::community::CommunityAdviceItem;
use crate::inference::{EngineFailure, InferenceEngine};
use crate::language::transcription::TranscriptionError;
use crate::language::{
    Direction, Language, Transcriber, Transcription, TranslationError, TranslationModel, TranslationModelLoader,
};
use crate::store::CommunityStore;
use crate::utils::error::{AdvisoryError, Result};

/// A small PNG with a green gradient, enough to pass decoding
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, 160, (y % 256) as u8])
    });
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

/// Inference engine returning fixed logits after a queue of failures
pub struct ScriptedEngine {
    logits: Vec<f32>,
    accelerated: bool,
    failures: Mutex<VecDeque<EngineFailure>>,
    devices: Mutex<Vec<Device>>,
}

impl ScriptedEngine {
    pub fn always(logits: Vec<f32>) -> Self {
        Self {
            logits,
            accelerated: false,
            failures: Mutex::new(VecDeque::new()),
            devices: Mutex::new(Vec::new()),
        }
    }

    pub fn accelerated(logits: Vec<f32>) -> Self {
        Self {
            accelerated: true,
            ..Self::always(logits)
        }
    }

    pub fn then_fail(self, failure: EngineFailure) -> Self {
        self.failures.lock().unwrap().push_back(failure);
        self
    }

    /// Device of every forward call so far
    pub fn devices(&self) -> Vec<Device> {
        self.devices.lock().unwrap().clone()
    }
}

impl InferenceEngine for ScriptedEngine {
    fn forward(&self, _input: &[f32], device: Device) -> std::result::Result<Vec<f32>, EngineFailure> {
        self.devices.lock().unwrap().push(device);
        match self.failures.lock().unwrap().pop_front() {
            Some(failure) => Err(failure),
            None => Ok(self.logits.clone()),
        }
    }

    fn supports_accelerator(&self) -> bool {
        self.accelerated
    }
}

/// Columns: English, Tamil, Kannada
const DICTIONARY: [[&str; 3]; 2] = [
    ["Early Blight", "ஆரம்பகால கருகல்", "ಆರಂಭಿಕ ಅಂಗಮಾರಿ"],
    ["Spray neem oil", "வேப்ப எண்ணெய் தெளிக்கவும்", "ಬೇವಿನ ಎಣ್ಣೆ ಸಿಂಪಡಿಸಿ"],
];

fn column(language: Language) -> Option<usize> {
    match language {
        Language::En => Some(0),
        Language::Ta => Some(1),
        Language::Kn => Some(2),
        _ => None,
    }
}

/// Phrasebook model; unknown text comes back tagged with the target code
struct DictionaryModel;

#[async_trait]
impl TranslationModel for DictionaryModel {
    async fn translate(
        &self,
        texts: &[String],
        source: Language,
        target: Language,
    ) -> std::result::Result<Vec<String>, TranslationError> {
        let (src, tgt) = match (column(source), column(target)) {
            (Some(src), Some(tgt)) => (src, tgt),
            _ => return Err(TranslationError::Unsupported(source, target)),
        };
        Ok(texts
            .iter()
            .map(|text| {
                DICTIONARY
                    .iter()
                    .find(|row| row[src] == text.as_str())
                    .map(|row| row[tgt].to_string())
                    .unwrap_or_else(|| format!("[{}] {}", target.code(), text))
            })
            .collect())
    }
}

/// Loader counting load attempts, optionally failing the first few
pub struct DictionaryLoader {
    loads: AtomicUsize,
    failures_left: AtomicUsize,
}

impl DictionaryLoader {
    pub fn sample() -> Self {
        Self {
            loads: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(0),
        }
    }

    pub fn failing_loads(self, count: usize) -> Self {
        self.failures_left.store(count, Ordering::SeqCst);
        self
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranslationModelLoader for DictionaryLoader {
    async fn load(&self, direction: Direction) -> std::result::Result<Arc<dyn TranslationModel>, TranslationError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(TranslationError::Load(format!("{} not reachable", direction.model_name())));
        }
        Ok(Arc::new(DictionaryModel))
    }
}

/// Generated advice in the requested seven-part layout
pub const WELL_FORMED_ADVICE: &str = "\
1. **SUMMARY**
Leaf spot is a fungal disease that spreads fast in humid weather.

2. **IMMEDIATE ACTIONS**
- Remove and burn infected leaves
- Avoid overhead irrigation

3. **TREATMENT PLAN**
Chemical:
- Mancozeb 2.5 g per litre, every 10 days
Organic:
- Neem oil 5 ml per litre

4. **PREVENTION TIPS**
- Use disease-free seedlings
- Keep 45 cm between plants

5. **TIMELINE**
Visible improvement within 10-14 days.

6. **COST ESTIMATE**
Rs 400-600 per acre.

7. **URGENCY LEVEL**
High - act within two days.
";

enum Behaviour {
    Reply(String),
    Hang,
    Fail,
}

/// Generator with a fixed behaviour that records its prompts
pub struct ScriptedGenerator {
    behaviour: Behaviour,
    calls: AtomicUsize,
    last_prompt: Mutex<String>,
}

impl ScriptedGenerator {
    fn with(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(String::new()),
        }
    }

    pub fn replying(text: &str) -> Self {
        Self::with(Behaviour::Reply(text.to_string()))
    }

    /// Never answers
    pub fn hanging() -> Self {
        Self::with(Behaviour::Hang)
    }

    pub fn failing() -> Self {
        Self::with(Behaviour::Fail)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> String {
        self.last_prompt.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, _system_prompt: &str, user_prompt: &str) -> std::result::Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().unwrap() = user_prompt.to_string();
        match &self.behaviour {
            Behaviour::Reply(text) => Ok(text.clone()),
            Behaviour::Hang => std::future::pending().await,
            Behaviour::Fail => Err(GenerationError::Status {
                status: 503,
                body: "upstream overloaded".to_string(),
            }),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

/// Transcriber returning fixed text and recording the language it was asked for
pub struct FixedTranscriber {
    text: Option<String>,
    last_language: Mutex<Option<Option<Language>>>,
}

impl FixedTranscriber {
    pub fn new(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            last_language: Mutex::new(None),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            text: None,
            last_language: Mutex::new(None),
        }
    }

    pub fn last_language(&self) -> Option<Option<Language>> {
        *self.last_language.lock().unwrap()
    }
}

#[async_trait]
impl Transcriber for FixedTranscriber {
    async fn transcribe(
        &self,
        _audio: Vec<u8>,
        _filename: &str,
        language: Option<Language>,
    ) -> std::result::Result<Transcription, TranscriptionError> {
        *self.last_language.lock().unwrap() = Some(language);
        match &self.text {
            Some(text) => Ok(Transcription {
                text: text.clone(),
                language: language.map(|l| l.code().to_string()).unwrap_or_else(|| "ta".to_string()),
            }),
            None => Err(TranscriptionError::Unreachable("connection refused".to_string())),
        }
    }
}

/// Community store whose every call fails
pub struct FailingCommunityStore;

#[async_trait]
impl CommunityStore for FailingCommunityStore {
    async fn insert_advice(&self, _item: CommunityAdviceItem) -> Result<()> {
        Err(AdvisoryError::Storage("community collection offline".into()))
    }

    async fn advice_for_disease(&self, _disease_label: &str) -> Result<Vec<CommunityAdviceItem>> {
        Err(AdvisoryError::Storage("community collection offline".into()))
    }

    async fn advice_for_scan(&self, _scan_id: &str) -> Result<Vec<CommunityAdviceItem>> {
        Err(AdvisoryError::Storage("community collection offline".into()))
    }

    async fn increment_helpful(&self, _scan_id: &str, _advice_id: &str) -> Result<Option<CommunityAdviceItem>> {
        Err(AdvisoryError::Storage("community collection offline".into()))
    }
}
