//! Languages, machine translation and speech transcription
//!
//! English is the base language. Advice and knowledge are stored in
//! English and translated at the edges.

pub mod backend;
pub mod transcription;
pub mod translator;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::utils::error::{AdvisoryError, Result};

pub use backend::{Direction, IndicTransLoader, TranslationError, TranslationModel, TranslationModelLoader};
pub use transcription::{Transcriber, Transcription, TranscriptionService, WhisperClient};
pub use translator::{TranslationMode, TranslationOutcome, Translator};

/// Languages a farmer can ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Hi,
    Ta,
    Te,
    Kn,
    Mr,
}

/// Hub language for every translation
pub const BASE_LANGUAGE: Language = Language::En;

impl Language {
    pub const ALL: [Language; 6] = [
        Language::En,
        Language::Hi,
        Language::Ta,
        Language::Te,
        Language::Kn,
        Language::Mr,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Hi => "hi",
            Language::Ta => "ta",
            Language::Te => "te",
            Language::Kn => "kn",
            Language::Mr => "mr",
        }
    }

    /// English name, used inside generation prompts
    pub fn english_name(&self) -> &'static str {
        match self {
            Language::En => "English",
            Language::Hi => "Hindi",
            Language::Ta => "Tamil",
            Language::Te => "Telugu",
            Language::Kn => "Kannada",
            Language::Mr => "Marathi",
        }
    }

    pub fn native_name(&self) -> &'static str {
        match self {
            Language::En => "English",
            Language::Hi => "हिन्दी",
            Language::Ta => "தமிழ்",
            Language::Te => "తెలుగు",
            Language::Kn => "ಕನ್ನಡ",
            Language::Mr => "मराठी",
        }
    }

    /// Flores-style code of the translation models, for languages they cover
    pub fn model_code(&self) -> Option<&'static str> {
        match self {
            Language::En => Some("eng_Latn"),
            Language::Ta => Some("tam_Taml"),
            Language::Kn => Some("kan_Knda"),
            _ => None,
        }
    }

    /// Whether machine translation covers this language
    pub fn is_translatable(&self) -> bool {
        self.model_code().is_some()
    }

    pub fn is_base(&self) -> bool {
        *self == BASE_LANGUAGE
    }

    /// Parse a code, treating anything unknown as the base language
    pub fn parse_or_base(code: &str) -> Self {
        code.parse().unwrap_or(BASE_LANGUAGE)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = AdvisoryError;

    fn from_str(s: &str) -> Result<Self> {
        let code = s.trim().to_lowercase();
        Language::ALL
            .iter()
            .copied()
            .find(|lang| lang.code() == code)
            .ok_or_else(|| AdvisoryError::Validation(format!("Unsupported language '{}'", s)))
    }
}

/// Entry of the supported-languages listing
#[derive(Debug, Clone, Serialize)]
pub struct LanguageInfo {
    pub code: &'static str,
    pub name: &'static str,
    pub native_name: &'static str,
    pub translatable: bool,
}

pub fn supported_languages() -> Vec<LanguageInfo> {
    Language::ALL
        .iter()
        .map(|lang| LanguageInfo {
            code: lang.code(),
            name: lang.english_name(),
            native_name: lang.native_name(),
            translatable: lang.is_translatable(),
        })
        .collect()
}
