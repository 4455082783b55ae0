//! Application configuration
//!
//! Loaded from a TOML file with every field defaulted, then patched from
//! environment variables so secrets never need to live in the file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::utils::error::{Result, ResultExt};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub models: ModelsConfig,
    pub knowledge: KnowledgeConfig,
    pub generation: GenerationConfig,
    pub cache: CacheConfig,
    pub translation: TranslationConfig,
    pub transcription: TranscriptionConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Directory holding `{crop}_model.mpk` and `{crop}_classes.txt`
    pub models_dir: PathBuf,
    /// Crops to load; unknown names are rejected at startup
    pub crops: Vec<String>,
    /// Prefer the accelerator when the build and host support it
    pub use_accelerator: bool,
    /// Square input size after center crop
    pub input_size: usize,
    /// CPU copies of each crop model serving requests in parallel
    pub cpu_replicas: usize,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from("ml_models"),
            crops: vec!["chilli".into(), "groundnut".into(), "rice".into()],
            use_accelerator: true,
            input_size: 224,
            cpu_replicas: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeConfig {
    pub path: PathBuf,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("knowledge_base/crop_diseases.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Missing key leaves generation unavailable and every scan uses the knowledge fallback
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub referer: String,
    pub title: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://openrouter.ai/api/v1".into(),
            model: "mistralai/ministral-3b".into(),
            timeout_secs: 30,
            referer: "http://localhost:8080".into(),
            title: "KrishiLok Agricultural Assistant".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub capacity: usize,
    pub ttl_hours: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            ttl_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    /// Base URL of the IndicTrans model host
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    /// Base URL of the Whisper host
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
        }
    }
}

/// Load a TOML configuration file into any deserializable type
pub fn load_toml_config<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    let content = fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse config {}", path.display()))
}

impl AppConfig {
    /// Load from an optional file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config: AppConfig = match path {
            Some(path) => load_toml_config(path)?,
            None => AppConfig::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply overrides from a variable lookup; empty values are ignored
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("OPENROUTER_API_KEY") {
            self.generation.api_key = Some(key);
        }
        if let Some(dir) = get("KRISHILOK_MODELS_DIR") {
            self.models.models_dir = PathBuf::from(dir);
        }
        if let Some(path) = get("KRISHILOK_KNOWLEDGE_PATH") {
            self.knowledge.path = PathBuf::from(path);
        }
        if let Some(url) = get("KRISHILOK_TRANSLATION_URL") {
            self.translation.endpoint = Some(url);
        }
        if let Some(url) = get("KRISHILOK_TRANSCRIPTION_URL") {
            self.transcription.endpoint = Some(url);
        }
    }
}
