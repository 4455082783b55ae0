//! # KrishiLok
//!
//! Crop disease detection and treatment advisory for smallholder farmers.
//!
//! ## Features
//!
//! - **Per-crop classifiers** built with Burn, CPU by default with optional CUDA
//! - **Knowledge base** of disease records used as generation context and as fallback advice
//! - **Advice synthesis** through a text generation backend, cached and never failing
//! - **Translation** through an English hub, with speech transcription for voice notes
//! - **Community advice** ranked by helpful votes, with contributor trust scores
//!
//! ## Modules
//!
//! - `inference`: Image preprocessing, inference engines and the crop classifier
//! - `model`: CNN architecture built with Burn
//! - `knowledge`: Disease knowledge lookup and context rendering
//! - `advice`: Prompting, parsing, caching and the advice synthesizer
//! - `language`: Languages, translation and transcription
//! - `community`: Community advice ranking and trust scores
//! - `pipeline`: The scan orchestrator and scan records
//! - `store`: Storage traits and the in-memory store
//! - `utils`: Logging, errors and text helpers
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use krishilok::bootstrap::AdvisoryServices;
//! use krishilok::config::AppConfig;
//! use krishilok::pipeline::ScanSubmission;
//!
//! let services = AdvisoryServices::from_config(&AppConfig::load(None)?)?;
//! let outcome = services.orchestrator.submit_scan(ScanSubmission {
//!     user_id: "farmer-1".into(),
//!     image: std::fs::read("leaf.jpg")?,
//!     crop: "chilli".into(),
//!     description: None,
//!     language: "ta".into(),
//!     image_ref: None,
//! }).await?;
//! ```

pub mod advice;
pub mod backend;
pub mod bootstrap;
pub mod community;
pub mod config;
pub mod inference;
pub mod knowledge;
pub mod language;
pub mod model;
pub mod pipeline;
pub mod service;
pub mod store;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used items for convenience
pub use advice::{AdvicePayload, AdviceSynthesizer, Urgency};
pub use bootstrap::AdvisoryServices;
pub use config::AppConfig;
pub use inference::{CropCategory, ImageClassifier, Prediction};
pub use knowledge::{DiseaseKnowledgeEntry, KnowledgeRetriever};
pub use language::{Language, Translator};
pub use pipeline::{Orchestrator, ScanRecord, ScanStatus};
pub use service::ServiceSlot;
pub use utils::error::{AdvisoryError, ErrorKind, Result};

/// Default input size of the crop classifiers
pub const IMAGE_SIZE: usize = 224;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
