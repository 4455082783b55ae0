//! Inference module for crop disease classification
//!
//! This module provides:
//! - Image preprocessing matching the training transform
//! - The inference engine seam and its Burn implementation
//! - The per-crop classifier with accelerator fallback

pub mod classifier;
pub mod engine;
pub mod preprocess;

pub use classifier::{CropCategory, CropModel, ImageClassifier, LabelProbability, Prediction};
pub use engine::{BurnEngine, EngineFailure, InferenceEngine, ModelArtifacts};
