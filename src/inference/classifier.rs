//! Per-crop image classifier
//!
//! Holds one model per supported crop. A crop whose artefacts failed to
//! load stays registered as unavailable so callers can tell "try later"
//! apart from "bad input".

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backend::{self, Device};
use crate::config::ModelsConfig;
use crate::inference::engine::{load_class_names, BurnEngine, EngineFailure, InferenceEngine, ModelArtifacts};
use crate::inference::preprocess::{self, CROP_SIZE};
use crate::service::{ServiceSlot, SlotStatus};
use crate::utils::error::{AdvisoryError, Result};
use crate::utils::round2;

/// Supported crop categories, each with its own trained model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CropCategory {
    Chilli,
    Groundnut,
    Rice,
}

impl CropCategory {
    pub const ALL: [CropCategory; 3] = [CropCategory::Chilli, CropCategory::Groundnut, CropCategory::Rice];

    pub fn as_str(&self) -> &'static str {
        match self {
            CropCategory::Chilli => "chilli",
            CropCategory::Groundnut => "groundnut",
            CropCategory::Rice => "rice",
        }
    }
}

impl fmt::Display for CropCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CropCategory {
    type Err = AdvisoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "chilli" => Ok(CropCategory::Chilli),
            "groundnut" => Ok(CropCategory::Groundnut),
            "rice" => Ok(CropCategory::Rice),
            other => Err(AdvisoryError::Validation(format!(
                "Invalid crop type '{}'. Supported: chilli, groundnut, rice",
                other
            ))),
        }
    }
}

/// One label with its probability in percent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelProbability {
    pub label: String,
    pub probability: f64,
}

/// Result of a single prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    /// Arg-max label
    pub label: String,

    /// Probability of `label`, 0-100, two decimals
    pub confidence: f64,

    /// Every label, highest probability first
    pub all_probabilities: Vec<LabelProbability>,

    /// Device the successful pass ran on
    pub device: Device,

    pub inference_time_ms: f64,
}

impl Prediction {
    /// Rank class probabilities (0-1, same order as `class_names`)
    pub fn from_probabilities(
        class_names: &[String],
        probabilities: &[f64],
        device: Device,
        inference_time_ms: f64,
    ) -> Self {
        let mut ranked: Vec<LabelProbability> = class_names
            .iter()
            .zip(probabilities)
            .map(|(label, &p)| LabelProbability {
                label: label.clone(),
                probability: round2(p * 100.0),
            })
            .collect();
        // stable sort keeps class order among equal probabilities
        ranked.sort_by(|a, b| b.probability.total_cmp(&a.probability));

        let (label, confidence) = ranked
            .first()
            .map(|top| (top.label.clone(), top.probability))
            .unwrap_or_default();

        Self {
            label,
            confidence,
            all_probabilities: ranked,
            device,
            inference_time_ms,
        }
    }

    pub fn top_k(&self, k: usize) -> &[LabelProbability] {
        &self.all_probabilities[..k.min(self.all_probabilities.len())]
    }

    /// Label to percent map, as stored on scan records
    pub fn probability_map(&self) -> BTreeMap<String, f64> {
        self.all_probabilities
            .iter()
            .map(|p| (p.label.clone(), p.probability))
            .collect()
    }
}

/// Numerically stable softmax
pub fn softmax(logits: &[f32]) -> Vec<f64> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max) as f64;
    let exps: Vec<f64> = logits.iter().map(|&x| (x as f64 - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    if sum == 0.0 || !sum.is_finite() {
        return vec![1.0 / logits.len().max(1) as f64; logits.len()];
    }
    exps.into_iter().map(|e| e / sum).collect()
}

/// A loaded crop model and its label list
pub struct CropModel {
    pub class_names: Vec<String>,
    pub engine: Arc<dyn InferenceEngine>,
}

impl CropModel {
    pub fn new(class_names: Vec<String>, engine: Arc<dyn InferenceEngine>) -> Self {
        Self { class_names, engine }
    }
}

/// Classifier over every supported crop
pub struct ImageClassifier {
    models: HashMap<CropCategory, ServiceSlot<CropModel>>,
    /// Cleared for good after the first accelerator memory failure
    accelerator_enabled: AtomicBool,
    input_size: u32,
}

impl ImageClassifier {
    /// Classifier with every crop unavailable
    pub fn new() -> Self {
        let models = CropCategory::ALL
            .iter()
            .map(|&crop| (crop, ServiceSlot::unavailable("model not configured")))
            .collect();
        Self {
            models,
            accelerator_enabled: AtomicBool::new(backend::is_gpu_available()),
            input_size: CROP_SIZE,
        }
    }

    pub fn with_model(mut self, crop: CropCategory, model: CropModel) -> Self {
        self.models.insert(crop, ServiceSlot::Ready(model));
        self
    }

    pub fn with_unavailable(mut self, crop: CropCategory, reason: impl Into<String>) -> Self {
        self.models.insert(crop, ServiceSlot::unavailable(reason));
        self
    }

    pub fn with_accelerator(self, enabled: bool) -> Self {
        self.accelerator_enabled.store(enabled, Ordering::SeqCst);
        self
    }

    /// Load every configured crop; a crop that fails to load is marked unavailable
    pub fn load(config: &ModelsConfig) -> Result<Self> {
        let mut classifier = Self::new().with_accelerator(config.use_accelerator && backend::is_gpu_available());
        classifier.input_size = config.input_size as u32;

        for name in &config.crops {
            let crop: CropCategory = name.parse()?;
            let artifacts = ModelArtifacts::for_crop(&config.models_dir, crop.as_str());

            let loaded = load_class_names(&artifacts.classes).and_then(|class_names| {
                let engine = BurnEngine::load(
                    &artifacts,
                    class_names.len(),
                    config.input_size,
                    config.use_accelerator,
                    config.cpu_replicas,
                )?;
                Ok(CropModel::new(class_names, Arc::new(engine)))
            });

            match loaded {
                Ok(model) => {
                    info!(crop = %crop, classes = model.class_names.len(), "Loaded crop model");
                    classifier.models.insert(crop, ServiceSlot::Ready(model));
                }
                Err(e) => {
                    warn!(crop = %crop, "Crop model unavailable: {}", e);
                    classifier.models.insert(crop, ServiceSlot::unavailable(e.to_string()));
                }
            }
        }

        info!("Classifier backend: {}", backend::backend_name());
        Ok(classifier)
    }

    pub fn supported_crops(&self) -> Vec<CropCategory> {
        CropCategory::ALL.to_vec()
    }

    pub fn is_model_loaded(&self, crop: CropCategory) -> bool {
        self.models.get(&crop).map(ServiceSlot::is_ready).unwrap_or(false)
    }

    pub fn class_names(&self, crop: CropCategory) -> Result<&[String]> {
        Ok(&self.model(crop)?.class_names)
    }

    /// Readiness of each crop, keyed by crop name
    pub fn model_status(&self) -> BTreeMap<String, SlotStatus> {
        CropCategory::ALL
            .iter()
            .map(|crop| {
                let status = self
                    .models
                    .get(crop)
                    .map(ServiceSlot::status)
                    .unwrap_or(SlotStatus {
                        ready: false,
                        reason: Some("model not configured".into()),
                    });
                (crop.to_string(), status)
            })
            .collect()
    }

    pub fn current_device(&self) -> Device {
        if self.accelerator_enabled.load(Ordering::SeqCst) {
            Device::Gpu(0)
        } else {
            Device::Cpu
        }
    }

    fn model(&self, crop: CropCategory) -> Result<&CropModel> {
        match self.models.get(&crop) {
            Some(slot) => slot.ready(&format!("{} model", crop)),
            None => Err(AdvisoryError::ServiceUnavailable(format!(
                "{} model is not available",
                crop
            ))),
        }
    }

    /// Classify an uploaded image. Blocking; run it off the async executor.
    pub fn predict(&self, image: &[u8], crop: CropCategory) -> Result<Prediction> {
        let model = self.model(crop)?;
        let input = preprocess::preprocess_bytes(image, self.input_size)?;

        let start = Instant::now();
        let (logits, device) = self.forward_with_fallback(model, &input, crop)?;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        if logits.len() != model.class_names.len() {
            return Err(AdvisoryError::Inference(format!(
                "{} model produced {} outputs for {} classes",
                crop,
                logits.len(),
                model.class_names.len()
            )));
        }

        let prediction =
            Prediction::from_probabilities(&model.class_names, &softmax(&logits), device, elapsed_ms);
        debug!(
            crop = %crop,
            label = %prediction.label,
            confidence = prediction.confidence,
            device = %device,
            "Prediction complete"
        );
        Ok(prediction)
    }

    /// One forward pass; on accelerator memory exhaustion switch to the CPU and retry once
    fn forward_with_fallback(
        &self,
        model: &CropModel,
        input: &[f32],
        crop: CropCategory,
    ) -> Result<(Vec<f32>, Device)> {
        let device = if model.engine.supports_accelerator() {
            self.current_device()
        } else {
            Device::Cpu
        };

        match model.engine.forward(input, device) {
            Ok(logits) => Ok((logits, device)),
            Err(EngineFailure::OutOfMemory(msg)) if device.is_accelerated() => {
                warn!(crop = %crop, "Accelerator out of memory, retrying on CPU: {}", msg);
                self.accelerator_enabled.store(false, Ordering::SeqCst);
                model
                    .engine
                    .forward(input, Device::Cpu)
                    .map(|logits| (logits, Device::Cpu))
                    .map_err(|e| AdvisoryError::Inference(format!("CPU retry failed: {}", e)))
            }
            Err(e) => Err(AdvisoryError::Inference(e.to_string())),
        }
    }
}

impl Default for ImageClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{png_bytes, ScriptedEngine};
    use crate::utils::error::ErrorKind;

    fn chilli_classes() -> Vec<String> {
        vec![
            "chilli_healthy".to_string(),
            "chilli_leafspot".to_string(),
            "chilli_whitefly".to_string(),
        ]
    }

    #[test]
    fn test_crop_parse() {
        assert_eq!("Chilli".parse::<CropCategory>().unwrap(), CropCategory::Chilli);
        let err = "wheat".parse::<CropCategory>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let probs = softmax(&[1.0, 2.0, 3.0, 1000.0]);
        let sum: f64 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert!(probs[3] > 0.99);
    }

    #[test]
    fn test_prediction_is_ranked_percentages() {
        let engine = ScriptedEngine::always(vec![0.5, 3.0, 1.0]);
        let classifier = ImageClassifier::new()
            .with_model(CropCategory::Chilli, CropModel::new(chilli_classes(), Arc::new(engine)));

        let prediction = classifier
            .predict(&png_bytes(64, 48), CropCategory::Chilli)
            .unwrap();

        assert_eq!(prediction.label, "chilli_leafspot");
        assert!(chilli_classes().contains(&prediction.label));
        assert!(prediction.confidence > 0.0 && prediction.confidence <= 100.0);

        let probs = &prediction.all_probabilities;
        assert!(probs.windows(2).all(|w| w[0].probability >= w[1].probability));
        let total: f64 = probs.iter().map(|p| p.probability).sum();
        assert!((total - 100.0).abs() < 0.05);
        assert_eq!(prediction.top_k(2).len(), 2);
        assert_eq!(prediction.top_k(10).len(), 3);
    }

    #[test]
    fn test_unloaded_crop_is_service_unavailable() {
        let classifier = ImageClassifier::new().with_unavailable(CropCategory::Rice, "rice_model.mpk missing");
        let err = classifier.predict(&png_bytes(32, 32), CropCategory::Rice).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ServiceUnavailable);
        assert!(!classifier.is_model_loaded(CropCategory::Rice));
        assert!(!classifier.model_status()["rice"].ready);
    }

    #[test]
    fn test_corrupt_image_is_validation_error() {
        let engine = Arc::new(ScriptedEngine::always(vec![0.0, 1.0, 0.0]));
        let classifier = ImageClassifier::new()
            .with_model(CropCategory::Chilli, CropModel::new(chilli_classes(), engine.clone()));

        let err = classifier.predict(b"not an image", CropCategory::Chilli).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(engine.devices().is_empty());
    }

    #[test]
    fn test_out_of_memory_falls_back_to_cpu_once() {
        let engine = Arc::new(
            ScriptedEngine::accelerated(vec![0.0, 2.0, 0.0])
                .then_fail(EngineFailure::OutOfMemory("CUDA out of memory".into())),
        );
        let classifier = ImageClassifier::new()
            .with_model(CropCategory::Chilli, CropModel::new(chilli_classes(), engine.clone()))
            .with_accelerator(true);

        let prediction = classifier.predict(&png_bytes(32, 32), CropCategory::Chilli).unwrap();

        assert_eq!(prediction.device, Device::Cpu);
        assert_eq!(engine.devices(), vec![Device::Gpu(0), Device::Cpu]);
        assert_eq!(classifier.current_device(), Device::Cpu);
    }

    #[test]
    fn test_failed_retry_is_fatal() {
        let engine = Arc::new(
            ScriptedEngine::accelerated(vec![0.0, 2.0, 0.0])
                .then_fail(EngineFailure::OutOfMemory("out of memory".into()))
                .then_fail(EngineFailure::Runtime("kernel crashed".into())),
        );
        let classifier = ImageClassifier::new()
            .with_model(CropCategory::Chilli, CropModel::new(chilli_classes(), engine.clone()))
            .with_accelerator(true);

        let err = classifier.predict(&png_bytes(32, 32), CropCategory::Chilli).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Fatal);
        assert_eq!(engine.devices().len(), 2);
    }

    #[test]
    fn test_runtime_failure_is_not_retried() {
        let engine = Arc::new(
            ScriptedEngine::accelerated(vec![0.0, 2.0, 0.0])
                .then_fail(EngineFailure::Runtime("shape mismatch".into())),
        );
        let classifier = ImageClassifier::new()
            .with_model(CropCategory::Chilli, CropModel::new(chilli_classes(), engine.clone()))
            .with_accelerator(true);

        let err = classifier.predict(&png_bytes(32, 32), CropCategory::Chilli).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Fatal);
        assert_eq!(engine.devices(), vec![Device::Gpu(0)]);
    }

    #[test]
    fn test_output_size_mismatch_is_fatal() {
        let engine = ScriptedEngine::always(vec![1.0, 2.0]);
        let classifier = ImageClassifier::new()
            .with_model(CropCategory::Chilli, CropModel::new(chilli_classes(), Arc::new(engine)));
        let err = classifier.predict(&png_bytes(32, 32), CropCategory::Chilli).unwrap_err();
        assert!(matches!(err, AdvisoryError::Inference(_)));
    }
}
