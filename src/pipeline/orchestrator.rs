//! Scan submission and retrieval
//!
//! `received -> classifying -> classified -> advising -> ranking_community -> done`.
//! Only the classification step can fail a submission. Advice always
//! comes back complete, possibly degraded, and a community lookup failure
//! just means no community items.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::record::{PipelineStage, ScanRecord};
use crate::advice::{translate_payload, AdviceRequest, AdviceSynthesizer};
use crate::community::{
    Author, CommunityAdviceItem, CommunityAdviceRanker, TrustEventKind, TrustScoreEngine, AFTER_SCAN_LIMIT,
    AFTER_SCAN_MIN_HELPFUL, DETAIL_LIMIT, DETAIL_MIN_HELPFUL,
};
use crate::inference::{CropCategory, ImageClassifier, Prediction};
use crate::knowledge::KnowledgeRetriever;
use crate::language::{Language, TranslationMode, Translator, BASE_LANGUAGE};
use crate::service::ServiceSlot;
use crate::store::{CommunityStore, MemoryStore, ScanStore, TrustStore};
use crate::utils::error::{AdvisoryError, ErrorKind, Result};

/// A scan is "commonly seen" once this many earlier scans found the same disease
const COMMON_DISEASE_THRESHOLD: usize = 3;

/// Storage collaborators of the pipeline
#[derive(Clone)]
pub struct Stores {
    pub scans: Arc<dyn ScanStore>,
    pub community: Arc<dyn CommunityStore>,
    pub trust: Arc<dyn TrustStore>,
}

impl Stores {
    /// Every collection backed by one in-memory store
    pub fn from_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            scans: store.clone(),
            community: store.clone(),
            trust: store,
        }
    }
}

/// An uploaded image and what the farmer told us about it
#[derive(Debug, Clone)]
pub struct ScanSubmission {
    pub user_id: String,
    pub image: Vec<u8>,
    pub crop: String,
    pub description: Option<String>,
    pub language: String,
    /// Where the upload layer stored the image, if it did
    pub image_ref: Option<String>,
}

/// Result of a successful submission
#[derive(Debug, Clone, Serialize)]
pub struct ScanOutcome {
    pub record: ScanRecord,
    pub community_advice: Vec<CommunityAdviceItem>,
    pub advice_cached: bool,
}

/// A stored scan as shown to its owner in a given language
#[derive(Debug, Clone, Serialize)]
pub struct ScanDetails {
    pub record: ScanRecord,
    pub language: String,
    pub disease_name_translated: Option<String>,
    pub community_advice: Vec<CommunityAdviceItem>,
    /// Some text could not be translated and is shown as stored
    pub translation_degraded: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanPage {
    pub scans: Vec<ScanRecord>,
    pub total: usize,
    pub skip: usize,
    pub limit: usize,
}

fn enter(scan_id: &str, stage: PipelineStage) {
    debug!(scan_id = %scan_id, stage = %stage, "Pipeline stage");
}

pub struct Orchestrator {
    classifier: Arc<ImageClassifier>,
    knowledge: Arc<KnowledgeRetriever>,
    synthesizer: Arc<AdviceSynthesizer>,
    translator: ServiceSlot<Arc<Translator>>,
    ranker: CommunityAdviceRanker,
    trust: TrustScoreEngine,
    scans: Arc<dyn ScanStore>,
    community: Arc<dyn CommunityStore>,
}

impl Orchestrator {
    pub fn new(
        classifier: Arc<ImageClassifier>,
        knowledge: Arc<KnowledgeRetriever>,
        synthesizer: Arc<AdviceSynthesizer>,
        translator: ServiceSlot<Arc<Translator>>,
        stores: Stores,
    ) -> Self {
        Self {
            classifier,
            knowledge,
            synthesizer,
            translator,
            ranker: CommunityAdviceRanker::new(stores.community.clone()),
            trust: TrustScoreEngine::new(stores.trust),
            scans: stores.scans,
            community: stores.community,
        }
    }

    pub fn classifier(&self) -> &ImageClassifier {
        &self.classifier
    }

    pub fn knowledge(&self) -> &KnowledgeRetriever {
        &self.knowledge
    }

    pub fn synthesizer(&self) -> &AdviceSynthesizer {
        &self.synthesizer
    }

    pub fn trust(&self) -> &TrustScoreEngine {
        &self.trust
    }

    pub async fn submit_scan(&self, submission: ScanSubmission) -> Result<ScanOutcome> {
        self.submit_scan_cancellable(submission, &CancellationToken::new()).await
    }

    /// Run the full pipeline for one upload
    ///
    /// A bad crop or an unloaded model fails before anything is stored. A
    /// bad image or a fatal inference error stores a failed record. A
    /// cancelled request stores nothing.
    pub async fn submit_scan_cancellable(
        &self,
        submission: ScanSubmission,
        cancel: &CancellationToken,
    ) -> Result<ScanOutcome> {
        let crop: CropCategory = submission.crop.parse()?;
        if !self.classifier.is_model_loaded(crop) {
            warn!(crop = %crop, "Scan rejected, model not loaded");
            return Err(AdvisoryError::ServiceUnavailable(format!(
                "Model for {} is not available. Please try again later.",
                crop
            )));
        }

        let language = match submission.language.parse::<Language>() {
            Ok(language) => language,
            Err(_) => {
                debug!(language = %submission.language, "Unsupported scan language, using {}", BASE_LANGUAGE);
                BASE_LANGUAGE
            }
        }
        .code()
        .to_string();
        let mut record = ScanRecord::new(
            submission.user_id,
            crop,
            submission.image_ref,
            submission.description,
            language.clone(),
        );
        enter(&record.id, PipelineStage::Received);

        enter(&record.id, PipelineStage::Classifying);
        let prediction = match self.classify(submission.image, crop).await {
            Ok(prediction) => prediction,
            Err(e) => {
                enter(&record.id, PipelineStage::ClassificationFailed);
                if e.kind() == ErrorKind::ServiceUnavailable {
                    return Err(e);
                }
                record.fail(e.to_string());
                self.persist(record, cancel).await?;
                return Err(e);
            }
        };
        enter(&record.id, PipelineStage::Classified);

        enter(&record.id, PipelineStage::Advising);
        let label = prediction.label.clone();
        let entry = self.knowledge.lookup(&label);
        let disease_name = self.knowledge.display_name(&label);
        let context = entry.map(|e| e.format_for_generation()).unwrap_or_default();

        let advice = self
            .synthesizer
            .synthesize(AdviceRequest {
                label: &label,
                disease_name: &disease_name,
                crop: crop.as_str(),
                knowledge_context: &context,
                confidence: prediction.confidence,
                entry,
                language: &language,
            })
            .await;
        enter(
            &record.id,
            if advice.degraded {
                PipelineStage::AdviceDegraded
            } else {
                PipelineStage::Advised
            },
        );

        enter(&record.id, PipelineStage::RankingCommunity);
        let community_advice = self
            .community_advice(&label, AFTER_SCAN_MIN_HELPFUL, AFTER_SCAN_LIMIT)
            .await;
        let is_common = match self.scans.count_completed_with_label(&label).await {
            Ok(count) => count >= COMMON_DISEASE_THRESHOLD,
            Err(e) => {
                warn!(disease = %label, "Could not count earlier scans: {}", e);
                false
            }
        };

        record.complete(&prediction, disease_name, advice.payload, advice.degraded, is_common);
        let record = self.persist(record, cancel).await?;
        enter(&record.id, PipelineStage::Done);

        info!(
            scan_id = %record.id,
            crop = %crop,
            disease = %label,
            confidence = prediction.confidence,
            degraded = advice.degraded,
            community = community_advice.len(),
            "Scan completed"
        );
        Ok(ScanOutcome {
            record,
            community_advice,
            advice_cached: advice.cached,
        })
    }

    /// Classification is CPU bound, so it runs on the blocking pool
    async fn classify(&self, image: Vec<u8>, crop: CropCategory) -> Result<Prediction> {
        let classifier = self.classifier.clone();
        tokio::task::spawn_blocking(move || classifier.predict(&image, crop))
            .await
            .map_err(|e| AdvisoryError::Inference(format!("classification task failed: {}", e)))?
    }

    async fn persist(&self, record: ScanRecord, cancel: &CancellationToken) -> Result<ScanRecord> {
        if cancel.is_cancelled() {
            info!(scan_id = %record.id, "Scan cancelled before it was stored");
            return Err(AdvisoryError::Cancelled);
        }
        self.scans.save_scan(record.clone()).await?;
        Ok(record)
    }

    /// Ranked community advice, empty when the lookup fails
    async fn community_advice(&self, label: &str, min_helpful: u32, limit: usize) -> Vec<CommunityAdviceItem> {
        match self.ranker.top_advice_for_disease(label, min_helpful, limit).await {
            Ok(items) => items,
            Err(e) => {
                warn!(disease = %label, "Community advice unavailable: {}", e);
                Vec::new()
            }
        }
    }

    async fn owned_scan(&self, scan_id: &str, user_id: &str) -> Result<ScanRecord> {
        let record = self
            .scans
            .get_scan(scan_id)
            .await?
            .ok_or_else(|| AdvisoryError::NotFound("Scan not found".to_string()))?;
        if record.user_id != user_id {
            return Err(AdvisoryError::Forbidden("Access denied".to_string()));
        }
        Ok(record)
    }

    /// A user's own scan, translated for display when `language` differs
    ///
    /// The stored record is never modified.
    pub async fn fetch_scan(&self, scan_id: &str, user_id: &str, language: Option<&str>) -> Result<ScanDetails> {
        let mut record = self.owned_scan(scan_id, user_id).await?;

        let community_advice = match &record.disease_label {
            Some(label) => self.community_advice(label, DETAIL_MIN_HELPFUL, DETAIL_LIMIT).await,
            None => Vec::new(),
        };

        let target = language
            .map(|l| l.trim().to_lowercase())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| record.language.clone());
        let (disease_name_translated, translation_degraded) = self.localize(&mut record, &target).await;

        Ok(ScanDetails {
            record,
            language: target,
            disease_name_translated,
            community_advice,
            translation_degraded,
        })
    }

    async fn localize(&self, record: &mut ScanRecord, target: &str) -> (Option<String>, bool) {
        let translator = self.translator.as_ready();
        let mut degraded = false;

        let name = match (&record.disease_name, translator) {
            (None, _) => None,
            (Some(name), _) if target == BASE_LANGUAGE.code() => Some(name.clone()),
            (Some(name), Some(translator)) => {
                let outcome = translator
                    .translate_batch(std::slice::from_ref(name), BASE_LANGUAGE.code(), target)
                    .await;
                degraded |= outcome.is_degraded();
                outcome.texts.into_iter().next()
            }
            (Some(name), None) => {
                degraded = true;
                Some(name.clone())
            }
        };

        if record.language != target {
            if let Some(advice) = &record.advice {
                match translator {
                    Some(translator) => {
                        let (payload, mode) = translate_payload(translator, advice, &record.language, target).await;
                        degraded |= mode == TranslationMode::Degraded;
                        record.next_steps = payload.immediate_actions.clone();
                        record.advice = Some(payload);
                    }
                    None => degraded = true,
                }
            }
        }

        if degraded {
            warn!(scan_id = %record.id, language = %target, "Scan shown partly untranslated");
        }
        (name, degraded)
    }

    /// A user's scans, newest first
    pub async fn list_scans(&self, user_id: &str, skip: usize, limit: usize) -> Result<ScanPage> {
        let (scans, total) = self.scans.list_scans(user_id, skip, limit).await?;
        Ok(ScanPage {
            scans,
            total,
            skip,
            limit,
        })
    }

    pub async fn delete_scan(&self, scan_id: &str, user_id: &str) -> Result<()> {
        self.owned_scan(scan_id, user_id).await?;
        if !self.scans.delete_scan(scan_id).await? {
            return Err(AdvisoryError::NotFound("Scan not found".to_string()));
        }
        info!(scan_id = %scan_id, user_id = %user_id, "Scan deleted");
        Ok(())
    }

    /// Attach advice to a completed scan, filed under its disease
    pub async fn add_advice(&self, scan_id: &str, author: Author, text: &str) -> Result<CommunityAdviceItem> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AdvisoryError::Validation("Advice text is empty".to_string()));
        }

        let record = self
            .scans
            .get_scan(scan_id)
            .await?
            .ok_or_else(|| AdvisoryError::NotFound("Scan not found".to_string()))?;
        let label = match (&record.disease_label, record.is_completed()) {
            (Some(label), true) => label.clone(),
            _ => {
                return Err(AdvisoryError::Validation(
                    "Advice can only be added to a completed scan".to_string(),
                ))
            }
        };

        let item = CommunityAdviceItem {
            id: Uuid::new_v4().to_string(),
            disease_label: label,
            scan_id: scan_id.to_string(),
            author_id: author.id,
            author_name: author.name,
            author_location: author.location,
            advice: text.to_string(),
            helpful_count: 0,
            created_at: Utc::now(),
        };
        self.community.insert_advice(item.clone()).await?;
        info!(scan_id = %scan_id, user_id = %item.author_id, "Community advice added");
        Ok(item)
    }

    pub async fn advice_for_scan(&self, scan_id: &str) -> Result<Vec<CommunityAdviceItem>> {
        self.community.advice_for_scan(scan_id).await
    }

    /// Count a helpful vote and credit the advice author
    pub async fn mark_helpful(&self, scan_id: &str, advice_id: &str, voter_id: &str) -> Result<CommunityAdviceItem> {
        let item = self
            .community
            .increment_helpful(scan_id, advice_id)
            .await?
            .ok_or_else(|| AdvisoryError::NotFound("Advice not found".to_string()))?;

        match self.trust.apply_event(&item.author_id, TrustEventKind::HelpfulVote).await {
            Ok(score) => debug!(user_id = %item.author_id, voter = %voter_id, score, "Helpful vote credited"),
            Err(e) => warn!(user_id = %item.author_id, "Could not credit helpful vote: {}", e),
        }
        Ok(item)
    }

    /// Record a 1-5 feedback score for a user and return the new trust score
    pub async fn submit_feedback(&self, user_id: &str, score: u8) -> Result<f64> {
        let kind = TrustEventKind::from_feedback_score(score)?;
        self.trust.apply_event(user_id, kind).await
    }

    pub async fn trust_score(&self, user_id: &str) -> Result<f64> {
        self.trust.score(user_id).await
    }

    pub async fn recompute_trust(&self, user_id: &str) -> Result<f64> {
        self.trust.recompute(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::advice::{AdviceCache, TextGenerator, Urgency};
    use crate::inference::CropModel;
    use crate::pipeline::ScanStatus;
    use crate::testing::{png_bytes, DictionaryLoader, FailingCommunityStore, ScriptedEngine, ScriptedGenerator};

    const CLASSES: [&str; 3] = ["chilli_healthy", "chilli_leafspot", "early_blight"];

    const KNOWLEDGE: &str = r#"{
        "chilli_leafspot": {
            "disease_name": "Chilli Leaf Spot",
            "crop": "chilli",
            "treatment": {
                "immediate": ["Remove spotted leaves", "Stop overhead watering"],
                "organic": ["Neem oil 5 ml per litre"]
            },
            "prevention": ["Use certified seed"],
            "timeline": "2-3 weeks",
            "cost_estimate": "Rs 500 per acre",
            "urgency": "high"
        },
        "early_blight": {
            "disease_name": "Early Blight",
            "crop": "chilli",
            "treatment": { "immediate": ["Spray neem oil"] },
            "urgency": "medium"
        }
    }"#;

    const EARLY_BLIGHT_ADVICE: &str = "Summary: Early Blight\nImmediate actions:\n- Spray neem oil";

    /// Logits whose softmax is exactly `probabilities`
    fn logits(probabilities: [f32; 3]) -> Vec<f32> {
        probabilities.iter().map(|p| p.ln()).collect()
    }

    struct Harness {
        orchestrator: Orchestrator,
        store: Arc<MemoryStore>,
    }

    fn harness(engine_logits: Vec<f32>, generator: Arc<dyn TextGenerator>) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let stores = Stores::from_memory(store.clone());
        build(engine_logits, generator, stores, store)
    }

    fn build(
        engine_logits: Vec<f32>,
        generator: Arc<dyn TextGenerator>,
        stores: Stores,
        store: Arc<MemoryStore>,
    ) -> Harness {
        let classes = CLASSES.iter().map(|c| c.to_string()).collect();
        let classifier = ImageClassifier::new()
            .with_model(
                CropCategory::Chilli,
                CropModel::new(classes, Arc::new(ScriptedEngine::always(engine_logits))),
            )
            .with_unavailable(CropCategory::Rice, "rice_model.mpk not found");

        let translator = Arc::new(Translator::new(Arc::new(DictionaryLoader::sample())));
        let synthesizer = AdviceSynthesizer::new(
            ServiceSlot::Ready(generator),
            Some(translator.clone()),
            AdviceCache::new(100, Duration::from_secs(24 * 3600)),
            Duration::from_secs(30),
        );

        let orchestrator = Orchestrator::new(
            Arc::new(classifier),
            Arc::new(KnowledgeRetriever::from_json_str(KNOWLEDGE).unwrap()),
            Arc::new(synthesizer),
            ServiceSlot::Ready(translator),
            stores,
        );
        Harness { orchestrator, store }
    }

    fn submission(crop: &str, image: Vec<u8>) -> ScanSubmission {
        ScanSubmission {
            user_id: "farmer-1".into(),
            image,
            crop: crop.into(),
            description: Some("Brown spots on lower leaves".into()),
            language: "en".into(),
            image_ref: None,
        }
    }

    fn leafspot() -> Vec<f32> {
        logits([0.05, 0.923, 0.027])
    }

    fn author(id: &str) -> Author {
        Author {
            id: id.into(),
            name: "Lakshmi".into(),
            location: Some("Guntur".into()),
        }
    }

    #[tokio::test]
    async fn test_chilli_scan_completes_with_generated_advice() {
        let generator = Arc::new(ScriptedGenerator::replying(crate::testing::WELL_FORMED_ADVICE));
        let h = harness(leafspot(), generator.clone());

        let outcome = h
            .orchestrator
            .submit_scan(submission("chilli", png_bytes(64, 64)))
            .await
            .unwrap();
        let record = &outcome.record;

        assert_eq!(record.status, ScanStatus::Completed);
        assert_eq!(record.disease_label.as_deref(), Some("chilli_leafspot"));
        assert_eq!(record.disease_name.as_deref(), Some("Chilli Leaf Spot"));
        assert_eq!(record.confidence, Some(92.3));

        let advice = record.advice.as_ref().unwrap();
        assert!(!advice.immediate_actions.is_empty());
        assert_eq!(advice.urgency, Urgency::High);
        assert!(advice.raw_llm_response.is_some());
        assert_eq!(record.next_steps, advice.immediate_actions);
        assert!(!record.advice_degraded);

        assert_eq!(generator.calls(), 1);
        assert!(generator.last_prompt().contains("Chilli Leaf Spot"));
        assert!(generator.last_prompt().contains("92.3%"));
        assert_eq!(h.store.get_scan(&record.id).await.unwrap().as_ref(), Some(record));
    }

    #[tokio::test]
    async fn test_scan_language_is_normalized() {
        let generator = Arc::new(ScriptedGenerator::replying(crate::testing::WELL_FORMED_ADVICE));
        let h = harness(leafspot(), generator.clone());

        for (requested, stored) in [("", "en"), ("klingon", "en"), (" TA ", "ta")] {
            let outcome = h
                .orchestrator
                .submit_scan(ScanSubmission {
                    language: requested.into(),
                    ..submission("chilli", png_bytes(32, 32))
                })
                .await
                .unwrap();
            assert_eq!(outcome.record.language, stored);
        }

        // empty and unknown share the English cache entry
        assert_eq!(h.orchestrator.synthesizer().cache().len(), 2);
        assert_eq!(generator.calls(), 2);
    }

    #[tokio::test]
    async fn test_unloaded_model_is_unavailable_and_not_stored() {
        let h = harness(leafspot(), Arc::new(ScriptedGenerator::replying("unused")));

        let err = h
            .orchestrator
            .submit_scan(submission("rice", png_bytes(32, 32)))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ServiceUnavailable);
        assert_eq!(h.store.scan_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_crop_is_validation_error() {
        let h = harness(leafspot(), Arc::new(ScriptedGenerator::replying("unused")));
        let err = h
            .orchestrator
            .submit_scan(submission("wheat", png_bytes(32, 32)))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(h.store.scan_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generation_timeout_still_completes_from_knowledge() {
        let h = harness(leafspot(), Arc::new(ScriptedGenerator::hanging()));

        let outcome = h
            .orchestrator
            .submit_scan(submission("chilli", png_bytes(64, 64)))
            .await
            .unwrap();
        let record = outcome.record;
        let advice = record.advice.unwrap();

        assert_eq!(record.status, ScanStatus::Completed);
        assert!(record.advice_degraded);
        assert!(advice.raw_llm_response.is_none());
        assert_eq!(advice.summary, "Chilli Leaf Spot");
        assert_eq!(advice.immediate_actions, vec!["Remove spotted leaves", "Stop overhead watering"]);
        assert_eq!(advice.treatment_plan.organic, vec!["Neem oil 5 ml per litre"]);
        assert_eq!(advice.timeline, "2-3 weeks");
        assert_eq!(advice.urgency, Urgency::High);
    }

    #[tokio::test]
    async fn test_corrupt_image_stores_failed_record() {
        let h = harness(leafspot(), Arc::new(ScriptedGenerator::replying("unused")));

        let err = h
            .orchestrator
            .submit_scan(submission("chilli", b"GIF89a garbage".to_vec()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let (scans, total) = h.store.list_scans("farmer-1", 0, 10).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(scans[0].status, ScanStatus::Failed);
        assert!(scans[0].disease_label.is_none() && scans[0].confidence.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_scan_is_not_stored() {
        let h = harness(leafspot(), Arc::new(ScriptedGenerator::replying(crate::testing::WELL_FORMED_ADVICE)));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = h
            .orchestrator
            .submit_scan_cancellable(submission("chilli", png_bytes(32, 32)), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(h.store.scan_count(), 0);
    }

    #[tokio::test]
    async fn test_community_thresholds_differ_after_scan_and_on_detail() {
        let h = harness(leafspot(), Arc::new(ScriptedGenerator::replying(crate::testing::WELL_FORMED_ADVICE)));
        let first = h
            .orchestrator
            .submit_scan(submission("chilli", png_bytes(32, 32)))
            .await
            .unwrap();
        let scan_id = first.record.id.clone();

        for (votes, text) in [(2, "Two votes"), (3, "Three votes"), (1, "One vote")] {
            let item = h
                .orchestrator
                .add_advice(&scan_id, author("farmer-9"), text)
                .await
                .unwrap();
            for _ in 0..votes {
                h.orchestrator.mark_helpful(&scan_id, &item.id, "farmer-1").await.unwrap();
            }
        }

        let second = h
            .orchestrator
            .submit_scan(submission("chilli", png_bytes(32, 32)))
            .await
            .unwrap();
        let shown: Vec<&str> = second.community_advice.iter().map(|a| a.advice.as_str()).collect();
        assert_eq!(shown, vec!["Three votes", "Two votes"]);
        assert!(second.advice_cached);

        let details = h
            .orchestrator
            .fetch_scan(&second.record.id, "farmer-1", None)
            .await
            .unwrap();
        let shown: Vec<&str> = details.community_advice.iter().map(|a| a.advice.as_str()).collect();
        assert_eq!(shown, vec!["Three votes"]);

        // six helpful votes at +2 each
        assert_eq!(h.orchestrator.trust_score("farmer-9").await.unwrap(), 62.0);
    }

    #[tokio::test]
    async fn test_community_store_failure_is_absorbed() {
        let store = Arc::new(MemoryStore::new());
        let stores = Stores {
            scans: store.clone(),
            community: Arc::new(FailingCommunityStore),
            trust: store.clone(),
        };
        let h = build(
            leafspot(),
            Arc::new(ScriptedGenerator::replying(crate::testing::WELL_FORMED_ADVICE)),
            stores,
            store,
        );

        let outcome = h
            .orchestrator
            .submit_scan(submission("chilli", png_bytes(32, 32)))
            .await
            .unwrap();
        assert_eq!(outcome.record.status, ScanStatus::Completed);
        assert!(outcome.community_advice.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_translates_without_touching_the_stored_record() {
        let h = harness(
            logits([0.02, 0.03, 0.95]),
            Arc::new(ScriptedGenerator::replying(EARLY_BLIGHT_ADVICE)),
        );
        let outcome = h
            .orchestrator
            .submit_scan(submission("chilli", png_bytes(32, 32)))
            .await
            .unwrap();
        let scan_id = outcome.record.id.clone();
        assert_eq!(outcome.record.disease_name.as_deref(), Some("Early Blight"));

        let tamil = h.orchestrator.fetch_scan(&scan_id, "farmer-1", Some("ta")).await.unwrap();
        assert_eq!(tamil.disease_name_translated.as_deref(), Some("ஆரம்பகால கருகல்"));
        assert_eq!(tamil.record.next_steps, vec!["வேப்ப எண்ணெய் தெளிக்கவும்"]);
        assert_eq!(tamil.record.advice.as_ref().unwrap().summary, "ஆரம்பகால கருகல்");
        assert!(!tamil.translation_degraded);

        let english = h.orchestrator.fetch_scan(&scan_id, "farmer-1", Some("en")).await.unwrap();
        assert_eq!(english.record.disease_name.as_deref(), Some("Early Blight"));
        assert_eq!(english.disease_name_translated.as_deref(), Some("Early Blight"));
        assert_eq!(english.record.next_steps, vec!["Spray neem oil"]);

        let stored = h.store.get_scan(&scan_id).await.unwrap().unwrap();
        assert_eq!(stored, outcome.record);
    }

    #[tokio::test]
    async fn test_untranslatable_language_is_flagged_not_failed() {
        let h = harness(
            logits([0.02, 0.03, 0.95]),
            Arc::new(ScriptedGenerator::replying(EARLY_BLIGHT_ADVICE)),
        );
        let outcome = h
            .orchestrator
            .submit_scan(submission("chilli", png_bytes(32, 32)))
            .await
            .unwrap();

        let hindi = h
            .orchestrator
            .fetch_scan(&outcome.record.id, "farmer-1", Some("hi"))
            .await
            .unwrap();
        assert!(hindi.translation_degraded);
        assert_eq!(hindi.disease_name_translated.as_deref(), Some("Early Blight"));
    }

    #[tokio::test]
    async fn test_only_the_owner_can_read_or_delete() {
        let h = harness(leafspot(), Arc::new(ScriptedGenerator::replying(crate::testing::WELL_FORMED_ADVICE)));
        let outcome = h
            .orchestrator
            .submit_scan(submission("chilli", png_bytes(32, 32)))
            .await
            .unwrap();
        let scan_id = outcome.record.id;

        let err = h.orchestrator.fetch_scan(&scan_id, "farmer-2", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        let err = h.orchestrator.delete_scan(&scan_id, "farmer-2").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        let err = h.orchestrator.fetch_scan("missing", "farmer-1", None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        h.orchestrator.delete_scan(&scan_id, "farmer-1").await.unwrap();
        assert_eq!(h.orchestrator.list_scans("farmer-1", 0, 10).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_disease_becomes_common_after_three_scans() {
        let h = harness(leafspot(), Arc::new(ScriptedGenerator::replying(crate::testing::WELL_FORMED_ADVICE)));
        let mut flags = Vec::new();
        for _ in 0..4 {
            let outcome = h
                .orchestrator
                .submit_scan(submission("chilli", png_bytes(32, 32)))
                .await
                .unwrap();
            flags.push(outcome.record.is_common);
        }
        assert_eq!(flags, vec![false, false, false, true]);
    }

    #[tokio::test]
    async fn test_advice_requires_completed_scan_and_text() {
        let h = harness(leafspot(), Arc::new(ScriptedGenerator::replying("unused")));
        h.orchestrator
            .submit_scan(submission("chilli", b"not an image".to_vec()))
            .await
            .unwrap_err();
        let failed = h.store.list_scans("farmer-1", 0, 1).await.unwrap().0.remove(0);

        let err = h
            .orchestrator
            .add_advice(&failed.id, author("farmer-9"), "Try neem")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = h.orchestrator.add_advice("missing", author("farmer-9"), "   ").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = h.orchestrator.mark_helpful(&failed.id, "nope", "farmer-1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_feedback_moves_trust_and_recompute_agrees() {
        let h = harness(leafspot(), Arc::new(ScriptedGenerator::replying("unused")));

        assert_eq!(h.orchestrator.submit_feedback("farmer-5", 5).await.unwrap(), 55.0);
        assert_eq!(h.orchestrator.submit_feedback("farmer-5", 3).await.unwrap(), 56.0);
        assert_eq!(h.orchestrator.submit_feedback("farmer-5", 1).await.unwrap(), 51.0);
        assert_eq!(h.orchestrator.recompute_trust("farmer-5").await.unwrap(), 51.0);

        let err = h.orchestrator.submit_feedback("farmer-5", 9).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
