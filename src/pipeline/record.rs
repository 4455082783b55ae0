//! Scan records and pipeline stages

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::advice::AdvicePayload;
use crate::inference::{CropCategory, Prediction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Processing,
    Completed,
    Failed,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Processing => "processing",
            ScanStatus::Completed => "completed",
            ScanStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a submission is in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Received,
    Classifying,
    Classified,
    ClassificationFailed,
    Advising,
    Advised,
    AdviceDegraded,
    RankingCommunity,
    Done,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Received => "received",
            PipelineStage::Classifying => "classifying",
            PipelineStage::Classified => "classified",
            PipelineStage::ClassificationFailed => "classification_failed",
            PipelineStage::Advising => "advising",
            PipelineStage::Advised => "advised",
            PipelineStage::AdviceDegraded => "advice_degraded",
            PipelineStage::RankingCommunity => "ranking_community",
            PipelineStage::Done => "done",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One disease detection request and its result
///
/// A completed record always has a label and a confidence; a failed one
/// never does. Advice text is stored in `language`, the disease name in
/// English.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRecord {
    pub id: String,
    pub user_id: String,
    pub crop: CropCategory,
    pub image_ref: String,
    pub description: String,
    pub status: ScanStatus,
    pub disease_label: Option<String>,
    /// English display name of `disease_label`
    pub disease_name: Option<String>,
    /// Percent, 0-100
    pub confidence: Option<f64>,
    pub all_predictions: BTreeMap<String, f64>,
    pub next_steps: Vec<String>,
    pub advice: Option<AdvicePayload>,
    pub advice_degraded: bool,
    pub is_common: bool,
    pub language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ScanRecord {
    pub fn new(
        user_id: impl Into<String>,
        crop: CropCategory,
        image_ref: Option<String>,
        description: Option<String>,
        language: impl Into<String>,
    ) -> Self {
        let id = Uuid::new_v4().to_string();
        let image_ref = image_ref.unwrap_or_else(|| format!("scans/{}", id));
        let description = description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| format!("Disease detection for {}", crop));

        Self {
            id,
            user_id: user_id.into(),
            crop,
            image_ref,
            description,
            status: ScanStatus::Processing,
            disease_label: None,
            disease_name: None,
            confidence: None,
            all_predictions: BTreeMap::new(),
            next_steps: Vec::new(),
            advice: None,
            advice_degraded: false,
            is_common: false,
            language: language.into(),
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Move to `completed` with the classification and its advice
    pub fn complete(
        &mut self,
        prediction: &Prediction,
        disease_name: String,
        advice: AdvicePayload,
        advice_degraded: bool,
        is_common: bool,
    ) {
        self.status = ScanStatus::Completed;
        self.disease_label = Some(prediction.label.clone());
        self.disease_name = Some(disease_name);
        self.confidence = Some(prediction.confidence);
        self.all_predictions = prediction.probability_map();
        self.next_steps = advice.immediate_actions.clone();
        self.advice = Some(advice);
        self.advice_degraded = advice_degraded;
        self.is_common = is_common;
        self.error = None;
        self.completed_at = Some(Utc::now());
    }

    /// Move to `failed`, clearing any classification
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = ScanStatus::Failed;
        self.disease_label = None;
        self.disease_name = None;
        self.confidence = None;
        self.all_predictions.clear();
        self.next_steps.clear();
        self.advice = None;
        self.advice_degraded = false;
        self.is_common = false;
        self.error = Some(reason.into());
        self.completed_at = Some(Utc::now());
    }

    pub fn is_completed(&self) -> bool {
        self.status == ScanStatus::Completed
    }
}
