//! Treatment advice synthesis
//!
//! This module provides:
//! - The structured advice payload returned for every detected disease
//! - Prompt construction and the text generation client
//! - A pure parser from free-form generated text to the payload
//! - A bounded, expiring cache of finished payloads
//! - The synthesizer tying these together with a knowledge-only fallback

pub mod cache;
pub mod generator;
pub mod parser;
pub mod prompt;
pub mod synthesizer;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use cache::AdviceCache;
pub use generator::{GenerationError, OpenRouterClient, TextGenerator};
pub use synthesizer::{translate_payload, AdviceRequest, AdviceSynthesizer, SynthesisOutcome};

/// Timeline text when nothing better is known
pub const DEFAULT_TIMELINE: &str = "Varies based on severity";
/// Cost text when nothing better is known
pub const DEFAULT_COST_ESTIMATE: &str = "Consult local supplier";
/// Summary when neither generation nor knowledge names the disease
pub const DEFAULT_SUMMARY: &str = "Disease detected";
/// Immediate action when nothing better is known
pub const DEFAULT_IMMEDIATE_ACTION: &str = "Consult agricultural expert";

/// Payload fields carried through machine translation
pub const TRANSLATED_FIELDS: [&str; 7] = [
    "summary",
    "immediate_actions",
    "treatment_plan.chemical",
    "treatment_plan.organic",
    "prevention_tips",
    "timeline",
    "cost_estimate",
];

/// How soon the farmer has to act
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Low => "low",
            Urgency::Medium => "medium",
            Urgency::High => "high",
            Urgency::Critical => "critical",
        }
    }

    /// Find an urgency level among the words of `text`
    ///
    /// "critical" and "very high" win over "high", which wins over "low".
    pub fn detect(text: &str) -> Option<Urgency> {
        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(|w| w.to_lowercase())
            .collect();
        let has = |word: &str| words.iter().any(|w| w == word);
        let very_high = words.windows(2).any(|pair| pair[0] == "very" && pair[1] == "high");

        if has("critical") || very_high {
            Some(Urgency::Critical)
        } else if has("high") {
            Some(Urgency::High)
        } else if has("low") {
            Some(Urgency::Low)
        } else if has("medium") || has("moderate") {
            Some(Urgency::Medium)
        } else {
            None
        }
    }

    /// Like [`Urgency::detect`], defaulting to medium
    pub fn parse_lenient(text: &str) -> Urgency {
        Self::detect(text).unwrap_or_default()
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreatmentPlan {
    pub chemical: Vec<String>,
    pub organic: Vec<String>,
}

/// Structured treatment advice. Always renderable: every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvicePayload {
    pub summary: String,
    pub immediate_actions: Vec<String>,
    pub treatment_plan: TreatmentPlan,
    pub prevention_tips: Vec<String>,
    pub timeline: String,
    pub cost_estimate: String,
    pub urgency: Urgency,
    /// Unparsed generator output, diagnostic only
    pub raw_llm_response: Option<String>,
}

impl Default for AdvicePayload {
    fn default() -> Self {
        Self {
            summary: DEFAULT_SUMMARY.to_string(),
            immediate_actions: vec![DEFAULT_IMMEDIATE_ACTION.to_string()],
            treatment_plan: TreatmentPlan::default(),
            prevention_tips: Vec::new(),
            timeline: DEFAULT_TIMELINE.to_string(),
            cost_estimate: DEFAULT_COST_ESTIMATE.to_string(),
            urgency: Urgency::Medium,
            raw_llm_response: None,
        }
    }
}
