//! Disease knowledge base
//!
//! Static reference records keyed by classifier label, loaded once at
//! startup and read-only afterwards. A missing entry is a normal outcome;
//! callers fall back to generic advice.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::utils::error::{AdvisoryError, Result};
use crate::utils::{humanize_label, truncate_chars};

/// Upper bound on the rendered generation context, in characters
pub const MAX_CONTEXT_CHARS: usize = 3500;

/// Treatment options for a disease
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreatmentOptions {
    pub immediate: Vec<String>,
    pub chemical: Vec<String>,
    pub organic: Vec<String>,
    /// Only present for nutrient deficiencies
    pub fertilizers: Vec<String>,
}

impl TreatmentOptions {
    fn is_empty(&self) -> bool {
        self.immediate.is_empty()
            && self.chemical.is_empty()
            && self.organic.is_empty()
            && self.fertilizers.is_empty()
    }
}

/// One disease record. Every field is optional in the source file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiseaseKnowledgeEntry {
    pub disease_name: String,
    pub scientific_name: String,
    pub crop: String,
    pub severity: String,
    pub spread_rate: String,
    pub symptoms: Vec<String>,
    pub causes: Vec<String>,
    pub treatment: TreatmentOptions,
    pub prevention: Vec<String>,
    pub cost_estimate: String,
    pub timeline: String,
    pub urgency: String,
    pub yield_impact: String,
    pub note: String,
}

fn or_unknown<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}

fn push_list(parts: &mut Vec<String>, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    parts.push(title.to_string());
    parts.extend(items.iter().map(|item| format!("- {}", item)));
}

impl DiseaseKnowledgeEntry {
    /// Render the entry as the context block sent to the generator
    pub fn format_for_generation(&self) -> String {
        let mut parts = Vec::new();

        let mut header = format!("Disease: {}", or_unknown(&self.disease_name, "Unknown"));
        if !self.scientific_name.is_empty() {
            header.push_str(&format!(" ({})", self.scientific_name));
        }
        parts.push(header);
        parts.push(format!("Crop: {}", or_unknown(&self.crop, "Unknown")));
        parts.push(format!(
            "Severity: {} | Spread Rate: {}",
            humanize_label(or_unknown(&self.severity, "unknown")),
            humanize_label(or_unknown(&self.spread_rate, "unknown"))
        ));
        parts.push(String::new());

        if !self.symptoms.is_empty() {
            push_list(&mut parts, "Symptoms:", &self.symptoms);
            parts.push(String::new());
        }
        if !self.causes.is_empty() {
            push_list(&mut parts, "Causes:", &self.causes);
            parts.push(String::new());
        }

        if !self.treatment.is_empty() {
            parts.push("Recommended Treatment:".to_string());
            push_list(&mut parts, "Immediate Actions:", &self.treatment.immediate);
            push_list(&mut parts, "Chemical Treatment:", &self.treatment.chemical);
            push_list(&mut parts, "Organic Treatment:", &self.treatment.organic);
            push_list(&mut parts, "Fertilizer Application:", &self.treatment.fertilizers);
            parts.push(String::new());
        }

        if !self.prevention.is_empty() {
            push_list(&mut parts, "Prevention Tips:", &self.prevention);
            parts.push(String::new());
        }

        if !self.cost_estimate.is_empty()
            || !self.timeline.is_empty()
            || !self.urgency.is_empty()
            || !self.yield_impact.is_empty()
        {
            parts.push("Additional Information:".to_string());
            if !self.cost_estimate.is_empty() {
                parts.push(format!("Cost Estimate: {}", self.cost_estimate));
            }
            if !self.timeline.is_empty() {
                parts.push(format!("Timeline: {}", self.timeline));
            }
            if !self.urgency.is_empty() {
                parts.push(format!("Urgency: {}", humanize_label(&self.urgency)));
            }
            if !self.yield_impact.is_empty() {
                parts.push(format!("Yield Impact: {}", self.yield_impact));
            }
        }

        if !self.note.is_empty() {
            parts.push(String::new());
            parts.push(format!("Important Note: {}", self.note));
        }

        truncate_chars(&parts.join("\n"), MAX_CONTEXT_CHARS, "...")
    }
}

/// In-memory lookup over the knowledge file
#[derive(Debug, Clone, Default)]
pub struct KnowledgeRetriever {
    entries: BTreeMap<String, DiseaseKnowledgeEntry>,
}

impl KnowledgeRetriever {
    pub fn from_entries(entries: BTreeMap<String, DiseaseKnowledgeEntry>) -> Self {
        Self { entries }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let entries: BTreeMap<String, DiseaseKnowledgeEntry> = serde_json::from_str(json)?;
        Ok(Self::from_entries(entries))
    }

    /// Load the knowledge file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            AdvisoryError::Config(format!(
                "Failed to read knowledge base {}: {}",
                path.display(),
                e
            ))
        })?;
        let retriever = Self::from_json_str(&content)?;
        info!(diseases = retriever.len(), "Knowledge base loaded");
        Ok(retriever)
    }

    /// Load, or start empty when the file is missing or malformed
    pub fn load_or_empty(path: &Path) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            warn!("Knowledge base unavailable, advice will be generic: {}", e);
            Self::default()
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact key match, then case-insensitive
    pub fn lookup(&self, label: &str) -> Option<&DiseaseKnowledgeEntry> {
        if let Some(entry) = self.entries.get(label) {
            return Some(entry);
        }
        let lower = label.to_lowercase();
        self.entries
            .iter()
            .find(|(key, _)| key.to_lowercase() == lower)
            .map(|(_, entry)| entry)
    }

    /// Context block for `label`, empty when unknown
    pub fn format_for_generation(&self, label: &str) -> String {
        self.lookup(label)
            .map(DiseaseKnowledgeEntry::format_for_generation)
            .unwrap_or_default()
    }

    /// English display name for a label
    pub fn display_name(&self, label: &str) -> String {
        match self.lookup(label) {
            Some(entry) if !entry.disease_name.trim().is_empty() => entry.disease_name.clone(),
            _ => humanize_label(label),
        }
    }

    pub fn disease_names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn diseases_by_crop(&self, crop: &str) -> BTreeMap<String, DiseaseKnowledgeEntry> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.crop.eq_ignore_ascii_case(crop))
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "chilli_leafspot": {
            "disease_name": "Chilli Leaf Spot",
            "scientific_name": "Cercospora capsici",
            "crop": "chilli",
            "severity": "moderate",
            "spread_rate": "fast",
            "symptoms": ["Small circular spots with grey centres"],
            "treatment": {
                "immediate": ["Remove infected leaves", "Avoid overhead irrigation"],
                "chemical": ["Mancozeb 2.5 g per litre"]
            },
            "prevention": ["Use disease-free seed"],
            "cost_estimate": "Rs 500-800 per acre",
            "urgency": "high"
        },
        "rice_blast": { "crop": "rice" }
    }"#;

    fn retriever() -> KnowledgeRetriever {
        KnowledgeRetriever::from_json_str(SAMPLE).unwrap()
    }

    #[test]
    fn test_lookup_exact_then_case_insensitive() {
        let kb = retriever();
        assert!(kb.lookup("chilli_leafspot").is_some());
        assert_eq!(
            kb.lookup("Chilli_LeafSpot").map(|e| e.crop.as_str()),
            Some("chilli")
        );
        assert!(kb.lookup("groundnut_rust").is_none());
    }

    #[test]
    fn test_format_layout() {
        let context = retriever().format_for_generation("chilli_leafspot");
        assert!(context.starts_with("Disease: Chilli Leaf Spot (Cercospora capsici)\nCrop: chilli"));
        assert!(context.contains("Severity: Moderate | Spread Rate: Fast"));
        assert!(context.contains("Immediate Actions:\n- Remove infected leaves"));
        assert!(context.contains("Chemical Treatment:\n- Mancozeb 2.5 g per litre"));
        assert!(context.contains("Urgency: High"));
        assert!(!context.contains("Organic Treatment:"));
    }

    #[test]
    fn test_sparse_entry_uses_unknown() {
        let context = retriever().format_for_generation("rice_blast");
        assert!(context.starts_with("Disease: Unknown\nCrop: rice\nSeverity: Unknown | Spread Rate: Unknown"));
    }

    #[test]
    fn test_yield_impact_alone_is_rendered() {
        let entry = DiseaseKnowledgeEntry {
            disease_name: "Groundnut Rust".into(),
            yield_impact: "Up to 50% pod loss".into(),
            ..Default::default()
        };
        let context = entry.format_for_generation();
        assert!(context.contains("Additional Information:\nYield Impact: Up to 50% pod loss"));
        assert!(!context.contains("Cost Estimate:"));
    }

    #[test]
    fn test_format_is_bounded() {
        let entry = DiseaseKnowledgeEntry {
            disease_name: "Long".into(),
            symptoms: (0..500).map(|i| format!("symptom number {}", i)).collect(),
            ..Default::default()
        };
        let context = entry.format_for_generation();
        assert_eq!(context.chars().count(), MAX_CONTEXT_CHARS + 3);
        assert!(context.ends_with("..."));
    }

    #[test]
    fn test_unknown_label_formats_empty() {
        assert_eq!(retriever().format_for_generation("unknown"), "");
    }

    #[test]
    fn test_listings_and_display_name() {
        let kb = retriever();
        assert_eq!(kb.disease_names(), vec!["chilli_leafspot", "rice_blast"]);
        assert_eq!(kb.diseases_by_crop("RICE").len(), 1);
        assert_eq!(kb.display_name("chilli_leafspot"), "Chilli Leaf Spot");
        assert_eq!(kb.display_name("rice_blast"), "Rice Blast");
        assert_eq!(kb.display_name("groundnut_early_leaf_spot"), "Groundnut Early Leaf Spot");
    }

    #[test]
    fn test_bundled_knowledge_base_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("knowledge_base/crop_diseases.json");
        let kb = KnowledgeRetriever::load(&path).unwrap();
        for crop in ["chilli", "groundnut", "rice"] {
            assert!(!kb.diseases_by_crop(crop).is_empty(), "no entries for {}", crop);
        }
        assert!(kb.format_for_generation("rice_blast").contains("Tricyclazole"));
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let kb = KnowledgeRetriever::load_or_empty(Path::new("/nonexistent/kb.json"));
        assert!(kb.is_empty());
    }
}
