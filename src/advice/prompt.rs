//! Prompts for treatment advice generation
//!
//! The numbered seven-section layout requested here is what
//! [`super::parser`] expects back. Change both together.

use crate::language::Language;

pub const SYSTEM_PROMPT: &str = "You are an expert agricultural advisor helping Indian farmers treat crop diseases.
Provide clear, practical, and affordable advice in simple language suitable for farmers with limited resources.
Focus on actionable steps, local remedies, and cost-effective solutions.
Be concise, direct, and farmer-friendly. Avoid overly technical jargon.";

/// Per-request prompt
pub fn user_prompt(
    disease_name: &str,
    crop: &str,
    confidence: f64,
    knowledge_context: &str,
    language: Language,
) -> String {
    let context = if knowledge_context.trim().is_empty() {
        "No database entry is available for this disease."
    } else {
        knowledge_context
    };

    format!(
        "A farmer in India has detected {disease} in their {crop} crop with {confidence:.1}% confidence.

Agricultural Database Information:
{context}

Please provide treatment advice in {language} language with the following structure:

1. SUMMARY (2-3 sentences): Brief explanation of the disease and what it means for the farmer
2. IMMEDIATE ACTIONS (3-5 steps): Practical steps the farmer should take right now
3. TREATMENT PLAN:
   - Chemical options: Specific products with dosages in simple terms
   - Organic options: Natural/traditional remedies available locally
4. PREVENTION TIPS (3-5 tips): How to prevent this in future crops
5. TIMELINE: Expected time for recovery/improvement
6. COST ESTIMATE: Approximate cost range in Indian Rupees
7. URGENCY: Low/Medium/High/Critical

Keep advice practical, affordable, and easy to understand. Use simple language that farmers can follow.
Include local product names where applicable. Focus on what's available in Indian agricultural markets.",
        disease = disease_name,
        crop = crop,
        confidence = confidence,
        context = context,
        language = language.english_name(),
    )
}
