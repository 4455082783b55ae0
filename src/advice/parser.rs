//! Parser from free-form generated advice to [`AdvicePayload`]
//!
//! The generator is asked for seven numbered sections. Headers are
//! recognised by keyword, optionally after a `1.`-`7.` number, with
//! markdown decoration ignored. A bare numbered line counts as a header
//! only when it reads like one (bold or ending in `:`); otherwise it is a
//! list item. Anything the text does not supply is filled from the
//! knowledge entry, then from fixed defaults.

use super::{
    AdvicePayload, TreatmentPlan, Urgency, DEFAULT_COST_ESTIMATE, DEFAULT_IMMEDIATE_ACTION,
    DEFAULT_SUMMARY, DEFAULT_TIMELINE,
};
use crate::knowledge::DiseaseKnowledgeEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Summary,
    Immediate,
    Treatment,
    Chemical,
    Organic,
    Prevention,
    Timeline,
    Cost,
    Urgency,
}

impl Section {
    /// Section announced by the leading words of a header
    fn from_keyword(text: &str) -> Option<Section> {
        let lower = text.to_lowercase();
        let starts = |kw: &str| lower.starts_with(kw);
        if starts("summary") {
            Some(Section::Summary)
        } else if starts("immediate") {
            Some(Section::Immediate)
        } else if starts("treatment") {
            Some(Section::Treatment)
        } else if starts("prevention") {
            Some(Section::Prevention)
        } else if starts("timeline") {
            Some(Section::Timeline)
        } else if starts("cost") {
            Some(Section::Cost)
        } else if starts("urgency") {
            Some(Section::Urgency)
        } else {
            None
        }
    }

    fn from_number(n: u32) -> Option<Section> {
        match n {
            1 => Some(Section::Summary),
            2 => Some(Section::Immediate),
            3 => Some(Section::Treatment),
            4 => Some(Section::Prevention),
            5 => Some(Section::Timeline),
            6 => Some(Section::Cost),
            7 => Some(Section::Urgency),
            _ => None,
        }
    }

    /// Position of the section in the requested numbered layout
    fn number(&self) -> u32 {
        match self {
            Section::Summary => 1,
            Section::Immediate => 2,
            Section::Treatment | Section::Chemical | Section::Organic => 3,
            Section::Prevention => 4,
            Section::Timeline => 5,
            Section::Cost => 6,
            Section::Urgency => 7,
        }
    }

    fn in_treatment(&self) -> bool {
        matches!(self, Section::Treatment | Section::Chemical | Section::Organic)
    }
}

/// Strip markdown emphasis and heading marks from both ends
fn strip_decoration(text: &str) -> &str {
    text.trim_matches(|c: char| c == '#' || c == '*' || c == '_' || c.is_whitespace())
}

/// Split `N.` / `N)` off the front of a line
fn split_number(text: &str) -> Option<(u32, &str)> {
    let digits = text.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 || digits > 2 {
        return None;
    }
    let rest = &text[digits..];
    let rest = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')'))?;
    let n = text[..digits].parse().ok()?;
    Some((n, rest))
}

/// Bullet marker removed, if the line had one
fn strip_bullet(line: &str) -> Option<&str> {
    for marker in ["- ", "• ", "* ", "+ "] {
        if let Some(rest) = line.strip_prefix(marker) {
            return Some(rest.trim());
        }
    }
    if line == "-" || line == "•" {
        return Some("");
    }
    split_number(line).map(|(_, rest)| rest.trim())
}

/// Text after the first colon of a header, if any
fn inline_content(header: &str) -> Option<String> {
    header
        .split_once(':')
        .map(|(_, rest)| strip_decoration(rest).to_string())
        .filter(|rest| !rest.is_empty())
}

/// A header line: the section it opens and content written after its colon
///
/// A numbered line that starts with a keyword is still a list item unless it
/// is decorated like a header or its number moves forward to that section.
fn detect_header(line: &str, current: Option<Section>) -> Option<(Section, Option<String>)> {
    let bare = line.trim_start_matches(|c: char| c == '#' || c.is_whitespace());

    // unnumbered bullets are list items, even if they mention a keyword
    if bare.starts_with("- ") || bare.starts_with("• ") || bare.starts_with("+ ") {
        return None;
    }
    if bare.starts_with("* ") {
        return None;
    }

    let undecorated = strip_decoration(bare);
    match split_number(undecorated) {
        Some((n, rest)) => {
            let rest_text = strip_decoration(rest);
            if !(1..=7).contains(&n) {
                return None;
            }
            let header_like = rest_text.ends_with(':')
                || rest.trim().starts_with("**")
                || (rest_text.chars().any(char::is_alphabetic)
                    && !rest_text.chars().any(char::is_lowercase));
            if let Some(section) = Section::from_keyword(rest_text) {
                let advances = section.number() == n && current.map_or(true, |c| n > c.number());
                return (header_like || advances).then(|| (section, inline_content(rest_text)));
            }
            if header_like {
                Section::from_number(n).map(|section| (section, inline_content(rest_text)))
            } else {
                None
            }
        }
        None => Section::from_keyword(undecorated).map(|s| (s, inline_content(undecorated))),
    }
}

/// `chemical` / `organic` sub-header inside the treatment section
fn detect_treatment_switch(line: &str) -> Option<(Section, Option<String>)> {
    let text = strip_decoration(strip_bullet(line).unwrap_or(line));
    let lower = text.to_lowercase();
    let section = if lower.starts_with("chemical") {
        Section::Chemical
    } else if lower.starts_with("organic") {
        Section::Organic
    } else {
        return None;
    };
    Some((section, inline_content(text)))
}

#[derive(Debug, Default)]
struct Sections {
    summary: Vec<String>,
    immediate: Vec<String>,
    chemical: Vec<String>,
    organic: Vec<String>,
    prevention: Vec<String>,
    timeline: Vec<String>,
    cost: Vec<String>,
    urgency: Option<Urgency>,
    urgency_seen: bool,
}

impl Sections {
    fn push(&mut self, section: Section, line: &str) {
        let bullet = strip_bullet(line);
        let text = strip_decoration(bullet.unwrap_or(line)).to_string();
        if text.is_empty() {
            return;
        }
        match section {
            Section::Summary => self.summary.push(text),
            Section::Timeline => self.timeline.push(text),
            Section::Cost => self.cost.push(text),
            Section::Immediate => self.immediate.push(text),
            Section::Prevention => self.prevention.push(text),
            Section::Chemical => self.chemical.push(text),
            Section::Organic => self.organic.push(text),
            // items before a chemical/organic sub-header have no home
            Section::Treatment => {}
            Section::Urgency => {
                if !self.urgency_seen {
                    self.urgency_seen = true;
                    self.urgency = Urgency::detect(&text);
                }
            }
        }
    }

    /// List sections keep only bullet items; prose sections keep everything
    fn accept(&mut self, section: Section, line: &str) {
        let is_list = matches!(
            section,
            Section::Immediate | Section::Prevention | Section::Chemical | Section::Organic
        );
        if is_list && strip_bullet(line).is_none() {
            return;
        }
        self.push(section, line);
    }

    fn into_payload(self, entry: Option<&DiseaseKnowledgeEntry>, raw: Option<String>) -> AdvicePayload {
        let joined = |parts: Vec<String>| parts.join(" ").trim().to_string();
        let non_empty = |s: &str| Some(s.to_string()).filter(|s| !s.trim().is_empty());
        let list_or = |parsed: Vec<String>, from_entry: Option<&Vec<String>>| {
            if parsed.is_empty() {
                from_entry.cloned().unwrap_or_default()
            } else {
                parsed
            }
        };

        let summary = Some(joined(self.summary))
            .filter(|s| !s.is_empty())
            .or_else(|| entry.and_then(|e| non_empty(&e.disease_name)))
            .unwrap_or_else(|| DEFAULT_SUMMARY.to_string());

        let mut immediate_actions = list_or(self.immediate, entry.map(|e| &e.treatment.immediate));
        if immediate_actions.is_empty() {
            immediate_actions.push(DEFAULT_IMMEDIATE_ACTION.to_string());
        }

        let timeline = Some(joined(self.timeline))
            .filter(|s| !s.is_empty())
            .or_else(|| entry.and_then(|e| non_empty(&e.timeline)))
            .unwrap_or_else(|| DEFAULT_TIMELINE.to_string());

        let cost_estimate = Some(joined(self.cost))
            .filter(|s| !s.is_empty())
            .or_else(|| entry.and_then(|e| non_empty(&e.cost_estimate)))
            .unwrap_or_else(|| DEFAULT_COST_ESTIMATE.to_string());

        let urgency = self
            .urgency
            .or_else(|| entry.and_then(|e| Urgency::detect(&e.urgency)))
            .unwrap_or_default();

        AdvicePayload {
            summary,
            immediate_actions,
            treatment_plan: TreatmentPlan {
                chemical: list_or(self.chemical, entry.map(|e| &e.treatment.chemical)),
                organic: list_or(self.organic, entry.map(|e| &e.treatment.organic)),
            },
            prevention_tips: list_or(self.prevention, entry.map(|e| &e.prevention)),
            timeline,
            cost_estimate,
            urgency,
            raw_llm_response: raw,
        }
    }
}

/// Parse generated text; missing sections come from `entry` or defaults
pub fn parse_generation(text: &str, entry: Option<&DiseaseKnowledgeEntry>) -> AdvicePayload {
    let mut sections = Sections::default();
    let mut current: Option<Section> = None;

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.chars().all(|c| matches!(c, '-' | '=' | '*' | '_' | '#')) {
            continue;
        }

        if current.map(|s| s.in_treatment()).unwrap_or(false) {
            if let Some((sub, inline)) = detect_treatment_switch(line) {
                current = Some(sub);
                if let Some(content) = inline {
                    sections.push(sub, &content);
                }
                continue;
            }
        }

        if let Some((section, inline)) = detect_header(line, current) {
            current = Some(section);
            if let Some(content) = inline {
                sections.push(section, &content);
            }
            continue;
        }

        if let Some(section) = current {
            sections.accept(section, line);
        }
    }

    sections.into_payload(entry, Some(text.to_string()))
}

/// Payload built from knowledge alone, used when generation fails
pub fn fallback_payload(entry: Option<&DiseaseKnowledgeEntry>) -> AdvicePayload {
    Sections::default().into_payload(entry, None)
}
