//! Utilities module for logging, errors and small helpers
//!
//! This module provides:
//! - Structured logging with tracing
//! - Error handling types
//! - Text helpers shared by the knowledge and advice modules

pub mod error;
pub mod logging;

// Re-export main types for convenience
pub use error::{AdvisoryError, ErrorKind, Result, ResultExt};
pub use logging::{init_logging, LogConfig};

/// Truncate to at most `max_chars` characters, appending `marker` when cut
pub fn truncate_chars(text: &str, max_chars: usize, marker: &str) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}{}", &text[..byte_idx], marker),
        None => text.to_string(),
    }
}

/// Turn a snake_case label into a display name ("chilli_leafspot" -> "Chilli Leafspot")
pub fn humanize_label(label: &str) -> String {
    label
        .split(|c: char| c == '_' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Round to two decimals
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
