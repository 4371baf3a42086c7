//! Response quality checks.
//!
//! Only an empty response is invalid. Every other finding is advisory and is
//! reported in `issues` while the text still goes back to the caller.

use serde::{Deserialize, Serialize};

use crate::persona::Persona;

pub const MIN_RESPONSE_CHARS: usize = 10;
pub const MAX_RESPONSE_CHARS: usize = 2000;
pub const TRUNCATED_RESPONSE_CHARS: usize = 1900;
pub const TRUNCATION_MARKER: &str = "... [Response truncated for length]";

pub const ISSUE_EMPTY: &str = "Empty response";
pub const ISSUE_TOO_SHORT: &str = "Response too short";
pub const ISSUE_TOO_LONG: &str = "Response too long";
pub const ISSUE_MISSING_DISCLAIMER: &str = "Missing professional consultation disclaimer";

/// Lowercase phrases that count as a professional disclaimer.
const DISCLAIMER_PHRASES: &[&str] = &["i am not a", "i'm not a", "consult a professional"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub issues: Vec<String>,
    pub formatted_response: String,
}

pub fn validate(raw: &str, persona: Persona) -> ValidationReport {
    let trimmed = raw.trim();

    if trimmed.is_empty() {
        return ValidationReport {
            is_valid: false,
            issues: vec![ISSUE_EMPTY.to_string()],
            formatted_response: trimmed.to_string(),
        };
    }

    let mut issues = Vec::new();
    let mut formatted = trimmed.to_string();
    let len = trimmed.chars().count();

    if len < MIN_RESPONSE_CHARS {
        issues.push(ISSUE_TOO_SHORT.to_string());
    }

    if len > MAX_RESPONSE_CHARS {
        issues.push(ISSUE_TOO_LONG.to_string());
        formatted = trimmed.chars().take(TRUNCATED_RESPONSE_CHARS).collect();
        formatted.push_str(TRUNCATION_MARKER);
    }

    if persona.is_sensitive() && !has_disclaimer(trimmed) {
        issues.push(ISSUE_MISSING_DISCLAIMER.to_string());
    }

    ValidationReport {
        is_valid: true,
        issues,
        formatted_response: formatted,
    }
}

fn has_disclaimer(text: &str) -> bool {
    let lower = text.to_lowercase();
    DISCLAIMER_PHRASES.iter().any(|p| lower.contains(p))
}
