//! Validation of LLM replies against the suggestion schema.
//!
//! The ladder is: strict parse, then extraction of the first balanced JSON
//! object from surrounding prose, then exactly one repair round trip through
//! the LLM. Anything still invalid becomes [`ValidationError::InvalidResponse`].

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::prompt::build_repair_prompt;
use crate::errors::ValidationError;
use crate::llm::LlmClient;

/// A proposed resolution for one conflict region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub merged_code: String,
    pub reason: String,
}

/// Validate `raw`, using `llm` for at most one repair request.
pub fn validate<L: LlmClient + ?Sized>(raw: &str, llm: &L) -> Result<Suggestion, ValidationError> {
    let first_error = match parse_or_extract(raw) {
        Ok(suggestion) => return Ok(suggestion),
        Err(e) => e,
    };

    info!(error = %first_error, "LLM reply is not a valid suggestion, requesting repair");
    let repair_prompt = build_repair_prompt(raw, &first_error).map_err(|e| {
        ValidationError::InvalidResponse {
            raw: raw.to_string(),
            detail: format!("{first_error} (repair prompt unavailable: {e})"),
        }
    })?;

    let repaired = match llm.send(&repair_prompt) {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "repair request failed");
            return Err(ValidationError::InvalidResponse {
                raw: raw.to_string(),
                detail: format!("{first_error} (repair request failed: {e})"),
            });
        }
    };

    parse_or_extract(&repaired).map_err(|second_error| {
        warn!(error = %second_error, "repaired reply is still invalid");
        ValidationError::InvalidResponse {
            raw: raw.to_string(),
            detail: first_error,
        }
    })
}

/// Steps one and two of the ladder. The error is the strict-parse message.
fn parse_or_extract(text: &str) -> Result<Suggestion, String> {
    let strict_error = match serde_json::from_str::<Suggestion>(text.trim()) {
        Ok(suggestion) => return Ok(suggestion),
        Err(e) => e.to_string(),
    };

    if let Some(candidate) = extract_balanced_object(text) {
        match serde_json::from_str::<Suggestion>(candidate) {
            Ok(suggestion) => {
                debug!("extracted suggestion from surrounding text");
                return Ok(suggestion);
            }
            Err(e) => return Err(e.to_string()),
        }
    }
    Err(strict_error)
}

/// Return the first balanced `{...}` span in `text`.
///
/// Braces inside JSON string literals (including escaped quotes) do not count
/// towards the depth. Returns `None` if the first object never closes.
pub fn extract_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}
