//! LLM backend abstraction.
//!
//! Every provider is collapsed into the single [`LlmClient::send`] capability:
//! one prompt in, one text reply out.

pub mod http;

pub use http::HttpLlmClient;

use crate::errors::LlmError;

/// A backend that answers a prompt with free text.
pub trait LlmClient {
    /// Send `prompt` and return the provider's text reply.
    fn send(&self, prompt: &str) -> Result<String, LlmError>;
}

impl<T: LlmClient + ?Sized> LlmClient for &T {
    fn send(&self, prompt: &str) -> Result<String, LlmError> {
        (**self).send(prompt)
    }
}

impl<T: LlmClient + ?Sized> LlmClient for Box<T> {
    fn send(&self, prompt: &str) -> Result<String, LlmError> {
        (**self).send(prompt)
    }
}

/// Parse `text` as JSON if possible, falling back to the first `{...}` object
/// embedded in it. Returns `None` when neither yields valid JSON.
pub fn best_effort_json(text: &str) -> Option<serde_json::Value> {
    if let Ok(value) = serde_json::from_str(text.trim()) {
        return Some(value);
    }
    let candidate = crate::conflict::validator::extract_balanced_object(text)?;
    serde_json::from_str(candidate).ok()
}
