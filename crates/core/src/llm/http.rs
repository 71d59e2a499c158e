//! HTTP client for the supported LLM providers.
//!
//! Uses `reqwest::blocking`; the interactive loop is synchronous and the only
//! timeout applied is the client's own request timeout.

use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use super::LlmClient;
use crate::config::{LlmConfig, Provider};
use crate::errors::LlmError;

/// Talks to OpenAI-compatible, Anthropic or Ollama endpoints.
pub struct HttpLlmClient {
    http: Client,
    provider: Provider,
    model: String,
    api_url: String,
    api_key: Option<String>,
    api_key_env: String,
    temperature: f32,
    max_tokens: u32,
}

// Response shapes, trimmed to the fields we read.

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicBlock>,
}

#[derive(Debug, Deserialize)]
struct AnthropicBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

impl HttpLlmClient {
    /// Build a client from the `[llm]` configuration section.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let http = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("mergewise/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            provider: config.provider,
            model: config.model.clone(),
            api_url: config.effective_api_url(),
            api_key: config.api_key.clone(),
            api_key_env: config.api_key_env.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    fn endpoint(&self) -> String {
        match self.provider {
            Provider::OpenAi => format!("{}/chat/completions", self.api_url),
            Provider::Anthropic => format!("{}/messages", self.api_url),
            Provider::Ollama => format!("{}/api/generate", self.api_url),
        }
    }

    fn request_body(&self, prompt: &str) -> serde_json::Value {
        match self.provider {
            Provider::OpenAi => json!({
                "model": self.model,
                "messages": [{ "role": "user", "content": prompt }],
                "temperature": self.temperature,
                "max_tokens": self.max_tokens,
            }),
            Provider::Anthropic => json!({
                "model": self.model,
                "messages": [{ "role": "user", "content": prompt }],
                "temperature": self.temperature,
                "max_tokens": self.max_tokens,
            }),
            Provider::Ollama => json!({
                "model": self.model,
                "prompt": prompt,
                "stream": false,
                "options": { "temperature": self.temperature },
            }),
        }
    }

    fn api_key(&self) -> Result<Option<&str>, LlmError> {
        if !self.provider.requires_api_key() {
            return Ok(None);
        }
        self.api_key
            .as_deref()
            .map(Some)
            .ok_or_else(|| LlmError::MissingApiKey(self.api_key_env.clone()))
    }

    fn extract_text(&self, body: &str) -> Result<String, LlmError> {
        let parse_err = |e: serde_json::Error| LlmError::Provider(format!("unexpected response: {e}"));
        let text = match self.provider {
            Provider::OpenAi => {
                let resp: OpenAiResponse = serde_json::from_str(body).map_err(parse_err)?;
                resp.choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.message.content)
            }
            Provider::Anthropic => {
                let resp: AnthropicResponse = serde_json::from_str(body).map_err(parse_err)?;
                let joined: String = resp
                    .content
                    .into_iter()
                    .filter(|b| b.kind == "text")
                    .filter_map(|b| b.text)
                    .collect();
                Some(joined)
            }
            Provider::Ollama => {
                let resp: OllamaResponse = serde_json::from_str(body).map_err(parse_err)?;
                Some(resp.response)
            }
        };
        match text {
            Some(t) if !t.trim().is_empty() => Ok(t),
            _ => Err(LlmError::EmptyResponse(truncate(body, 200))),
        }
    }
}

impl LlmClient for HttpLlmClient {
    #[instrument(skip(self, prompt), fields(provider = %self.provider, model = %self.model))]
    fn send(&self, prompt: &str) -> Result<String, LlmError> {
        let key = self.api_key()?;
        let url = self.endpoint();
        debug!(url = %url, prompt_len = prompt.len(), "sending LLM request");

        let mut req = self.http.post(&url).json(&self.request_body(prompt));
        req = match (self.provider, key) {
            (Provider::Anthropic, Some(key)) => req
                .header("x-api-key", key)
                .header("anthropic-version", "2023-06-01"),
            (_, Some(key)) => req.bearer_auth(key),
            (_, None) => req,
        };

        let resp = req.send()?;
        let status = resp.status();
        let body = resp.text()?;
        if !status.is_success() {
            warn!(status = status.as_u16(), "LLM request failed");
            return Err(LlmError::ApiError {
                status: status.as_u16(),
                body: truncate(&body, 500),
            });
        }

        let text = self.extract_text(&body)?;
        info!(reply_len = text.len(), "received LLM reply");
        Ok(text)
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
