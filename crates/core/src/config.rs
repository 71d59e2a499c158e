//! TOML-based configuration for mergewise.
//!
//! The API key is never stored in the file. The `[llm]` section names an
//! environment variable (`api_key_env`) and the key is resolved at runtime via
//! [`AppConfig::resolve_env_vars`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::ConfigError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// LLM provider settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Conflict resolution settings.
    #[serde(default)]
    pub resolve: ResolveConfig,

    /// Terminal presentation settings.
    #[serde(default)]
    pub ui: UiConfig,
}

// ---------------------------------------------------------------------------
// LLM
// ---------------------------------------------------------------------------

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// OpenAI chat completions (or any compatible endpoint).
    #[default]
    OpenAi,
    /// Anthropic messages API.
    Anthropic,
    /// Local Ollama server.
    Ollama,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenAi => write!(f, "openai"),
            Self::Anthropic => write!(f, "anthropic"),
            Self::Ollama => write!(f, "ollama"),
        }
    }
}

impl Provider {
    /// Default API base URL for the provider.
    pub fn default_api_url(self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Anthropic => "https://api.anthropic.com/v1",
            Self::Ollama => "http://localhost:11434",
        }
    }

    /// Whether requests must carry an API key.
    pub fn requires_api_key(self) -> bool {
        !matches!(self, Self::Ollama)
    }
}

/// LLM connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Backend to talk to.
    #[serde(default)]
    pub provider: Provider,

    /// Model identifier passed to the provider.
    #[serde(default = "default_model")]
    pub model: String,

    /// API base URL. Defaults per provider when unset.
    #[serde(default)]
    pub api_url: Option<String>,

    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// HTTP timeout for a single request, in seconds.
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Upper bound on generated tokens.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Resolved API key (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub api_key: Option<String>,
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_llm_timeout() -> u64 {
    120
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    4096
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            model: default_model(),
            api_url: None,
            api_key_env: default_api_key_env(),
            timeout_secs: default_llm_timeout(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            api_key: None,
        }
    }
}

impl LlmConfig {
    /// API base URL with the provider default applied, without a trailing slash.
    pub fn effective_api_url(&self) -> String {
        self.api_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_api_url())
            .trim_end_matches('/')
            .to_string()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Resolve
// ---------------------------------------------------------------------------

/// Conflict resolution behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveConfig {
    /// Lines of surrounding code sent to the LLM on each side of a conflict.
    #[serde(default = "default_context_lines")]
    pub context_lines: usize,

    /// Lines of surrounding code shown in the terminal on each side.
    #[serde(default = "default_display_context_lines")]
    pub display_context_lines: usize,

    /// Custom prompt template. The packaged template is used when unset.
    #[serde(default)]
    pub template: Option<PathBuf>,

    /// Timeout for VCS bookkeeping commands, in seconds.
    #[serde(default = "default_vcs_timeout")]
    pub vcs_timeout_secs: u64,

    /// Directory for JSON resolution logs. Logging is off when unset.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_context_lines() -> usize {
    10
}
fn default_display_context_lines() -> usize {
    3
}
fn default_vcs_timeout() -> u64 {
    5
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            context_lines: default_context_lines(),
            display_context_lines: default_display_context_lines(),
            template: None,
            vcs_timeout_secs: default_vcs_timeout(),
            log_dir: None,
        }
    }
}

impl ResolveConfig {
    pub fn vcs_timeout(&self) -> Duration {
        Duration::from_secs(self.vcs_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// UI
// ---------------------------------------------------------------------------

/// Terminal presentation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiConfig {
    /// Colored output.
    #[serde(default = "default_true")]
    pub color: bool,
}

fn default_true() -> bool {
    true
}

impl Default for UiConfig {
    fn default() -> Self {
        Self { color: true }
    }
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

/// Default location of the config file (`~/.config/mergewise/config.toml`).
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mergewise")
        .join("config.toml")
}

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    ///
    /// This does **not** resolve environment variables -- call
    /// [`resolve_env_vars`](Self::resolve_env_vars) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Resolve the API key from the environment.
    ///
    /// A missing variable only logs a warning; the LLM client reports it when
    /// a request is actually made.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        if self.llm.provider.requires_api_key() {
            self.llm.api_key = resolve_optional_env(&self.llm.api_key_env, "llm.api_key_env");
        }
        Ok(())
    }

    /// Validate that all fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.llm.model.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "llm.model".into(),
                detail: "model must not be empty".into(),
            });
        }
        if self.llm.provider.requires_api_key() && self.llm.api_key_env.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "llm.api_key_env".into(),
                detail: format!("provider '{}' needs an API key variable", self.llm.provider),
            });
        }
        if self.llm.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "llm.timeout_secs".into(),
                detail: "timeout must be > 0".into(),
            });
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::InvalidValue {
                field: "llm.temperature".into(),
                detail: "temperature must be between 0.0 and 2.0".into(),
            });
        }
        if self.resolve.vcs_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "resolve.vcs_timeout_secs".into(),
                detail: "timeout must be > 0".into(),
            });
        }
        if let Some(ref template) = self.resolve.template {
            if !template.exists() {
                return Err(ConfigError::InvalidValue {
                    field: "resolve.template".into(),
                    detail: format!("{} does not exist", template.display()),
                });
            }
        }
        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`load_and_resolve`](Self::load_and_resolve), but falls back to
    /// defaults when the file does not exist.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load_and_resolve(path);
        }
        debug!(path = %path.display(), "no config file, using defaults");
        let mut config = Self::default();
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }
}

/// Try to read an environment variable by name. Returns `Some(value)` on
/// success; logs a warning and returns `None` if the variable is unset.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val)
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            warn!(field, env_name, "env var not set");
            None
        }
    }
}

/// Commented default configuration written by `mergewise init`.
pub const DEFAULT_CONFIG_TOML: &str = r#"# mergewise configuration

[llm]
# openai | anthropic | ollama
provider = "openai"
model = "gpt-4o-mini"
# api_url = "https://api.openai.com/v1"
api_key_env = "OPENAI_API_KEY"
timeout_secs = 120
temperature = 0.2
max_tokens = 4096

[resolve]
# Lines of code sent to the LLM around each conflict.
context_lines = 10
# Lines of code shown around each conflict in the terminal.
display_context_lines = 3
# template = "/path/to/custom_template.txt"
vcs_timeout_secs = 5
# log_dir = "~/.local/share/mergewise/logs"

[ui]
color = true
"#;
