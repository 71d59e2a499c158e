//! Error types for the mergewise core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use std::path::PathBuf;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Vcs(#[from] VcsError),
}

// ---------------------------------------------------------------------------
// Conflict errors
// ---------------------------------------------------------------------------

/// Errors from parsing conflicted files and writing resolutions back.
#[derive(Debug, Error)]
pub enum ConflictError {
    /// The input path does not exist.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The input path exists but is not a regular file.
    #[error("not a regular file: {}", .0.display())]
    NotAFile(PathBuf),

    /// A `<<<<<<<` marker was never closed by a `>>>>>>>` marker.
    #[error("conflict opened at line {start_line} is never closed (missing >>>>>>> marker)")]
    MalformedRegion { start_line: usize },

    /// A region's original text could not be found in the buffer at write time.
    #[error("conflict at lines {start_line}-{end_line} no longer matches the file contents")]
    RegionMismatch { start_line: usize, end_line: usize },

    /// Writing the resolved file failed; the original is left untouched.
    #[error("failed to write '{}': {source}", path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Generic I/O wrapper.
    #[error("conflict I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Template errors
// ---------------------------------------------------------------------------

/// Errors from loading and parsing prompt templates.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// The configured template file does not exist.
    #[error("template not found: {}", .0.display())]
    NotFound(PathBuf),

    /// A block tag is malformed or unbalanced.
    #[error("template syntax error: {0}")]
    Syntax(String),

    /// Generic I/O error reading the template file.
    #[error("template I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// LLM errors
// ---------------------------------------------------------------------------

/// Errors from talking to the LLM provider.
#[derive(Debug, Error)]
pub enum LlmError {
    /// HTTP-level transport error (network, TLS, timeout).
    #[error("LLM HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The provider returned a non-success status code.
    #[error("LLM API error (HTTP {status}): {body}")]
    ApiError { status: u16, body: String },

    /// The API key environment variable is not set.
    #[error("LLM API key not configured (set the '{0}' environment variable)")]
    MissingApiKey(String),

    /// The provider answered but the reply carried no text.
    #[error("LLM response contained no text: {0}")]
    EmptyResponse(String),

    /// Any other provider failure (used by non-HTTP clients).
    #[error("LLM provider error: {0}")]
    Provider(String),
}

impl LlmError {
    /// Short remedy shown to the user next to the error.
    pub fn hint(&self) -> &'static str {
        match self {
            Self::MissingApiKey(_) => {
                "Export the API key variable named in [llm].api_key_env, then retry."
            }
            Self::ApiError { status: 401 | 403, .. } => {
                "The provider rejected the credentials. Check the API key and [llm] settings."
            }
            Self::ApiError { status: 429, .. } => "Rate limited by the provider. Wait a moment and retry.",
            Self::HttpError(_) => "Check network connectivity and [llm].api_url, then retry.",
            _ => "Retry, or pick a side manually.",
        }
    }
}

// ---------------------------------------------------------------------------
// Validation errors
// ---------------------------------------------------------------------------

/// Errors from validating an LLM reply against the suggestion schema.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Neither parsing, extraction nor the repair round trip produced a
    /// valid suggestion.
    #[error("invalid LLM response: {detail}")]
    InvalidResponse { raw: String, detail: String },
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// VCS errors
// ---------------------------------------------------------------------------

/// Errors from read-only repository queries. Marking a file resolved never
/// fails with these; it reports a `MarkStatus` instead.
#[derive(Debug, Error)]
pub enum VcsError {
    /// No `.git` or `.hg` directory above the given path.
    #[error("not inside a git or mercurial repository: {}", .0.display())]
    NoRepository(PathBuf),

    /// Underlying `git2` error.
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// An external VCS command failed or timed out.
    #[error("{command} {outcome}")]
    Command { command: String, outcome: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = ConflictError::FileNotFound(PathBuf::from("/tmp/missing.rs"));
        assert_eq!(err.to_string(), "file not found: /tmp/missing.rs");

        let err = ConflictError::MalformedRegion { start_line: 7 };
        assert!(err.to_string().contains("line 7"));

        let err = LlmError::MissingApiKey("OPENAI_API_KEY".into());
        assert!(err.to_string().contains("OPENAI_API_KEY"));

        let err = ConfigError::InvalidValue {
            field: "resolve.context_lines".into(),
            detail: "too large".into(),
        };
        assert!(err.to_string().contains("resolve.context_lines"));
    }

    #[test]
    fn test_llm_hints() {
        let err = LlmError::ApiError {
            status: 401,
            body: "unauthorized".into(),
        };
        assert!(err.hint().contains("credentials"));
        assert!(LlmError::MissingApiKey("X".into()).hint().contains("api_key_env"));
    }

    #[test]
    fn test_core_error_from_subsystem() {
        let err: CoreError = ConflictError::NotAFile(PathBuf::from("dir")).into();
        assert!(matches!(err, CoreError::Conflict(_)));

        let err: CoreError = TemplateError::Syntax("unclosed".into()).into();
        assert!(matches!(err, CoreError::Template(_)));
    }
}
