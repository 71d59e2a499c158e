//! mergewise core library.
//!
//! This crate provides the building blocks for LLM-assisted merge conflict
//! resolution: conflict parsing, prompt templates, the LLM client, response
//! validation, the interactive resolution engine, file mutation, VCS
//! integration, and the bounded external-command runner they share.

pub mod assist;
pub mod config;
pub mod conflict;
pub mod editor;
pub mod errors;
pub mod llm;
pub mod process;
pub mod template;
pub mod ui;
pub mod vcs;

// Re-exports for convenience.
pub use config::AppConfig;
pub use conflict::{ResolveSession, SessionOptions, SessionOutcome};
pub use errors::CoreError;
pub use llm::{HttpLlmClient, LlmClient};
pub use ui::{Interaction, Theme};
pub use vcs::{SystemVcs, VcsBackend};
