//! Subcommand implementations that need an LLM or a repository.

pub mod ask;
pub mod resolve;
pub mod status;
