//! Prompt assembly for conflict resolution.

use std::path::Path;

use tracing::debug;

use super::parser::ConflictRegion;
use crate::errors::TemplateError;
use crate::template::{Context, Template};

/// Packaged resolution template.
pub const DEFAULT_RESOLVE_TEMPLATE: &str = include_str!("../../templates/resolve.txt");
/// Packaged template for the single JSON repair round trip.
pub const REPAIR_TEMPLATE: &str = include_str!("../../templates/repair.txt");

/// Builds the LLM prompt for one conflict region.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    template: Template,
}

impl PromptBuilder {
    /// Use the template at `path`, or the packaged default when `None`.
    pub fn new(path: Option<&Path>) -> Result<Self, TemplateError> {
        let template = match path {
            Some(path) => Template::load(path)?,
            None => Template::parse(DEFAULT_RESOLVE_TEMPLATE)?,
        };
        Ok(Self { template })
    }

    pub fn from_source(source: &str) -> Result<Self, TemplateError> {
        Ok(Self {
            template: Template::parse(source)?,
        })
    }

    /// Render the prompt for `region`. `full_file_text` is the current file
    /// contents, which may differ from the parse-time text after an edit.
    pub fn build(
        &self,
        region: &ConflictRegion,
        full_file_text: &str,
        user_comment: Option<&str>,
    ) -> String {
        let comment = user_comment.map(str::trim).filter(|c| !c.is_empty());

        let mut ctx = Context::new();
        ctx.insert("full_file_content", full_file_text)
            .insert("context_before", region.context_before.as_str())
            .insert("context_after", region.context_after.as_str())
            .insert("base_label", region.base_label.as_str())
            .insert("base_content", region.base_content.as_str())
            .insert("incoming_label", region.incoming_label.as_str())
            .insert("incoming_content", region.incoming_content.as_str())
            .insert("start_line", region.start_line)
            .insert("end_line", region.end_line)
            .insert("has_comment", comment.is_some())
            .insert("user_comment", comment.unwrap_or_default())
            .insert("has_ancestor", region.ancestor_content.is_some())
            .insert(
                "ancestor_content",
                region.ancestor_content.as_deref().unwrap_or_default(),
            );

        let prompt = self.template.render(&ctx);
        debug!(
            start_line = region.start_line,
            prompt_len = prompt.len(),
            "built resolution prompt"
        );
        prompt
    }
}

/// Prompt asking the LLM to turn `malformed` into schema-conformant JSON.
pub fn build_repair_prompt(malformed: &str, error: &str) -> Result<String, TemplateError> {
    let mut ctx = Context::new();
    ctx.insert("malformed", malformed).insert("error", error);
    Ok(Template::parse(REPAIR_TEMPLATE)?.render(&ctx))
}
