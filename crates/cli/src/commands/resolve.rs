//! `mergewise resolve`: interactive per-file resolution.

use std::process::ExitCode;

use anyhow::{Context, Result};
use tracing::info;

use mergewise_core::conflict::{PromptBuilder, SessionReport};
use mergewise_core::editor::SystemEditor;
use mergewise_core::{
    AppConfig, HttpLlmClient, ResolveSession, SessionOptions, SessionOutcome, SystemVcs, Theme,
};

use crate::style;
use crate::terminal::TerminalInteraction;
use crate::ResolveArgs;

/// Resolve each file in turn. Stops at the first abort; a file that fails to
/// load is reported and the rest are still processed.
pub fn run(config: &AppConfig, args: ResolveArgs, theme: Theme) -> Result<ExitCode> {
    let llm = HttpLlmClient::from_config(&config.llm).context("failed to build LLM client")?;
    let editor = SystemEditor::from_env();
    let vcs = SystemVcs::new(config.resolve.vcs_timeout());
    let template = args.template.as_deref().or(config.resolve.template.as_deref());
    let prompts = PromptBuilder::new(template).context("failed to load prompt template")?;

    let options = SessionOptions {
        context_lines: args.context_lines.unwrap_or(config.resolve.context_lines),
        display_context_lines: config.resolve.display_context_lines,
        dry_run: args.dry_run,
        mark_resolved: !args.no_vcs,
        log_dir: args.log_dir.clone().or_else(|| config.resolve.log_dir.clone()),
    };
    let session = ResolveSession::new(&llm, &editor, &vcs, prompts, theme, options);
    let mut ui = TerminalInteraction::new();

    let mut reports: Vec<(String, SessionReport)> = Vec::new();
    let mut failed = false;
    let mut aborted = false;

    for file in &args.files {
        info!(file = %file.display(), "starting resolution");
        match session.run(file, &mut ui) {
            Ok(report) => {
                if let Some(ref log) = report.log_path {
                    println!("{}", style::dim(&format!("Resolution log: {}", log.display())));
                }
                aborted = report.outcome == SessionOutcome::Aborted;
                reports.push((file.display().to_string(), report));
                if aborted {
                    break;
                }
            }
            Err(e) => {
                failed = true;
                eprintln!("{}", style::error(&format!("{}: {}", file.display(), e)));
            }
        }
    }

    if reports.len() > 1 || (failed && !reports.is_empty()) {
        println!();
        println!("{}", style::session_table(&reports));
    }

    if failed || aborted {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
