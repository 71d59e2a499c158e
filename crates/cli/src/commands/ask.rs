//! `mergewise ask` and `mergewise review`.

use std::process::ExitCode;

use anyhow::{Context, Result};

use mergewise_core::assist::{capture_diff, review_diff, suggest_command};
use mergewise_core::process::{CommandOutcome, ExternalCommand};
use mergewise_core::ui::waiting;
use mergewise_core::{AppConfig, CoreError, HttpLlmClient, Interaction, Theme};

use crate::style;
use crate::terminal::TerminalInteraction;

fn print_llm_hint(theme: &Theme, err: &CoreError) {
    if let CoreError::Llm(e) = err {
        eprintln!("{}", theme.dim(e.hint()));
    }
}

pub fn run_ask(config: &AppConfig, request: &str, theme: Theme) -> Result<ExitCode> {
    let llm = HttpLlmClient::from_config(&config.llm).context("failed to build LLM client")?;
    let cwd = std::env::current_dir().context("failed to read current directory")?;
    let mut ui = TerminalInteraction::new();

    let suggestion = {
        let _wait = waiting(&mut ui, "Asking the LLM...");
        suggest_command(&llm, request, &cwd)
    };
    let suggestion = match suggestion {
        Ok(s) => s,
        Err(e) => {
            print_llm_hint(&theme, &e);
            return Err(e).context("could not get a command suggestion");
        }
    };

    ui.show(&format!("  {}", style::command(&suggestion.command)));
    if !suggestion.explanation.is_empty() {
        ui.show(&theme.dim(&format!("  {}", suggestion.explanation)));
    }
    ui.show("");

    if ui.confirm("Run this command?")? != Some(true) {
        ui.show(&theme.dim("Not run."));
        return Ok(ExitCode::SUCCESS);
    }

    let outcome = ExternalCommand::new("sh")
        .args(["-c", suggestion.command.as_str()])
        .interactive()
        .run();
    match outcome {
        CommandOutcome::Success { .. } => Ok(ExitCode::SUCCESS),
        other => {
            eprintln!("{}", style::error(&other.to_string()));
            Ok(ExitCode::FAILURE)
        }
    }
}

pub fn run_review(
    config: &AppConfig,
    staged: bool,
    revision: Option<&str>,
    theme: Theme,
) -> Result<ExitCode> {
    let cwd = std::env::current_dir().context("failed to read current directory")?;
    let diff = capture_diff(&cwd, staged, revision, config.resolve.vcs_timeout())
        .context("failed to capture diff")?;
    if diff.trim().is_empty() {
        println!("{}", theme.success("Nothing to review, the diff is empty."));
        return Ok(ExitCode::SUCCESS);
    }

    let llm = HttpLlmClient::from_config(&config.llm).context("failed to build LLM client")?;
    let mut ui = TerminalInteraction::new();
    let review = {
        let _wait = waiting(&mut ui, "Reviewing changes...");
        review_diff(&llm, &diff, revision)
    };
    match review {
        Ok(text) => {
            ui.show(&theme.header("Review"));
            ui.show(&text);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            print_llm_hint(&theme, &e);
            Err(e).context("review failed")
        }
    }
}
