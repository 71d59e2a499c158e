//! Natural-language shell commands and diff review.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::errors::{CoreError, ValidationError, VcsError};
use crate::llm::{best_effort_json, LlmClient};
use crate::process::{CommandOutcome, ExternalCommand};
use crate::template::{Context, Template};

const ASK_TEMPLATE: &str = include_str!("../templates/ask.txt");
const REVIEW_TEMPLATE: &str = include_str!("../templates/review.txt");

/// A shell command proposed by the LLM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellSuggestion {
    pub command: String,
    #[serde(default)]
    pub explanation: String,
}

/// Ask the LLM to translate `request` into one shell command.
#[instrument(skip(llm))]
pub fn suggest_command(
    llm: &dyn LlmClient,
    request: &str,
    cwd: &Path,
) -> Result<ShellSuggestion, CoreError> {
    let shell = std::env::var("SHELL")
        .ok()
        .and_then(|s| Path::new(&s).file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "sh".to_string());

    let mut ctx = Context::new();
    ctx.insert("request", request)
        .insert("shell", shell)
        .insert("os", std::env::consts::OS)
        .insert("cwd", cwd.display().to_string());
    let prompt = Template::parse(ASK_TEMPLATE)?.render(&ctx);

    let raw = llm.send(&prompt)?;
    let invalid = |detail: String| ValidationError::InvalidResponse {
        raw: raw.clone(),
        detail,
    };
    let value = best_effort_json(&raw).ok_or_else(|| invalid("no JSON object in reply".into()))?;
    let suggestion: ShellSuggestion =
        serde_json::from_value(value).map_err(|e| invalid(e.to_string()))?;
    if suggestion.command.trim().is_empty() {
        return Err(invalid("empty command".into()).into());
    }
    debug!(command = %suggestion.command, "suggested shell command");
    Ok(suggestion)
}

/// Capture `git diff` output for review.
pub fn capture_diff(
    repo_dir: &Path,
    staged: bool,
    revision: Option<&str>,
    timeout: Duration,
) -> Result<String, VcsError> {
    let mut cmd = ExternalCommand::new("git")
        .args(["--no-pager", "diff", "--no-color"])
        .current_dir(repo_dir)
        .timeout(timeout);
    if staged {
        cmd = cmd.arg("--cached");
    }
    if let Some(rev) = revision {
        cmd = cmd.arg(rev);
    }
    match cmd.run() {
        CommandOutcome::Success { stdout, .. } => Ok(stdout),
        other => Err(VcsError::Command {
            command: cmd.display(),
            outcome: other.to_string(),
        }),
    }
}

/// Ask the LLM to review `diff`. Returns its free-text analysis.
#[instrument(skip(llm, diff), fields(diff_len = diff.len()))]
pub fn review_diff(
    llm: &dyn LlmClient,
    diff: &str,
    revision: Option<&str>,
) -> Result<String, CoreError> {
    let mut ctx = Context::new();
    ctx.insert("diff", diff)
        .insert("has_revision", revision.is_some())
        .insert("revision", revision.unwrap_or_default());
    let prompt = Template::parse(REVIEW_TEMPLATE)?.render(&ctx);
    Ok(llm.send(&prompt)?)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::errors::LlmError;

    struct Fixed {
        reply: &'static str,
        seen: RefCell<String>,
    }

    impl LlmClient for Fixed {
        fn send(&self, prompt: &str) -> Result<String, LlmError> {
            *self.seen.borrow_mut() = prompt.to_string();
            Ok(self.reply.to_string())
        }
    }

    fn fixed(reply: &'static str) -> Fixed {
        Fixed {
            reply,
            seen: RefCell::new(String::new()),
        }
    }

    #[test]
    fn test_suggest_command() {
        let llm = fixed(
            "```json\n{\"command\": \"find . -name '*.rs' | wc -l\", \"explanation\": \"counts\"}\n```",
        );
        let s = suggest_command(&llm, "count rust files", Path::new("/work")).unwrap();
        assert_eq!(s.command, "find . -name '*.rs' | wc -l");
        assert!(llm.seen.borrow().contains("Request: count rust files"));
        assert!(llm.seen.borrow().contains("Working directory: /work"));
    }

    #[test]
    fn test_suggest_command_rejects_prose() {
        let llm = fixed("I cannot help with that.");
        let err = suggest_command(&llm, "x", Path::new(".")).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_review_prompt() {
        let llm = fixed("Looks fine.");
        let out = review_diff(&llm, "+added line", Some("main")).unwrap();
        assert_eq!(out, "Looks fine.");
        let prompt = llm.seen.borrow();
        assert!(prompt.contains("against main"));
        assert!(prompt.contains("+added line"));
    }

    #[test]
    fn test_capture_diff_outside_repo_fails() {
        let dir = tempfile::tempdir().unwrap();
        if crate::vcs::detect(dir.path()).is_some() {
            return;
        }
        let available = ExternalCommand::new("git").arg("--version").run().is_success();
        if !available {
            return;
        }
        // `git diff` outside a repository behaves like `diff --no-index` and
        // needs two paths, so with none it fails.
        assert!(capture_diff(dir.path(), false, None, Duration::from_secs(5)).is_err());
    }
}
