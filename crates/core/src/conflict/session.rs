//! File-level driver: parse, resolve, apply, write, mark.

use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};

use super::engine::{ResolutionEngine, ResolutionResult};
use super::log::{ResolutionLog, ResolutionLogEntry, SessionStatus};
use super::mutator::{apply, write_atomic, Document, Mutation, Summary};
use super::parser::{parse_file, ConflictRegion, DEFAULT_CONTEXT_LINES};
use super::prompt::PromptBuilder;
use crate::editor::Editor;
use crate::errors::ConflictError;
use crate::llm::LlmClient;
use crate::ui::{Interaction, Theme};
use crate::vcs::{MarkStatus, VcsBackend};

/// Per-run settings.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Lines of context sent to the LLM around each region.
    pub context_lines: usize,
    /// Lines of context shown in the terminal around each region.
    pub display_context_lines: usize,
    /// Print a diff instead of writing the file.
    pub dry_run: bool,
    /// Mark the file resolved in the VCS when every region was accepted.
    pub mark_resolved: bool,
    pub log_dir: Option<PathBuf>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            context_lines: DEFAULT_CONTEXT_LINES,
            display_context_lines: 3,
            dry_run: false,
            mark_resolved: true,
            log_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    NoConflicts,
    /// The user aborted; the file is unchanged.
    Aborted,
    Written {
        summary: Summary,
        /// `None` when marking was not attempted.
        mark: Option<MarkStatus>,
    },
    DryRun {
        summary: Summary,
        diff: String,
    },
}

#[derive(Debug, Clone)]
pub struct SessionReport {
    pub outcome: SessionOutcome,
    pub entries: Vec<ResolutionLogEntry>,
    pub log_path: Option<PathBuf>,
}

/// Resolves every conflict region of one file.
pub struct ResolveSession<'a> {
    llm: &'a dyn LlmClient,
    editor: &'a dyn Editor,
    vcs: &'a dyn VcsBackend,
    prompts: PromptBuilder,
    theme: Theme,
    options: SessionOptions,
}

impl<'a> ResolveSession<'a> {
    pub fn new(
        llm: &'a dyn LlmClient,
        editor: &'a dyn Editor,
        vcs: &'a dyn VcsBackend,
        prompts: PromptBuilder,
        theme: Theme,
        options: SessionOptions,
    ) -> Self {
        Self {
            llm,
            editor,
            vcs,
            prompts,
            theme,
            options,
        }
    }

    #[instrument(skip(self, ui), fields(path = %path.display()))]
    pub fn run(
        &self,
        path: &Path,
        ui: &mut dyn Interaction,
    ) -> Result<SessionReport, ConflictError> {
        let (text, regions) = parse_file(path, self.options.context_lines)?;
        let mut log = ResolutionLog::new(path);

        if regions.is_empty() {
            ui.show(&self.theme.success(&format!(
                "No conflicts found in {}.",
                path.display()
            )));
            log.finish(SessionStatus::NoConflicts);
            return Ok(SessionReport {
                outcome: SessionOutcome::NoConflicts,
                entries: Vec::new(),
                log_path: None,
            });
        }

        info!(count = regions.len(), "resolving conflicts");
        ui.show(&self.theme.header(&format!(
            "Found {} conflict{} in {}",
            regions.len(),
            if regions.len() == 1 { "" } else { "s" },
            path.display()
        )));

        let decided = {
            let mut engine = ResolutionEngine::new(
                self.llm,
                &mut *ui,
                self.editor,
                &self.prompts,
                self.theme,
                self.options.display_context_lines,
                self.options.context_lines,
                path,
                text,
            );
            engine.resolve_all(&regions)?
        };

        // Regions here are the re-synced ones, so edits made during the
        // session still locate.
        let decisions: Vec<(&ConflictRegion, &ResolutionResult)> =
            decided.iter().map(|(region, result)| (region, result)).collect();
        for (region, result) in &decisions {
            log.push(ResolutionLogEntry::new(path, region, result));
        }

        // Re-read: manual edits may have changed the file since parsing.
        let current = std::fs::read_to_string(path)?;
        let outcome = match apply(&Document::from_text(&current), &decisions)? {
            Mutation::Aborted => {
                ui.show(&self.theme.warn(&format!(
                    "Aborted. No changes were made; {} is unchanged on disk.",
                    path.display()
                )));
                log.finish(SessionStatus::Aborted);
                SessionOutcome::Aborted
            }
            Mutation::Applied { document, summary } => {
                let resolved = document.to_text();
                if self.options.dry_run {
                    let diff = self.render_diff(&current, &resolved);
                    ui.show(&self.theme.header("Dry run, the file was not modified:"));
                    ui.show(&diff);
                    log.finish(SessionStatus::DryRun);
                    SessionOutcome::DryRun { summary, diff }
                } else {
                    if resolved != current {
                        write_atomic(path, &resolved)?;
                    }
                    ui.show(&self.theme.success(&format!(
                        "{}: {} accepted, {} skipped.",
                        path.display(),
                        summary.accepted,
                        summary.skipped
                    )));
                    let mark = self.maybe_mark(path, summary, ui);
                    log.finish(SessionStatus::Written);
                    SessionOutcome::Written { summary, mark }
                }
            }
        };

        let log_path = self.options.log_dir.as_deref().and_then(|dir| {
            log.write_to_dir(dir)
                .map_err(|e| {
                    warn!(error = %e, dir = %dir.display(), "could not write resolution log");
                    ui.show(&self.theme.warn(&format!("Could not write resolution log: {e}")));
                })
                .ok()
        });

        Ok(SessionReport {
            outcome,
            entries: log.entries,
            log_path,
        })
    }

    fn maybe_mark(
        &self,
        path: &Path,
        summary: Summary,
        ui: &mut dyn Interaction,
    ) -> Option<MarkStatus> {
        if !self.options.mark_resolved || summary.accepted == 0 {
            return None;
        }
        if summary.skipped > 0 {
            ui.show(&self.theme.dim(&format!(
                "{} conflict(s) skipped; leaving the file unresolved in version control.",
                summary.skipped
            )));
            return None;
        }

        let status = self.vcs.mark_resolved(path);
        match &status {
            MarkStatus::Marked { vcs } => ui.show(&self.theme.success(&format!(
                "Marked {} as resolved ({vcs}).",
                path.display()
            ))),
            MarkStatus::NoRepository => ui.show(
                &self
                    .theme
                    .dim("Not inside a git or mercurial repository; nothing to mark."),
            ),
            MarkStatus::Failed { message, hint } => {
                ui.show(&self.theme.warn(&format!("Could not mark resolved: {message}")));
                ui.show(&self.theme.dim(hint));
            }
            MarkStatus::TimedOut { hint } => {
                ui.show(&self.theme.warn("Marking the file resolved timed out."));
                ui.show(&self.theme.dim(hint));
            }
        }
        Some(status)
    }

    fn render_diff(&self, original: &str, resolved: &str) -> String {
        let patch = diffy::create_patch(original, resolved);
        let formatter = if self.theme.is_colored() {
            diffy::PatchFormatter::new().with_color()
        } else {
            diffy::PatchFormatter::new()
        };
        let rendered = formatter.fmt_patch(&patch).to_string();
        rendered
    }
}
