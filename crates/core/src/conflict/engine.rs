//! Interactive per-region resolution state machine.
//!
//! For each region the engine asks the LLM for a suggestion, validates it,
//! and lets the user accept, skip, comment, edit or abort. Failed requests
//! drop into a recovery menu instead of ending the session.

use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::mutator::locate_block;
use super::parser::{parse, split_lines, ConflictRegion};
use super::prompt::PromptBuilder;
use super::validator::{self, Suggestion};
use crate::editor::Editor;
use crate::errors::ConflictError;
use crate::llm::LlmClient;
use crate::process::CommandOutcome;
use crate::ui::{self, Interaction, Theme};

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Accepted,
    Skipped,
    Aborted,
}

/// What replaces an accepted region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Replacement {
    Text(String),
    /// The user resolved the region in the editor; the file already holds it.
    AlreadyOnDisk,
}

/// How a result was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResolutionMethod {
    #[serde(rename = "LLM Suggestion")]
    LlmSuggestion,
    #[serde(rename = "Manual Edit")]
    ManualEdit,
    #[serde(rename = "Manual Choice")]
    ManualChoice,
    Skipped,
    Aborted,
}

impl std::fmt::Display for ResolutionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LlmSuggestion => write!(f, "LLM Suggestion"),
            Self::ManualEdit => write!(f, "Manual Edit"),
            Self::ManualChoice => write!(f, "Manual Choice"),
            Self::Skipped => write!(f, "Skipped"),
            Self::Aborted => write!(f, "Aborted"),
        }
    }
}

/// The final decision for one region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolutionResult {
    pub outcome: Outcome,
    /// Only set when accepted.
    pub replacement: Option<Replacement>,
    pub reason: String,
    pub comment: Option<String>,
    pub method: ResolutionMethod,
}

impl ResolutionResult {
    pub fn accepted(
        replacement: Replacement,
        reason: impl Into<String>,
        comment: Option<String>,
        method: ResolutionMethod,
    ) -> Self {
        Self {
            outcome: Outcome::Accepted,
            replacement: Some(replacement),
            reason: reason.into(),
            comment,
            method,
        }
    }

    pub fn skipped(reason: impl Into<String>, comment: Option<String>) -> Self {
        Self {
            outcome: Outcome::Skipped,
            replacement: None,
            reason: reason.into(),
            comment,
            method: ResolutionMethod::Skipped,
        }
    }

    pub fn aborted(reason: impl Into<String>, comment: Option<String>) -> Self {
        Self {
            outcome: Outcome::Aborted,
            replacement: None,
            reason: reason.into(),
            comment,
            method: ResolutionMethod::Aborted,
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.outcome == Outcome::Aborted
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum State {
    /// Request a suggestion and present it.
    Presenting { comment: Option<String> },
    AwaitingChoice {
        suggestion: Suggestion,
        comment: Option<String>,
    },
    Commenting {
        suggestion: Suggestion,
        comment: Option<String>,
    },
    Editing {
        suggestion: Option<Suggestion>,
        comment: Option<String>,
    },
    /// The last request failed; offer alternatives.
    Recovering {
        detail: String,
        comment: Option<String>,
    },
    Finished(ResolutionResult),
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            Self::Presenting { .. } => "presenting",
            Self::AwaitingChoice { .. } => "awaiting_choice",
            Self::Commenting { .. } => "commenting",
            Self::Editing { .. } => "editing",
            Self::Recovering { .. } => "recovering",
            Self::Finished(_) => "finished",
        }
    }
}

/// What a re-read of the file says about the region being resolved.
enum Resync {
    /// Still conflicted; the region was refreshed from the new text.
    Present,
    /// The markers are gone.
    Gone,
    /// The file no longer parses.
    Malformed(ConflictError),
}

const CHOICE_PROMPT: &str = "[y] accept  [n] skip  [c] comment  [e] edit  [a] abort";
const RECOVERY_PROMPT: &str =
    "[r] retry  [c] retry with comment  [b] take base  [i] take incoming  [n] skip  [a] abort";
const COMMENT_PROMPT: &str = "Comment for the LLM (finish with an empty line):";

/// Drives the resolution of regions within one file.
pub struct ResolutionEngine<'a> {
    llm: &'a dyn LlmClient,
    ui: &'a mut dyn Interaction,
    editor: &'a dyn Editor,
    prompts: &'a PromptBuilder,
    theme: Theme,
    display_context: usize,
    context_lines: usize,
    path: &'a Path,
    /// Latest known file text; refreshed after comments and edits.
    text: String,
    /// Raw blocks of the other regions in the file, used to tell them apart
    /// from the current one after a re-parse.
    others: Vec<Vec<String>>,
}

impl<'a> ResolutionEngine<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        llm: &'a dyn LlmClient,
        ui: &'a mut dyn Interaction,
        editor: &'a dyn Editor,
        prompts: &'a PromptBuilder,
        theme: Theme,
        display_context: usize,
        context_lines: usize,
        path: &'a Path,
        text: String,
    ) -> Self {
        Self {
            llm,
            ui,
            editor,
            prompts,
            theme,
            display_context,
            context_lines,
            path,
            text,
            others: Vec::new(),
        }
    }

    /// Resolve `regions` (ascending file order) from the bottom up.
    ///
    /// Returns one pair per decided region in processing order, i.e. reverse
    /// file order. Each region is the one the decision applies to, re-parsed
    /// if the file changed while it was being resolved. The first abort ends
    /// processing and is the last element.
    pub fn resolve_all(
        &mut self,
        regions: &[ConflictRegion],
    ) -> Result<Vec<(ConflictRegion, ResolutionResult)>, ConflictError> {
        let total = regions.len();
        let mut decided: Vec<(ConflictRegion, ResolutionResult)> = Vec::with_capacity(total);
        for (idx, region) in regions.iter().enumerate().rev() {
            self.others = regions[..idx]
                .iter()
                .chain(decided.iter().map(|(r, _)| r))
                .map(|r| r.raw_block.clone())
                .collect();
            let (region, result) = self.resolve_region(region, idx + 1, total)?;
            let aborted = result.is_aborted();
            let start_line = region.start_line;
            decided.push((region, result));
            if aborted {
                info!(start_line, "aborted by user");
                break;
            }
        }
        Ok(decided)
    }

    /// Current file text as seen by the engine.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Re-read the file and find `region` in it again.
    ///
    /// An unchanged block is matched exactly. Otherwise the region is the
    /// bottom-most conflict that is not one of the other known regions, since
    /// every region below the current one is already decided.
    fn resync(&mut self, region: &mut ConflictRegion) -> Result<Resync, ConflictError> {
        self.text = std::fs::read_to_string(self.path)?;
        let fresh = match parse(&self.text, self.context_lines) {
            Ok(fresh) => fresh,
            Err(e @ ConflictError::MalformedRegion { .. }) => return Ok(Resync::Malformed(e)),
            Err(e) => return Err(e),
        };

        let found = fresh
            .iter()
            .filter(|r| r.raw_block == region.raw_block)
            .min_by_key(|r| r.start_line.abs_diff(region.start_line))
            .or_else(|| {
                fresh
                    .iter()
                    .rev()
                    .find(|r| !self.others.contains(&r.raw_block))
            });

        Ok(match found {
            Some(fresh_region) => {
                debug!(
                    old_start = region.start_line,
                    new_start = fresh_region.start_line,
                    "region re-synced"
                );
                *region = fresh_region.clone();
                Resync::Present
            }
            None => Resync::Gone,
        })
    }

    /// Re-sync, then ask for a fresh suggestion if the region is still there.
    fn represent(
        &mut self,
        region: &mut ConflictRegion,
        suggestion: Option<Suggestion>,
        comment: Option<String>,
    ) -> Result<State, ConflictError> {
        Ok(match self.resync(region)? {
            Resync::Present => State::Presenting { comment },
            Resync::Gone => {
                info!("conflict markers removed during the session");
                self.ui.show(
                    &self
                        .theme
                        .dim("The conflict markers are gone; keeping the file as edited."),
                );
                State::Finished(ResolutionResult::accepted(
                    Replacement::AlreadyOnDisk,
                    "resolved manually in the editor",
                    comment,
                    ResolutionMethod::ManualEdit,
                ))
            }
            Resync::Malformed(e) => {
                warn!(error = %e, "file no longer parses after the edit");
                self.ui.show(&self.theme.error(&format!("{e}. Fix the markers in the editor.")));
                State::Editing {
                    suggestion,
                    comment,
                }
            }
        })
    }

    fn region_still_present(&self, region: &ConflictRegion) -> bool {
        locate_block(split_lines(&self.text).as_slice(), region).is_some()
    }

    #[instrument(skip(self, region), fields(start_line = region.start_line, end_line = region.end_line))]
    pub fn resolve_region(
        &mut self,
        region: &ConflictRegion,
        index: usize,
        total: usize,
    ) -> Result<(ConflictRegion, ResolutionResult), ConflictError> {
        let mut region = region.clone();
        if !self.region_still_present(&region) {
            info!("region no longer present, treating as resolved outside the tool");
            self.ui.show(&self.theme.dim(&format!(
                "Conflict at lines {}-{} was already resolved outside mergewise.",
                region.start_line, region.end_line
            )));
            let result = ResolutionResult::accepted(
                Replacement::AlreadyOnDisk,
                "resolved outside the tool",
                None,
                ResolutionMethod::ManualEdit,
            );
            return Ok((region, result));
        }

        self.show_region(&region, index, total);

        let mut state = State::Presenting { comment: None };
        loop {
            debug!(state = state.name(), "engine step");
            state = match state {
                State::Presenting { comment } => self.present(&region, comment),
                State::AwaitingChoice {
                    suggestion,
                    comment,
                } => self.await_choice(suggestion, comment)?,
                State::Commenting {
                    suggestion,
                    comment,
                } => self.comment(&mut region, suggestion, comment)?,
                State::Editing {
                    suggestion,
                    comment,
                } => self.edit(&mut region, index, total, suggestion, comment)?,
                State::Recovering { detail, comment } => {
                    self.recover(&mut region, detail, comment)?
                }
                State::Finished(result) => return Ok((region, result)),
            };
        }
    }

    fn show_region(&mut self, region: &ConflictRegion, index: usize, total: usize) {
        let view = ui::render_region(
            &self.theme,
            region,
            index,
            total,
            self.ui.width(),
            self.display_context,
        );
        self.ui.show("");
        self.ui.show(&view);
    }

    fn present(&mut self, region: &ConflictRegion, comment: Option<String>) -> State {
        let prompt = self.prompts.build(region, &self.text, comment.as_deref());
        let reply = {
            let _wait = ui::waiting(&mut *self.ui, "Asking the LLM for a resolution...");
            self.llm
                .send(&prompt)
                .map(|raw| validator::validate(&raw, self.llm))
        };

        match reply {
            Ok(Ok(suggestion)) => {
                self.ui
                    .show(&ui::render_suggestion(&self.theme, &suggestion));
                State::AwaitingChoice {
                    suggestion,
                    comment,
                }
            }
            Ok(Err(e)) => {
                warn!(error = %e, "LLM reply failed validation");
                self.ui.show(&self.theme.error(&format!(
                    "The LLM reply could not be used: {e}"
                )));
                State::Recovering {
                    detail: e.to_string(),
                    comment,
                }
            }
            Err(e) => {
                warn!(error = %e, "LLM request failed");
                self.ui.show(&self.theme.error(&e.to_string()));
                self.ui.show(&self.theme.dim(e.hint()));
                State::Recovering {
                    detail: e.to_string(),
                    comment,
                }
            }
        }
    }

    fn await_choice(
        &mut self,
        suggestion: Suggestion,
        comment: Option<String>,
    ) -> Result<State, ConflictError> {
        let Some(input) = self.ui.read_line(CHOICE_PROMPT)? else {
            return Ok(State::Finished(ResolutionResult::aborted(
                "end of input",
                comment,
            )));
        };

        Ok(match input.trim().to_lowercase().as_str() {
            "y" => State::Finished(ResolutionResult::accepted(
                Replacement::Text(suggestion.merged_code),
                suggestion.reason,
                comment,
                ResolutionMethod::LlmSuggestion,
            )),
            "n" => State::Finished(ResolutionResult::skipped(suggestion.reason, comment)),
            "c" => State::Commenting {
                suggestion,
                comment,
            },
            "e" => State::Editing {
                suggestion: Some(suggestion),
                comment,
            },
            "a" => State::Finished(ResolutionResult::aborted(suggestion.reason, comment)),
            "" => State::AwaitingChoice {
                suggestion,
                comment,
            },
            other => {
                self.ui.show(&self.theme.warn(&format!(
                    "Unrecognized choice '{other}'. Choose y, n, c, e or a."
                )));
                State::AwaitingChoice {
                    suggestion,
                    comment,
                }
            }
        })
    }

    fn comment(
        &mut self,
        region: &mut ConflictRegion,
        suggestion: Suggestion,
        comment: Option<String>,
    ) -> Result<State, ConflictError> {
        let Some(text) = ui::read_multiline(&mut *self.ui, COMMENT_PROMPT)? else {
            return Ok(State::Finished(ResolutionResult::aborted(
                "end of input",
                comment,
            )));
        };
        if text.trim().is_empty() {
            return Ok(State::AwaitingChoice {
                suggestion,
                comment,
            });
        }
        self.represent(region, Some(suggestion), Some(text))
    }

    fn edit(
        &mut self,
        region: &mut ConflictRegion,
        index: usize,
        total: usize,
        suggestion: Option<Suggestion>,
        comment: Option<String>,
    ) -> Result<State, ConflictError> {
        let back = |suggestion: Option<Suggestion>, comment: Option<String>| match suggestion {
            Some(suggestion) => State::AwaitingChoice {
                suggestion,
                comment,
            },
            None => State::Recovering {
                detail: "no suggestion".into(),
                comment,
            },
        };

        let before = std::fs::read_to_string(self.path)?;
        match self.editor.edit(self.path, region.start_line) {
            CommandOutcome::Success { .. } => {}
            other => {
                warn!(outcome = %other, "editor did not exit cleanly");
                self.ui
                    .show(&self.theme.error(&format!("Editor {other}")));
                return Ok(back(suggestion, comment));
            }
        }

        let after = std::fs::read_to_string(self.path)?;
        if after == before {
            self.ui.show(&self.theme.dim("File unchanged."));
            return Ok(back(suggestion, comment));
        }
        self.text = after;

        match self
            .ui
            .confirm("The file changed. Did you resolve this conflict manually?")?
        {
            None => Ok(State::Finished(ResolutionResult::aborted(
                "end of input",
                comment,
            ))),
            Some(true) => Ok(State::Finished(ResolutionResult::accepted(
                Replacement::AlreadyOnDisk,
                "resolved manually in the editor",
                comment,
                ResolutionMethod::ManualEdit,
            ))),
            Some(false) => {
                let state = self.represent(region, suggestion, comment)?;
                if matches!(state, State::Presenting { .. }) {
                    self.show_region(region, index, total);
                }
                Ok(state)
            }
        }
    }

    fn recover(
        &mut self,
        region: &mut ConflictRegion,
        detail: String,
        comment: Option<String>,
    ) -> Result<State, ConflictError> {
        let Some(input) = self.ui.read_line(RECOVERY_PROMPT)? else {
            return Ok(State::Finished(ResolutionResult::aborted(
                "end of input",
                comment,
            )));
        };

        Ok(match input.trim().to_lowercase().as_str() {
            "r" => State::Presenting { comment },
            "c" => match ui::read_multiline(&mut *self.ui, COMMENT_PROMPT)? {
                None => State::Finished(ResolutionResult::aborted("end of input", comment)),
                Some(text) if text.trim().is_empty() => State::Recovering { detail, comment },
                Some(text) => self.represent(region, None, Some(text))?,
            },
            "b" => State::Finished(ResolutionResult::accepted(
                Replacement::Text(region.base_content.clone()),
                format!("took base side ({})", region.base_label),
                comment,
                ResolutionMethod::ManualChoice,
            )),
            "i" => State::Finished(ResolutionResult::accepted(
                Replacement::Text(region.incoming_content.clone()),
                format!("took incoming side ({})", region.incoming_label),
                comment,
                ResolutionMethod::ManualChoice,
            )),
            "n" => State::Finished(ResolutionResult::skipped(detail, comment)),
            "a" => State::Finished(ResolutionResult::aborted(detail, comment)),
            "" => State::Recovering { detail, comment },
            other => {
                self.ui.show(&self.theme.warn(&format!(
                    "Unrecognized choice '{other}'. Choose r, c, b, i, n or a."
                )));
                State::Recovering { detail, comment }
            }
        })
    }
}
