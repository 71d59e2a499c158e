//! End-to-end tests for single-file conflict resolution.
//!
//! These tests drive the real `ResolveSession` against files in a temp
//! directory, with a scripted LLM, scripted terminal input, and a VCS double
//! that records mark requests. One test uses the real `git` binary and skips
//! gracefully when it is not installed.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use mergewise_core::conflict::prompt::PromptBuilder;
use mergewise_core::conflict::{ResolveSession, SessionOptions, SessionOutcome, Summary};
use mergewise_core::editor::Editor;
use mergewise_core::errors::{ConflictError, LlmError};
use mergewise_core::llm::LlmClient;
use mergewise_core::process::{CommandOutcome, ExternalCommand};
use mergewise_core::ui::{Interaction, Theme};
use mergewise_core::vcs::{MarkStatus, SystemVcs, VcsBackend, VcsKind};

// ===========================================================================
// Test doubles
// ===========================================================================

struct ScriptedLlm {
    replies: RefCell<VecDeque<Result<String, LlmError>>>,
    calls: Cell<usize>,
}

impl ScriptedLlm {
    fn suggesting(codes: &[&str]) -> Self {
        Self {
            replies: RefCell::new(
                codes
                    .iter()
                    .map(|c| {
                        Ok(serde_json::json!({ "merged_code": c, "reason": "merged" }).to_string())
                    })
                    .collect(),
            ),
            calls: Cell::new(0),
        }
    }
}

impl LlmClient for ScriptedLlm {
    fn send(&self, _prompt: &str) -> Result<String, LlmError> {
        self.calls.set(self.calls.get() + 1);
        self.replies
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Provider("script exhausted".into())))
    }
}

#[derive(Default)]
struct ScriptedUi {
    input: VecDeque<Option<String>>,
    shown: Vec<String>,
}

impl ScriptedUi {
    fn typing(keys: &[&str]) -> Self {
        Self {
            input: keys.iter().map(|k| Some(k.to_string())).collect(),
            shown: Vec::new(),
        }
    }

    fn saw(&self, needle: &str) -> bool {
        self.shown.iter().any(|s| s.contains(needle))
    }
}

impl Interaction for ScriptedUi {
    fn show(&mut self, text: &str) {
        self.shown.push(text.to_string());
    }
    fn read_line(&mut self, _prompt: &str) -> io::Result<Option<String>> {
        Ok(self.input.pop_front().flatten())
    }
    fn confirm(&mut self, _question: &str) -> io::Result<Option<bool>> {
        Ok(Some(false))
    }
    fn start_wait(&mut self, _message: &str) {}
    fn stop_wait(&mut self) {}
}

struct NoEditor;

impl Editor for NoEditor {
    fn edit(&self, _path: &Path, _line: usize) -> CommandOutcome {
        CommandOutcome::Failure {
            message: "no editor in tests".into(),
            exit_code: None,
        }
    }
}

/// Overwrites the file with fixed text, as a user saving in the editor.
struct WritingEditor(&'static str);

impl Editor for WritingEditor {
    fn edit(&self, path: &Path, _line: usize) -> CommandOutcome {
        std::fs::write(path, self.0).unwrap();
        CommandOutcome::Success {
            stdout: String::new(),
            stderr: String::new(),
        }
    }
}

#[derive(Default)]
struct RecordingVcs {
    marked: RefCell<Vec<PathBuf>>,
}

impl VcsBackend for RecordingVcs {
    fn mark_resolved(&self, path: &Path) -> MarkStatus {
        self.marked.borrow_mut().push(path.to_path_buf());
        MarkStatus::Marked { vcs: VcsKind::Git }
    }
}

/// Always reports the same non-success status.
struct BrokenVcs(MarkStatus);

impl VcsBackend for BrokenVcs {
    fn mark_resolved(&self, _path: &Path) -> MarkStatus {
        self.0.clone()
    }
}

// ===========================================================================
// Helpers
// ===========================================================================

const SCENARIO: &str = "A\n<<<<<<< HEAD\nfoo=1\n=======\nfoo=2\n>>>>>>> br\nB\n";

const THREE: &str = "\
one
<<<<<<< HEAD
a1
=======
a2
>>>>>>> br
two
<<<<<<< HEAD
b1
=======
b2
>>>>>>> br
three
<<<<<<< HEAD
c1
=======
c2
>>>>>>> br
four
";

fn write_fixture(contents: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.conf");
    std::fs::write(&path, contents).unwrap();
    (dir, path)
}

fn run_session(
    path: &Path,
    llm: &ScriptedLlm,
    ui: &mut ScriptedUi,
    vcs: &dyn VcsBackend,
    options: SessionOptions,
) -> Result<mergewise_core::conflict::SessionReport, ConflictError> {
    run_session_with_editor(path, llm, ui, &NoEditor, vcs, options)
}

fn run_session_with_editor(
    path: &Path,
    llm: &ScriptedLlm,
    ui: &mut ScriptedUi,
    editor: &dyn Editor,
    vcs: &dyn VcsBackend,
    options: SessionOptions,
) -> Result<mergewise_core::conflict::SessionReport, ConflictError> {
    let session = ResolveSession::new(
        llm,
        editor,
        vcs,
        PromptBuilder::new(None).unwrap(),
        Theme::plain(),
        options,
    );
    session.run(path, ui)
}

// ===========================================================================
// Tests
// ===========================================================================

#[test]
fn test_end_to_end_scenario() {
    let (_dir, path) = write_fixture(SCENARIO);
    let llm = ScriptedLlm::suggesting(&["foo=3"]);
    let mut ui = ScriptedUi::typing(&["y"]);
    let vcs = RecordingVcs::default();

    let report = run_session(&path, &llm, &mut ui, &vcs, SessionOptions::default()).unwrap();

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "A\nfoo=3\nB\n");
    assert_eq!(
        report.outcome,
        SessionOutcome::Written {
            summary: Summary { accepted: 1, skipped: 0 },
            mark: Some(MarkStatus::Marked { vcs: VcsKind::Git }),
        }
    );
    assert_eq!(vcs.marked.borrow().as_slice(), &[path.clone()]);
    assert_eq!(report.entries.len(), 1);
    assert_eq!(report.entries[0].method.to_string(), "LLM Suggestion");
}

#[test]
fn test_partial_resolution_does_not_mark() {
    let (_dir, path) = write_fixture(THREE);
    let llm = ScriptedLlm::suggesting(&["c", "b", "a"]);
    // Bottom-up: accept c, skip b, accept a.
    let mut ui = ScriptedUi::typing(&["y", "n", "y"]);
    let vcs = RecordingVcs::default();

    let report = run_session(&path, &llm, &mut ui, &vcs, SessionOptions::default()).unwrap();

    assert_eq!(
        report.outcome,
        SessionOutcome::Written {
            summary: Summary { accepted: 2, skipped: 1 },
            mark: None,
        }
    );
    assert!(vcs.marked.borrow().is_empty());
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "one\na\ntwo\n<<<<<<< HEAD\nb1\n=======\nb2\n>>>>>>> br\nthree\nc\nfour\n"
    );
    assert!(ui.saw("leaving the file unresolved"));
}

#[test]
fn test_full_resolution_marks_exactly_once() {
    let (_dir, path) = write_fixture(THREE);
    let llm = ScriptedLlm::suggesting(&["c\nc", "b", "a\na\na"]);
    let mut ui = ScriptedUi::typing(&["y", "y", "y"]);
    let vcs = RecordingVcs::default();

    run_session(&path, &llm, &mut ui, &vcs, SessionOptions::default()).unwrap();

    assert_eq!(vcs.marked.borrow().len(), 1);
    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "one\na\na\na\ntwo\nb\nthree\nc\nc\nfour\n"
    );
}

#[test]
fn test_edit_inside_region_then_accept_regenerated() {
    let (_dir, path) = write_fixture(SCENARIO);
    let llm = ScriptedLlm::suggesting(&["foo=1", "foo=3"]);
    // Edit, answer "not resolved" (the double always says no), then accept.
    let mut ui = ScriptedUi::typing(&["e", "y"]);
    let editor = WritingEditor("A\n<<<<<<< HEAD\nfoo=10\n=======\nfoo=2\n>>>>>>> br\nB\n");
    let vcs = RecordingVcs::default();

    let report = run_session_with_editor(
        &path,
        &llm,
        &mut ui,
        &editor,
        &vcs,
        SessionOptions::default(),
    )
    .unwrap();

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "A\nfoo=3\nB\n");
    assert_eq!(
        report.outcome,
        SessionOutcome::Written {
            summary: Summary { accepted: 1, skipped: 0 },
            mark: Some(MarkStatus::Marked { vcs: VcsKind::Git }),
        }
    );
    assert_eq!(llm.calls.get(), 2);
}

#[test]
fn test_edit_around_decided_region_keeps_earlier_decisions() {
    let (_dir, path) = write_fixture(THREE);
    // c accepted first; b edited (line added above, b1 changed), regenerated
    // and accepted; then a accepted.
    let llm = ScriptedLlm::suggesting(&["c", "b-old", "b", "a"]);
    let mut ui = ScriptedUi::typing(&["y", "e", "y", "y"]);
    let edited = "\
// header
one
<<<<<<< HEAD
a1
=======
a2
>>>>>>> br
two
<<<<<<< HEAD
b10
=======
b2
>>>>>>> br
three
<<<<<<< HEAD
c1
=======
c2
>>>>>>> br
four
";
    let vcs = RecordingVcs::default();

    let report = run_session_with_editor(
        &path,
        &llm,
        &mut ui,
        &WritingEditor(edited),
        &vcs,
        SessionOptions::default(),
    )
    .unwrap();

    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "// header\none\na\ntwo\nb\nthree\nc\nfour\n"
    );
    assert_eq!(
        report.outcome,
        SessionOutcome::Written {
            summary: Summary { accepted: 3, skipped: 0 },
            mark: Some(MarkStatus::Marked { vcs: VcsKind::Git }),
        }
    );
    // The logged region for b reflects its position after the edit.
    assert_eq!(report.entries[1].start_line, 9);
}

#[test]
fn test_failed_mark_is_not_fatal() {
    let (_dir, path) = write_fixture(SCENARIO);
    let llm = ScriptedLlm::suggesting(&["foo=3"]);
    let mut ui = ScriptedUi::typing(&["y"]);
    let status = MarkStatus::Failed {
        message: "fatal: index.lock exists".into(),
        hint: "Run `git add settings.conf` to mark it resolved.".into(),
    };
    let vcs = BrokenVcs(status.clone());

    let report = run_session(&path, &llm, &mut ui, &vcs, SessionOptions::default()).unwrap();

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "A\nfoo=3\nB\n");
    assert_eq!(
        report.outcome,
        SessionOutcome::Written {
            summary: Summary { accepted: 1, skipped: 0 },
            mark: Some(status),
        }
    );
    assert!(ui.saw("Could not mark resolved: fatal: index.lock exists"));
    assert!(ui.saw("Run `git add settings.conf`"));
}

#[test]
fn test_timed_out_mark_is_not_fatal() {
    let (_dir, path) = write_fixture(SCENARIO);
    let llm = ScriptedLlm::suggesting(&["foo=3"]);
    let mut ui = ScriptedUi::typing(&["y"]);
    let status = MarkStatus::TimedOut {
        hint: "Run `hg resolve --mark settings.conf` to mark it resolved.".into(),
    };
    let vcs = BrokenVcs(status.clone());

    let report = run_session(&path, &llm, &mut ui, &vcs, SessionOptions::default()).unwrap();

    assert!(matches!(
        report.outcome,
        SessionOutcome::Written { mark: Some(MarkStatus::TimedOut { .. }), .. }
    ));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "A\nfoo=3\nB\n");
    assert!(ui.saw("timed out"));
    assert!(ui.saw("hg resolve --mark settings.conf"));
}

#[test]
fn test_abort_leaves_file_untouched() {
    let (_dir, path) = write_fixture(THREE);
    let llm = ScriptedLlm::suggesting(&["c", "b"]);
    let mut ui = ScriptedUi::typing(&["y", "a"]);
    let vcs = RecordingVcs::default();

    let report = run_session(&path, &llm, &mut ui, &vcs, SessionOptions::default()).unwrap();

    assert_eq!(report.outcome, SessionOutcome::Aborted);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), THREE);
    assert!(vcs.marked.borrow().is_empty());
    assert!(ui.saw("unchanged on disk"));
    // The first region was never presented.
    assert_eq!(llm.calls.get(), 2);
}

#[test]
fn test_end_of_input_aborts() {
    let (_dir, path) = write_fixture(SCENARIO);
    let llm = ScriptedLlm::suggesting(&["foo=3"]);
    let mut ui = ScriptedUi::default();
    let vcs = RecordingVcs::default();

    let report = run_session(&path, &llm, &mut ui, &vcs, SessionOptions::default()).unwrap();

    assert_eq!(report.outcome, SessionOutcome::Aborted);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), SCENARIO);
}

#[test]
fn test_no_conflicts_is_idempotent() {
    let text = "fn main() {\n    println!(\"hi\");\n}\n";
    let (_dir, path) = write_fixture(text);
    let before = std::fs::metadata(&path).unwrap().modified().unwrap();
    let llm = ScriptedLlm::suggesting(&[]);
    let mut ui = ScriptedUi::default();
    let vcs = RecordingVcs::default();

    let report = run_session(&path, &llm, &mut ui, &vcs, SessionOptions::default()).unwrap();

    assert_eq!(report.outcome, SessionOutcome::NoConflicts);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), text);
    assert_eq!(std::fs::metadata(&path).unwrap().modified().unwrap(), before);
    assert_eq!(llm.calls.get(), 0);
    assert!(ui.saw("No conflicts found"));
}

#[test]
fn test_missing_file_fails_before_llm() {
    let dir = tempfile::tempdir().unwrap();
    let llm = ScriptedLlm::suggesting(&["x"]);
    let mut ui = ScriptedUi::default();
    let vcs = RecordingVcs::default();

    let err = run_session(
        &dir.path().join("absent.rs"),
        &llm,
        &mut ui,
        &vcs,
        SessionOptions::default(),
    )
    .unwrap_err();

    assert!(matches!(err, ConflictError::FileNotFound(_)));
    assert_eq!(llm.calls.get(), 0);
}

#[test]
fn test_malformed_file_fails_before_llm() {
    let (_dir, path) = write_fixture("a\n<<<<<<< HEAD\nx\n=======\ny\n");
    let llm = ScriptedLlm::suggesting(&["x"]);
    let mut ui = ScriptedUi::default();

    let err = run_session(
        &path,
        &llm,
        &mut ui,
        &RecordingVcs::default(),
        SessionOptions::default(),
    )
    .unwrap_err();

    assert!(matches!(err, ConflictError::MalformedRegion { start_line: 2 }));
    assert_eq!(llm.calls.get(), 0);
}

#[test]
fn test_dry_run_prints_diff_and_writes_nothing() {
    let (_dir, path) = write_fixture(SCENARIO);
    let llm = ScriptedLlm::suggesting(&["foo=3"]);
    let mut ui = ScriptedUi::typing(&["y"]);
    let vcs = RecordingVcs::default();
    let options = SessionOptions {
        dry_run: true,
        ..SessionOptions::default()
    };

    let report = run_session(&path, &llm, &mut ui, &vcs, options).unwrap();

    let SessionOutcome::DryRun { summary, diff } = report.outcome else {
        panic!("expected a dry run, got {:?}", report.outcome);
    };
    assert_eq!(summary.accepted, 1);
    assert!(diff.contains("-foo=1"));
    assert!(diff.contains("+foo=3"));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), SCENARIO);
    assert!(vcs.marked.borrow().is_empty());
}

#[test]
fn test_mark_disabled() {
    let (_dir, path) = write_fixture(SCENARIO);
    let llm = ScriptedLlm::suggesting(&["foo=3"]);
    let mut ui = ScriptedUi::typing(&["y"]);
    let vcs = RecordingVcs::default();
    let options = SessionOptions {
        mark_resolved: false,
        ..SessionOptions::default()
    };

    run_session(&path, &llm, &mut ui, &vcs, options).unwrap();

    assert!(vcs.marked.borrow().is_empty());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "A\nfoo=3\nB\n");
}

#[test]
fn test_resolution_log_written() {
    let (dir, path) = write_fixture(THREE);
    let llm = ScriptedLlm::suggesting(&["c", "b", "a"]);
    let mut ui = ScriptedUi::typing(&["y", "n", "y"]);
    let log_dir = dir.path().join("logs");
    let options = SessionOptions {
        log_dir: Some(log_dir.clone()),
        ..SessionOptions::default()
    };

    let report = run_session(&path, &llm, &mut ui, &RecordingVcs::default(), options).unwrap();

    let log_path = report.log_path.expect("log written");
    assert!(log_path.starts_with(&log_dir));
    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&log_path).unwrap()).unwrap();
    let entries = value["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 3);
    // Processing order is bottom-up.
    assert_eq!(entries[0]["start_line"], 14);
    assert_eq!(entries[1]["method"], "Skipped");
    assert_eq!(entries[2]["start_line"], 2);
}

#[test]
fn test_real_git_mark() {
    if !ExternalCommand::new("git").arg("--version").run().is_success() {
        eprintln!("git not installed, skipping");
        return;
    }
    let (dir, path) = write_fixture(SCENARIO);
    let repo = git2::Repository::init(dir.path()).unwrap();
    let llm = ScriptedLlm::suggesting(&["foo=3"]);
    let mut ui = ScriptedUi::typing(&["y"]);

    let report =
        run_session(&path, &llm, &mut ui, &SystemVcs::default(), SessionOptions::default())
            .unwrap();

    assert!(matches!(
        report.outcome,
        SessionOutcome::Written {
            mark: Some(MarkStatus::Marked { vcs: VcsKind::Git }),
            ..
        }
    ));
    let index = repo.index().unwrap();
    assert!(index.get_path(Path::new("settings.conf"), 0).is_some());
}
