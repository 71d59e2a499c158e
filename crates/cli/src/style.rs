//! Shared styling utilities for the CLI.

use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use console::Style;

use mergewise_core::conflict::SessionReport;
use mergewise_core::vcs::{ConflictedFile, MarkStatus};
use mergewise_core::SessionOutcome;

/// Create a success-styled string (green with checkmark).
pub fn success(msg: &str) -> String {
    let style = Style::new().green();
    format!("{} {}", style.apply_to("✓"), msg)
}

/// Create an error-styled string (red with cross).
pub fn error(msg: &str) -> String {
    let style = Style::new().red();
    format!("{} {}", style.apply_to("✗"), msg)
}

/// Create a dim-styled string.
pub fn dim(msg: &str) -> String {
    let style = Style::new().dim();
    style.apply_to(msg).to_string()
}

/// Shell command highlight (bold cyan).
pub fn command(cmd: &str) -> String {
    Style::new().cyan().bold().apply_to(cmd).to_string()
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(header);
    table
}

fn outcome_cell(outcome: &SessionOutcome) -> Cell {
    match outcome {
        SessionOutcome::NoConflicts => Cell::new("no conflicts"),
        SessionOutcome::Aborted => Cell::new("aborted").fg(Color::Yellow),
        SessionOutcome::Written { summary, .. } if summary.skipped > 0 => {
            Cell::new("partially resolved").fg(Color::Yellow)
        }
        SessionOutcome::Written { .. } => Cell::new("resolved").fg(Color::Green),
        SessionOutcome::DryRun { .. } => Cell::new("dry run"),
    }
}

fn mark_cell(outcome: &SessionOutcome) -> Cell {
    match outcome {
        SessionOutcome::Written {
            mark: Some(status), ..
        } => match status {
            MarkStatus::Marked { vcs } => Cell::new(format!("marked ({vcs})")).fg(Color::Green),
            MarkStatus::NoRepository => Cell::new("no repository"),
            MarkStatus::Failed { .. } => Cell::new("failed").fg(Color::Red),
            MarkStatus::TimedOut { .. } => Cell::new("timed out").fg(Color::Red),
        },
        _ => Cell::new("-"),
    }
}

/// One row per file processed by `resolve`.
pub fn session_table(reports: &[(String, SessionReport)]) -> Table {
    let mut table = new_table(vec!["File", "Accepted", "Skipped", "Outcome", "VCS"]);
    for (file, report) in reports {
        let (accepted, skipped) = match &report.outcome {
            SessionOutcome::Written { summary, .. } | SessionOutcome::DryRun { summary, .. } => {
                (summary.accepted.to_string(), summary.skipped.to_string())
            }
            _ => ("-".to_string(), "-".to_string()),
        };
        table.add_row(vec![
            Cell::new(file),
            Cell::new(accepted),
            Cell::new(skipped),
            outcome_cell(&report.outcome),
            mark_cell(&report.outcome),
        ]);
    }
    table
}

/// Conflicted files reported by the repository.
pub fn conflicted_table(files: &[ConflictedFile]) -> Table {
    let mut table = new_table(vec!["File", "Markers"]);
    for f in files {
        let markers = if f.has_markers {
            Cell::new("yes").fg(Color::Yellow)
        } else {
            Cell::new("no (resolved on disk)").fg(Color::Green)
        };
        table.add_row(vec![Cell::new(f.path.display()), markers]);
    }
    table
}
