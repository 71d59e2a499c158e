//! Presentation capability injected into the resolution engine.
//!
//! [`Theme`] owns every color decision and can be switched off. [`Interaction`]
//! is the seam between the engine and the terminal: the CLI implements it
//! with dialoguer and indicatif, tests implement it with scripted input.

use std::io;

use console::{pad_str, Alignment, Style};

use crate::conflict::parser::ConflictRegion;
use crate::conflict::validator::Suggestion;

/// Terminal width at which the two sides are shown next to each other.
pub const SIDE_BY_SIDE_MIN_WIDTH: usize = 100;

// ---------------------------------------------------------------------------
// Theme
// ---------------------------------------------------------------------------

/// Styles for all engine output.
#[derive(Debug, Clone, Copy)]
pub struct Theme {
    color: bool,
}

impl Default for Theme {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Theme {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    /// No escape sequences at all.
    pub fn plain() -> Self {
        Self::new(false)
    }

    pub fn is_colored(&self) -> bool {
        self.color
    }

    fn paint(&self, style: Style, text: &str) -> String {
        if self.color {
            style.apply_to(text).to_string()
        } else {
            text.to_string()
        }
    }

    pub fn success(&self, msg: &str) -> String {
        format!("{} {}", self.paint(Style::new().green(), "✓"), msg)
    }

    pub fn error(&self, msg: &str) -> String {
        format!("{} {}", self.paint(Style::new().red(), "✗"), msg)
    }

    pub fn warn(&self, msg: &str) -> String {
        format!("{} {}", self.paint(Style::new().yellow(), "⚠"), msg)
    }

    pub fn header(&self, msg: &str) -> String {
        self.paint(Style::new().bold(), msg)
    }

    pub fn dim(&self, msg: &str) -> String {
        self.paint(Style::new().dim(), msg)
    }

    pub fn base(&self, msg: &str) -> String {
        self.paint(Style::new().cyan(), msg)
    }

    pub fn incoming(&self, msg: &str) -> String {
        self.paint(Style::new().magenta(), msg)
    }

    pub fn suggestion(&self, msg: &str) -> String {
        self.paint(Style::new().green(), msg)
    }
}

// ---------------------------------------------------------------------------
// Interaction
// ---------------------------------------------------------------------------

/// User-facing I/O used by the engine.
///
/// `Ok(None)` from the reading methods means end of input.
pub trait Interaction {
    /// Print a block of text.
    fn show(&mut self, text: &str);

    /// Read one line (without the newline).
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>>;

    /// Ask a yes/no question.
    fn confirm(&mut self, question: &str) -> io::Result<Option<bool>>;

    /// Show a progress indicator until [`stop_wait`](Self::stop_wait).
    fn start_wait(&mut self, message: &str);

    fn stop_wait(&mut self);

    /// Terminal width in columns.
    fn width(&self) -> usize {
        80
    }
}

/// Stops the progress indicator when dropped, on success and error paths.
pub struct WaitGuard<'a, I: Interaction + ?Sized> {
    ui: &'a mut I,
}

impl<I: Interaction + ?Sized> Drop for WaitGuard<'_, I> {
    fn drop(&mut self) {
        self.ui.stop_wait();
    }
}

/// Start the progress indicator and return a guard that stops it.
pub fn waiting<'a, I: Interaction + ?Sized>(ui: &'a mut I, message: &str) -> WaitGuard<'a, I> {
    ui.start_wait(message);
    WaitGuard { ui }
}

/// Read lines until a blank line. `Ok(None)` on end of input.
pub fn read_multiline<I: Interaction + ?Sized>(
    ui: &mut I,
    prompt: &str,
) -> io::Result<Option<String>> {
    let mut lines = Vec::new();
    let mut first = true;
    loop {
        let shown = if first { prompt } else { "" };
        first = false;
        match ui.read_line(shown)? {
            None => return Ok(None),
            Some(line) if line.trim().is_empty() => break,
            Some(line) => lines.push(line),
        }
    }
    Ok(Some(lines.join("\n")))
}

// ---------------------------------------------------------------------------
// Conflict view
// ---------------------------------------------------------------------------

fn expand_tabs(line: &str) -> String {
    line.replace('\t', "    ")
}

fn side_label(kind: &str, label: &str) -> String {
    if label.is_empty() {
        kind.to_string()
    } else {
        format!("{kind} ({label})")
    }
}

/// Render a region with its context, both sides, side by side or stacked.
pub fn render_region(
    theme: &Theme,
    region: &ConflictRegion,
    index: usize,
    total: usize,
    width: usize,
    display_context: usize,
) -> String {
    let mut out = Vec::new();
    out.push(theme.header(&format!(
        "Conflict {index}/{total} (lines {}-{})",
        region.start_line, region.end_line
    )));

    let before: Vec<&str> = region.context_before.lines().collect();
    for line in &before[before.len().saturating_sub(display_context)..] {
        out.push(theme.dim(&format!("  {}", expand_tabs(line))));
    }

    let base_title = side_label("Base", &region.base_label);
    let incoming_title = side_label("Incoming", &region.incoming_label);

    if width >= SIDE_BY_SIDE_MIN_WIDTH {
        let col = (width - 3) / 2;
        let left: Vec<&str> = region.base_content.lines().collect();
        let right: Vec<&str> = region.incoming_content.lines().collect();
        out.push(format!(
            "{} │ {}",
            theme.base(&pad_str(&base_title, col, Alignment::Left, Some("…"))),
            theme.incoming(&pad_str(&incoming_title, col, Alignment::Left, Some("…"))),
        ));
        out.push(format!("{}─┼─{}", "─".repeat(col), "─".repeat(col)));
        for i in 0..left.len().max(right.len()) {
            let l = expand_tabs(left.get(i).copied().unwrap_or_default());
            let r = expand_tabs(right.get(i).copied().unwrap_or_default());
            out.push(format!(
                "{} │ {}",
                theme.base(&pad_str(&l, col, Alignment::Left, Some("…"))),
                theme.incoming(&pad_str(&r, col, Alignment::Left, Some("…"))),
            ));
        }
    } else {
        out.push(theme.base(&format!("<<<<<<< {base_title}")));
        for line in region.base_content.lines() {
            out.push(theme.base(&expand_tabs(line)));
        }
        out.push("=======".to_string());
        for line in region.incoming_content.lines() {
            out.push(theme.incoming(&expand_tabs(line)));
        }
        out.push(theme.incoming(&format!(">>>>>>> {incoming_title}")));
    }

    for line in region.context_after.lines().take(display_context) {
        out.push(theme.dim(&format!("  {}", expand_tabs(line))));
    }
    out.join("\n")
}

/// Render an LLM suggestion with its reason.
pub fn render_suggestion(theme: &Theme, suggestion: &Suggestion) -> String {
    let mut out = vec![theme.header("Suggested resolution:")];
    if suggestion.merged_code.is_empty() {
        out.push(theme.dim("  (remove the block entirely)"));
    }
    for line in suggestion.merged_code.lines() {
        out.push(theme.suggestion(&format!("  {}", expand_tabs(line))));
    }
    out.push(format!("{} {}", theme.dim("Reason:"), suggestion.reason));
    out.join("\n")
}
