//! Terminal-backed [`Interaction`] using dialoguer prompts and an indicatif
//! spinner. Falls back to plain line reads when stdin is not a terminal so
//! answers can be piped in.

use std::io::{self, BufRead, IsTerminal, Write};
use std::time::Duration;

use console::Term;
use dialoguer::{Confirm, Input};
use indicatif::{ProgressBar, ProgressStyle};

use mergewise_core::Interaction;

pub struct TerminalInteraction {
    spinner: Option<ProgressBar>,
    interactive: bool,
}

impl TerminalInteraction {
    pub fn new() -> Self {
        Self {
            spinner: None,
            interactive: io::stdin().is_terminal(),
        }
    }

    fn read_plain(&self, prompt: &str) -> io::Result<Option<String>> {
        if !prompt.is_empty() {
            eprint!("{prompt}: ");
            io::stderr().flush()?;
        }
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }
}

impl Default for TerminalInteraction {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TerminalInteraction {
    fn drop(&mut self) {
        self.stop_wait();
    }
}

/// End of input or Ctrl-C while prompting means "no answer".
fn no_answer<T>(err: dialoguer::Error) -> io::Result<Option<T>> {
    let dialoguer::Error::IO(e) = err;
    match e.kind() {
        io::ErrorKind::UnexpectedEof | io::ErrorKind::Interrupted => Ok(None),
        _ => Err(e),
    }
}

fn parse_yes_no(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

impl Interaction for TerminalInteraction {
    fn show(&mut self, text: &str) {
        match &self.spinner {
            Some(spinner) => spinner.suspend(|| println!("{text}")),
            None => println!("{text}"),
        }
    }

    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        self.stop_wait();
        // Continuation lines of a multi-line comment come with no prompt.
        if !self.interactive || prompt.is_empty() {
            return self.read_plain(prompt);
        }
        match Input::<String>::new()
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()
        {
            Ok(line) => Ok(Some(line)),
            Err(e) => no_answer(e),
        }
    }

    fn confirm(&mut self, question: &str) -> io::Result<Option<bool>> {
        self.stop_wait();
        if !self.interactive {
            return Ok(self
                .read_plain(&format!("{question} [y/N]"))?
                .map(|a| parse_yes_no(&a)));
        }
        match Confirm::new()
            .with_prompt(question)
            .default(false)
            .interact_opt()
        {
            Ok(answer) => Ok(answer),
            Err(e) => no_answer(e),
        }
    }

    fn start_wait(&mut self, message: &str) {
        self.stop_wait();
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.blue} {msg}")
            .map(|s| s.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]))
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        spinner.set_style(style);
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));
        self.spinner = Some(spinner);
    }

    fn stop_wait(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }

    fn width(&self) -> usize {
        let (_rows, cols) = Term::stdout().size();
        usize::from(cols)
    }
}
