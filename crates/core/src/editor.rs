//! External editor launching.

use std::path::Path;

use tracing::debug;

use crate::process::{CommandOutcome, ExternalCommand};

/// Opens a file for manual editing and blocks until the user is done.
pub trait Editor {
    fn edit(&self, path: &Path, line: usize) -> CommandOutcome;
}

/// The user's editor from `$VISUAL`, `$EDITOR`, or `vi`.
#[derive(Debug, Clone)]
pub struct SystemEditor {
    program: String,
    args: Vec<String>,
}

impl SystemEditor {
    pub fn from_env() -> Self {
        let command = std::env::var("VISUAL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| std::env::var("EDITOR").ok().filter(|v| !v.trim().is_empty()))
            .unwrap_or_else(|| "vi".to_string());
        Self::new(&command)
    }

    /// Split a command line such as `code --wait` into program and arguments.
    pub fn new(command: &str) -> Self {
        let mut parts = command.split_whitespace().map(String::from);
        let program = parts.next().unwrap_or_else(|| "vi".to_string());
        Self {
            program,
            args: parts.collect(),
        }
    }

    /// Editors that understand `+LINE` before the file name.
    fn supports_line_arg(&self) -> bool {
        let name = Path::new(&self.program)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        matches!(name, "vi" | "vim" | "nvim" | "nano" | "emacs" | "kak" | "micro")
    }

    fn command(&self, path: &Path, line: usize) -> ExternalCommand {
        let mut cmd = ExternalCommand::new(&self.program)
            .args(self.args.iter().cloned())
            .interactive();
        if self.supports_line_arg() {
            cmd = cmd.arg(format!("+{line}"));
        }
        cmd.arg(path.display().to_string())
    }
}

impl Editor for SystemEditor {
    fn edit(&self, path: &Path, line: usize) -> CommandOutcome {
        let cmd = self.command(path, line);
        debug!(cmd = %cmd.display(), "launching editor");
        cmd.run()
    }
}
