//! `mergewise status`: list conflicted files.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};

use mergewise_core::vcs::conflicted_files;
use mergewise_core::{AppConfig, Theme};

use crate::style;

pub fn run(config: &AppConfig, path: &Path, theme: Theme) -> Result<ExitCode> {
    let files = conflicted_files(path, config.resolve.vcs_timeout())
        .context("failed to query repository status")?;

    if files.is_empty() {
        println!("{}", theme.success("No conflicted files."));
        return Ok(ExitCode::SUCCESS);
    }

    println!("{}", style::conflicted_table(&files));
    let pending = files.iter().filter(|f| f.has_markers).count();
    if pending > 0 {
        println!();
        println!(
            "{}",
            style::dim(&format!(
                "{pending} file(s) still contain markers. Run `mergewise resolve <FILE>` on each."
            ))
        );
    }
    Ok(ExitCode::SUCCESS)
}
