//! mergewise command-line tool.
//!
//! Provides subcommands for resolving merge conflicts with an LLM, listing
//! conflicted files, turning natural-language requests into shell commands,
//! reviewing diffs, and generating / validating configuration files.

mod commands;
mod style;
mod terminal;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mergewise_core::config::{default_config_path, AppConfig, DEFAULT_CONFIG_TOML};
use mergewise_core::Theme;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// LLM-assisted merge conflict resolution and shell helper.
#[derive(Parser, Debug)]
#[command(
    name = "mergewise",
    version,
    about = "Resolve merge conflicts and write shell commands with an LLM"
)]
struct Cli {
    /// Path to the TOML configuration file
    /// (default: ~/.config/mergewise/config.toml).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve conflict markers in one or more files, interactively.
    Resolve(ResolveArgs),

    /// List files the repository considers conflicted.
    Status {
        /// Any path inside the repository.
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Translate a natural-language request into a shell command.
    Ask {
        /// What you want to do, in plain words.
        #[arg(required = true, num_args = 1..)]
        request: Vec<String>,
    },

    /// Ask the LLM to review the working-tree diff.
    Review {
        /// Review staged changes instead of unstaged ones.
        #[arg(long)]
        staged: bool,

        /// Diff against this revision.
        revision: Option<String>,
    },

    /// Generate a default configuration file.
    Init {
        /// Output path (default: ~/.config/mergewise/config.toml).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate a configuration file.
    Validate,
}

#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Files containing conflict markers.
    #[arg(required = true, num_args = 1..)]
    pub files: Vec<PathBuf>,

    /// Lines of context sent to the LLM around each conflict.
    #[arg(long)]
    pub context_lines: Option<usize>,

    /// Show the resulting diff instead of writing files.
    #[arg(long)]
    pub dry_run: bool,

    /// Do not mark files resolved in git / hg.
    #[arg(long)]
    pub no_vcs: bool,

    /// Write JSON resolution logs into this directory.
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Custom prompt template.
    #[arg(long)]
    pub template: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let explicit = cli.config.is_some();
    let config_path = cli.config.unwrap_or_else(default_config_path);
    let no_color = cli.no_color;

    match cli.command {
        Commands::Init { output } => {
            cmd_init(output.as_deref().unwrap_or(&config_path))?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Validate => {
            cmd_validate(&config_path)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Resolve(args) => {
            let (config, theme) = prepare(&config_path, explicit, no_color)?;
            commands::resolve::run(&config, args, theme)
        }
        Commands::Status { path } => {
            let (config, theme) = prepare(&config_path, explicit, no_color)?;
            commands::status::run(&config, &path, theme)
        }
        Commands::Ask { request } => {
            let (config, theme) = prepare(&config_path, explicit, no_color)?;
            commands::ask::run_ask(&config, &request.join(" "), theme)
        }
        Commands::Review { staged, revision } => {
            let (config, theme) = prepare(&config_path, explicit, no_color)?;
            commands::ask::run_review(&config, staged, revision.as_deref(), theme)
        }
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

/// An explicit `--config` must exist; the default location may be absent.
fn load_config(path: &Path, explicit: bool) -> Result<AppConfig> {
    if explicit {
        return AppConfig::load_and_resolve(path).context("failed to load configuration file");
    }
    AppConfig::load_or_default(path).context("failed to load configuration file")
}

/// Load the configuration and set up colors for a command that needs them.
fn prepare(path: &Path, explicit: bool, no_color: bool) -> Result<(AppConfig, Theme)> {
    let config = load_config(path, explicit)?;
    let color = !no_color && config.ui.color;
    if !color {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }
    Ok((config, Theme::new(color)))
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_init(output: &Path) -> Result<()> {
    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).context("failed to create config directory")?;
    }

    std::fs::write(output, DEFAULT_CONFIG_TOML).context("failed to write config file")?;

    println!(
        "{}",
        style::success(&format!("Default configuration written to {}", output.display()))
    );
    println!();
    println!("Next steps:");
    println!("  1. Pick a provider and model in the [llm] section");
    println!("  2. Export the API key variable named by api_key_env (OPENAI_API_KEY by default)");
    println!(
        "  3. Validate with: mergewise validate --config {}",
        output.display()
    );

    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let mut config =
        AppConfig::load_from_file(config_path).context("failed to parse configuration")?;
    println!("  [OK] TOML structure is valid");

    config.resolve_env_vars()?;
    println!("  [OK] Environment variable references processed");

    match config.validate() {
        Ok(()) => println!("  [OK] All fields are valid"),
        Err(e) => {
            println!("  [FAIL] Validation error: {}", e);
            anyhow::bail!("configuration validation failed");
        }
    }

    println!();
    println!("Configuration summary:");
    println!("  Provider      : {}", config.llm.provider);
    println!("  Model         : {}", config.llm.model);
    println!("  API URL       : {}", config.llm.effective_api_url());
    if config.llm.provider.requires_api_key() {
        println!(
            "  API key       : {} ({})",
            if config.llm.api_key.is_some() { "set" } else { "NOT SET" },
            config.llm.api_key_env
        );
    }
    println!("  Context lines : {}", config.resolve.context_lines);
    println!(
        "  Template      : {}",
        config
            .resolve
            .template
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "built-in".to_string())
    );
    println!(
        "  Resolution log: {}",
        config
            .resolve
            .log_dir
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "off".to_string())
    );
    println!();
    println!("Configuration is valid.");

    Ok(())
}
