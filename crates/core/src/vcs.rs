//! Version-control integration.
//!
//! Marking a file resolved is best effort: it runs `git add` or
//! `hg resolve --mark` through the bounded command runner and reports a
//! [`MarkStatus`] with a manual-command hint on failure. Read-only status
//! queries go through `git2` for Git and `hg resolve --list` for Mercurial.

use std::path::{Path, PathBuf};
use std::time::Duration;

use git2::Repository;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::errors::VcsError;
use crate::process::{CommandOutcome, ExternalCommand};

/// Default bound on VCS bookkeeping commands.
pub const DEFAULT_VCS_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VcsKind {
    Git,
    Mercurial,
}

impl std::fmt::Display for VcsKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Git => write!(f, "git"),
            Self::Mercurial => write!(f, "hg"),
        }
    }
}

/// A detected repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoInfo {
    pub kind: VcsKind,
    pub root: PathBuf,
}

/// Find the nearest repository containing `path` (a file or directory).
///
/// Mercurial wins when a directory holds both `.hg` and `.git`.
pub fn detect(path: &Path) -> Option<RepoInfo> {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let start = if absolute.is_dir() {
        absolute.as_path()
    } else {
        absolute.parent()?
    };

    start.ancestors().find_map(|dir| {
        if dir.join(".hg").is_dir() {
            Some(RepoInfo {
                kind: VcsKind::Mercurial,
                root: dir.to_path_buf(),
            })
        } else if dir.join(".git").exists() {
            // `.git` is a file in worktrees and submodules.
            Some(RepoInfo {
                kind: VcsKind::Git,
                root: dir.to_path_buf(),
            })
        } else {
            None
        }
    })
}

/// Result of trying to mark a file resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkStatus {
    Marked { vcs: VcsKind },
    NoRepository,
    Failed { message: String, hint: String },
    TimedOut { hint: String },
}

impl MarkStatus {
    pub fn is_marked(&self) -> bool {
        matches!(self, Self::Marked { .. })
    }
}

/// The bookkeeping side of a VCS.
pub trait VcsBackend {
    fn mark_resolved(&self, path: &Path) -> MarkStatus;
}

/// Marks files using the real `git` / `hg` binaries.
#[derive(Debug, Clone)]
pub struct SystemVcs {
    timeout: Duration,
}

impl Default for SystemVcs {
    fn default() -> Self {
        Self::new(DEFAULT_VCS_TIMEOUT)
    }
}

impl SystemVcs {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

fn mark_command(kind: VcsKind, file_name: &str) -> ExternalCommand {
    match kind {
        VcsKind::Git => ExternalCommand::new("git").args(["add", "--", file_name]),
        VcsKind::Mercurial => ExternalCommand::new("hg").args(["resolve", "--mark", file_name]),
    }
}

fn manual_hint(kind: VcsKind, path: &Path) -> String {
    match kind {
        VcsKind::Git => format!("Run `git add {}` to mark it resolved.", path.display()),
        VcsKind::Mercurial => {
            format!("Run `hg resolve --mark {}` to mark it resolved.", path.display())
        }
    }
}

impl VcsBackend for SystemVcs {
    #[instrument(skip(self), fields(path = %path.display()))]
    fn mark_resolved(&self, path: &Path) -> MarkStatus {
        let Some(repo) = detect(path) else {
            debug!("no repository found, nothing to mark");
            return MarkStatus::NoRepository;
        };
        let (Some(dir), Some(name)) = (path.parent(), path.file_name()) else {
            return MarkStatus::Failed {
                message: "path has no file name".into(),
                hint: manual_hint(repo.kind, path),
            };
        };
        let dir = if dir.as_os_str().is_empty() {
            Path::new(".")
        } else {
            dir
        };

        let outcome = mark_command(repo.kind, &name.to_string_lossy())
            .current_dir(dir)
            .timeout(self.timeout)
            .run();

        match outcome {
            CommandOutcome::Success { .. } => {
                info!(vcs = %repo.kind, "marked resolved");
                MarkStatus::Marked { vcs: repo.kind }
            }
            CommandOutcome::Failure { message, .. } => {
                warn!(vcs = %repo.kind, error = %message, "marking resolved failed");
                MarkStatus::Failed {
                    message,
                    hint: manual_hint(repo.kind, path),
                }
            }
            CommandOutcome::TimedOut { after } => {
                warn!(vcs = %repo.kind, after_secs = after.as_secs(), "marking resolved timed out");
                MarkStatus::TimedOut {
                    hint: manual_hint(repo.kind, path),
                }
            }
        }
    }
}

/// A file the VCS currently considers conflicted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictedFile {
    /// Path relative to the repository root.
    pub path: PathBuf,
    /// Whether the working copy still contains conflict markers.
    pub has_markers: bool,
}

/// List unresolved files of the repository containing `path`.
#[instrument(fields(path = %path.display()))]
pub fn conflicted_files(path: &Path, timeout: Duration) -> Result<Vec<ConflictedFile>, VcsError> {
    let repo = detect(path).ok_or_else(|| VcsError::NoRepository(path.to_path_buf()))?;
    let relative = match repo.kind {
        VcsKind::Git => git_conflicts(&repo.root)?,
        VcsKind::Mercurial => hg_conflicts(&repo.root, timeout)?,
    };
    debug!(count = relative.len(), "listed conflicted files");

    Ok(relative
        .into_iter()
        .map(|p| {
            let has_markers = std::fs::read_to_string(repo.root.join(&p))
                .map(|text| text.lines().any(|l| l.starts_with("<<<<<<<")))
                .unwrap_or(false);
            ConflictedFile { path: p, has_markers }
        })
        .collect())
}

fn git_conflicts(root: &Path) -> Result<Vec<PathBuf>, VcsError> {
    let repo = Repository::open(root)?;
    let index = repo.index()?;
    let mut paths = Vec::new();
    for conflict in index.conflicts()? {
        let conflict = conflict?;
        let entry = conflict.our.or(conflict.their).or(conflict.ancestor);
        if let Some(entry) = entry {
            let path = PathBuf::from(String::from_utf8_lossy(&entry.path).into_owned());
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
    }
    Ok(paths)
}

fn hg_conflicts(root: &Path, timeout: Duration) -> Result<Vec<PathBuf>, VcsError> {
    let cmd = ExternalCommand::new("hg")
        .args(["resolve", "--list"])
        .current_dir(root)
        .timeout(timeout);
    match cmd.run() {
        CommandOutcome::Success { stdout, .. } => Ok(parse_hg_resolve_list(&stdout)),
        other => Err(VcsError::Command {
            command: cmd.display(),
            outcome: other.to_string(),
        }),
    }
}

/// Unresolved (`U`) entries of `hg resolve --list` output.
fn parse_hg_resolve_list(output: &str) -> Vec<PathBuf> {
    output
        .lines()
        .filter_map(|line| line.strip_prefix("U "))
        .map(|p| PathBuf::from(p.trim()))
        .collect()
}
