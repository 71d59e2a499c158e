//! Bounded execution of external commands.
//!
//! Every subprocess the tool starts (git, hg, the editor, `git diff`, shell
//! commands confirmed by the user) goes through [`ExternalCommand`], which
//! reports a structured [`CommandOutcome`] instead of an error. On timeout the
//! child receives SIGTERM, then SIGKILL once the grace period expires.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, instrument, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const DEFAULT_GRACE: Duration = Duration::from_secs(1);

/// Result of running an external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Exit status zero.
    Success { stdout: String, stderr: String },
    /// The command could not start or exited non-zero.
    Failure {
        message: String,
        exit_code: Option<i32>,
    },
    /// The timeout elapsed and the child was terminated.
    TimedOut { after: Duration },
}

impl CommandOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Captured stdout of a successful run.
    pub fn stdout(&self) -> Option<&str> {
        match self {
            Self::Success { stdout, .. } => Some(stdout),
            _ => None,
        }
    }
}

impl std::fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success { .. } => write!(f, "succeeded"),
            Self::Failure { message, .. } => write!(f, "failed: {message}"),
            Self::TimedOut { after } => write!(f, "timed out after {}s", after.as_secs_f32()),
        }
    }
}

/// Builder for a single external command invocation.
#[derive(Debug, Clone)]
pub struct ExternalCommand {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    timeout: Option<Duration>,
    grace: Duration,
    interactive: bool,
    stdin: Option<String>,
}

impl ExternalCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            timeout: None,
            grace: DEFAULT_GRACE,
            interactive: false,
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Kill the command if it runs longer than `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Time allowed between SIGTERM and SIGKILL.
    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Inherit the terminal instead of capturing output (editors, shells).
    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }

    /// Feed `input` to the child's stdin.
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Human-readable command line, for hints and logs.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run to completion or timeout. Never panics and never returns an error;
    /// all failure modes are folded into [`CommandOutcome`].
    #[instrument(skip(self), fields(cmd = %self.display()))]
    pub fn run(&self) -> CommandOutcome {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(ref dir) = self.cwd {
            cmd.current_dir(dir);
        }
        if self.interactive {
            cmd.stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit());
        } else {
            cmd.stdin(if self.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
            // Own process group, so a timeout also reaches grandchildren that
            // hold our pipes open.
            #[cfg(unix)]
            {
                use std::os::unix::process::CommandExt;
                cmd.process_group(0);
            }
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return CommandOutcome::Failure {
                    message: format!("'{}' was not found on PATH", self.program),
                    exit_code: None,
                };
            }
            Err(e) => {
                return CommandOutcome::Failure {
                    message: format!("could not start '{}': {e}", self.program),
                    exit_code: None,
                };
            }
        };

        let writer = match (self.stdin.clone(), child.stdin.take()) {
            (Some(input), Some(mut pipe)) => Some(thread::spawn(move || {
                // A child that exits early closes the pipe; that is not our error.
                let _ = pipe.write_all(input.as_bytes());
            })),
            _ => None,
        };
        let stdout_reader = child.stdout.take().map(drain);
        let stderr_reader = child.stderr.take().map(drain);

        let status = self.wait(&mut child);

        if let Some(handle) = writer {
            let _ = handle.join();
        }
        let stdout = join_reader(stdout_reader);
        let stderr = join_reader(stderr_reader);

        match status {
            WaitResult::Exited(status) if status.success() => {
                debug!("command succeeded");
                CommandOutcome::Success { stdout, stderr }
            }
            WaitResult::Exited(status) => {
                let detail = stderr.trim();
                let message = if detail.is_empty() {
                    format!("'{}' exited with {status}", self.display())
                } else {
                    detail.to_string()
                };
                debug!(code = ?status.code(), "command failed");
                CommandOutcome::Failure {
                    message,
                    exit_code: status.code(),
                }
            }
            WaitResult::WaitFailed(e) => CommandOutcome::Failure {
                message: format!("waiting for '{}' failed: {e}", self.program),
                exit_code: None,
            },
            WaitResult::TimedOut(after) => {
                warn!(after_secs = after.as_secs_f32(), "command timed out");
                CommandOutcome::TimedOut { after }
            }
        }
    }

    fn wait(&self, child: &mut Child) -> WaitResult {
        let Some(timeout) = self.timeout else {
            return match child.wait() {
                Ok(status) => WaitResult::Exited(status),
                Err(e) => WaitResult::WaitFailed(e),
            };
        };

        let deadline = Instant::now() + timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return WaitResult::Exited(status),
                Ok(None) if Instant::now() >= deadline => break,
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => return WaitResult::WaitFailed(e),
            }
        }

        terminate(child, self.grace, !self.interactive);
        WaitResult::TimedOut(timeout)
    }
}

enum WaitResult {
    Exited(ExitStatus),
    WaitFailed(std::io::Error),
    TimedOut(Duration),
}

/// SIGTERM, wait up to `grace`, then SIGKILL. Always reaps the child.
fn terminate(child: &mut Child, grace: Duration, whole_group: bool) {
    let pid = child.id() as i32;
    let target = if whole_group { -pid } else { pid };

    #[cfg(unix)]
    unsafe {
        libc::kill(target as libc::pid_t, libc::SIGTERM);
    }

    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        if let Ok(Some(_)) = child.try_wait() {
            #[cfg(unix)]
            if whole_group {
                unsafe {
                    libc::kill(target as libc::pid_t, libc::SIGKILL);
                }
            }
            return;
        }
        thread::sleep(POLL_INTERVAL);
    }

    debug!(pid, "grace period expired, sending SIGKILL");
    #[cfg(unix)]
    unsafe {
        libc::kill(target as libc::pid_t, libc::SIGKILL);
    }
    let _ = child.kill();
    let _ = child.wait();
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_reader(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}
