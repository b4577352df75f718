//! Blocking process execution helpers.
//!
//! Every external operation in homestead goes through these functions, and
//! all of them block until the child exits; the orchestrator has no
//! internal parallelism. The error type keeps "the binary is not
//! installed" separate from "the command ran and failed", because adapters
//! routinely need to treat the former as a normal negative answer.

use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use thiserror::Error;

/// Failure modes of an external command.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("command not found: {0}")]
    NotFound(String),

    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {}: {}", display_code(.code), .stderr.trim())]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}

impl ExecError {
    /// Whether this is the "binary absent" case rather than a real failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Exit code of a `Failed` error, if the child exited normally.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Failed { code, .. } => *code,
            _ => None,
        }
    }
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "signal".to_string(),
    }
}

fn rendered(cmd: &str, args: &[&str]) -> String {
    if args.is_empty() {
        cmd.to_string()
    } else {
        format!("{cmd} {}", args.join(" "))
    }
}

fn spawn_error(cmd: &str, args: &[&str], e: std::io::Error) -> ExecError {
    if e.kind() == std::io::ErrorKind::NotFound {
        ExecError::NotFound(cmd.to_string())
    } else {
        ExecError::Spawn {
            command: rendered(cmd, args),
            source: e,
        }
    }
}

/// Run a command and capture trimmed stdout. Non-zero exit is an error
/// carrying the child's stderr.
pub fn run_capture(cmd: &str, args: &[&str]) -> Result<String, ExecError> {
    let output = Command::new(cmd)
        .args(args)
        .output()
        .map_err(|e| spawn_error(cmd, args, e))?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        Err(ExecError::Failed {
            command: rendered(cmd, args),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Run a command for its exit status alone. Non-zero exit is NOT an error
/// here; callers interpret the code (e.g. `systemctl is-active` uses 3 for
/// "inactive", `findmnt` uses 1 for "not mounted").
pub fn run_status(cmd: &str, args: &[&str]) -> Result<ExitStatus, ExecError> {
    Command::new(cmd)
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|e| spawn_error(cmd, args, e))
}

/// Run a command silently, returning success/failure. Spawn problems count
/// as failure.
pub fn run_quiet(cmd: &str, args: &[&str]) -> bool {
    run_status(cmd, args).map(|s| s.success()).unwrap_or(false)
}

/// Check if a command exists on `$PATH`.
pub fn command_exists(cmd: &str) -> bool {
    Command::new("which")
        .arg(cmd)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Scoped working-directory change.
///
/// A leaked chdir corrupts every later relative filesystem operation in the
/// process, so the previous directory is restored on drop, on success and
/// failure paths alike.
#[derive(Debug)]
pub struct Workdir {
    previous: PathBuf,
}

impl Workdir {
    pub fn change_to(dir: &Path) -> Result<Self, std::io::Error> {
        let previous = std::env::current_dir()?;
        std::env::set_current_dir(dir)?;
        log::trace!("cwd -> {}", dir.display());
        Ok(Self { previous })
    }
}

impl Drop for Workdir {
    fn drop(&mut self) {
        if let Err(e) = std::env::set_current_dir(&self.previous) {
            log::error!(
                "Failed to restore working directory {}: {e}",
                self.previous.display()
            );
        }
    }
}
