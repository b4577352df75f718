//! Container runtime adapter: runtime detection, compose-command
//! detection, and container queries for podman and docker.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use super::exec::{command_exists, run_capture, run_quiet, Workdir};
use super::ContainerEngine;

/// The container execution engine selected for the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeKind {
    /// Rootless, daemonless. Preferred on immutable-root hosts.
    Podman,
    /// Daemon-based.
    Docker,
}

impl RuntimeKind {
    pub const ALL: &'static [Self] = &[Self::Podman, Self::Docker];

    /// Runtime binary name; also the generated unit-name prefix.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Podman => "podman",
            Self::Docker => "docker",
        }
    }

    /// The daemon unit generated units must order after, if any.
    pub fn daemon_unit(self) -> Option<&'static str> {
        match self {
            Self::Podman => None,
            Self::Docker => Some("docker.service"),
        }
    }

    /// Whether stacks run under an unprivileged account.
    pub fn rootless(self) -> bool {
        matches!(self, Self::Podman)
    }
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

impl FromStr for RuntimeKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "podman" => Ok(Self::Podman),
            "docker" => Ok(Self::Docker),
            other => anyhow::bail!("Unknown container runtime: {other:?}"),
        }
    }
}

/// A resolved compose invocation: either the runtime's compose plugin
/// (`podman compose`, `docker compose`) or the standalone binary
/// (`podman-compose`, `docker-compose`).
///
/// Detected once, persisted in the store, and reused verbatim by every
/// later pull/start/stop so all of them run the identical command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeCommand {
    program: String,
    args: Vec<String>,
}

impl ComposeCommand {
    pub fn plugin(kind: RuntimeKind) -> Self {
        Self {
            program: kind.prefix().to_string(),
            args: vec!["compose".to_string()],
        }
    }

    pub fn standalone(kind: RuntimeKind) -> Self {
        Self {
            program: format!("{}-compose", kind.prefix()),
            args: Vec::new(),
        }
    }

    /// The full invocation with `extra` appended, as argv.
    pub fn argv(&self, extra: &[&str]) -> Vec<String> {
        let mut argv = vec![self.program.clone()];
        argv.extend(self.args.iter().cloned());
        argv.extend(extra.iter().map(|s| (*s).to_string()));
        argv
    }

    /// Render as a single command line (unit `Exec*` directives, store).
    pub fn command_line(&self, extra: &[&str]) -> String {
        self.argv(extra).join(" ")
    }

    /// Whether this invocation answers a `version` query on this host.
    fn works(&self) -> bool {
        let argv = self.argv(&["version"]);
        let args: Vec<&str> = argv[1..].iter().map(String::as_str).collect();
        match run_capture(&argv[0], &args) {
            Ok(out) => {
                log::debug!("{} -> {}", self.command_line(&["version"]), version_of(&out));
                true
            }
            Err(e) if e.is_not_found() => {
                log::debug!("{} is not installed", self.program);
                false
            }
            Err(e) => {
                log::debug!("{} unavailable: {e}", self.command_line(&[]));
                false
            }
        }
    }
}

impl fmt::Display for ComposeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line(&[]))
    }
}

impl FromStr for ComposeCommand {
    type Err = anyhow::Error;

    /// Parse the persisted form (`docker compose`, `podman-compose`, ...).
    fn from_str(s: &str) -> Result<Self> {
        let mut words = s.split_whitespace().map(str::to_string);
        let program = words.next().context("Empty compose command")?;
        Ok(Self {
            program,
            args: words.collect(),
        })
    }
}

/// Extract a bare version number from tool output for logging.
fn version_of(output: &str) -> String {
    let re = regex::Regex::new(r"v?(\d+\.\d+(?:\.\d+)*)").expect("static regex");
    re.captures(output)
        .and_then(|c| c.get(1))
        .map_or_else(|| "unknown version".to_string(), |m| m.as_str().to_string())
}

/// Live [`ContainerEngine`] shelling out to the runtime binaries.
pub struct Engine;

impl ContainerEngine for Engine {
    fn available(&self, kind: RuntimeKind) -> bool {
        command_exists(kind.prefix())
    }

    fn responsive(&self, kind: RuntimeKind) -> bool {
        run_quiet(kind.prefix(), &["info", "--format", "{{.Host.Arch}}"])
            || run_quiet(kind.prefix(), &["info"])
    }

    fn detect_compose(&self, kind: RuntimeKind) -> Result<Option<ComposeCommand>> {
        let plugin = ComposeCommand::plugin(kind);
        if plugin.works() {
            return Ok(Some(plugin));
        }
        let standalone = ComposeCommand::standalone(kind);
        if standalone.works() {
            return Ok(Some(standalone));
        }
        Ok(None)
    }

    fn compose_check(&self, compose: &ComposeCommand, workdir: &Path) -> Result<()> {
        // Compose resolves its file relative to the working directory; the
        // guard restores the previous cwd whether or not the check passes.
        let _cwd = Workdir::change_to(workdir)
            .with_context(|| format!("Failed to enter {}", workdir.display()))?;

        let argv = compose.argv(&["config", "--quiet"]);
        let args: Vec<&str> = argv[1..].iter().map(String::as_str).collect();
        run_capture(&argv[0], &args)
            .map(|_| ())
            .with_context(|| format!("Compose file in {} failed validation", workdir.display()))
    }

    fn running_containers(&self, kind: RuntimeKind, filter: &str) -> Result<Vec<String>> {
        match kind {
            RuntimeKind::Podman => {
                let out = run_capture(
                    "podman",
                    &["ps", "--filter", &format!("name={filter}"), "--format", "json"],
                )
                .context("podman ps failed")?;
                parse_podman_ps(&out)
            }
            RuntimeKind::Docker => {
                let out = run_capture(
                    "docker",
                    &["ps", "--filter", &format!("name={filter}"), "--format", "{{.Names}}"],
                )
                .context("docker ps failed")?;
                Ok(out.lines().map(str::to_string).collect())
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct PodmanPsEntry {
    #[serde(rename = "Names", default)]
    names: Vec<String>,
}

fn parse_podman_ps(json: &str) -> Result<Vec<String>> {
    if json.is_empty() {
        return Ok(Vec::new());
    }
    let entries: Vec<PodmanPsEntry> =
        serde_json::from_str(json).context("Unexpected podman ps JSON")?;
    Ok(entries.into_iter().flat_map(|e| e.names).collect())
}

// ============================================================================
// Tests
// ============================================================================
