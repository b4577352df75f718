//! Ports onto the host system.
//!
//! Shelling out to OS tools is the primary I/O mechanism of this tool, so
//! each external system gets a narrow trait (a port) with a shelling-out
//! live implementation. The orchestration logic only ever sees the traits,
//! which is what makes the pipeline and the unit synthesizer testable
//! without touching a real host.

use anyhow::Result;
use std::path::{Path, PathBuf};

pub mod accounts;
pub mod exec;
pub mod host;
pub mod mounts;
pub mod runtime;
pub mod systemd;

#[cfg(test)]
pub mod mock;

pub use accounts::UserRecord;
pub use runtime::{ComposeCommand, RuntimeKind};

/// A unit file found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingUnit {
    pub path: PathBuf,
    pub body: String,
}

/// Service supervisor (systemd) operations.
pub trait ServiceManager {
    /// Locate a unit file by name across the systemd search paths.
    fn query_unit(&self, name: &str) -> Result<Option<ExistingUnit>>;
    /// Write a unit file under the local admin unit directory.
    fn install_unit(&self, name: &str, body: &str) -> Result<PathBuf>;
    /// Delete a previously installed unit file. `Ok(false)` if absent.
    fn remove_unit(&self, name: &str) -> Result<bool>;
    fn daemon_reload(&self) -> Result<()>;
    fn enable(&self, unit: &str) -> Result<()>;
    fn disable(&self, unit: &str) -> Result<()>;
    fn start(&self, unit: &str) -> Result<()>;
    fn stop(&self, unit: &str) -> Result<()>;
    /// `Ok(false)` is the defined negative (unit inactive), not an error.
    fn is_active(&self, unit: &str) -> Result<bool>;
    fn is_enabled(&self, unit: &str) -> Result<bool>;
}

/// Container runtime operations (podman or docker, plus compose).
pub trait ContainerEngine {
    /// Whether the runtime binary for `kind` is installed.
    fn available(&self, kind: RuntimeKind) -> bool;
    /// Whether the runtime answers queries (for docker, whether the
    /// daemon is up).
    fn responsive(&self, kind: RuntimeKind) -> bool;
    /// Find a working compose invocation for `kind`: plugin first, then
    /// the standalone binary. `Ok(None)` when neither answers.
    fn detect_compose(&self, kind: RuntimeKind) -> Result<Option<ComposeCommand>>;
    /// Validate the compose file in `workdir` without touching state.
    fn compose_check(&self, compose: &ComposeCommand, workdir: &Path) -> Result<()>;
    /// Names of running containers whose name matches `filter`.
    fn running_containers(&self, kind: RuntimeKind, filter: &str) -> Result<Vec<String>>;
}

/// Network storage introspection and mounting.
pub trait MountInspector {
    /// `Ok(false)` is the defined negative (nothing mounted there).
    fn is_mounted(&self, path: &Path) -> Result<bool>;
    fn mount(&self, source: &str, target: &Path) -> Result<()>;
}

/// Local account management.
pub trait AccountManager {
    fn lookup_user(&self, name: &str) -> Result<Option<UserRecord>>;
    fn create_service_user(&self, name: &str) -> Result<UserRecord>;
    /// Whether the user's manager lingers without an active login.
    fn lingering_enabled(&self, user: &str) -> Result<bool>;
    fn enable_lingering(&self, user: &str) -> Result<()>;
    /// Ensure `/run/user/<uid>` exists with the right owner and 0700 mode.
    fn ensure_runtime_dir(&self, user: &UserRecord) -> Result<PathBuf>;
}

/// Process environment and host-level facts.
pub trait HostInspector {
    fn is_root(&self) -> bool;
    fn command_exists(&self, name: &str) -> bool;
    /// Public address of this host, for VPN endpoint configuration.
    fn wan_address(&self) -> Result<String>;
}

/// The full set of ports, passed by reference through the pipeline and the
/// synthesizer. No component reaches for a global.
pub struct SystemPorts {
    pub systemd: Box<dyn ServiceManager>,
    pub engine: Box<dyn ContainerEngine>,
    pub mounts: Box<dyn MountInspector>,
    pub accounts: Box<dyn AccountManager>,
    pub host: Box<dyn HostInspector>,
}

impl SystemPorts {
    /// Ports backed by the real host commands.
    pub fn live() -> Self {
        Self {
            systemd: Box::new(systemd::Systemctl),
            engine: Box::new(runtime::Engine),
            mounts: Box::new(mounts::Findmnt),
            accounts: Box::new(accounts::Accounts),
            host: Box::new(host::Host),
        }
    }
}
