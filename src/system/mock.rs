//! In-memory ports for scenario tests.
//!
//! One shared [`MockState`] backs all five ports. Queries answer from the
//! state without recording anything; every mutating operation appends a
//! line to `calls`, which is how tests assert properties like "a re-run of
//! a completed pipeline performs zero external mutating calls".

use anyhow::{Context, Result, bail};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{
    AccountManager, ComposeCommand, ContainerEngine, ExistingUnit, HostInspector, MountInspector,
    RuntimeKind, ServiceManager, SystemPorts, UserRecord,
};

#[derive(Debug)]
pub struct MockState {
    /// Mutating calls, in order.
    pub calls: Vec<String>,
    pub root: bool,
    pub missing_commands: HashSet<String>,
    pub wan: String,
    pub users: HashMap<String, UserRecord>,
    pub lingering: HashSet<String>,
    pub runtime_dirs: HashSet<PathBuf>,
    pub mounted: HashSet<PathBuf>,
    pub fail_mount: bool,
    pub units: HashMap<String, String>,
    pub enabled: HashSet<String>,
    pub active: HashSet<String>,
    pub available_runtimes: HashSet<RuntimeKind>,
    /// Compose detection override per runtime; default is the plugin form.
    pub compose: HashMap<RuntimeKind, Option<ComposeCommand>>,
    pub running: Vec<String>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            root: true,
            missing_commands: HashSet::new(),
            wan: "203.0.113.7".to_string(),
            users: HashMap::new(),
            lingering: HashSet::new(),
            runtime_dirs: HashSet::new(),
            mounted: HashSet::new(),
            fail_mount: false,
            units: HashMap::new(),
            enabled: HashSet::new(),
            active: HashSet::new(),
            available_runtimes: [RuntimeKind::Podman].into_iter().collect(),
            compose: HashMap::new(),
            running: Vec::new(),
        }
    }
}

/// Handle owning the shared state; clone-cheap ports are built from it.
#[derive(Clone, Default)]
pub struct MockSystem {
    state: Arc<Mutex<MockState>>,
}

impl MockSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().expect("mock state poisoned")
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn ports(&self) -> SystemPorts {
        SystemPorts {
            systemd: Box::new(MockSystemd(self.clone())),
            engine: Box::new(MockEngine(self.clone())),
            mounts: Box::new(MockMounts(self.clone())),
            accounts: Box::new(MockAccounts(self.clone())),
            host: Box::new(MockHost(self.clone())),
        }
    }

    fn record(&self, call: impl Into<String>) {
        self.state().calls.push(call.into());
    }
}

struct MockSystemd(MockSystem);

impl ServiceManager for MockSystemd {
    fn query_unit(&self, name: &str) -> Result<Option<ExistingUnit>> {
        Ok(self.0.state().units.get(name).map(|body| ExistingUnit {
            path: Path::new("/etc/systemd/system").join(name),
            body: body.clone(),
        }))
    }

    fn install_unit(&self, name: &str, body: &str) -> Result<PathBuf> {
        self.0.record(format!("systemd.install_unit {name}"));
        self.0.state().units.insert(name.to_string(), body.to_string());
        Ok(Path::new("/etc/systemd/system").join(name))
    }

    fn remove_unit(&self, name: &str) -> Result<bool> {
        self.0.record(format!("systemd.remove_unit {name}"));
        Ok(self.0.state().units.remove(name).is_some())
    }

    fn daemon_reload(&self) -> Result<()> {
        self.0.record("systemd.daemon_reload");
        Ok(())
    }

    fn enable(&self, unit: &str) -> Result<()> {
        self.0.record(format!("systemd.enable {unit}"));
        self.0.state().enabled.insert(unit.to_string());
        Ok(())
    }

    fn disable(&self, unit: &str) -> Result<()> {
        self.0.record(format!("systemd.disable {unit}"));
        self.0.state().enabled.remove(unit);
        Ok(())
    }

    fn start(&self, unit: &str) -> Result<()> {
        self.0.record(format!("systemd.start {unit}"));
        self.0.state().active.insert(unit.to_string());
        // Starting a mount unit makes its mountpoint mounted.
        if let Some(escaped) = unit.strip_suffix(".mount") {
            if let Ok(path) = sysunits::escape::unescape_path(escaped) {
                self.0.state().mounted.insert(PathBuf::from(path));
            }
        }
        Ok(())
    }

    fn stop(&self, unit: &str) -> Result<()> {
        self.0.record(format!("systemd.stop {unit}"));
        self.0.state().active.remove(unit);
        Ok(())
    }

    fn is_active(&self, unit: &str) -> Result<bool> {
        Ok(self.0.state().active.contains(unit))
    }

    fn is_enabled(&self, unit: &str) -> Result<bool> {
        Ok(self.0.state().enabled.contains(unit))
    }
}

struct MockEngine(MockSystem);

impl ContainerEngine for MockEngine {
    fn available(&self, kind: RuntimeKind) -> bool {
        self.0.state().available_runtimes.contains(&kind)
    }

    fn responsive(&self, kind: RuntimeKind) -> bool {
        self.available(kind)
    }

    fn detect_compose(&self, kind: RuntimeKind) -> Result<Option<ComposeCommand>> {
        Ok(self
            .0
            .state()
            .compose
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| Some(ComposeCommand::plugin(kind))))
    }

    fn compose_check(&self, _compose: &ComposeCommand, workdir: &Path) -> Result<()> {
        if workdir.as_os_str().is_empty() {
            bail!("empty workdir");
        }
        Ok(())
    }

    fn running_containers(&self, _kind: RuntimeKind, filter: &str) -> Result<Vec<String>> {
        Ok(self
            .0
            .state()
            .running
            .iter()
            .filter(|n| n.contains(filter))
            .cloned()
            .collect())
    }
}

struct MockMounts(MockSystem);

impl MountInspector for MockMounts {
    fn is_mounted(&self, path: &Path) -> Result<bool> {
        Ok(self.0.state().mounted.contains(path))
    }

    fn mount(&self, source: &str, target: &Path) -> Result<()> {
        if self.0.state().fail_mount {
            bail!("mount {source} at {} failed: connection refused", target.display());
        }
        self.0.record(format!("mounts.mount {source} {}", target.display()));
        self.0.state().mounted.insert(target.to_path_buf());
        Ok(())
    }
}

struct MockAccounts(MockSystem);

impl AccountManager for MockAccounts {
    fn lookup_user(&self, name: &str) -> Result<Option<UserRecord>> {
        Ok(self.0.state().users.get(name).cloned())
    }

    fn create_service_user(&self, name: &str) -> Result<UserRecord> {
        self.0.record(format!("accounts.create_service_user {name}"));
        let record = UserRecord {
            name: name.to_string(),
            uid: 990,
            gid: 990,
            home: PathBuf::from(format!("/home/{name}")),
        };
        self.0.state().users.insert(name.to_string(), record.clone());
        Ok(record)
    }

    fn lingering_enabled(&self, user: &str) -> Result<bool> {
        Ok(self.0.state().lingering.contains(user))
    }

    fn enable_lingering(&self, user: &str) -> Result<()> {
        self.0.record(format!("accounts.enable_lingering {user}"));
        self.0.state().lingering.insert(user.to_string());
        Ok(())
    }

    fn ensure_runtime_dir(&self, user: &UserRecord) -> Result<PathBuf> {
        let dir = user.runtime_dir();
        if !self.0.state().runtime_dirs.contains(&dir) {
            self.0.record(format!("accounts.ensure_runtime_dir {}", dir.display()));
            self.0.state().runtime_dirs.insert(dir.clone());
        }
        Ok(dir)
    }
}

struct MockHost(MockSystem);

impl HostInspector for MockHost {
    fn is_root(&self) -> bool {
        self.0.state().root
    }

    fn command_exists(&self, name: &str) -> bool {
        !self.0.state().missing_commands.contains(name)
    }

    fn wan_address(&self) -> Result<String> {
        let wan = self.0.state().wan.clone();
        (!wan.is_empty())
            .then_some(wan)
            .context("no WAN address configured in mock")
    }
}
