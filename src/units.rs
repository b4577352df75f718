//! Service unit synthesis.
//!
//! Turns one selected stack plus the configured container runtime into a
//! systemd unit, then reconciles it with whatever the host already has:
//!
//! - A unit shipped by the OS image (no homestead header) is preserved
//!   as-is and only enabled/started, so image customizations survive.
//! - A unit written by an earlier run is rewritten only when its recorded
//!   checksum no longer matches freshly rendered content (config drift or
//!   a runtime switch); the line diff is shown before replacing it.
//! - After a runtime switch, the generated unit left under the previous
//!   runtime's prefix is stopped, disabled, and removed.
//!
//! Synthesis failures are scoped to one stack; the deploy step keeps going
//! with the remaining stacks.

use anyhow::{Context, Result, bail};
use colored::Colorize;
use std::path::{Path, PathBuf};

use sysunits::{escape, marker, UnitFile};

use crate::config::{self, StackSpec};
use crate::paths;
use crate::store::{self, SetupStore};
use crate::system::{ComposeCommand, RuntimeKind, SystemPorts, UserRecord};
use crate::ui;

/// Derived service identity for one stack. Deterministic: the same stack
/// and configuration always resolve to the same value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub stack: String,
    pub display_name: String,
    pub workdir: PathBuf,
    pub unit_name: String,
}

pub fn resolve_service_info(
    stack: &StackSpec,
    runtime: RuntimeKind,
    containers_base: &Path,
) -> ServiceInfo {
    ServiceInfo {
        stack: stack.name.clone(),
        display_name: format!("{} stack", stack.title),
        workdir: containers_base.join(&stack.name),
        unit_name: format!("{}-{}.service", runtime.prefix(), stack.name),
    }
}

/// The runtime recorded by the preflight step.
pub fn configured_runtime(store: &SetupStore) -> Result<RuntimeKind> {
    store
        .get(store::KEY_RUNTIME)
        .context("No container runtime configured; run the preflight step first")?
        .parse()
}

/// The containers base directory, as configured.
pub fn containers_base(store: &SetupStore) -> PathBuf {
    paths::expand(&store.get_or(store::KEY_CONTAINERS_BASE, paths::DEFAULT_CONTAINERS_BASE))
}

/// What reconciliation decided to do with a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitAction {
    /// Fresh unit written.
    Installed,
    /// Our unit existed and matched; nothing rewritten.
    Unchanged,
    /// Our unit existed but drifted; rewritten.
    Replaced,
    /// Image-provided unit found; left untouched.
    PreservedImageUnit,
}

#[derive(Debug)]
pub struct DeployOutcome {
    pub unit_name: String,
    pub action: UnitAction,
    /// Whether containers for the stack were observed running afterwards.
    /// `false` is a warning, not a failure; the unit may still be starting.
    pub verified: bool,
}

pub struct Synthesizer<'a> {
    store: &'a mut SetupStore,
    ports: &'a SystemPorts,
}

impl<'a> Synthesizer<'a> {
    pub fn new(store: &'a mut SetupStore, ports: &'a SystemPorts) -> Self {
        Self { store, ports }
    }

    /// Deploy one stack end to end: resolve, synthesize, reconcile,
    /// enable, start, verify.
    pub fn deploy_stack(&mut self, stack: &StackSpec) -> Result<DeployOutcome> {
        let runtime = configured_runtime(self.store)?;
        let base = containers_base(self.store);
        let info = resolve_service_info(stack, runtime, &base);

        let compose = self.compose_command(runtime)?;

        let compose_file = config::compose_file(&info.workdir).with_context(|| {
            format!(
                "Stack {} has no compose file in {} — place one there or re-run the \
                 stack configuration step",
                stack.name,
                info.workdir.display()
            )
        })?;
        log::debug!("Using compose file {}", compose_file.display());

        self.ports
            .engine
            .compose_check(&compose, &info.workdir)
            .with_context(|| format!("Stack {} compose file is invalid", stack.name))?;

        let identity = if runtime.rootless() {
            Some(self.ensure_rootless_identity()?)
        } else {
            None
        };

        let mountpoint = self.store.get(store::KEY_NAS_MOUNTPOINT).map(str::to_string);
        let body = build_unit_body(&info, runtime, &compose, identity.as_ref(), mountpoint.as_deref());

        let action = self.reconcile_unit(&info, &body)?;
        self.remove_stale_runtime_unit(&stack.name, runtime)?;

        if matches!(action, UnitAction::Installed | UnitAction::Replaced) {
            self.ports.systemd.daemon_reload()?;
        }

        self.ports.systemd.enable(&info.unit_name)?;
        self.ports.systemd.start(&info.unit_name)?;

        let verified = match self.ports.engine.running_containers(runtime, &stack.name) {
            Ok(names) if !names.is_empty() => {
                log::info!("{}: {} container(s) running", stack.name, names.len());
                true
            }
            Ok(_) => {
                ui::warn(&format!(
                    "No {} containers visible yet — the unit may still be starting",
                    stack.name
                ));
                false
            }
            Err(e) => {
                ui::warn(&format!("Could not verify {}: {e}", stack.name));
                false
            }
        };

        Ok(DeployOutcome {
            unit_name: info.unit_name,
            action,
            verified,
        })
    }

    /// The compose invocation for this host, detected once and then read
    /// back from the store so every later operation runs the identical
    /// command.
    pub fn compose_command(&mut self, runtime: RuntimeKind) -> Result<ComposeCommand> {
        if let Some(cached) = self.store.get(store::KEY_COMPOSE_CMD) {
            return cached
                .parse()
                .with_context(|| format!("Invalid cached compose command: {cached:?}"));
        }

        let detected = self.ports.engine.detect_compose(runtime)?;
        match detected {
            Some(cmd) => {
                self.store.set(store::KEY_COMPOSE_CMD, &cmd.command_line(&[]))?;
                log::info!("Detected compose command: {cmd}");
                Ok(cmd)
            }
            None => bail!(
                "No working compose command for {runtime}. Install the compose plugin \
                 or the standalone {}-compose binary, then re-run deployment",
                runtime.prefix()
            ),
        }
    }

    /// Rootless execution identity: the service account must exist, linger,
    /// and own its runtime directory before systemd can run user-scoped
    /// containers for it without an active login.
    fn ensure_rootless_identity(&mut self) -> Result<UserRecord> {
        let name = self
            .store
            .get(store::KEY_SERVICE_USER)
            .context("Service account not configured; run the account step first")?
            .to_string();

        let user = self
            .ports
            .accounts
            .lookup_user(&name)?
            .with_context(|| format!("Service account {name} does not exist"))?;

        if !self.ports.accounts.lingering_enabled(&name)? {
            log::info!("Enabling lingering for {name}");
            self.ports.accounts.enable_lingering(&name)?;
        }
        self.ports.accounts.ensure_runtime_dir(&user)?;

        Ok(user)
    }

    fn reconcile_unit(&self, info: &ServiceInfo, body: &str) -> Result<UnitAction> {
        let existing = self.ports.systemd.query_unit(&info.unit_name)?;

        let action = match existing {
            Some(unit) if !marker::is_generated(&unit.body) => {
                log::info!(
                    "{} exists at {} and is not ours; preserving it",
                    info.unit_name,
                    unit.path.display()
                );
                UnitAction::PreservedImageUnit
            }
            Some(unit) if !marker::drifted(&unit.body, body) => UnitAction::Unchanged,
            Some(unit) => {
                ui::info(&format!("{} changed:", info.unit_name));
                show_unit_diff(&unit.body, body);
                self.ports.systemd.install_unit(&info.unit_name, &marker::stamp(body))?;
                UnitAction::Replaced
            }
            None => {
                self.ports.systemd.install_unit(&info.unit_name, &marker::stamp(body))?;
                UnitAction::Installed
            }
        };

        Ok(action)
    }

    /// After a runtime switch the old `<other-runtime>-<stack>.service`
    /// would keep starting the stack with the previous engine. Remove it
    /// iff we generated it; an image-provided one is only reported.
    fn remove_stale_runtime_unit(&self, stack: &str, current: RuntimeKind) -> Result<()> {
        for other in RuntimeKind::ALL.iter().filter(|k| **k != current) {
            let stale_name = format!("{}-{stack}.service", other.prefix());
            let Some(stale) = self.ports.systemd.query_unit(&stale_name)? else {
                continue;
            };

            if marker::is_generated(&stale.body) {
                ui::info(&format!("Removing stale {stale_name} from previous runtime"));
                self.ports.systemd.stop(&stale_name)?;
                self.ports.systemd.disable(&stale_name)?;
                self.ports.systemd.remove_unit(&stale_name)?;
            } else {
                ui::warn(&format!(
                    "{stale_name} exists but was not generated by homestead; leaving it in place"
                ));
            }
        }
        Ok(())
    }
}

/// Render the unit body for one stack. Pure; no host access.
pub fn build_unit_body(
    info: &ServiceInfo,
    runtime: RuntimeKind,
    compose: &ComposeCommand,
    identity: Option<&UserRecord>,
    mountpoint: Option<&str>,
) -> String {
    let mut unit = UnitFile::new();

    unit.entry("Unit", "Description", &format!("{} ({runtime})", info.display_name));
    unit.entry("Unit", "After", "network-online.target");
    unit.entry("Unit", "Wants", "network-online.target");

    if let Some(daemon) = runtime.daemon_unit() {
        unit.entry("Unit", "After", daemon);
        unit.entry("Unit", "Requires", daemon);

        // The stack's data may live on network storage; order after the
        // mount unit systemd derives for the mountpoint. Omitted entirely
        // when no storage is configured.
        if let Some(mountpoint) = mountpoint {
            let mount_unit = escape::mount_unit_name(mountpoint);
            unit.entry("Unit", "After", &mount_unit);
            unit.entry("Unit", "Requires", &mount_unit);
        }
    }

    unit.entry("Service", "Type", "simple");
    unit.entry("Service", "WorkingDirectory", &info.workdir.to_string_lossy());

    if let Some(user) = identity {
        unit.entry("Service", "User", &user.name);
        unit.entry("Service", "Group", &user.name);
        unit.entry(
            "Service",
            "Environment",
            &format!("XDG_RUNTIME_DIR=/run/user/{}", user.uid),
        );
    }

    unit.entry("Service", "ExecStartPre", &compose.command_line(&["pull", "--quiet"]));
    unit.entry("Service", "ExecStart", &compose.command_line(&["up"]));
    unit.entry("Service", "ExecStop", &compose.command_line(&["down"]));
    unit.entry("Service", "Restart", "on-failure");
    unit.entry("Service", "RestartSec", "10");
    // Image pulls take minutes on first boot, not seconds.
    unit.entry("Service", "TimeoutStartSec", "900");
    unit.entry("Service", "TimeoutStopSec", "120");

    unit.entry("Install", "WantedBy", "multi-user.target");

    unit.render()
}

fn show_unit_diff(old: &str, new: &str) {
    let diff = similar::TextDiff::from_lines(old, new);
    for change in diff.iter_all_changes() {
        match change.tag() {
            similar::ChangeTag::Delete => print!("    {}", format!("- {change}").red()),
            similar::ChangeTag::Insert => print!("    {}", format!("+ {change}").green()),
            similar::ChangeTag::Equal => {}
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StackCatalog;
    use crate::system::mock::MockSystem;
    use std::fs;
    use tempfile::TempDir;

    fn media() -> StackSpec {
        StackCatalog::builtin().find("media").unwrap().clone()
    }

    fn test_store(dir: &TempDir) -> SetupStore {
        SetupStore::open(dir.path()).unwrap()
    }

    fn seed_stack_dir(base: &Path, stack: &str) {
        fs::create_dir_all(base.join(stack)).unwrap();
        fs::write(base.join(stack).join("compose.yaml"), "services: {}\n").unwrap();
    }

    fn seeded(runtime: &str) -> (TempDir, SetupStore) {
        let dir = TempDir::new().unwrap();
        let mut store = test_store(&dir);
        let base = dir.path().join("containers");
        seed_stack_dir(&base, "media");
        store.set(store::KEY_RUNTIME, runtime).unwrap();
        store
            .set(store::KEY_CONTAINERS_BASE, &base.to_string_lossy())
            .unwrap();
        store.set(store::KEY_SERVICE_USER, "homestead").unwrap();
        (dir, store)
    }

    #[test]
    fn service_info_is_deterministic() {
        let base = Path::new("/srv/containers");
        let a = resolve_service_info(&media(), RuntimeKind::Podman, base);
        let b = resolve_service_info(&media(), RuntimeKind::Podman, base);
        assert_eq!(a, b);
        assert_eq!(a.unit_name, "podman-media.service");
        assert_eq!(a.workdir, PathBuf::from("/srv/containers/media"));
    }

    #[test]
    fn unit_name_prefix_follows_runtime() {
        let base = Path::new("/srv/containers");
        let podman = resolve_service_info(&media(), RuntimeKind::Podman, base);
        let docker = resolve_service_info(&media(), RuntimeKind::Docker, base);
        assert_eq!(podman.unit_name, "podman-media.service");
        assert_eq!(docker.unit_name, "docker-media.service");
    }

    #[test]
    fn docker_unit_depends_on_daemon_and_mount() {
        let info = resolve_service_info(&media(), RuntimeKind::Docker, Path::new("/srv/containers"));
        let compose = ComposeCommand::plugin(RuntimeKind::Docker);
        let body = build_unit_body(&info, RuntimeKind::Docker, &compose, None, Some("/mnt/nas-media"));

        assert!(body.contains("After=docker.service"));
        assert!(body.contains("Requires=docker.service"));
        assert!(body.contains("After=mnt-nas\\x2dmedia.mount"));
        assert!(body.contains("Requires=mnt-nas\\x2dmedia.mount"));
        assert!(body.contains("ExecStart=docker compose up"));
        assert!(!body.contains("User="));
    }

    #[test]
    fn mount_clause_is_omitted_when_unconfigured() {
        let info = resolve_service_info(&media(), RuntimeKind::Docker, Path::new("/srv/containers"));
        let compose = ComposeCommand::plugin(RuntimeKind::Docker);
        let body = build_unit_body(&info, RuntimeKind::Docker, &compose, None, None);
        assert!(!body.contains(".mount"));
    }

    #[test]
    fn podman_unit_carries_execution_identity() {
        let info = resolve_service_info(&media(), RuntimeKind::Podman, Path::new("/srv/containers"));
        let compose = ComposeCommand::plugin(RuntimeKind::Podman);
        let user = UserRecord {
            name: "homestead".to_string(),
            uid: 990,
            gid: 990,
            home: PathBuf::from("/home/homestead"),
        };
        let body = build_unit_body(&info, RuntimeKind::Podman, &compose, Some(&user), None);

        assert!(body.contains("User=homestead"));
        assert!(body.contains("Group=homestead"));
        assert!(body.contains("Environment=XDG_RUNTIME_DIR=/run/user/990"));
        assert!(!body.contains("docker.service"));
        assert!(body.contains("TimeoutStartSec=900"));
    }

    #[test]
    fn fresh_deploy_installs_enables_and_starts() {
        let (_dir, mut store) = seeded("podman");
        let mock = MockSystem::new();
        mock.state().users.insert(
            "homestead".to_string(),
            UserRecord {
                name: "homestead".to_string(),
                uid: 990,
                gid: 990,
                home: PathBuf::from("/home/homestead"),
            },
        );
        mock.state().running.push("media-jellyfin".to_string());
        let ports = mock.ports();

        let outcome = Synthesizer::new(&mut store, &ports)
            .deploy_stack(&media())
            .unwrap();

        assert_eq!(outcome.action, UnitAction::Installed);
        assert_eq!(outcome.unit_name, "podman-media.service");
        assert!(outcome.verified);
        assert_eq!(store.get(store::KEY_COMPOSE_CMD), Some("podman compose"));

        let calls = mock.calls();
        assert!(calls.contains(&"systemd.install_unit podman-media.service".to_string()));
        assert!(calls.contains(&"accounts.enable_lingering homestead".to_string()));
        assert!(calls.contains(&"systemd.enable podman-media.service".to_string()));
        assert!(calls.contains(&"systemd.start podman-media.service".to_string()));

        let body = mock.state().units["podman-media.service"].clone();
        assert!(sysunits::marker::is_generated(&body));
    }

    #[test]
    fn unchanged_unit_is_not_rewritten() {
        let (_dir, mut store) = seeded("podman");
        let mock = MockSystem::new();
        mock.state().users.insert(
            "homestead".to_string(),
            UserRecord {
                name: "homestead".to_string(),
                uid: 990,
                gid: 990,
                home: PathBuf::from("/home/homestead"),
            },
        );
        let ports = mock.ports();

        Synthesizer::new(&mut store, &ports).deploy_stack(&media()).unwrap();
        mock.clear_calls();

        let outcome = Synthesizer::new(&mut store, &ports).deploy_stack(&media()).unwrap();
        assert_eq!(outcome.action, UnitAction::Unchanged);
        let calls = mock.calls();
        assert!(!calls.iter().any(|c| c.starts_with("systemd.install_unit")));
        assert!(!calls.iter().any(|c| c == "systemd.daemon_reload"));
    }

    #[test]
    fn image_provided_unit_is_preserved() {
        let (_dir, mut store) = seeded("podman");
        let mock = MockSystem::new();
        mock.state().users.insert(
            "homestead".to_string(),
            UserRecord {
                name: "homestead".to_string(),
                uid: 990,
                gid: 990,
                home: PathBuf::from("/home/homestead"),
            },
        );
        mock.state().units.insert(
            "podman-media.service".to_string(),
            "[Unit]\nDescription=Image-provided media unit\n".to_string(),
        );
        let ports = mock.ports();

        let outcome = Synthesizer::new(&mut store, &ports).deploy_stack(&media()).unwrap();
        assert_eq!(outcome.action, UnitAction::PreservedImageUnit);

        let body = mock.state().units["podman-media.service"].clone();
        assert!(body.contains("Image-provided"));
        assert!(mock.calls().contains(&"systemd.start podman-media.service".to_string()));
    }

    #[test]
    fn runtime_switch_replaces_prefix_and_removes_stale_unit() {
        let (_dir, mut store) = seeded("podman");
        let mock = MockSystem::new();
        mock.state().users.insert(
            "homestead".to_string(),
            UserRecord {
                name: "homestead".to_string(),
                uid: 990,
                gid: 990,
                home: PathBuf::from("/home/homestead"),
            },
        );
        let ports = mock.ports();

        Synthesizer::new(&mut store, &ports).deploy_stack(&media()).unwrap();
        assert!(mock.state().units.contains_key("podman-media.service"));

        // Operator switches the runtime; the cached compose command no
        // longer applies either.
        store.set(store::KEY_RUNTIME, "docker").unwrap();
        store.set(store::KEY_COMPOSE_CMD, "docker compose").unwrap();
        mock.clear_calls();

        let outcome = Synthesizer::new(&mut store, &ports).deploy_stack(&media()).unwrap();
        assert_eq!(outcome.action, UnitAction::Installed);
        assert_eq!(outcome.unit_name, "docker-media.service");

        let state_units: Vec<String> = {
            let state = mock.state();
            state.units.keys().cloned().collect()
        };
        assert!(state_units.contains(&"docker-media.service".to_string()));
        assert!(!state_units.contains(&"podman-media.service".to_string()));

        let calls = mock.calls();
        assert!(calls.contains(&"systemd.stop podman-media.service".to_string()));
        assert!(calls.contains(&"systemd.disable podman-media.service".to_string()));
        assert!(calls.contains(&"systemd.remove_unit podman-media.service".to_string()));
    }

    #[test]
    fn missing_compose_is_a_hard_failure_with_no_unit_written() {
        let (_dir, mut store) = seeded("docker");
        let mock = MockSystem::new();
        mock.state().compose.insert(RuntimeKind::Docker, None);
        let ports = mock.ports();

        let err = Synthesizer::new(&mut store, &ports)
            .deploy_stack(&media())
            .unwrap_err();
        assert!(err.to_string().contains("compose"));
        assert!(mock.state().units.is_empty());
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn missing_compose_file_fails_that_stack() {
        let (_dir, mut store) = seeded("docker");
        // Remove the compose file seeded by the helper.
        let base = containers_base(&store);
        fs::remove_file(base.join("media/compose.yaml")).unwrap();
        let mock = MockSystem::new();
        let ports = mock.ports();

        let err = Synthesizer::new(&mut store, &ports)
            .deploy_stack(&media())
            .unwrap_err();
        assert!(err.to_string().contains("no compose file"));
        assert!(mock.state().units.is_empty());
    }
}
