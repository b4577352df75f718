//! systemd adapter, shelling out to `systemctl`.

use anyhow::{Context, Result, bail};
use std::fs;
use std::path::{Path, PathBuf};

use super::exec::{run_capture, run_status};
use super::{ExistingUnit, ServiceManager};

/// Where generated units are written. Admin-local, survives image updates
/// on immutable-root systems because `/etc` is the writable overlay.
pub const LOCAL_UNIT_DIR: &str = "/etc/systemd/system";

/// Unit search paths, in the order systemd consults them.
pub const UNIT_SEARCH_PATHS: &[&str] = &[
    "/etc/systemd/system",
    "/run/systemd/system",
    "/usr/local/lib/systemd/system",
    "/usr/lib/systemd/system",
    "/lib/systemd/system",
];

/// Live [`ServiceManager`] backed by `systemctl`.
pub struct Systemctl;

impl Systemctl {
    fn systemctl(&self, args: &[&str]) -> Result<()> {
        run_capture("systemctl", args)
            .map(|_| ())
            .with_context(|| format!("systemctl {} failed", args.join(" ")))
    }
}

impl ServiceManager for Systemctl {
    fn query_unit(&self, name: &str) -> Result<Option<ExistingUnit>> {
        for dir in UNIT_SEARCH_PATHS {
            let path = Path::new(dir).join(name);
            if path.is_file() {
                let body = fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read unit {}", path.display()))?;
                return Ok(Some(ExistingUnit { path, body }));
            }
        }
        Ok(None)
    }

    fn install_unit(&self, name: &str, body: &str) -> Result<PathBuf> {
        let path = Path::new(LOCAL_UNIT_DIR).join(name);
        fs::write(&path, body)
            .with_context(|| format!("Failed to write unit {}", path.display()))?;
        log::info!("Wrote unit {}", path.display());
        Ok(path)
    }

    fn remove_unit(&self, name: &str) -> Result<bool> {
        let path = Path::new(LOCAL_UNIT_DIR).join(name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to remove unit {}", path.display()))
            }
        }
    }

    fn daemon_reload(&self) -> Result<()> {
        self.systemctl(&["daemon-reload"])
    }

    fn enable(&self, unit: &str) -> Result<()> {
        self.systemctl(&["enable", unit])
    }

    fn disable(&self, unit: &str) -> Result<()> {
        self.systemctl(&["disable", unit])
    }

    fn start(&self, unit: &str) -> Result<()> {
        self.systemctl(&["start", unit])
    }

    fn stop(&self, unit: &str) -> Result<()> {
        self.systemctl(&["stop", unit])
    }

    fn is_active(&self, unit: &str) -> Result<bool> {
        // Exit 0 = active; 3 = inactive/activating (defined negative);
        // anything else is a real failure.
        let status = run_status("systemctl", &["is-active", "--quiet", unit])
            .with_context(|| format!("systemctl is-active {unit} failed to run"))?;
        match status.code() {
            Some(0) => Ok(true),
            Some(3) => Ok(false),
            code => bail!("systemctl is-active {unit} exited with {code:?}"),
        }
    }

    fn is_enabled(&self, unit: &str) -> Result<bool> {
        // `is-enabled` exits 1 for disabled while still printing the state,
        // so only a run with empty output counts as a real failure.
        match run_capture("systemctl", &["is-enabled", unit]) {
            Ok(_) => Ok(true),
            Err(e) => match e.exit_code() {
                Some(1) => Ok(false),
                _ => Err(e).with_context(|| format!("systemctl is-enabled {unit} failed")),
            },
        }
    }
}
