//! Preflight checks: privileges, required host tools, container runtime.
//!
//! Also the step that pins the runtime choice: whichever engine is found
//! first (podman preferred) is recorded in the store so every later step
//! and every generated unit agrees on it.

use anyhow::{Result, bail};

use crate::store;
use crate::system::RuntimeKind;
use crate::ui;

use super::{StepCtx, StepOutcome};

/// Host tools the pipeline shells out to unconditionally.
const REQUIRED_COMMANDS: &[&str] = &["systemctl", "findmnt", "getent", "loginctl", "useradd"];

pub fn run(ctx: &mut StepCtx) -> Result<StepOutcome> {
    if !ctx.ports.host.is_root() {
        bail!("homestead must run as root — re-run with sudo");
    }

    let missing: Vec<&str> = REQUIRED_COMMANDS
        .iter()
        .copied()
        .filter(|cmd| !ctx.ports.host.command_exists(cmd))
        .collect();
    if !missing.is_empty() {
        bail!("Required commands missing from this host: {}", missing.join(", "));
    }

    let runtime = match ctx.store.get(store::KEY_RUNTIME) {
        Some(configured) => {
            let kind: RuntimeKind = configured.parse()?;
            if !ctx.ports.engine.available(kind) {
                bail!("Configured runtime {kind} is not installed on this host");
            }
            kind
        }
        None => {
            let detected = RuntimeKind::ALL
                .iter()
                .copied()
                .find(|k| ctx.ports.engine.available(*k));
            match detected {
                Some(kind) => {
                    ctx.store.set(store::KEY_RUNTIME, kind.prefix())?;
                    ui::info(&format!("Detected container runtime: {kind}"));
                    kind
                }
                None => bail!("No container runtime found — install podman or docker"),
            }
        }
    };

    // A daemon-based runtime is only usable when its daemon answers.
    if runtime.daemon_unit().is_some() && !ctx.ports.engine.responsive(runtime) {
        ui::warn(&format!("{runtime} is installed but not answering — is the daemon running?"));
    }
    log::debug!("Preflight passed with runtime {runtime}");

    Ok(StepOutcome::Completed)
}
