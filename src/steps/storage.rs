//! Network storage: make the configured NAS export available at its
//! mountpoint.
//!
//! With nothing configured the step completes immediately: there is
//! nothing to reconcile, and generated units simply carry no mount
//! dependency. When the image provides a systemd mount unit for the
//! mountpoint it is preferred over a direct `mount` call so boot ordering
//! stays under systemd's control either way.

use anyhow::{Context, Result, bail};
use std::fs;

use sysunits::escape;

use crate::paths;
use crate::store;
use crate::ui;

use super::{StepCtx, StepOutcome};

pub fn run(ctx: &mut StepCtx) -> Result<StepOutcome> {
    let Some(source) = ctx.store.get(store::KEY_NAS_SOURCE).map(str::to_string) else {
        ui::info("No network storage configured; nothing to mount");
        return Ok(StepOutcome::Completed);
    };

    let mountpoint_raw = ctx
        .store
        .get(store::KEY_NAS_MOUNTPOINT)
        .context("NAS_SOURCE is set but NAS_MOUNTPOINT is not")?
        .to_string();
    let mountpoint = paths::expand(&mountpoint_raw);

    fs::create_dir_all(&mountpoint)
        .with_context(|| format!("Failed to create mountpoint {}", mountpoint.display()))?;

    if ctx.ports.mounts.is_mounted(&mountpoint)? {
        ui::info(&format!("{} is already mounted", mountpoint.display()));
        return Ok(StepOutcome::Completed);
    }

    let mount_unit = escape::mount_unit_name(&mountpoint_raw);
    if ctx.ports.systemd.query_unit(&mount_unit)?.is_some() {
        log::info!("Using mount unit {mount_unit}");
        ctx.ports.systemd.enable(&mount_unit)?;
        ctx.ports.systemd.start(&mount_unit)?;
    } else {
        log::info!("No {mount_unit} on this host; mounting directly");
        ctx.ports.mounts.mount(&source, &mountpoint)?;
    }

    if !ctx.ports.mounts.is_mounted(&mountpoint)? {
        bail!(
            "{source} did not come up at {} — check the export and network",
            mountpoint.display()
        );
    }

    ui::success(&format!("{source} mounted at {}", mountpoint.display()));
    Ok(StepOutcome::Completed)
}
