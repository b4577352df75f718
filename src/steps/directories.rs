//! Directory layout: the containers base and its shared subdirectories.

use anyhow::{Context, Result};
use std::fs;
use std::os::unix::fs::PermissionsExt;

use crate::store;
use crate::units;

use super::{StepCtx, StepOutcome};

pub fn run(ctx: &mut StepCtx) -> Result<StepOutcome> {
    let base = units::containers_base(ctx.store);

    fs::create_dir_all(&base)
        .with_context(|| format!("Failed to create {}", base.display()))?;

    // Per-stack secrets land here; keep it admin-only.
    let secrets = base.join("secrets");
    fs::create_dir_all(&secrets)
        .with_context(|| format!("Failed to create {}", secrets.display()))?;
    fs::set_permissions(&secrets, fs::Permissions::from_mode(0o700))
        .with_context(|| format!("Failed to restrict {}", secrets.display()))?;

    ctx.store
        .set(store::KEY_CONTAINERS_BASE, &base.to_string_lossy())?;
    log::info!("Containers base ready at {}", base.display());

    Ok(StepOutcome::Completed)
}
