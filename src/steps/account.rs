//! Service account provisioning.
//!
//! Pre-baked images often ship the account already; in that case the step
//! reconciles (records the existing uid/gid) instead of creating anything.

use anyhow::Result;

use crate::store;
use crate::ui;

use super::{StepCtx, StepOutcome};

/// Default name of the account stacks run under.
const DEFAULT_SERVICE_USER: &str = "homestead";

pub fn run(ctx: &mut StepCtx) -> Result<StepOutcome> {
    let name = ctx.store.get_or(store::KEY_SERVICE_USER, DEFAULT_SERVICE_USER);

    let user = match ctx.ports.accounts.lookup_user(&name)? {
        Some(existing) => {
            ui::info(&format!("Account {name} already exists (uid {})", existing.uid));
            existing
        }
        None => {
            let created = ctx.ports.accounts.create_service_user(&name)?;
            ui::success(&format!("Created account {name} (uid {})", created.uid));
            created
        }
    };

    ctx.store.set(store::KEY_SERVICE_USER, &user.name)?;
    ctx.store.set(store::KEY_SERVICE_UID, &user.uid.to_string())?;
    ctx.store.set(store::KEY_SERVICE_GID, &user.gid.to_string())?;

    Ok(StepOutcome::Completed)
}
