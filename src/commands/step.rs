//! `homestead step`: run one pipeline step.

use anyhow::{Result, bail};
use std::io::IsTerminal;

use crate::cli::StepArgs;
use crate::config::StackCatalog;
use crate::paths;
use crate::steps::{self, AbortPolicy, RunOptions, StepCtx};
use crate::store::SetupStore;
use crate::system::SystemPorts;
use crate::ui;
use crate::Context as AppContext;

pub fn run(_ctx: &AppContext, args: StepArgs) -> Result<()> {
    let step = steps::find_step(&args.step)?;

    let mut store = SetupStore::open_default()?;
    let catalog = StackCatalog::load(&paths::config_dir()?)?;
    let ports = SystemPorts::live();

    if args.force && store.remove_marker(step.marker)? {
        ui::info(&format!("Cleared marker {} — step will re-execute", step.marker));
    }

    let opts = RunOptions {
        assume_yes: args.yes,
        interactive: std::io::stdin().is_terminal(),
        stacks: args
            .stacks
            .as_deref()
            .map(|s| s.split(',').map(|t| t.trim().to_string()).collect()),
    };

    let mut step_ctx = StepCtx {
        store: &mut store,
        ports: &ports,
        catalog: &catalog,
        opts: &opts,
    };
    let summary = steps::run_pipeline(&mut step_ctx, &[step], &AbortPolicy)?;

    if !summary.is_success() {
        bail!("Step {} failed", step.id.name());
    }
    Ok(())
}
