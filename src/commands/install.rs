//! `homestead install`: the full pipeline run.

use anyhow::{Context, Result, bail};
use std::fs::OpenOptions;
use std::io::{IsTerminal, Write};

use crate::cli::{FailureMode, InstallArgs};
use crate::config::StackCatalog;
use crate::paths;
use crate::steps::{
    self, AbortPolicy, FailurePolicy, KeepGoingPolicy, PromptPolicy, RunOptions, StepCtx, StepDef,
};
use crate::store::{self, SetupStore};
use crate::system::SystemPorts;
use crate::ui;
use crate::Context as AppContext;

pub fn run(ctx: &AppContext, args: InstallArgs) -> Result<()> {
    if args.list_steps {
        list_steps();
        return Ok(());
    }

    if !ctx.quiet {
        ui::banner();
    }
    ui::header("Homestead Provisioning");

    let mut store = SetupStore::open_default()?;
    let catalog = StackCatalog::load(&paths::config_dir()?)?;
    let ports = SystemPorts::live();

    if ctx.verbose > 0 {
        ui::dim(&format!("state: {}", store.config_path().display()));
    }

    let selection = resolve_persisted_selection(&mut store, &args)?;
    let names: Vec<&str> = selection.iter().map(|s| s.id.name()).collect();
    ui::dim(&format!("steps: {}", names.join(" → ")));

    log_run(&format!("install start: {}", names.join(",")))?;

    let opts = RunOptions {
        assume_yes: args.yes,
        interactive: std::io::stdin().is_terminal(),
        stacks: args
            .stacks
            .as_deref()
            .map(|s| s.split(',').map(|t| t.trim().to_string()).collect()),
    };
    let policy = make_policy(args.on_failure);

    let mut step_ctx = StepCtx {
        store: &mut store,
        ports: &ports,
        catalog: &catalog,
        opts: &opts,
    };
    let summary = steps::run_pipeline(&mut step_ctx, &selection, policy.as_ref())?;

    steps::print_summary(&summary);
    log_run(&format!(
        "install end: {} completed, {} failed{}",
        summary.completed.len(),
        summary.failed.len(),
        if summary.aborted { ", aborted" } else { "" },
    ))?;

    if !summary.is_success() {
        bail!("{} step(s) failed", summary.failed.len());
    }
    Ok(())
}

/// Step selection is itself configuration: flags win and are persisted,
/// otherwise the previous run's selection is reproduced.
fn resolve_persisted_selection(
    store: &mut SetupStore,
    args: &InstallArgs,
) -> Result<Vec<&'static StepDef>> {
    if args.only.is_some() || args.skip.is_some() || args.quick {
        let selection =
            steps::resolve_selection(args.only.as_deref(), args.skip.as_deref(), args.quick)?;
        let names: Vec<&str> = selection.iter().map(|s| s.id.name()).collect();
        store.set(store::KEY_STEP_SELECTION, &names.join(","))?;
        return Ok(selection);
    }

    if let Some(persisted) = store.get(store::KEY_STEP_SELECTION).map(str::to_string) {
        log::debug!("Reusing persisted step selection: {persisted}");
        return steps::resolve_selection(Some(&persisted), None, false);
    }

    steps::resolve_selection(None, None, false)
}

fn make_policy(mode: FailureMode) -> Box<dyn FailurePolicy> {
    match mode {
        FailureMode::Prompt => Box::new(PromptPolicy),
        FailureMode::Abort => Box::new(AbortPolicy),
        FailureMode::KeepGoing => Box::new(KeepGoingPolicy),
    }
}

fn list_steps() {
    ui::header("Pipeline Steps");
    println!();
    for (i, step) in steps::CATALOG.iter().enumerate() {
        println!("  {}. {:<12} {}", i + 1, step.id.name(), step.title);
    }
    println!();
    ui::dim("homestead install --only storage,deploy  re-runs a subset");
    ui::dim("homestead install --quick                skips the VPN step");
}

/// Append a timestamped line to the run log. Best-effort diagnostics, but
/// an unwritable state dir is still surfaced.
fn log_run(message: &str) -> Result<()> {
    let path = paths::state_dir()?.join("install.log");
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    writeln!(file, "{} {message}", chrono::Utc::now().to_rfc3339())
        .with_context(|| format!("Failed to append to {}", path.display()))?;
    Ok(())
}
