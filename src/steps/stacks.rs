//! Stack configuration: pick which application stacks this host runs and
//! prepare their working directories.
//!
//! The selection is a configuration entry, so an unattended re-run
//! reproduces it without asking again. Priority: an already-persisted
//! selection, then `--stacks` from the command line, then an interactive
//! multi-select.

use anyhow::{Context, Result, bail};
use std::fs;
use std::io::IsTerminal;

use crate::config::{self, StackCatalog};
use crate::store::{self, SetupStore};
use crate::ui;
use crate::units;

use super::{StepCtx, StepOutcome};

pub fn run(ctx: &mut StepCtx) -> Result<StepOutcome> {
    let catalog = ctx.catalog;

    let selected = match persisted_selection(ctx.store, catalog)? {
        Some(names) => {
            ui::info(&format!("Using persisted stack selection: {}", names.join(", ")));
            names
        }
        None => {
            let names = choose_stacks(ctx, catalog)?;
            ctx.store.set(store::KEY_SELECTED_STACKS, &names.join(","))?;
            names
        }
    };

    if selected.is_empty() {
        bail!("No stacks selected — nothing to deploy");
    }

    prepare_workdirs(ctx.store, &selected)?;

    Ok(StepOutcome::Completed)
}

/// Working directories exist from selection time on, so operators (or the
/// image) can drop compose files into them before deployment.
pub fn prepare_workdirs(store: &SetupStore, selected: &[String]) -> Result<()> {
    let base = units::containers_base(store);
    for name in selected {
        let workdir = base.join(name);
        fs::create_dir_all(&workdir)
            .with_context(|| format!("Failed to create {}", workdir.display()))?;
        if config::compose_file(&workdir).is_none() {
            ui::warn(&format!(
                "{} has no compose file yet ({})",
                name,
                workdir.display()
            ));
        }
    }
    Ok(())
}

/// Validate and return the persisted selection, if any.
fn persisted_selection(store: &SetupStore, catalog: &StackCatalog) -> Result<Option<Vec<String>>> {
    let Some(raw) = store.get(store::KEY_SELECTED_STACKS) else {
        return Ok(None);
    };
    Ok(Some(parse_selection(raw, catalog)?))
}

/// Parse a comma-separated stack list against the catalog.
pub fn parse_selection(raw: &str, catalog: &StackCatalog) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for token in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        config::validate_stack_name(token)?;
        if catalog.find(token).is_none() {
            bail!(
                "Unknown stack {token:?} (catalog: {})",
                catalog.names().join(", ")
            );
        }
        if !names.contains(&token.to_string()) {
            names.push(token.to_string());
        }
    }
    Ok(names)
}

fn choose_stacks(ctx: &StepCtx, catalog: &StackCatalog) -> Result<Vec<String>> {
    if let Some(cli_stacks) = &ctx.opts.stacks {
        return parse_selection(&cli_stacks.join(","), catalog);
    }

    if !ctx.opts.interactive || !std::io::stdin().is_terminal() {
        bail!(
            "No stack selection available — pass --stacks or run interactively \
             (catalog: {})",
            catalog.names().join(", ")
        );
    }

    choose_interactive(catalog)
}

/// Multi-select over the catalog. Only call when stdin is a terminal.
pub fn choose_interactive(catalog: &StackCatalog) -> Result<Vec<String>> {
    let items: Vec<String> = catalog
        .stacks
        .iter()
        .map(|s| format!("{} — {}", s.title, s.description))
        .collect();

    let picked = dialoguer::MultiSelect::new()
        .with_prompt("Select stacks to deploy (space toggles, enter confirms)")
        .items(&items)
        .interact()
        .context("Stack selection cancelled")?;

    Ok(picked
        .into_iter()
        .map(|i| catalog.stacks[i].name.clone())
        .collect())
}
