//! `homestead stacks`: catalog listing and stack selection.

use anyhow::{Result, bail};
use colored::Colorize;
use std::io::IsTerminal;

use crate::cli::StacksCommand;
use crate::config::{self, StackCatalog};
use crate::paths;
use crate::steps;
use crate::store::{self, SetupStore};
use crate::ui;
use crate::units;
use crate::Context as AppContext;

pub fn run(_ctx: &AppContext, cmd: StacksCommand) -> Result<()> {
    match cmd {
        StacksCommand::List => list(),
        StacksCommand::Select { stacks } => select(stacks),
    }
}

fn list() -> Result<()> {
    let store = SetupStore::open_default()?;
    let catalog = StackCatalog::load(&paths::config_dir()?)?;
    let selected = store.get_or(store::KEY_SELECTED_STACKS, "");
    let selected: Vec<&str> = selected.split(',').filter(|s| !s.is_empty()).collect();

    ui::header("Stack Catalog");
    for stack in &catalog.stacks {
        let mark = if selected.contains(&stack.name.as_str()) {
            "✓".green()
        } else {
            "○".dimmed()
        };
        println!(
            "  {mark} {:<12} {} — {}",
            stack.name.bold(),
            stack.title,
            stack.description.dimmed()
        );
    }

    let base = units::containers_base(&store);
    if base.is_dir() {
        let discovered = config::discover_stack_dirs(&base);
        if !discovered.is_empty() {
            ui::section("Compose files present");
            for name in discovered {
                println!("  {}", base.join(&name).display());
            }
        }
    }

    Ok(())
}

/// Replace the persisted selection with a fresh one.
fn select(stacks: Option<String>) -> Result<()> {
    let mut store = SetupStore::open_default()?;
    let catalog = StackCatalog::load(&paths::config_dir()?)?;

    let names = match stacks {
        Some(list) => steps::stacks::parse_selection(&list, &catalog)?,
        None => {
            if !std::io::stdin().is_terminal() {
                bail!("Not a terminal — pass --stacks <names> instead");
            }
            steps::stacks::choose_interactive(&catalog)?
        }
    };
    if names.is_empty() {
        bail!("No stacks selected");
    }

    store.set(store::KEY_SELECTED_STACKS, &names.join(","))?;
    steps::stacks::prepare_workdirs(&store, &names)?;
    ui::success(&format!("Selection: {}", names.join(", ")));
    ui::dim("run `homestead marker clear stacks-deployed` to redeploy an installed host");
    Ok(())
}
