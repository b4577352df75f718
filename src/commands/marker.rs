//! `homestead marker`: completion marker management.
//!
//! Clearing a marker is the one supported way to force a completed step to
//! run again.

use anyhow::Result;
use colored::Colorize;

use crate::cli::MarkerCommand;
use crate::steps;
use crate::store::SetupStore;
use crate::ui;
use crate::Context as AppContext;

pub fn run(_ctx: &AppContext, cmd: MarkerCommand) -> Result<()> {
    let store = SetupStore::open_default()?;

    match cmd {
        MarkerCommand::List => {
            let markers = store.markers()?;
            if markers.is_empty() {
                ui::dim("no markers recorded — nothing has completed yet");
                return Ok(());
            }
            for name in markers {
                let owner = steps::CATALOG.iter().find(|s| s.marker == name);
                match owner {
                    Some(step) => println!("  {name} {}", format!("({})", step.title).dimmed()),
                    None => println!("  {name}"),
                }
            }
            Ok(())
        }
        MarkerCommand::Clear { name } => {
            if store.remove_marker(&name)? {
                ui::success(&format!("Cleared {name} — the owning step will run again"));
            } else {
                ui::warn(&format!("No marker named {name}"));
            }
            Ok(())
        }
    }
}
