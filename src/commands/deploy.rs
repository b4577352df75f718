//! `homestead deploy`: drive the unit synthesizer directly.
//!
//! Useful after editing a compose file or switching runtimes on an
//! already-installed host; unlike the pipeline it does not consult or
//! record step markers.

use anyhow::{Context, Result, bail};

use crate::cli::DeployArgs;
use crate::config::StackCatalog;
use crate::paths;
use crate::steps::stacks::parse_selection;
use crate::store::{self, SetupStore};
use crate::system::SystemPorts;
use crate::ui;
use crate::units::Synthesizer;
use crate::Context as AppContext;

pub fn run(_ctx: &AppContext, args: DeployArgs) -> Result<()> {
    let mut store = SetupStore::open_default()?;
    let catalog = StackCatalog::load(&paths::config_dir()?)?;
    let ports = SystemPorts::live();

    let targets: Vec<String> = match &args.stack {
        Some(name) => {
            catalog
                .find(name)
                .with_context(|| format!("Unknown stack {name:?}"))?;
            vec![name.clone()]
        }
        None => {
            let raw = store
                .get(store::KEY_SELECTED_STACKS)
                .context("No stacks selected — run `homestead stacks select` first")?
                .to_string();
            parse_selection(&raw, &catalog)?
        }
    };

    let mut failures = 0usize;
    for name in &targets {
        let spec = catalog
            .find(name)
            .with_context(|| format!("Stack {name} vanished from the catalog"))?
            .clone();
        let spinner = crate::progress::spinner(&format!("Deploying {name}"));
        let mut synthesizer = Synthesizer::new(&mut store, &ports);
        let result = synthesizer.deploy_stack(&spec);
        spinner.finish_and_clear();
        match result {
            Ok(outcome) => {
                ui::success(&format!("{name}: {} ({:?})", outcome.unit_name, outcome.action));
            }
            Err(e) => {
                ui::error(&format!("{name}: {e:#}"));
                failures += 1;
            }
        }
    }

    if failures > 0 {
        bail!("{failures} of {} stack(s) failed to deploy", targets.len());
    }
    Ok(())
}
