//! Stack deployment: synthesize, install and start one unit per selected
//! stack.
//!
//! A stack that fails to deploy does not stop the others; the step itself
//! fails at the end if anything failed, so the marker is only recorded
//! once every selected stack is up.

use anyhow::{Context, Result, bail};

use crate::store;
use crate::ui;
use crate::units::Synthesizer;

use super::{stacks, StepCtx, StepOutcome};

pub fn run(ctx: &mut StepCtx) -> Result<StepOutcome> {
    let raw = ctx
        .store
        .get(store::KEY_SELECTED_STACKS)
        .context("No stack selection recorded — run the stack configuration step first")?
        .to_string();
    let selected = stacks::parse_selection(&raw, ctx.catalog)?;
    if selected.is_empty() {
        bail!("Stack selection is empty — nothing to deploy");
    }

    let pb = crate::progress::bar(selected.len() as u64, "Deploying stacks");
    let mut failures: Vec<(String, String)> = Vec::new();

    for name in &selected {
        pb.set_message(name.clone());
        let spec = ctx
            .catalog
            .find(name)
            .with_context(|| format!("Stack {name} vanished from the catalog"))?
            .clone();

        let mut synthesizer = Synthesizer::new(&mut *ctx.store, ctx.ports);
        match synthesizer.deploy_stack(&spec) {
            Ok(outcome) => {
                log::info!("{name}: {} ({:?})", outcome.unit_name, outcome.action);
            }
            Err(e) => {
                ui::error(&format!("{name} failed to deploy: {e:#}"));
                failures.push((name.clone(), format!("{e:#}")));
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    if !failures.is_empty() {
        bail!(
            "{} of {} stack(s) failed to deploy: {}",
            failures.len(),
            selected.len(),
            failures
                .iter()
                .map(|(n, _)| n.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    ui::success(&format!("{} stack(s) deployed", selected.len()));
    Ok(StepOutcome::Completed)
}
