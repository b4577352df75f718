//! The step pipeline.
//!
//! Provisioning is a fixed, ordered catalog of steps. Each step checks its
//! completion marker first (including recognized legacy names), executes
//! idempotently against the ports, and gets its marker recorded on
//! success. What happens after a failure is not the step's business: the
//! pipeline consults a [`FailurePolicy`] and either carries on or aborts,
//! leaving every already-recorded marker in place so the next run resumes
//! where this one stopped.

use anyhow::{Context as AnyhowContext, Result, bail};
use colored::Colorize;

use crate::store::SetupStore;
use crate::system::SystemPorts;
use crate::ui;

pub mod account;
pub mod deploy;
pub mod directories;
pub mod preflight;
pub mod stacks;
pub mod storage;
pub mod vpn;

/// Options threaded through every step.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Skip confirmations, take defaults.
    pub assume_yes: bool,
    /// Whether prompting the operator is possible at all.
    pub interactive: bool,
    /// Stack selection supplied on the command line.
    pub stacks: Option<Vec<String>>,
}

/// Everything a step action gets to work with. The store, the ports and
/// the stack catalog are handed in by reference; steps own no state.
pub struct StepCtx<'a> {
    pub store: &'a mut SetupStore,
    pub ports: &'a SystemPorts,
    pub catalog: &'a crate::config::StackCatalog,
    pub opts: &'a RunOptions,
}

/// How a step's action ended. Failure is an `Err`, not a variant, so the
/// policy layer sees the full error chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// Work done (or verified done); record the marker.
    Completed,
    /// Nothing applicable on this host; no marker, re-evaluated next run.
    Skipped(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepId {
    Preflight,
    Account,
    Directories,
    Vpn,
    Storage,
    Stacks,
    Deploy,
}

impl StepId {
    pub fn name(self) -> &'static str {
        match self {
            Self::Preflight => "preflight",
            Self::Account => "account",
            Self::Directories => "directories",
            Self::Vpn => "vpn",
            Self::Storage => "storage",
            Self::Stacks => "stacks",
            Self::Deploy => "deploy",
        }
    }
}

/// A statically defined pipeline step.
pub struct StepDef {
    pub id: StepId,
    pub title: &'static str,
    /// Canonical completion marker.
    pub marker: &'static str,
    /// Older marker names still honored (and migrated) from earlier
    /// releases and pre-baked images.
    pub legacy_markers: &'static [&'static str],
    /// Markers that must exist before this step may run.
    pub requires: &'static [&'static str],
    pub run: fn(&mut StepCtx) -> Result<StepOutcome>,
}

/// The full catalog, in execution order.
pub const CATALOG: &[StepDef] = &[
    StepDef {
        id: StepId::Preflight,
        title: "Preflight checks",
        marker: "preflight-ok",
        legacy_markers: &["precheck-done"],
        requires: &[],
        run: preflight::run,
    },
    StepDef {
        id: StepId::Account,
        title: "Service account",
        marker: "account-provisioned",
        legacy_markers: &["user-created"],
        requires: &["preflight-ok"],
        run: account::run,
    },
    StepDef {
        id: StepId::Directories,
        title: "Directory layout",
        marker: "directories-created",
        legacy_markers: &[],
        requires: &["account-provisioned"],
        run: directories::run,
    },
    StepDef {
        id: StepId::Vpn,
        title: "VPN tunnel",
        marker: "vpn-configured",
        legacy_markers: &["wireguard-setup"],
        requires: &["preflight-ok"],
        run: vpn::run,
    },
    StepDef {
        id: StepId::Storage,
        title: "Network storage",
        marker: "network-storage-configured",
        legacy_markers: &["nas-mounted"],
        requires: &["directories-created"],
        run: storage::run,
    },
    StepDef {
        id: StepId::Stacks,
        title: "Stack configuration",
        marker: "stacks-selected",
        legacy_markers: &[],
        requires: &["preflight-ok"],
        run: stacks::run,
    },
    StepDef {
        id: StepId::Deploy,
        title: "Stack deployment",
        marker: "stacks-deployed",
        legacy_markers: &[],
        requires: &["directories-created", "stacks-selected"],
        run: deploy::run,
    },
];

/// Look up a step by name or 1-based index.
pub fn find_step(token: &str) -> Result<&'static StepDef> {
    if let Ok(index) = token.parse::<usize>() {
        return CATALOG
            .get(index.wrapping_sub(1))
            .with_context(|| format!("No step #{index} (valid: 1..={})", CATALOG.len()));
    }
    CATALOG
        .iter()
        .find(|s| s.id.name() == token)
        .with_context(|| {
            let names: Vec<&str> = CATALOG.iter().map(|s| s.id.name()).collect();
            format!("Unknown step {token:?} (valid: {})", names.join(", "))
        })
}

/// Resolve a run's step selection in catalog order.
///
/// `only` wins over `skip`; `quick` is the full sequence minus the VPN
/// step. Tokens may be names or 1-based indexes.
pub fn resolve_selection(
    only: Option<&str>,
    skip: Option<&str>,
    quick: bool,
) -> Result<Vec<&'static StepDef>> {
    let parse_tokens = |list: &str| -> Result<Vec<StepId>> {
        list.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| find_step(t).map(|s| s.id))
            .collect()
    };

    if let Some(only) = only {
        let wanted = parse_tokens(only)?;
        return Ok(CATALOG.iter().filter(|s| wanted.contains(&s.id)).collect());
    }

    let mut excluded: Vec<StepId> = Vec::new();
    if quick {
        excluded.push(StepId::Vpn);
    }
    if let Some(skip) = skip {
        excluded.extend(parse_tokens(skip)?);
    }

    Ok(CATALOG.iter().filter(|s| !excluded.contains(&s.id)).collect())
}

// ============================================================================
// Failure policy
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    Continue,
    Abort,
}

/// Pipeline-level decision on what a step failure means for the rest of
/// the run. Individual steps never make this call.
pub trait FailurePolicy {
    fn on_step_failure(&self, step: &StepDef, err: &anyhow::Error) -> FailureAction;
}

/// Ask the operator (the interactive default).
pub struct PromptPolicy;

impl FailurePolicy for PromptPolicy {
    fn on_step_failure(&self, step: &StepDef, _err: &anyhow::Error) -> FailureAction {
        use std::io::IsTerminal;

        if !std::io::stdin().is_terminal() {
            return FailureAction::Abort;
        }

        let proceed = dialoguer::Confirm::new()
            .with_prompt(format!("{} failed — continue with the remaining steps?", step.title))
            .default(false)
            .interact()
            .unwrap_or(false);

        if proceed {
            FailureAction::Continue
        } else {
            FailureAction::Abort
        }
    }
}

/// Stop at the first failure (the non-interactive default).
pub struct AbortPolicy;

impl FailurePolicy for AbortPolicy {
    fn on_step_failure(&self, _step: &StepDef, _err: &anyhow::Error) -> FailureAction {
        FailureAction::Abort
    }
}

/// Keep going past failures; the summary still reports them.
pub struct KeepGoingPolicy;

impl FailurePolicy for KeepGoingPolicy {
    fn on_step_failure(&self, _step: &StepDef, _err: &anyhow::Error) -> FailureAction {
        FailureAction::Continue
    }
}

// ============================================================================
// Pipeline runner
// ============================================================================

#[derive(Debug, Default)]
pub struct PipelineSummary {
    pub completed: Vec<StepId>,
    pub already_complete: Vec<StepId>,
    pub skipped: Vec<(StepId, String)>,
    pub failed: Vec<(StepId, String)>,
    pub aborted: bool,
}

impl PipelineSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && !self.aborted
    }
}

/// Run `steps` in order against the context.
///
/// Completed markers are never rolled back: a failure mid-run leaves the
/// earlier steps recorded, which is exactly what makes a re-run resume.
pub fn run_pipeline(
    ctx: &mut StepCtx,
    steps: &[&StepDef],
    policy: &dyn FailurePolicy,
) -> Result<PipelineSummary> {
    let mut summary = PipelineSummary::default();

    for (i, step) in steps.iter().enumerate() {
        ui::step(i + 1, steps.len(), step.title);

        if ctx.store.ensure_canonical_marker(step.marker, step.legacy_markers)? {
            ui::dim("already complete");
            summary.already_complete.push(step.id);
            continue;
        }

        let result = check_prerequisites(ctx.store, step).and_then(|()| (step.run)(ctx));

        match result {
            Ok(StepOutcome::Completed) => {
                // Persisting the marker is part of the step's success; a
                // store that cannot record completion fails the run.
                ctx.store.mark_complete(step.marker)?;
                ui::success(&format!("{} complete", step.title));
                summary.completed.push(step.id);
            }
            Ok(StepOutcome::Skipped(reason)) => {
                ui::dim(&format!("skipped: {reason}"));
                summary.skipped.push((step.id, reason));
            }
            Err(e) => {
                ui::error(&format!("{} failed: {e:#}", step.title));
                summary.failed.push((step.id, format!("{e:#}")));
                match policy.on_step_failure(step, &e) {
                    FailureAction::Continue => {
                        log::warn!("Continuing past failed step {}", step.id.name());
                    }
                    FailureAction::Abort => {
                        summary.aborted = true;
                        break;
                    }
                }
            }
        }
    }

    Ok(summary)
}

fn check_prerequisites(store: &SetupStore, step: &StepDef) -> Result<()> {
    for marker in step.requires {
        if !store.is_complete(marker) {
            bail!(
                "Prerequisite {marker:?} is not complete — run the earlier steps first"
            );
        }
    }
    Ok(())
}

/// Render a one-line pipeline summary.
pub fn print_summary(summary: &PipelineSummary) {
    println!();
    if summary.is_success() {
        ui::success(&format!(
            "{} step(s) completed, {} already done, {} skipped",
            summary.completed.len(),
            summary.already_complete.len(),
            summary.skipped.len(),
        ));
    } else {
        ui::error(&format!(
            "{} step(s) failed{}",
            summary.failed.len(),
            if summary.aborted { " — run aborted" } else { "" },
        ));
        for (id, reason) in &summary.failed {
            println!("    {} {}: {}", "✗".red(), id.name(), reason);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
