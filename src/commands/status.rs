//! `homestead status`: read-only dashboard over the store.

use anyhow::Result;
use colored::Colorize;

use crate::config::{self, StackCatalog};
use crate::paths;
use crate::steps;
use crate::store::{self, SetupStore};
use crate::system::SystemPorts;
use crate::ui;
use crate::units;
use crate::Context as AppContext;

pub fn run(_ctx: &AppContext) -> Result<()> {
    let store = SetupStore::open_default()?;

    ui::header("Provisioning Status");

    ui::section("Steps");
    for (i, step) in steps::CATALOG.iter().enumerate() {
        let done = store.is_complete(step.marker)
            || step.legacy_markers.iter().any(|m| store.is_complete(m));
        let symbol = if done { "✓".green() } else { "○".dimmed() };
        println!("  {} {}. {:<12} {}", symbol, i + 1, step.id.name(), step.title.dimmed());
    }

    ui::section("Configuration");
    ui::kv("config file", &store.config_path().display().to_string());
    ui::kv("runtime", &store.get_or(store::KEY_RUNTIME, "(not detected)"));
    ui::kv("compose", &store.get_or(store::KEY_COMPOSE_CMD, "(not detected)"));
    ui::kv("stacks", &store.get_or(store::KEY_SELECTED_STACKS, "(none selected)"));
    ui::kv(
        "containers base",
        &units::containers_base(&store).display().to_string(),
    );
    if let Some(mountpoint) = store.get(store::KEY_NAS_MOUNTPOINT) {
        ui::kv("network storage", mountpoint);
    }
    if let Some(endpoint) = store.get(store::KEY_VPN_ENDPOINT) {
        ui::kv("vpn endpoint", endpoint);
    }

    // Unit state for deployed stacks, when a runtime has been pinned.
    if let (Ok(runtime), Some(raw)) = (
        units::configured_runtime(&store),
        store.get(store::KEY_SELECTED_STACKS),
    ) {
        let catalog = StackCatalog::load(&paths::config_dir()?)?;
        let ports = SystemPorts::live();
        let base = units::containers_base(&store);

        ui::section("Stack services");
        for name in raw.split(',').filter(|s| !s.is_empty()) {
            let Some(spec) = catalog.find(name) else {
                println!("  {} {name} (not in catalog)", "⚠".yellow());
                continue;
            };
            let info = units::resolve_service_info(spec, runtime, &base);
            let enabled = ports.systemd.is_enabled(&info.unit_name).unwrap_or(false);
            let active = ports.systemd.is_active(&info.unit_name).unwrap_or(false);
            let state = match (enabled, active) {
                (_, true) => "active".green(),
                (true, false) => "enabled, not running".yellow(),
                (false, false) => "not enabled".dimmed(),
            };
            println!("  {:<28} {}", info.unit_name, state);
        }
    }

    // Markers outside the catalog (sub-actions, legacy leftovers).
    let known: Vec<&str> = steps::CATALOG.iter().map(|s| s.marker).collect();
    let extra: Vec<String> = store
        .markers()?
        .into_iter()
        .filter(|m| !known.contains(&m.as_str()))
        .collect();
    if !extra.is_empty() {
        ui::section("Other markers");
        for marker in extra {
            println!("  {}", marker);
        }
    }

    let base = units::containers_base(&store);
    if base.is_dir() {
        let present = config::discover_stack_dirs(&base);
        if !present.is_empty() {
            let catalog = StackCatalog::load(&paths::config_dir()?)?;
            ui::section("Stack directories with compose files");
            for name in present {
                let note = if catalog.find(&name).is_some() {
                    ""
                } else {
                    " (not in catalog)"
                };
                println!("  {}{}", name, note.dimmed());
            }
        }
    }

    Ok(())
}
