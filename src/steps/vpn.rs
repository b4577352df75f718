//! VPN tunnel: bring up an operator-provided WireGuard configuration.
//!
//! Key and template generation is outside this tool; the step only
//! activates a config that is already in place and records the endpoint
//! facts peers will need. With no tools or no config present it skips
//! without a marker, so dropping a config in later makes the next run
//! pick it up.

use anyhow::Result;

use crate::paths;
use crate::store;
use crate::ui;

use super::{StepCtx, StepOutcome};

/// Config key overriding the WireGuard config path (used by tests and
/// non-standard layouts).
pub const KEY_VPN_CONFIG: &str = "VPN_CONFIG";

const DEFAULT_WG_CONFIG: &str = "/etc/wireguard/wg0.conf";

/// WireGuard's default listen port.
const WG_PORT: u16 = 51820;

pub fn run(ctx: &mut StepCtx) -> Result<StepOutcome> {
    if !ctx.ports.host.command_exists("wg-quick") {
        return Ok(StepOutcome::Skipped(
            "wireguard-tools is not installed".to_string(),
        ));
    }

    let config_path = paths::expand(&ctx.store.get_or(KEY_VPN_CONFIG, DEFAULT_WG_CONFIG));
    if !config_path.is_file() {
        return Ok(StepOutcome::Skipped(format!(
            "no WireGuard config at {} — generate one and re-run",
            config_path.display()
        )));
    }

    let interface = config_path
        .file_stem()
        .map_or_else(|| "wg0".to_string(), |s| s.to_string_lossy().to_string());

    // Peers need to know where to connect; detect the public address once
    // and keep it. Failing to detect is not fatal; the tunnel still works
    // for peers configured by other means.
    if ctx.store.get(store::KEY_VPN_ENDPOINT).is_none() {
        match ctx.ports.host.wan_address() {
            Ok(addr) => {
                ctx.store.set(store::KEY_WAN_IP, &addr)?;
                ctx.store
                    .set(store::KEY_VPN_ENDPOINT, &format!("{addr}:{WG_PORT}"))?;
                ui::info(&format!("VPN endpoint: {addr}:{WG_PORT}"));
            }
            Err(e) => ui::warn(&format!("Could not determine WAN address: {e}")),
        }
    }

    let unit = format!("wg-quick@{interface}.service");
    ctx.ports.systemd.enable(&unit)?;
    ctx.ports.systemd.start(&unit)?;

    if !ctx.ports.systemd.is_active(&unit)? {
        ui::warn(&format!("{unit} did not report active yet"));
    }

    Ok(StepOutcome::Completed)
}
