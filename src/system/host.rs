//! Host/process environment adapter: privilege check, command presence,
//! WAN address probe.

use anyhow::{Context, Result};

use super::exec::command_exists;
use super::HostInspector;

/// Services answering with the caller's public address in plain text.
const WAN_PROBES: &[&str] = &["https://api.ipify.org", "https://ifconfig.me/ip"];

/// Live [`HostInspector`].
pub struct Host;

impl HostInspector for Host {
    fn is_root(&self) -> bool {
        // SAFETY: geteuid has no failure modes and touches no memory.
        unsafe { libc::geteuid() == 0 }
    }

    fn command_exists(&self, name: &str) -> bool {
        command_exists(name)
    }

    fn wan_address(&self) -> Result<String> {
        let agent = ureq::Agent::new_with_defaults();
        let mut last_err = None;

        for probe in WAN_PROBES {
            match agent.get(*probe).call() {
                Ok(mut response) => {
                    let body = response
                        .body_mut()
                        .read_to_string()
                        .with_context(|| format!("Failed to read response from {probe}"))?;
                    let addr = body.trim().to_string();
                    if !addr.is_empty() {
                        log::debug!("WAN address {addr} (via {probe})");
                        return Ok(addr);
                    }
                }
                Err(e) => {
                    log::debug!("WAN probe {probe} failed: {e}");
                    last_err = Some(e);
                }
            }
        }

        Err(anyhow::anyhow!(
            "Could not determine WAN address: {}",
            last_err.map_or_else(|| "all probes returned empty".to_string(), |e| e.to_string())
        ))
    }
}
