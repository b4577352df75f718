//! Centralized path resolution for homestead
//!
//! Persistent state (config entries and completion markers) lives under the
//! invoking user's state directory; the stack catalog lives under the config
//! directory. Both can be redirected through environment variables, which is
//! how tests isolate themselves and how image builds pre-seed state.
//!
//! # Environment Variables
//!
//! - `HOMESTEAD_CONFIG_DIR` - Override config directory
//! - `HOMESTEAD_STATE_DIR` - Override state directory
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `HOMESTEAD_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/homestead` (if set)
//! 3. `~/.config/homestead`
//!
//! For state_dir():
//! 1. `HOMESTEAD_STATE_DIR` environment variable
//! 2. `XDG_STATE_HOME/homestead` (if set)
//! 3. `~/.local/state/homestead`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "HOMESTEAD_CONFIG_DIR";

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "HOMESTEAD_STATE_DIR";

/// Default base directory for per-stack working directories.
pub const DEFAULT_CONTAINERS_BASE: &str = "/srv/containers";

/// Get the homestead config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!("Using config dir from {}: {}", ENV_CONFIG_DIR, path.display());
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join("homestead");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("homestead"))
}

/// Get the homestead state directory path
pub fn state_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_STATE_DIR) {
        let path = expand(&dir);
        log::debug!("Using state dir from {}: {}", ENV_STATE_DIR, path.display());
        return Ok(path);
    }

    if let Ok(xdg_state) = std::env::var("XDG_STATE_HOME") {
        let path = PathBuf::from(xdg_state).join("homestead");
        log::debug!("Using XDG_STATE_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".local").join("state").join("homestead"))
}

/// Expand `~` and environment variables in a configured path.
pub fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}
