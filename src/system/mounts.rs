//! Network storage adapter: mount-point checks via `findmnt`, mounting
//! via `mount`.

use anyhow::{Context, Result, bail};
use std::path::Path;

use super::exec::{run_capture, run_status};
use super::MountInspector;

/// Live [`MountInspector`] backed by util-linux.
pub struct Findmnt;

impl MountInspector for Findmnt {
    fn is_mounted(&self, path: &Path) -> Result<bool> {
        // Exit 0 = something is mounted at the target; 1 = nothing is
        // (defined negative); anything else is a real failure.
        let target = path.to_string_lossy();
        let status = run_status("findmnt", &["--mountpoint", &target])
            .context("findmnt failed to run")?;
        match status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            code => bail!("findmnt {target} exited with {code:?}"),
        }
    }

    fn mount(&self, source: &str, target: &Path) -> Result<()> {
        let target_str = target.to_string_lossy();
        run_capture("mount", &[source, &target_str])
            .map(|_| ())
            .with_context(|| format!("Failed to mount {source} at {target_str}"))
    }
}
