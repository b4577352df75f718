//! Persistent setup state: configuration entries and completion markers.
//!
//! Everything the orchestrator remembers between runs goes through
//! [`SetupStore`]; no other module touches the filesystem for state. The
//! store is deliberately primitive: a `KEY=value` text file for
//! configuration and one empty file per completion marker, because both
//! survive crashes trivially and can be inspected (or repaired) with a
//! shell.
//!
//! Two guarantees matter here:
//!
//! - `set` rewrites the config file atomically (temp file in the same
//!   directory, then rename), so a crash mid-write never corrupts the last
//!   committed state and a concurrent reader never sees a torn file.
//! - `mark_complete_if_new` creates marker files with `O_CREAT|O_EXCL`, so
//!   when two invocations of the tool race, exactly one of them observes
//!   "I created it".

use anyhow::{Context, Result, bail};
use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Config file name inside the state directory.
const CONFIG_FILE: &str = "setup.conf";

/// Marker directory name inside the state directory.
const MARKER_DIR: &str = "markers";

// Well-known configuration keys. The vocabulary is open; these are the keys
// the pipeline itself reads and writes.
pub const KEY_RUNTIME: &str = "RUNTIME";
pub const KEY_COMPOSE_CMD: &str = "COMPOSE_CMD";
pub const KEY_SELECTED_STACKS: &str = "SELECTED_STACKS";
pub const KEY_STEP_SELECTION: &str = "STEP_SELECTION";
pub const KEY_CONTAINERS_BASE: &str = "CONTAINERS_BASE";
pub const KEY_SERVICE_USER: &str = "SERVICE_USER";
pub const KEY_SERVICE_UID: &str = "SERVICE_UID";
pub const KEY_SERVICE_GID: &str = "SERVICE_GID";
pub const KEY_NAS_SOURCE: &str = "NAS_SOURCE";
pub const KEY_NAS_MOUNTPOINT: &str = "NAS_MOUNTPOINT";
pub const KEY_VPN_ENDPOINT: &str = "VPN_ENDPOINT";
pub const KEY_WAN_IP: &str = "WAN_IP";

/// Persisted key/value configuration plus completion markers.
#[derive(Debug)]
pub struct SetupStore {
    config_path: PathBuf,
    marker_dir: PathBuf,
    entries: BTreeMap<String, String>,
}

impl SetupStore {
    /// Open (or initialize) the store under `state_dir`.
    ///
    /// Creates the directory layout if missing and loads any existing
    /// configuration.
    pub fn open(state_dir: &Path) -> Result<Self> {
        let marker_dir = state_dir.join(MARKER_DIR);
        fs::create_dir_all(&marker_dir).with_context(|| {
            format!("Failed to create state directory: {}", marker_dir.display())
        })?;

        let config_path = state_dir.join(CONFIG_FILE);
        let entries = if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            parse_config(&content)
        } else {
            log::debug!("No config file at {}, starting empty", config_path.display());
            BTreeMap::new()
        };

        Ok(Self {
            config_path,
            marker_dir,
            entries,
        })
    }

    /// Open the store at the default state directory.
    pub fn open_default() -> Result<Self> {
        Self::open(&crate::paths::state_dir()?)
    }

    /// Path of the config file (for status display).
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    // ========================================================================
    // Configuration entries
    // ========================================================================

    /// Look up a configuration value. Absence is distinct from empty.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Look up a configuration value, falling back to `default`.
    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or(default).to_string()
    }

    /// Set a configuration value and persist the whole store atomically.
    ///
    /// Write failures propagate; a step must never continue as if a value
    /// it failed to persist were saved.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        if key.is_empty() || key.contains('=') || key.contains('\n') {
            bail!("Invalid config key: {key:?}");
        }
        if value.contains('\n') {
            bail!("Config values must be single-line (key {key})");
        }

        self.entries.insert(key.to_string(), value.to_string());
        self.persist()
            .with_context(|| format!("Failed to persist config entry {key}"))
    }

    /// All entries, sorted by key (for `config list` and status output).
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn persist(&self) -> Result<()> {
        let dir = self
            .config_path
            .parent()
            .context("Config path has no parent directory")?;

        // Temp file in the same directory so the rename cannot cross a
        // filesystem boundary (rename is only atomic within one).
        let tmp_path = dir.join(format!("{CONFIG_FILE}.{}.tmp", std::process::id()));

        let mut tmp = fs::File::create(&tmp_path)
            .with_context(|| format!("Failed to create {}", tmp_path.display()))?;
        tmp.write_all(render_config(&self.entries).as_bytes())
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        tmp.sync_all()
            .with_context(|| format!("Failed to sync {}", tmp_path.display()))?;
        drop(tmp);

        fs::rename(&tmp_path, &self.config_path).with_context(|| {
            format!(
                "Failed to move {} into place as {}",
                tmp_path.display(),
                self.config_path.display()
            )
        })?;

        log::debug!("Persisted {} entries to {}", self.entries.len(), self.config_path.display());
        Ok(())
    }

    // ========================================================================
    // Completion markers
    // ========================================================================

    /// Record that `name` has completed. Idempotent.
    pub fn mark_complete(&self, name: &str) -> Result<()> {
        self.mark_complete_if_new(name).map(|_| ())
    }

    /// Whether `name` has completed at least once.
    pub fn is_complete(&self, name: &str) -> bool {
        match validate_marker_name(name) {
            Ok(()) => self.marker_path(name).exists(),
            Err(_) => false,
        }
    }

    /// Race-safe marker creation: returns `true` iff this call created the
    /// marker. Under concurrent invocation exactly one caller wins; the
    /// rest get `Ok(false)`.
    pub fn mark_complete_if_new(&self, name: &str) -> Result<bool> {
        validate_marker_name(name)?;
        let path = self.marker_path(name);
        match fs::OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => {
                log::debug!("Created marker {name}");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to create marker {}", path.display()))
            }
        }
    }

    /// Treat any recognized legacy marker as the canonical one being set.
    ///
    /// Returns `true` when the canonical marker exists or a legacy marker
    /// was found (in which case the canonical marker is created exactly
    /// once and the legacy file is cleaned up best-effort). Returns `false`
    /// when the caller still has to run the step.
    pub fn ensure_canonical_marker(&self, canonical: &str, legacy: &[&str]) -> Result<bool> {
        if self.is_complete(canonical) {
            return Ok(true);
        }

        for name in legacy {
            if self.is_complete(name) {
                self.mark_complete_if_new(canonical)?;
                if let Err(e) = fs::remove_file(self.marker_path(name)) {
                    log::debug!("Could not remove legacy marker {name}: {e}");
                } else {
                    log::info!("Migrated legacy marker {name} -> {canonical}");
                }
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Remove a marker so its step re-executes on the next run.
    ///
    /// Returns `true` if the marker existed.
    pub fn remove_marker(&self, name: &str) -> Result<bool> {
        validate_marker_name(name)?;
        match fs::remove_file(self.marker_path(name)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to remove marker {name}")),
        }
    }

    /// All present marker names, sorted.
    pub fn markers(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let entries = fs::read_dir(&self.marker_dir)
            .with_context(|| format!("Failed to read {}", self.marker_dir.display()))?;
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn marker_path(&self, name: &str) -> PathBuf {
        self.marker_dir.join(name)
    }
}

/// Marker names become filenames; restrict them so they can never escape
/// the marker directory.
fn validate_marker_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
    if !valid || name.starts_with('.') {
        bail!("Invalid marker name: {name:?}");
    }
    Ok(())
}

fn parse_config(content: &str) -> BTreeMap<String, String> {
    let mut entries = BTreeMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            entries.insert(key.trim().to_string(), value.to_string());
        } else {
            log::warn!("Ignoring malformed config line: {line:?}");
        }
    }
    entries
}

fn render_config(entries: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    for (key, value) in entries {
        out.push_str(key);
        out.push('=');
        out.push_str(value);
        out.push('\n');
    }
    out
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, SetupStore) {
        let dir = TempDir::new().unwrap();
        let store = SetupStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn absent_key_is_distinct_from_empty() {
        let (_dir, mut store) = store();
        assert_eq!(store.get("RUNTIME"), None);
        store.set("RUNTIME", "").unwrap();
        assert_eq!(store.get("RUNTIME"), Some(""));
    }

    #[test]
    fn set_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let mut store = SetupStore::open(dir.path()).unwrap();
            store.set(KEY_RUNTIME, "podman").unwrap();
            store.set(KEY_SELECTED_STACKS, "media,cloud").unwrap();
        }
        let store = SetupStore::open(dir.path()).unwrap();
        assert_eq!(store.get(KEY_RUNTIME), Some("podman"));
        assert_eq!(store.get(KEY_SELECTED_STACKS), Some("media,cloud"));
    }

    #[test]
    fn set_overwrites_existing_key() {
        let (_dir, mut store) = store();
        store.set(KEY_RUNTIME, "docker").unwrap();
        store.set(KEY_RUNTIME, "podman").unwrap();
        assert_eq!(store.get(KEY_RUNTIME), Some("podman"));
        assert_eq!(store.entries().count(), 1);
    }

    #[test]
    fn set_rejects_multiline_values_and_bad_keys() {
        let (_dir, mut store) = store();
        assert!(store.set("KEY", "a\nb").is_err());
        assert!(store.set("A=B", "x").is_err());
        assert!(store.set("", "x").is_err());
    }

    #[test]
    fn stray_temp_file_does_not_corrupt_committed_state() {
        // Simulates a crash after the temp file was written but before the
        // rename: the previously committed value must survive.
        let dir = TempDir::new().unwrap();
        {
            let mut store = SetupStore::open(dir.path()).unwrap();
            store.set(KEY_RUNTIME, "podman").unwrap();
        }
        std::fs::write(
            dir.path().join(format!("{CONFIG_FILE}.9999.tmp")),
            "RUNTIME=gar",
        )
        .unwrap();

        let store = SetupStore::open(dir.path()).unwrap();
        assert_eq!(store.get(KEY_RUNTIME), Some("podman"));
    }

    #[test]
    fn config_file_is_line_oriented_and_comment_tolerant() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(MARKER_DIR)).unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "# seeded by image build\nRUNTIME=podman\n\nbroken line\nNAS_MOUNTPOINT=/mnt/nas-media\n",
        )
        .unwrap();

        let store = SetupStore::open(dir.path()).unwrap();
        assert_eq!(store.get(KEY_RUNTIME), Some("podman"));
        assert_eq!(store.get(KEY_NAS_MOUNTPOINT), Some("/mnt/nas-media"));
        assert_eq!(store.entries().count(), 2);
    }

    #[test]
    fn marker_creation_is_idempotent() {
        let (_dir, store) = store();
        assert!(store.mark_complete_if_new("preflight-ok").unwrap());
        assert!(!store.mark_complete_if_new("preflight-ok").unwrap());
        assert!(store.is_complete("preflight-ok"));

        store.mark_complete("preflight-ok").unwrap();
        assert!(store.is_complete("preflight-ok"));
    }

    #[test]
    fn concurrent_marker_creation_has_exactly_one_winner() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();
        // Pre-create the layout once so threads race only on the marker.
        SetupStore::open(&path).unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let path = path.clone();
                std::thread::spawn(move || {
                    let store = SetupStore::open(&path).unwrap();
                    store.mark_complete_if_new("deploy-done").unwrap()
                })
            })
            .collect();

        let winners: usize = handles
            .into_iter()
            .map(|h| usize::from(h.join().unwrap()))
            .sum();
        assert_eq!(winners, 1);
    }

    #[test]
    fn legacy_marker_migrates_to_canonical_once() {
        let (_dir, store) = store();
        store.mark_complete("user-created").unwrap();

        let done = store
            .ensure_canonical_marker("account-provisioned", &["user-created"])
            .unwrap();
        assert!(done);
        assert!(store.is_complete("account-provisioned"));
        // The legacy marker is no longer needed even if it is gone.
        assert!(!store.is_complete("user-created"));

        // Second call short-circuits on the canonical marker.
        let done = store
            .ensure_canonical_marker("account-provisioned", &["user-created"])
            .unwrap();
        assert!(done);
    }

    #[test]
    fn ensure_canonical_marker_reports_unstarted_steps() {
        let (_dir, store) = store();
        let done = store
            .ensure_canonical_marker("account-provisioned", &["user-created"])
            .unwrap();
        assert!(!done);
        assert!(!store.is_complete("account-provisioned"));
    }

    #[test]
    fn remove_marker_forces_rerun() {
        let (_dir, store) = store();
        store.mark_complete("vpn-configured").unwrap();
        assert!(store.remove_marker("vpn-configured").unwrap());
        assert!(!store.is_complete("vpn-configured"));
        assert!(!store.remove_marker("vpn-configured").unwrap());
    }

    #[test]
    fn marker_names_cannot_escape_the_marker_dir() {
        let (_dir, store) = store();
        assert!(store.mark_complete_if_new("../evil").is_err());
        assert!(store.mark_complete_if_new("a/b").is_err());
        assert!(store.mark_complete_if_new(".hidden").is_err());
        assert!(!store.is_complete("../evil"));
    }

    #[test]
    fn markers_lists_sorted_names() {
        let (_dir, store) = store();
        store.mark_complete("preflight-ok").unwrap();
        store.mark_complete("account-provisioned").unwrap();
        assert_eq!(
            store.markers().unwrap(),
            vec!["account-provisioned".to_string(), "preflight-ok".to_string()]
        );
    }
}
