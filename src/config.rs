//! Stack catalog: the set of application stacks this host can deploy.
//!
//! The catalog is data, not state: it describes what *can* be installed
//! (name, display title, description), while the store records what *was*
//! selected. Operators can override the built-in catalog by dropping a
//! `stacks.toml` into the config directory; pre-baked images usually ship
//! one.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Catalog file name inside the config directory.
const CATALOG_FILE: &str = "stacks.toml";

/// Compose file names recognized inside a stack's working directory.
const COMPOSE_FILE_NAMES: &[&str] = &[
    "compose.yaml",
    "compose.yml",
    "docker-compose.yaml",
    "docker-compose.yml",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StackSpec {
    /// Short name; becomes the working directory and unit name component.
    pub name: String,
    /// Human-readable title for menus and unit descriptions.
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackCatalog {
    #[serde(rename = "stack", default)]
    pub stacks: Vec<StackSpec>,
}

impl StackCatalog {
    /// Load `stacks.toml` from the config directory, falling back to the
    /// built-in catalog when none exists.
    pub fn load(config_dir: &Path) -> Result<Self> {
        let path = config_dir.join(CATALOG_FILE);
        if !path.exists() {
            log::debug!("No {} found, using built-in catalog", path.display());
            return Ok(Self::builtin());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let catalog: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid stack catalog: {}", path.display()))?;

        if catalog.stacks.is_empty() {
            bail!("Stack catalog {} defines no stacks", path.display());
        }
        for stack in &catalog.stacks {
            validate_stack_name(&stack.name)?;
        }
        Ok(catalog)
    }

    /// The stacks shipped with homestead.
    pub fn builtin() -> Self {
        let stack = |name: &str, title: &str, description: &str| StackSpec {
            name: name.to_string(),
            title: title.to_string(),
            description: description.to_string(),
        };
        Self {
            stacks: vec![
                stack("media", "Media server", "Jellyfin with request and indexer companions"),
                stack("cloud", "Personal cloud", "Nextcloud with collaborative editing"),
                stack("web", "Web front", "Reverse proxy and landing pages"),
                stack("monitoring", "Monitoring", "Metrics collection and dashboards"),
            ],
        }
    }

    pub fn find(&self, name: &str) -> Option<&StackSpec> {
        self.stacks.iter().find(|s| s.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.stacks.iter().map(|s| s.name.as_str()).collect()
    }
}

/// Stack names flow into paths and unit names; keep them boring.
pub fn validate_stack_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !valid {
        bail!("Invalid stack name {name:?} (lowercase letters, digits and '-' only)");
    }
    Ok(())
}

/// The compose file of a stack's working directory, if one is present.
pub fn compose_file(workdir: &Path) -> Option<PathBuf> {
    COMPOSE_FILE_NAMES
        .iter()
        .map(|name| workdir.join(name))
        .find(|p| p.is_file())
}

/// Stack directories under the containers base that already carry a
/// compose file (pre-seeded by the image or an earlier run).
pub fn discover_stack_dirs(base: &Path) -> Vec<String> {
    let mut found = Vec::new();
    for entry in WalkDir::new(base)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(std::result::Result::ok)
    {
        if entry.file_type().is_dir() && compose_file(entry.path()).is_some() {
            found.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    found.sort();
    found
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn builtin_catalog_has_valid_names() {
        let catalog = StackCatalog::builtin();
        assert!(!catalog.stacks.is_empty());
        for stack in &catalog.stacks {
            validate_stack_name(&stack.name).unwrap();
        }
        assert!(catalog.find("media").is_some());
        assert!(catalog.find("nope").is_none());
    }

    #[test]
    fn missing_catalog_falls_back_to_builtin() {
        let dir = TempDir::new().unwrap();
        let catalog = StackCatalog::load(dir.path()).unwrap();
        assert_eq!(catalog.names(), StackCatalog::builtin().names());
    }

    #[test]
    fn catalog_file_overrides_builtin() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(CATALOG_FILE),
            r#"
[[stack]]
name = "media"
title = "Media"

[[stack]]
name = "game-servers"
title = "Game servers"
description = "Dedicated game hosting"
"#,
        )
        .unwrap();

        let catalog = StackCatalog::load(dir.path()).unwrap();
        assert_eq!(catalog.names(), vec!["media", "game-servers"]);
        assert_eq!(catalog.find("game-servers").unwrap().title, "Game servers");
    }

    #[test]
    fn bad_stack_names_are_rejected() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(CATALOG_FILE),
            "[[stack]]\nname = \"../evil\"\ntitle = \"x\"\n",
        )
        .unwrap();
        assert!(StackCatalog::load(dir.path()).is_err());

        assert!(validate_stack_name("media").is_ok());
        assert!(validate_stack_name("Media").is_err());
        assert!(validate_stack_name("a b").is_err());
        assert!(validate_stack_name("").is_err());
    }

    #[test]
    fn discovers_stack_dirs_with_compose_files() {
        let base = TempDir::new().unwrap();
        fs::create_dir(base.path().join("media")).unwrap();
        fs::write(base.path().join("media/compose.yaml"), "services: {}\n").unwrap();
        fs::create_dir(base.path().join("empty")).unwrap();
        fs::write(base.path().join("loose-file"), "x").unwrap();

        assert_eq!(discover_stack_dirs(base.path()), vec!["media"]);
        assert_eq!(
            compose_file(&base.path().join("media")),
            Some(base.path().join("media/compose.yaml"))
        );
        assert_eq!(compose_file(&base.path().join("empty")), None);
    }
}
