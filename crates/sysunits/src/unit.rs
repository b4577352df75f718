//! Unit file document model.
//!
//! A unit file is a sequence of named sections, each holding ordered
//! `Key=Value` entries. Sections render in insertion order and entries
//! render in the order they were added, so the same inputs always produce
//! byte-identical output.

/// One `[Section]` of a unit file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub entries: Vec<(String, String)>,
}

/// An in-memory unit file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitFile {
    sections: Vec<Section>,
}

impl UnitFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `key=value` to `section`, creating the section on first use.
    ///
    /// Repeated keys are kept as separate entries; systemd treats repeated
    /// directives like `After=` as additive.
    pub fn entry(&mut self, section: &str, key: &str, value: &str) -> &mut Self {
        let section = match self.sections.iter_mut().find(|s| s.name == section) {
            Some(existing) => existing,
            None => {
                self.sections.push(Section {
                    name: section.to_string(),
                    entries: Vec::new(),
                });
                self.sections.last_mut().expect("just pushed")
            }
        };
        section.entries.push((key.to_string(), value.to_string()));
        self
    }

    /// All values recorded for `key` in `section`.
    pub fn values(&self, section: &str, key: &str) -> Vec<&str> {
        self.sections
            .iter()
            .filter(|s| s.name == section)
            .flat_map(|s| s.entries.iter())
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Render the unit to its on-disk text form.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (i, section) in self.sections.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push('[');
            out.push_str(&section.name);
            out.push_str("]\n");
            for (key, value) in &section.entries {
                out.push_str(key);
                out.push('=');
                out.push_str(value);
                out.push('\n');
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> UnitFile {
        let mut unit = UnitFile::new();
        unit.entry("Unit", "Description", "Media stack (podman)");
        unit.entry("Unit", "After", "network-online.target");
        unit.entry("Unit", "Wants", "network-online.target");
        unit.entry("Service", "Type", "oneshot");
        unit.entry("Service", "RemainAfterExit", "yes");
        unit.entry("Install", "WantedBy", "multi-user.target");
        unit
    }

    #[test]
    fn renders_sections_in_insertion_order() {
        let text = sample().render();
        assert_eq!(
            text,
            "[Unit]\n\
             Description=Media stack (podman)\n\
             After=network-online.target\n\
             Wants=network-online.target\n\
             \n\
             [Service]\n\
             Type=oneshot\n\
             RemainAfterExit=yes\n\
             \n\
             [Install]\n\
             WantedBy=multi-user.target\n"
        );
    }

    #[test]
    fn rendering_is_deterministic() {
        assert_eq!(sample().render(), sample().render());
    }

    #[test]
    fn repeated_keys_are_additive() {
        let mut unit = UnitFile::new();
        unit.entry("Unit", "After", "network-online.target");
        unit.entry("Unit", "After", "docker.service");
        assert_eq!(
            unit.values("Unit", "After"),
            vec!["network-online.target", "docker.service"]
        );
        let text = unit.render();
        assert!(text.contains("After=network-online.target\nAfter=docker.service\n"));
    }

    #[test]
    fn values_on_missing_key_is_empty() {
        assert!(sample().values("Unit", "Requires").is_empty());
        assert!(sample().values("Timer", "OnCalendar").is_empty());
    }
}
