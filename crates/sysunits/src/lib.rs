//! # Sysunits
//!
//! Building blocks for generating systemd units from Rust:
//!
//! - Escape filesystem paths into unit names the same way
//!   `systemd-escape --path` does (reversible, so generated dependency
//!   directives can be verified against the real mount units)
//! - Model a unit file as ordered sections and render it deterministically
//! - Stamp generated units with a checksum header so a later run can tell
//!   its own output apart from units shipped in the OS image, and detect
//!   when the generated content has drifted
//!
//! ## Example
//!
//! ```
//! use sysunits::{escape, marker, UnitFile};
//!
//! let mount = escape::mount_unit_name("/mnt/nas-media");
//! assert_eq!(mount, "mnt-nas\\x2dmedia.mount");
//!
//! let mut unit = UnitFile::new();
//! unit.entry("Unit", "Description", "Media stack");
//! unit.entry("Unit", "Requires", &mount);
//! unit.entry("Service", "ExecStart", "/usr/bin/podman compose up");
//! unit.entry("Install", "WantedBy", "multi-user.target");
//!
//! let text = marker::stamp(&unit.render());
//! assert!(marker::is_generated(&text));
//! ```

pub mod escape;
pub mod marker;
pub mod unit;

pub use escape::{escape_path, mount_unit_name, unescape_path, EscapeError};
pub use unit::UnitFile;
