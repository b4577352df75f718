//! Path-to-unit-name escaping, compatible with `systemd-escape --path`.
//!
//! Generated dependency directives (`Requires=mnt-nas\x2dmedia.mount`) must
//! match the names systemd itself derives for mount units, so the algorithm
//! here mirrors systemd's `unit_name_path_escape` exactly: the path is
//! normalized (duplicate and trailing slashes removed), `/` becomes `-`,
//! and every byte outside `[A-Za-z0-9:_.]` becomes `\xNN`. A leading `.`
//! is also escaped. The root path maps to `-`.

use thiserror::Error;

/// Error unescaping a unit name back into a path.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EscapeError {
    #[error("truncated escape sequence in {0:?}")]
    TruncatedEscape(String),
    #[error("invalid hex escape \\x{0} in unit name")]
    InvalidHex(String),
    #[error("escaped name produced invalid UTF-8")]
    InvalidUtf8,
}

/// Escape a filesystem path into a systemd unit name body.
///
/// The result has no unit type suffix; see [`mount_unit_name`] for the
/// common `.mount` case.
pub fn escape_path(path: &str) -> String {
    let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
    if components.is_empty() {
        return "-".to_string();
    }

    let normalized = components.join("/");
    let mut out = String::with_capacity(normalized.len());

    for (i, byte) in normalized.bytes().enumerate() {
        match byte {
            b'/' => out.push('-'),
            b'.' if i == 0 => push_hex(&mut out, byte),
            b if b.is_ascii_alphanumeric() || b == b':' || b == b'_' || b == b'.' => {
                out.push(b as char);
            }
            b => push_hex(&mut out, b),
        }
    }

    out
}

/// The mount unit name systemd derives for a mount point path.
pub fn mount_unit_name(path: &str) -> String {
    format!("{}.mount", escape_path(path))
}

/// Reverse [`escape_path`], recovering the absolute path.
pub fn unescape_path(escaped: &str) -> Result<String, EscapeError> {
    if escaped == "-" {
        return Ok("/".to_string());
    }

    let mut bytes = Vec::with_capacity(escaped.len() + 1);
    bytes.push(b'/');

    let mut chars = escaped.bytes();
    while let Some(b) = chars.next() {
        match b {
            b'-' => bytes.push(b'/'),
            b'\\' => {
                let (x, hi, lo) = (chars.next(), chars.next(), chars.next());
                match (x, hi, lo) {
                    (Some(b'x'), Some(hi), Some(lo)) => {
                        let hex = format!("{}{}", hi as char, lo as char);
                        let value = u8::from_str_radix(&hex, 16)
                            .map_err(|_| EscapeError::InvalidHex(hex))?;
                        bytes.push(value);
                    }
                    _ => return Err(EscapeError::TruncatedEscape(escaped.to_string())),
                }
            }
            b => bytes.push(b),
        }
    }

    String::from_utf8(bytes).map_err(|_| EscapeError::InvalidUtf8)
}

fn push_hex(out: &mut String, byte: u8) {
    out.push_str(&format!("\\x{byte:02x}"));
}
