//! Generated-unit header and drift detection.
//!
//! Units written by the orchestrator start with a single comment line that
//! embeds a blake3 checksum of the body. Reconciliation uses it two ways:
//! a unit without the header was shipped by the OS image and is never
//! overwritten; a unit with the header is ours and is rewritten whenever
//! the checksum no longer matches freshly rendered content.

const HEADER_PREFIX: &str = "# Generated by homestead; do not edit. checksum=";

/// Hex length kept in the header. Sixteen blake3 hex chars (64 bits) is
/// plenty to distinguish drift from identity for unit-sized text.
const CHECKSUM_LEN: usize = 16;

/// Checksum of a rendered unit body.
pub fn body_checksum(body: &str) -> String {
    let hex = blake3::hash(body.as_bytes()).to_hex().to_string();
    hex[..CHECKSUM_LEN].to_string()
}

/// Prepend the generated-unit header to a rendered body.
pub fn stamp(body: &str) -> String {
    format!("{}{}\n{}", HEADER_PREFIX, body_checksum(body), body)
}

/// Whether this on-disk unit text was written by us.
pub fn is_generated(text: &str) -> bool {
    text.lines().next().is_some_and(|l| l.starts_with(HEADER_PREFIX))
}

/// The checksum recorded in the header, if any.
pub fn embedded_checksum(text: &str) -> Option<&str> {
    let first = text.lines().next()?;
    let checksum = first.strip_prefix(HEADER_PREFIX)?.trim();
    (!checksum.is_empty()).then_some(checksum)
}

/// Whether `existing` (full on-disk text) no longer matches `body`
/// (freshly rendered, unstamped). Only meaningful for generated units;
/// an unstamped `existing` is always reported as drifted.
pub fn drifted(existing: &str, body: &str) -> bool {
    match embedded_checksum(existing) {
        Some(checksum) => checksum != body_checksum(body),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = "[Unit]\nDescription=Media stack\n";

    #[test]
    fn stamped_units_are_recognized() {
        let text = stamp(BODY);
        assert!(is_generated(&text));
        assert!(text.ends_with(BODY));
        assert_eq!(embedded_checksum(&text), Some(body_checksum(BODY).as_str()));
    }

    #[test]
    fn unstamped_units_are_not_ours() {
        assert!(!is_generated(BODY));
        assert!(!is_generated("# hand-written comment\n[Unit]\n"));
        assert_eq!(embedded_checksum(BODY), None);
    }

    #[test]
    fn identical_body_has_no_drift() {
        assert!(!drifted(&stamp(BODY), BODY));
    }

    #[test]
    fn changed_body_drifts() {
        let changed = "[Unit]\nDescription=Media stack (docker)\n";
        assert!(drifted(&stamp(BODY), changed));
    }

    #[test]
    fn checksum_is_stable() {
        assert_eq!(body_checksum(BODY), body_checksum(BODY));
        assert_eq!(body_checksum(BODY).len(), 16);
    }
}
