// crates/core/src/extract.rs
//! Field extraction from free-form access log values.
//!
//! Two pure functions: workbook/dashboard extraction from a resource
//! path, and domain-prefix stripping from a raw username. Both have a
//! defined fallback instead of an error path.

use regex_lite::Regex;
use std::sync::OnceLock;

/// Matches `.../w/<workbook>.../v/<dashboard>` in a resource path.
/// Greedy leading `.*` means the last `/w/` segment that still leaves
/// room for a `/v/` match wins, mirroring classic backtracking regex
/// behavior on these paths.
fn resource_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r".*/w/([^/]+).*/v/([^/]+)").expect("resource pattern is valid")
    })
}

/// Extract `(workbook, dashboard)` from a resource path.
///
/// A path that does not carry both the `/w/` and `/v/` markers in
/// order yields `("", "")`, a defined fallback rather than an error.
pub fn extract_workbook_dashboard(resource: &str) -> (String, String) {
    match resource_pattern().captures(resource) {
        Some(caps) => {
            let workbook = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let dashboard = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            (workbook.to_string(), dashboard.to_string())
        }
        None => (String::new(), String::new()),
    }
}

/// Strip a `DOMAIN\` prefix from a raw username.
///
/// Returns the substring after the first backslash when one is
/// present, otherwise the input unchanged. Empty in, empty out.
pub fn normalize_user(raw: &str) -> &str {
    match raw.find('\\') {
        Some(pos) => &raw[pos + 1..],
        None => raw,
    }
}
