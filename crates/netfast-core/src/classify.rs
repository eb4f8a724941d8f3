//! Classification of raw command failures.
//!
//! Network configuration and registry tools do not report permission
//! problems or missing entries in a structured way, so the only signal is
//! the text they print. Every caller goes through [`classify_failure`];
//! nothing else matches on these phrases.

/// Coarse kind of a failed command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The tool refused because the caller is not elevated
    PermissionDenied,
    /// The key, value or path the command targeted does not exist
    NotFound,
    /// Any other failure
    Other,
}

/// Phrases emitted by netsh, PowerShell, networksetup, resolvectl and nmcli
/// when they need administrator rights. Matched lowercase.
const ELEVATION_PATTERNS: &[&str] = &[
    "access denied",
    "access is denied",
    "requires elevation",
    "run as administrator",
    "cim resource",
    "permission denied",
    "operation not permitted",
    "authentication is required",
    "must be run as root",
    "requires root",
    "not authorized",
];

/// Phrases `reg` and PowerShell emit when the target entry is absent.
/// Matched lowercase.
const NOT_FOUND_PATTERNS: &[&str] = &[
    "unable to find the specified",
    "cannot find the specified",
    "cannot find path",
];

/// Classify the text of a failed command.
///
/// Elevation problems win over missing entries.
#[must_use]
pub fn classify_failure(text: &str) -> FailureKind {
    let lower = text.to_lowercase();
    if ELEVATION_PATTERNS.iter().any(|p| lower.contains(p)) {
        FailureKind::PermissionDenied
    } else if NOT_FOUND_PATTERNS.iter().any(|p| lower.contains(p)) {
        FailureKind::NotFound
    } else {
        FailureKind::Other
    }
}
