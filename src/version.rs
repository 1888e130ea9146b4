//! Kubernetes version catalog filtering and reconciliation
//!
//! The settings service supplies the available versions as a JSON object
//! keyed by version string. Rudder filters those keys against a semver
//! lower bound - the version the cluster was running when editing began, or
//! a fixed floor for new clusters - and keeps the selected version inside
//! the allowed set.

use crate::{Error, Result};

/// Oldest Kubernetes version offered when no initial version constrains the
/// choice (i.e. a brand new cluster)
pub const DEFAULT_OLDEST_SUPPORTED: &str = "1.8.0";

/// A parsed Kubernetes version, ordered by (major, minor, patch)
///
/// Pre-release/build suffixes (everything from the first hyphen) are
/// stripped before parsing: "1.10.0-rc1" orders as 1.10.0. The unstripped
/// string is what callers display and persist.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct KubernetesVersion {
    major: u32,
    minor: u32,
    patch: u32,
}

impl KubernetesVersion {
    /// Construct a version from its numeric parts
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse a version string
    ///
    /// Accepts an optional `v` prefix and a pre-release suffix. Requires at
    /// least major.minor with numeric parts; a missing patch is 0. Returns
    /// `None` for anything else.
    pub fn parse(version: &str) -> Option<Self> {
        let release = version.split('-').next().unwrap_or(version);
        let clean = release.strip_prefix('v').unwrap_or(release);

        let parts: Vec<&str> = clean.split('.').collect();
        if parts.len() < 2 {
            return None;
        }

        let mut numbers = [0u32; 3];
        for (i, part) in parts.iter().take(3).enumerate() {
            numbers[i] = part.parse().ok()?;
        }

        Some(Self::new(numbers[0], numbers[1], numbers[2]))
    }

    fn default_floor() -> Self {
        Self::new(1, 8, 0)
    }
}

impl std::fmt::Display for KubernetesVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Filter candidate version keys against the lower-bound constraint
///
/// The bound is `>= initial_version` when the cluster started editing with a
/// version set, else `>=` [`DEFAULT_OLDEST_SUPPORTED`]. Candidates are
/// compared with their pre-release suffix stripped, but the output keeps the
/// original keys in their input order. When `editing` and the initial
/// version survived neither the mapping nor the filter, it is prepended so
/// an existing cluster can always keep its running version.
pub fn filter_versions<'a, I>(keys: I, initial_version: Option<&str>, editing: bool) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let floor = initial_version
        .and_then(KubernetesVersion::parse)
        .unwrap_or_else(KubernetesVersion::default_floor);

    let mut out: Vec<String> = keys
        .into_iter()
        .filter(|key| KubernetesVersion::parse(key).is_some_and(|v| v >= floor))
        .map(String::from)
        .collect();

    if editing {
        if let Some(initial) = initial_version {
            if !out.iter().any(|v| v == initial) {
                out.insert(0, initial.to_string());
            }
        }
    }

    out
}

/// Parse the settings-supplied available-versions JSON and filter its keys
///
/// The blob is a JSON object mapping version string to metadata; only the
/// keys matter here, and their object order is preserved. An empty or
/// missing blob yields no choices; a malformed one is a serialization error.
pub fn version_choices(
    versions_json: &str,
    initial_version: Option<&str>,
    editing: bool,
) -> Result<Vec<String>> {
    let trimmed = versions_json.trim();
    let source = if trimmed.is_empty() { "{}" } else { trimmed };

    let versions: serde_json::Map<String, serde_json::Value> = serde_json::from_str(source)
        .map_err(|e| Error::serialization(format!("invalid k8s-versions setting: {e}")))?;

    Ok(filter_versions(
        versions.keys().map(String::as_str),
        initial_version,
        editing,
    ))
}

/// Keep the selected version inside the allowed set
///
/// Returns the selection unchanged when it is among the options, else the
/// first option. An invalid selection is derived-state drift, not a user
/// mistake, so this self-heals instead of erroring. `None` only when there
/// are no options at all.
pub fn reconcile_selected_version(selected: Option<&str>, options: &[String]) -> Option<String> {
    if let Some(current) = selected {
        if options.iter().any(|v| v == current) {
            return Some(current.to_string());
        }
    }
    options.first().cloned()
}
