//! Read-only settings surface supplied by the host
//!
//! Settings storage and refresh are owned by an external settings service.
//! This module only defines the lookup seam and the keys Rudder reads.

use std::collections::HashMap;

#[cfg(test)]
use mockall::automock;

/// Setting key for the default Kubernetes version used for new clusters
pub const VERSION_K8S_DEFAULT: &str = "k8s-version";

/// Setting key for the JSON-encoded mapping of available Kubernetes versions
///
/// The value is a JSON object keyed by version string. Only the keys matter
/// to Rudder; the metadata values are opaque. Key order is meaningful and is
/// preserved when parsing.
pub const VERSIONS_K8S: &str = "k8s-versions";

/// Setting key for the agent container image reference
pub const AGENT_IMAGE: &str = "agent-image";

/// Setting key for the CA certificate bundle presented to agents
pub const CA_CERTS: &str = "cacerts";

/// String-keyed configuration lookup
///
/// Implementations must already hold current values; lookups are synchronous
/// and never trigger a fetch.
#[cfg_attr(test, automock)]
pub trait Settings: Send + Sync {
    /// Get the value for a setting key, if present
    fn get(&self, key: &str) -> Option<String>;
}

/// Map-backed settings, for tests and the CLI
#[derive(Clone, Debug, Default)]
pub struct MemorySettings {
    values: HashMap<String, String>,
}

impl MemorySettings {
    /// Create an empty settings map
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value and return self for chaining
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Insert or replace a value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }
}

impl Settings for MemorySettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}
