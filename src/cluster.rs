//! Cluster and engine configuration types
//!
//! These are the API-facing types the wizard edits. Persistence (create,
//! save, node listing) belongs to an external store; Rudder only shapes and
//! validates the configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::topology::NodePool;

/// A cluster being created or edited by the wizard
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    /// Server-assigned cluster id, absent until first save
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Node pools, absent until the wizard creates the first one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_pools: Option<Vec<NodePool>>,

    /// RKE engine configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rke_config: Option<RkeConfig>,
}

impl Cluster {
    /// The node pools, empty when none have been created yet
    pub fn pools(&self) -> &[NodePool] {
        self.node_pools.as_deref().unwrap_or_default()
    }

    /// Mutable access to the node pools, creating the list if absent
    pub fn pools_mut(&mut self) -> &mut Vec<NodePool> {
        self.node_pools.get_or_insert_with(Vec::new)
    }
}

/// RKE engine configuration for a cluster
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RkeConfig {
    /// Kubernetes version to run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes_version: Option<String>,

    /// Authentication configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<AuthnConfig>,

    /// Network configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkConfig>,

    /// Private registries to pull system images from
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub private_registries: Vec<PrivateRegistry>,
}

/// Cluster authentication configuration
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthnConfig {
    /// Authentication strategy
    pub strategy: AuthStrategy,
}

/// Supported authentication strategies
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum AuthStrategy {
    /// Client certificate authentication
    X509,
}

impl AuthStrategy {
    /// Translation key for this strategy's display label
    pub fn label_key(&self) -> &'static str {
        match self {
            Self::X509 => "clusterNew.rke.auth.x509",
        }
    }
}

impl std::fmt::Display for AuthStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::X509 => write!(f, "x509"),
        }
    }
}

/// Cluster network configuration
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    /// CNI plugin to deploy
    pub plugin: NetworkPlugin,
}

/// Supported CNI network plugins
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum NetworkPlugin {
    /// Flannel overlay network
    Flannel,
    /// Calico with network policy support
    Calico,
    /// Canal (flannel + calico policies)
    Canal,
}

impl NetworkPlugin {
    /// All selectable plugins, in menu order
    pub const CHOICES: [NetworkPlugin; 3] = [
        NetworkPlugin::Flannel,
        NetworkPlugin::Calico,
        NetworkPlugin::Canal,
    ];

    /// Translation key for this plugin's display label
    pub fn label_key(&self) -> &'static str {
        match self {
            Self::Flannel => "clusterNew.rke.network.flannel",
            Self::Calico => "clusterNew.rke.network.calico",
            Self::Canal => "clusterNew.rke.network.canal",
        }
    }
}

impl std::fmt::Display for NetworkPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Flannel => write!(f, "flannel"),
            Self::Calico => write!(f, "calico"),
            Self::Canal => write!(f, "canal"),
        }
    }
}

/// A private registry the engine pulls system images from
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrivateRegistry {
    /// Registry URL
    pub url: String,

    /// Username for the registry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Password for the registry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// A node template owned by the node driver layer
///
/// External entity: Rudder only filters templates when offering choices for
/// a pool.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeTemplate {
    /// Template id
    pub id: String,

    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Lifecycle state (only "active" templates are offered)
    #[serde(default)]
    pub state: String,

    /// Node driver this template provisions with
    #[serde(default)]
    pub driver: String,
}

impl NodeTemplate {
    /// Whether the template is active and usable
    pub fn is_active(&self) -> bool {
        self.state == "active"
    }
}
