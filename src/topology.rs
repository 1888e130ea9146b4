//! Node pools, role counting, and quorum validation
//!
//! A node pool contributes `quantity` nodes, each holding any combination of
//! the three cluster roles. Before a cluster can be saved the per-role totals
//! must satisfy fixed quorum rules: etcd count in {1, 3, 5}, at least one
//! control plane node, at least one worker.

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};

/// Message key fired when the etcd quorum rule is violated
pub const MSG_ETCD_QUORUM: &str = "clusterNew.rke.errors.etcd";

/// Message key fired when no control plane node is configured
pub const MSG_CONTROL_PLANE_REQUIRED: &str = "clusterNew.rke.errors.controlPlane";

/// Message key fired when no worker node is configured
pub const MSG_WORKER_REQUIRED: &str = "clusterNew.rke.errors.worker";

/// The three node roles a pool can hold
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeRole {
    /// etcd cluster member
    Etcd,
    /// Kubernetes control plane
    ControlPlane,
    /// Workload-bearing worker
    Worker,
}

impl NodeRole {
    /// All roles in their fixed reporting order: etcd, control plane, worker
    pub const ORDERED: [NodeRole; 3] = [NodeRole::Etcd, NodeRole::ControlPlane, NodeRole::Worker];

    /// The agent command-line flag for this role
    pub fn flag(&self) -> &'static str {
        match self {
            Self::Etcd => "--etcd",
            Self::ControlPlane => "--controlplane",
            Self::Worker => "--worker",
        }
    }
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Etcd => write!(f, "etcd"),
            Self::ControlPlane => write!(f, "controlplane"),
            Self::Worker => write!(f, "worker"),
        }
    }
}

/// Per-role boolean flags, used for agent registration defaults
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoleFlags {
    /// Register as an etcd node
    #[serde(default)]
    pub etcd: bool,
    /// Register as a control plane node
    #[serde(default)]
    pub control_plane: bool,
    /// Register as a worker node
    #[serde(default)]
    pub worker: bool,
}

impl RoleFlags {
    /// Worker-only flags, the default for registered custom nodes
    pub fn worker_only() -> Self {
        Self {
            etcd: false,
            control_plane: false,
            worker: true,
        }
    }

    /// Whether the given role flag is set
    pub fn has(&self, role: NodeRole) -> bool {
        match role {
            NodeRole::Etcd => self.etcd,
            NodeRole::ControlPlane => self.control_plane,
            NodeRole::Worker => self.worker,
        }
    }
}

/// A sized, role-tagged group of nodes sharing a node template
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodePool {
    /// Number of nodes this pool contributes
    ///
    /// Kept as entered: the wizard binds a free-form text input here, so the
    /// value may be momentarily empty or non-numeric. [`NodePool::count`]
    /// applies the permissive parse.
    #[serde(
        default,
        deserialize_with = "quantity_from_number_or_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub quantity: Option<String>,

    /// Whether nodes in this pool run etcd
    #[serde(default)]
    pub etcd: bool,

    /// Whether nodes in this pool run the control plane
    #[serde(default)]
    pub control_plane: bool,

    /// Whether nodes in this pool are workers
    #[serde(default)]
    pub worker: bool,

    /// Reference to the node template used to provision this pool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_template_id: Option<String>,

    /// Hostname prefix for provisioned nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname_prefix: Option<String>,
}

/// Accept either a JSON number or a string for the pool quantity
fn quantity_from_number_or_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Number(n) => n.to_string(),
        Raw::Text(s) => s,
    }))
}

impl NodePool {
    /// Create a pool reusing the given node template
    pub fn with_template(node_template_id: Option<String>) -> Self {
        Self {
            node_template_id,
            ..Default::default()
        }
    }

    /// Whether this pool holds the given role
    pub fn has_role(&self, role: NodeRole) -> bool {
        match role {
            NodeRole::Etcd => self.etcd,
            NodeRole::ControlPlane => self.control_plane,
            NodeRole::Worker => self.worker,
        }
    }

    /// The node count this pool contributes
    ///
    /// Quantity is parsed as a non-negative base-10 integer; parse failure or
    /// a missing value contributes 0.
    pub fn count(&self) -> u32 {
        self.quantity
            .as_deref()
            .and_then(|q| q.trim().parse::<u32>().ok())
            .unwrap_or(0)
    }
}

/// Total node count over pools holding the given role
///
/// Sums [`NodePool::count`] over every pool with the role flag set.
pub fn count_by_role(pools: &[NodePool], role: NodeRole) -> u32 {
    pools
        .iter()
        .filter(|p| p.has_role(role))
        .map(NodePool::count)
        .sum()
}

/// Validate the quorum rules over the given pools
///
/// Each rule is checked independently - no short-circuiting - so the user
/// sees the full correction list at once. Messages come back in the fixed
/// order etcd, control plane, worker. An empty result means validation
/// passed. Callers append these to any externally-supplied error list.
///
/// Custom-node clusters skip these checks entirely (nodes register
/// out-of-band); that decision belongs to the driver, not here.
pub fn validate_quorum(pools: &[NodePool]) -> Vec<&'static str> {
    let mut errors = Vec::new();

    let etcd = count_by_role(pools, NodeRole::Etcd);
    if !matches!(etcd, 1 | 3 | 5) {
        errors.push(MSG_ETCD_QUORUM);
    }

    if count_by_role(pools, NodeRole::ControlPlane) < 1 {
        errors.push(MSG_CONTROL_PLANE_REQUIRED);
    }

    if count_by_role(pools, NodeRole::Worker) < 1 {
        errors.push(MSG_WORKER_REQUIRED);
    }

    errors
}
