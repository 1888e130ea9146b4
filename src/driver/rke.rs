//! RKE cluster driver
//!
//! Drives the multi-step creation wizard for RKE clusters: node-pool
//! composition, Kubernetes version selection, quorum validation, and - for
//! custom clusters whose nodes register out-of-band - the agent registration
//! command.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::agent::{AgentCommand, RegistrationToken, TokenSource};
use crate::cluster::{
    AuthStrategy, AuthnConfig, Cluster, NetworkConfig, NetworkPlugin, NodeTemplate, PrivateRegistry,
    RkeConfig,
};
use crate::driver::ClusterDriver;
use crate::settings::{self, Settings};
use crate::topology::{validate_quorum, NodePool, RoleFlags};
use crate::version::{reconcile_selected_version, version_choices};
use crate::{Error, Result};

/// Where the cluster's nodes come from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeSource {
    /// Nodes provisioned from node templates of the named node driver
    Template {
        /// Node driver name (e.g. "amazonec2")
        driver: String,
    },
    /// Nodes registered out-of-band by running the agent command
    Custom,
}

impl NodeSource {
    /// Whether nodes register out-of-band
    pub fn is_custom(&self) -> bool {
        matches!(self, Self::Custom)
    }

    /// The node driver name, if nodes are template-provisioned
    pub fn driver_name(&self) -> Option<&str> {
        match self {
            Self::Template { driver } => Some(driver),
            Self::Custom => None,
        }
    }
}

/// Which registry the engine pulls system images from
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum RegistrySource {
    /// The public default registry
    #[default]
    Default,
    /// A user-supplied private registry
    Custom {
        /// Registry URL
        url: String,
        /// Username
        user: Option<String>,
        /// Password
        password: Option<String>,
    },
}

/// Construction options for [`RkeDriver`]
///
/// Defaults that used to be ambient (role flags for registered nodes, the
/// network plugin for new configs) are supplied explicitly here.
#[derive(Clone, Debug)]
pub struct RkeDriverOptions {
    /// Where the cluster's nodes come from
    pub node_source: NodeSource,

    /// Whether an existing cluster is being edited
    pub editing: bool,

    /// Server URL embedded in the agent registration command
    pub server_url: String,

    /// Network plugin used when creating a default engine config
    pub default_network_plugin: NetworkPlugin,

    /// Authentication strategy used when creating a default engine config
    pub default_auth_strategy: AuthStrategy,

    /// Role flags preselected for registered custom nodes
    pub default_roles: RoleFlags,
}

impl RkeDriverOptions {
    /// Options for a new cluster with the conventional defaults
    /// (canal networking, x509 auth, worker-only registration)
    pub fn new(node_source: NodeSource, server_url: impl Into<String>) -> Self {
        Self {
            node_source,
            editing: false,
            server_url: server_url.into(),
            default_network_plugin: NetworkPlugin::Canal,
            default_auth_strategy: AuthStrategy::X509,
            default_roles: RoleFlags::worker_only(),
        }
    }

    /// Mark the driver as editing an existing cluster
    pub fn editing(mut self, editing: bool) -> Self {
        self.editing = editing;
        self
    }
}

/// The RKE implementation of [`ClusterDriver`]
pub struct RkeDriver {
    cluster: Cluster,
    options: RkeDriverOptions,
    settings: Arc<dyn Settings>,
    tokens: Arc<dyn TokenSource>,
    initial_version: Option<String>,
    initial_node_counts: HashMap<String, u32>,
    errors: Vec<String>,
    labels: Vec<(String, String)>,
    roles: RoleFlags,
    registry: RegistrySource,
    step: u8,
    token: Option<RegistrationToken>,
}

impl RkeDriver {
    /// Create a driver over the given cluster
    ///
    /// Fills in a default engine config when the cluster has none (version
    /// from the settings default, auth and network from the options),
    /// pre-creates one node pool for non-custom clusters, and records the
    /// version the edit started from.
    pub fn new(
        mut cluster: Cluster,
        options: RkeDriverOptions,
        settings: Arc<dyn Settings>,
        tokens: Arc<dyn TokenSource>,
    ) -> Self {
        if cluster.rke_config.is_none() {
            cluster.rke_config = Some(RkeConfig {
                kubernetes_version: settings.get(settings::VERSION_K8S_DEFAULT),
                authentication: Some(AuthnConfig {
                    strategy: options.default_auth_strategy,
                }),
                network: Some(NetworkConfig {
                    plugin: options.default_network_plugin,
                }),
                private_registries: Vec::new(),
            });
            debug!("created default engine config");
        }

        let initial_version = cluster
            .rke_config
            .as_ref()
            .and_then(|c| c.kubernetes_version.clone());
        let roles = options.default_roles;

        let mut driver = Self {
            cluster,
            options,
            settings,
            tokens,
            initial_version,
            initial_node_counts: HashMap::new(),
            errors: Vec::new(),
            labels: Vec::new(),
            roles,
            registry: RegistrySource::Default,
            step: 1,
            token: None,
        };

        if !driver.options.node_source.is_custom() && driver.cluster.node_pools.is_none() {
            driver.add_pool();
        }

        driver
    }

    /// The cluster being edited
    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    /// Mutable access to the cluster being edited
    pub fn cluster_mut(&mut self) -> &mut Cluster {
        &mut self.cluster
    }

    /// Consume the driver, returning the edited cluster
    pub fn into_cluster(self) -> Cluster {
        self.cluster
    }

    /// Current wizard step (1 = configure, 2 = register nodes)
    pub fn step(&self) -> u8 {
        self.step
    }

    /// The registration token, once issued by [`done_saving`](ClusterDriver::done_saving)
    pub fn token(&self) -> Option<&RegistrationToken> {
        self.token.as_ref()
    }

    /// Collected validation messages
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Append an externally-supplied validation message
    pub fn push_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    /// Add a node pool, carrying the last pool's node template forward
    pub fn add_pool(&mut self) {
        let template_id = self
            .cluster
            .pools()
            .last()
            .and_then(|p| p.node_template_id.clone());

        self.cluster
            .pools_mut()
            .push(NodePool::with_template(template_id));
        debug!(pools = self.cluster.pools().len(), "added node pool");
    }

    /// Remove the node pool at the given index
    pub fn remove_pool(&mut self, index: usize) {
        let pools = self.cluster.pools_mut();
        if index < pools.len() {
            pools.remove(index);
            debug!(pools = pools.len(), "removed node pool");
        }
    }

    /// Replace the labels applied to registered nodes
    ///
    /// Rows come straight from the form: duplicate keys keep their first
    /// position and the last value wins.
    pub fn set_labels<I, K, V>(&mut self, rows: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut out: Vec<(String, String)> = Vec::new();
        for (key, value) in rows {
            let (key, value) = (key.into(), value.into());
            match out.iter_mut().find(|(k, _)| *k == key) {
                Some(entry) => entry.1 = value,
                None => out.push((key, value)),
            }
        }
        self.labels = out;
    }

    /// Labels applied to registered nodes, in insertion order
    pub fn labels(&self) -> &[(String, String)] {
        &self.labels
    }

    /// Set the role flags preselected for registered nodes
    pub fn set_roles(&mut self, roles: RoleFlags) {
        self.roles = roles;
    }

    /// Select which registry the engine pulls from
    pub fn set_registry(&mut self, registry: RegistrySource) {
        self.registry = registry;
    }

    /// The currently selected Kubernetes version
    pub fn current_version(&self) -> Option<&str> {
        self.cluster
            .rke_config
            .as_ref()
            .and_then(|c| c.kubernetes_version.as_deref())
    }

    /// Select a Kubernetes version
    pub fn set_version(&mut self, version: impl Into<String>) {
        if let Some(config) = self.cluster.rke_config.as_mut() {
            config.kubernetes_version = Some(version.into());
        }
    }

    /// The Kubernetes versions this cluster may run
    ///
    /// Parsed from the settings-supplied mapping and filtered against the
    /// version the edit started from (or the default floor for new
    /// clusters).
    pub fn version_choices(&self) -> Result<Vec<String>> {
        let blob = self.settings.get(settings::VERSIONS_K8S).unwrap_or_default();
        version_choices(&blob, self.initial_version.as_deref(), self.options.editing)
    }

    /// Keep the selected version inside the allowed set
    ///
    /// Run whenever the available set changes. An out-of-set selection is
    /// reset to the first choice; with no choices the selection is left
    /// alone.
    pub fn reconcile_version(&mut self) -> Result<()> {
        let choices = self.version_choices()?;
        let reconciled = reconcile_selected_version(self.current_version(), &choices);

        if let Some(version) = reconciled {
            if self.current_version() != Some(version.as_str()) {
                info!(version = %version, "selected version no longer offered, resetting");
                self.set_version(version);
            }
        }
        Ok(())
    }

    /// Seed the per-cluster node-count baseline
    ///
    /// Called by the host when its (single, fire-and-forget) listing of
    /// existing nodes resolves. Until then every count reads as zero, a safe
    /// under-count.
    pub fn record_initial_counts(&mut self, counts: HashMap<String, u32>) {
        self.initial_node_counts = counts;
    }

    /// Nodes registered since editing began
    ///
    /// `current` is the number of nodes the host currently sees for this
    /// cluster. The baseline self-heals downward when nodes disappear so the
    /// delta never goes negative.
    pub fn new_node_count(&mut self, current: u32) -> u32 {
        let cluster_id = self.cluster.id.clone().unwrap_or_default();
        let baseline = self
            .initial_node_counts
            .entry(cluster_id)
            .or_insert(0);

        if current < *baseline {
            *baseline = current;
        }

        current - *baseline
    }

    /// Node templates offerable for this cluster's pools
    ///
    /// Active templates of the driver the cluster provisions with; empty for
    /// custom clusters.
    pub fn filter_node_templates<'a>(&self, templates: &'a [NodeTemplate]) -> Vec<&'a NodeTemplate> {
        let Some(driver) = self.options.node_source.driver_name() else {
            return Vec::new();
        };

        templates
            .iter()
            .filter(|t| t.is_active() && t.driver == driver)
            .collect()
    }

    /// The agent registration command for custom nodes
    ///
    /// Best-effort: renders placeholders for the token until
    /// [`done_saving`](ClusterDriver::done_saving) issues one.
    pub fn agent_command(&self) -> String {
        let mut command = AgentCommand::new()
            .server_url(&self.options.server_url)
            .roles(self.roles)
            .labels(self.labels.iter().cloned());

        if let Some(image) = self.settings.get(settings::AGENT_IMAGE) {
            command = command.image(image);
        }
        if let Some(cacerts) = self.settings.get(settings::CA_CERTS) {
            command = command.ca_certs(cacerts);
        }
        if let Some(token) = &self.token {
            command = command.token(token.as_str());
        }

        command.build()
    }
}

#[async_trait]
impl ClusterDriver for RkeDriver {
    /// Validate node-pool quorum rules
    ///
    /// Custom clusters skip the checks - their nodes register out-of-band.
    /// Quorum messages from a previous run are replaced; externally-supplied
    /// messages are kept, so repeated validation stays composable.
    fn validate(&mut self) -> bool {
        use crate::topology::{MSG_CONTROL_PLANE_REQUIRED, MSG_ETCD_QUORUM, MSG_WORKER_REQUIRED};

        self.errors.retain(|e| {
            e != MSG_ETCD_QUORUM && e != MSG_CONTROL_PLANE_REQUIRED && e != MSG_WORKER_REQUIRED
        });

        if !self.options.node_source.is_custom() {
            let violations = validate_quorum(self.cluster.pools());
            self.errors.extend(violations.iter().map(|m| m.to_string()));
        }

        self.errors.is_empty()
    }

    /// Attach the private registry, if one was selected
    fn will_save(&mut self) -> Result<()> {
        if let RegistrySource::Custom {
            url,
            user,
            password,
        } = &self.registry
        {
            let config = self
                .cluster
                .rke_config
                .as_mut()
                .ok_or_else(|| Error::validation("cluster has no engine config"))?;

            config.private_registries = vec![PrivateRegistry {
                url: url.clone(),
                user: user.clone(),
                password: password.clone(),
            }];
        }
        Ok(())
    }

    /// For custom clusters: obtain the registration token and advance to the
    /// node-registration step. No-op otherwise.
    async fn done_saving(&mut self) -> Result<()> {
        if !self.options.node_source.is_custom() {
            return Ok(());
        }

        let cluster_id = self
            .cluster
            .id
            .clone()
            .ok_or_else(|| Error::token("cluster has no id after save"))?;

        let token = self.tokens.get_or_create_token(&cluster_id).await?;
        info!(cluster = %cluster_id, "registration token issued");

        self.token = Some(token);
        self.step = 2;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::MemoryTokenSource;
    use crate::settings::MemorySettings;
    use crate::topology::{MSG_CONTROL_PLANE_REQUIRED, MSG_ETCD_QUORUM, MSG_WORKER_REQUIRED};

    const VERSIONS: &str = r#"{"1.8.0": {}, "1.9.2": {}, "1.10.0": {}}"#;

    fn test_settings() -> Arc<dyn Settings> {
        Arc::new(
            MemorySettings::new()
                .with(settings::VERSION_K8S_DEFAULT, "1.10.0")
                .with(settings::VERSIONS_K8S, VERSIONS)
                .with(settings::AGENT_IMAGE, "registry.local/agent:v1.2.3")
                .with(settings::CA_CERTS, "test"),
        )
    }

    fn template_driver(cluster: Cluster) -> RkeDriver {
        RkeDriver::new(
            cluster,
            RkeDriverOptions::new(
                NodeSource::Template {
                    driver: "amazonec2".to_string(),
                },
                "https://console.local",
            ),
            test_settings(),
            Arc::new(MemoryTokenSource::new()),
        )
    }

    fn custom_driver(cluster: Cluster) -> RkeDriver {
        RkeDriver::new(
            cluster,
            RkeDriverOptions::new(NodeSource::Custom, "https://console.local"),
            test_settings(),
            Arc::new(MemoryTokenSource::new()),
        )
    }

    fn pool(quantity: &str, etcd: bool, control_plane: bool, worker: bool) -> NodePool {
        NodePool {
            quantity: Some(quantity.to_string()),
            etcd,
            control_plane,
            worker,
            ..Default::default()
        }
    }

    // =========================================================================
    // Initialization Stories
    // =========================================================================

    /// Story: a fresh cluster gets the conventional engine defaults
    ///
    /// Version from the settings default, x509 auth, canal networking - all
    /// supplied explicitly through options/settings, not ambient globals.
    #[test]
    fn story_new_cluster_gets_default_engine_config() {
        let driver = template_driver(Cluster::default());
        let config = driver.cluster().rke_config.as_ref().unwrap();

        assert_eq!(config.kubernetes_version.as_deref(), Some("1.10.0"));
        assert_eq!(
            config.authentication.as_ref().unwrap().strategy,
            AuthStrategy::X509
        );
        assert_eq!(
            config.network.as_ref().unwrap().plugin,
            NetworkPlugin::Canal
        );
    }

    /// Story: an existing engine config is left untouched
    #[test]
    fn story_existing_engine_config_is_preserved() {
        let cluster = Cluster {
            rke_config: Some(RkeConfig {
                kubernetes_version: Some("1.9.2".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let driver = template_driver(cluster);

        let config = driver.cluster().rke_config.as_ref().unwrap();
        assert_eq!(config.kubernetes_version.as_deref(), Some("1.9.2"));
        assert!(config.network.is_none());
    }

    /// Story: non-custom clusters start with one empty pool, custom with none
    #[test]
    fn story_first_pool_is_precreated_except_for_custom() {
        let driver = template_driver(Cluster::default());
        assert_eq!(driver.cluster().pools().len(), 1);

        let custom = custom_driver(Cluster::default());
        assert!(custom.cluster().pools().is_empty());
    }

    // =========================================================================
    // Node Pool Stories
    // =========================================================================

    /// Story: a new pool reuses the last pool's node template
    #[test]
    fn story_added_pool_carries_template_forward() {
        let mut driver = template_driver(Cluster::default());
        driver.cluster_mut().pools_mut()[0].node_template_id = Some("nt-1".to_string());

        driver.add_pool();

        let pools = driver.cluster().pools();
        assert_eq!(pools.len(), 2);
        assert_eq!(pools[1].node_template_id.as_deref(), Some("nt-1"));
    }

    /// Story: pools are removed by explicit user action
    #[test]
    fn story_remove_pool_by_index() {
        let mut driver = template_driver(Cluster::default());
        driver.add_pool();
        assert_eq!(driver.cluster().pools().len(), 2);

        driver.remove_pool(0);
        assert_eq!(driver.cluster().pools().len(), 1);

        // Out-of-bounds removal is a no-op
        driver.remove_pool(7);
        assert_eq!(driver.cluster().pools().len(), 1);
    }

    /// Story: label rows collapse to a last-wins ordered map
    #[test]
    fn story_labels_last_wins_preserving_order() {
        let mut driver = custom_driver(Cluster::default());
        driver.set_labels([("a", "1"), ("b", "2"), ("a", "3")]);

        assert_eq!(
            driver.labels(),
            &[
                ("a".to_string(), "3".to_string()),
                ("b".to_string(), "2".to_string())
            ]
        );
    }

    // =========================================================================
    // Validation Stories
    // =========================================================================

    /// Story: quorum violations block the save with one message per rule
    #[test]
    fn story_validate_reports_quorum_violations() {
        let mut driver = template_driver(Cluster::default());
        *driver.cluster_mut().pools_mut() = vec![pool("2", true, true, true)];

        assert!(!driver.validate());
        assert_eq!(driver.errors(), &[MSG_ETCD_QUORUM.to_string()]);

        *driver.cluster_mut().pools_mut() =
            vec![pool("3", true, false, false), pool("2", false, true, true)];
        assert!(driver.validate());
        assert!(driver.errors().is_empty());
    }

    /// Story: quorum messages compose with externally-supplied errors
    ///
    /// The host appends its own validation messages first; ours join the
    /// list rather than replacing it, and re-validation does not duplicate.
    #[test]
    fn story_validate_composes_with_external_errors() {
        let mut driver = template_driver(Cluster::default());
        *driver.cluster_mut().pools_mut() = vec![pool("1", false, false, false)];
        driver.push_error("name is required");

        assert!(!driver.validate());
        assert_eq!(
            driver.errors(),
            &[
                "name is required".to_string(),
                MSG_ETCD_QUORUM.to_string(),
                MSG_CONTROL_PLANE_REQUIRED.to_string(),
                MSG_WORKER_REQUIRED.to_string()
            ]
        );

        // Re-running keeps the external message and does not stack ours
        assert!(!driver.validate());
        assert_eq!(driver.errors().len(), 4);
    }

    /// Story: custom clusters skip quorum checks entirely
    #[test]
    fn story_custom_clusters_skip_quorum() {
        let mut driver = custom_driver(Cluster::default());
        assert!(driver.validate());
        assert!(driver.errors().is_empty());
    }

    // =========================================================================
    // Version Selection Stories
    // =========================================================================

    /// Story: choices follow the settings mapping and the editing floor
    #[test]
    fn story_version_choices_filtered_by_initial_version() {
        let cluster = Cluster {
            rke_config: Some(RkeConfig {
                kubernetes_version: Some("1.9.2".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let driver = template_driver(cluster);

        // Floor is >= 1.9.2, the version editing started from
        assert_eq!(driver.version_choices().unwrap(), vec!["1.9.2", "1.10.0"]);
    }

    /// Story: an edited cluster keeps its stale running version on offer
    #[test]
    fn story_editing_keeps_stale_version_on_offer() {
        let cluster = Cluster {
            rke_config: Some(RkeConfig {
                kubernetes_version: Some("0.9.0".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let mut driver = RkeDriver::new(
            cluster,
            RkeDriverOptions::new(
                NodeSource::Template {
                    driver: "amazonec2".to_string(),
                },
                "https://console.local",
            )
            .editing(true),
            test_settings(),
            Arc::new(MemoryTokenSource::new()),
        );

        let choices = driver.version_choices().unwrap();
        assert_eq!(choices[0], "0.9.0");

        // The running version stays selected after reconciliation
        driver.reconcile_version().unwrap();
        assert_eq!(driver.current_version(), Some("0.9.0"));
    }

    /// Story: an out-of-set selection self-heals to the first choice
    #[test]
    fn story_reconcile_resets_invalid_selection() {
        let mut driver = template_driver(Cluster::default());
        driver.set_version("2.0.0");

        driver.reconcile_version().unwrap();
        assert_eq!(driver.current_version(), Some("1.10.0"));
    }

    /// Story: missing version settings mean no choices, not an error
    #[test]
    fn story_missing_versions_setting_yields_no_choices() {
        let settings = Arc::new(MemorySettings::new());
        let mut driver = RkeDriver::new(
            Cluster::default(),
            RkeDriverOptions::new(NodeSource::Custom, "https://console.local"),
            settings,
            Arc::new(MemoryTokenSource::new()),
        );

        assert!(driver.version_choices().unwrap().is_empty());

        // Nothing to heal toward; the selection is left alone
        driver.set_version("1.9.2");
        driver.reconcile_version().unwrap();
        assert_eq!(driver.current_version(), Some("1.9.2"));
    }

    // =========================================================================
    // Save Lifecycle Stories
    // =========================================================================

    /// Story: a selected private registry is attached on save
    #[test]
    fn story_will_save_attaches_private_registry() {
        let mut driver = template_driver(Cluster::default());
        driver.set_registry(RegistrySource::Custom {
            url: "registry.corp.local".to_string(),
            user: Some("puller".to_string()),
            password: Some("hunter2".to_string()),
        });

        driver.will_save().unwrap();

        let registries = &driver.cluster().rke_config.as_ref().unwrap().private_registries;
        assert_eq!(registries.len(), 1);
        assert_eq!(registries[0].url, "registry.corp.local");
    }

    /// Story: the default registry leaves the config untouched
    #[test]
    fn story_will_save_default_registry_is_noop() {
        let mut driver = template_driver(Cluster::default());
        driver.will_save().unwrap();
        assert!(driver
            .cluster()
            .rke_config
            .as_ref()
            .unwrap()
            .private_registries
            .is_empty());
    }

    /// Story: saving a custom cluster issues the token and advances the wizard
    #[tokio::test]
    async fn story_done_saving_custom_issues_token_and_advances() {
        let cluster = Cluster {
            id: Some("c-1".to_string()),
            ..Default::default()
        };
        let mut driver = custom_driver(cluster);
        assert_eq!(driver.step(), 1);

        driver.done_saving().await.unwrap();

        assert_eq!(driver.step(), 2);
        assert!(driver.token().is_some());
    }

    /// Story: a non-custom save does not touch the wizard step
    #[tokio::test]
    async fn story_done_saving_noncustom_is_noop() {
        let mut driver = template_driver(Cluster::default());
        driver.done_saving().await.unwrap();
        assert_eq!(driver.step(), 1);
        assert!(driver.token().is_none());
    }

    /// Story: a custom cluster without an id cannot be issued a token
    #[tokio::test]
    async fn story_done_saving_custom_requires_cluster_id() {
        let mut driver = custom_driver(Cluster::default());
        let err = driver.done_saving().await.unwrap_err();
        assert!(err.to_string().contains("no id"));
    }

    // =========================================================================
    // Agent Command Stories
    // =========================================================================

    /// Story: the command embeds settings, roles, labels, and the token
    #[tokio::test]
    async fn story_agent_command_reflects_driver_state() {
        let cluster = Cluster {
            id: Some("c-1".to_string()),
            ..Default::default()
        };
        let mut driver = custom_driver(cluster);
        driver.set_roles(RoleFlags {
            etcd: true,
            control_plane: false,
            worker: true,
        });
        driver.set_labels([("env", "prod")]);

        // Before the save: placeholders, no token yet
        let preview = driver.agent_command();
        assert!(preview.contains("registry.local/agent:v1.2.3"));
        assert!(preview.contains("--token  "));

        driver.done_saving().await.unwrap();
        let command = driver.agent_command();
        let token = driver.token().unwrap().as_str().to_string();

        assert!(command.contains("--server https://console.local"));
        assert!(command.contains(&format!("--token {token}")));
        assert!(command.contains("--etcd"));
        assert!(!command.contains("--controlplane"));
        assert!(command.ends_with("--label env=prod"));
    }

    // =========================================================================
    // Node Baseline Stories
    // =========================================================================

    /// Story: nodes registered since edit start, tolerating a missing baseline
    ///
    /// The existing-nodes listing resolves asynchronously; until it does the
    /// baseline is zero and every current node counts as new - a safe
    /// under-count of progress, never an error.
    #[test]
    fn story_new_node_count_uses_baseline() {
        let cluster = Cluster {
            id: Some("c-1".to_string()),
            ..Default::default()
        };
        let mut driver = custom_driver(cluster);

        // Baseline not yet loaded: everything counts as new
        assert_eq!(driver.new_node_count(2), 2);

        driver.record_initial_counts(HashMap::from([("c-1".to_string(), 2)]));
        assert_eq!(driver.new_node_count(2), 0);
        assert_eq!(driver.new_node_count(5), 3);
    }

    /// Story: the baseline self-heals downward when nodes disappear
    #[test]
    fn story_new_node_count_baseline_self_heals() {
        let cluster = Cluster {
            id: Some("c-1".to_string()),
            ..Default::default()
        };
        let mut driver = custom_driver(cluster);
        driver.record_initial_counts(HashMap::from([("c-1".to_string(), 4)]));

        // Two nodes were deleted: baseline drops to match
        assert_eq!(driver.new_node_count(2), 0);
        // A new registration now counts from the healed baseline
        assert_eq!(driver.new_node_count(3), 1);
    }

    // =========================================================================
    // Node Template Stories
    // =========================================================================

    /// Story: only active templates of the cluster's driver are offered
    #[test]
    fn story_filter_node_templates_by_state_and_driver() {
        let templates = vec![
            NodeTemplate {
                id: "nt-1".to_string(),
                state: "active".to_string(),
                driver: "amazonec2".to_string(),
                ..Default::default()
            },
            NodeTemplate {
                id: "nt-2".to_string(),
                state: "removed".to_string(),
                driver: "amazonec2".to_string(),
                ..Default::default()
            },
            NodeTemplate {
                id: "nt-3".to_string(),
                state: "active".to_string(),
                driver: "digitalocean".to_string(),
                ..Default::default()
            },
        ];

        let driver = template_driver(Cluster::default());
        let offered = driver.filter_node_templates(&templates);
        assert_eq!(offered.len(), 1);
        assert_eq!(offered[0].id, "nt-1");

        // Custom clusters provision nothing
        let custom = custom_driver(Cluster::default());
        assert!(custom.filter_node_templates(&templates).is_empty());
    }
}
