//! Rudder CLI - validate cluster configurations and preview agent commands

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rudder::agent::MemoryTokenSource;
use rudder::cluster::Cluster;
use rudder::driver::{ClusterDriver, NodeSource, RkeDriver, RkeDriverOptions};
use rudder::settings::{self, MemorySettings};
use rudder::topology::RoleFlags;

/// Rudder - provisioning-side core for a Kubernetes cluster management console
#[derive(Parser, Debug)]
#[command(name = "rudder", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate a cluster configuration file
    ///
    /// Runs the RKE driver's quorum and version checks against the given
    /// cluster YAML and reports every violation at once.
    Validate(ValidateArgs),

    /// Print the agent registration command for a custom cluster
    ///
    /// The token slot renders empty until the server issues one; everything
    /// else (image, server URL, CA checksum, roles, labels) is filled in.
    AgentCommand(AgentCommandArgs),
}

/// Validate mode arguments
#[derive(Parser, Debug)]
struct ValidateArgs {
    /// Path to the cluster YAML configuration file
    #[arg(short = 'f', long = "config")]
    config_file: PathBuf,

    /// Node driver providing the cluster's node templates; omit for a
    /// custom cluster whose nodes register out-of-band
    #[arg(long)]
    node_driver: Option<String>,

    /// Treat the cluster as an existing one being edited
    #[arg(long)]
    editing: bool,

    /// JSON mapping of available Kubernetes versions
    #[arg(long, env = "RUDDER_K8S_VERSIONS")]
    k8s_versions: Option<String>,

    /// Default Kubernetes version for new clusters
    #[arg(long, env = "RUDDER_K8S_VERSION_DEFAULT")]
    default_version: Option<String>,

    /// Server URL agents connect back to
    #[arg(long, env = "RUDDER_SERVER_URL", default_value = "https://localhost:8443")]
    server_url: String,
}

/// Agent command mode arguments
#[derive(Parser, Debug)]
struct AgentCommandArgs {
    /// Path to the cluster YAML configuration file
    #[arg(short = 'f', long = "config")]
    config_file: PathBuf,

    /// Agent container image
    #[arg(long, env = "RUDDER_AGENT_IMAGE")]
    agent_image: String,

    /// Path to the CA certificate bundle to checksum
    #[arg(long)]
    cacerts_file: Option<PathBuf>,

    /// Server URL agents connect back to
    #[arg(long, env = "RUDDER_SERVER_URL", default_value = "https://localhost:8443")]
    server_url: String,

    /// Register nodes as etcd members
    #[arg(long)]
    etcd: bool,

    /// Register nodes as control plane members
    #[arg(long)]
    controlplane: bool,

    /// Register nodes as workers
    #[arg(long)]
    worker: bool,

    /// Labels applied to registered nodes, as key=value (repeatable)
    #[arg(long = "label")]
    labels: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate(args) => run_validate(args).await,
        Commands::AgentCommand(args) => run_agent_command(args).await,
    }
}

/// Read and parse a cluster configuration file
async fn read_cluster(path: &PathBuf) -> anyhow::Result<Cluster> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read config file {:?}: {}", path, e))?;

    serde_yaml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Failed to parse cluster config: {}", e))
}

/// Validate a cluster configuration and report every violation
async fn run_validate(args: ValidateArgs) -> anyhow::Result<()> {
    let cluster = read_cluster(&args.config_file).await?;

    let mut settings = MemorySettings::new();
    if let Some(versions) = &args.k8s_versions {
        settings.insert(settings::VERSIONS_K8S, versions.clone());
    }
    if let Some(version) = &args.default_version {
        settings.insert(settings::VERSION_K8S_DEFAULT, version.clone());
    }

    let node_source = match args.node_driver {
        Some(driver) => NodeSource::Template { driver },
        None => NodeSource::Custom,
    };

    let options =
        RkeDriverOptions::new(node_source, args.server_url).editing(args.editing);
    let mut driver = RkeDriver::new(
        cluster,
        options,
        Arc::new(settings),
        Arc::new(MemoryTokenSource::new()),
    );

    println!("=== Rudder Validate ===");
    println!("Config file: {:?}", args.config_file);
    println!(
        "Kubernetes version: {}",
        driver.current_version().unwrap_or("(unset)")
    );

    let choices = driver.version_choices()?;
    if !choices.is_empty() {
        println!("Allowed versions: {}", choices.join(", "));
        driver.reconcile_version()?;
    }

    if driver.validate() {
        println!("OK: cluster configuration is valid");
        return Ok(());
    }

    println!("Validation failed:");
    for message in driver.errors() {
        println!("  - {}", message);
    }
    anyhow::bail!("{} validation error(s)", driver.errors().len())
}

/// Print the agent registration command for a custom cluster
async fn run_agent_command(args: AgentCommandArgs) -> anyhow::Result<()> {
    let cluster = read_cluster(&args.config_file).await?;

    let mut settings = MemorySettings::new();
    settings.insert(settings::AGENT_IMAGE, args.agent_image.clone());
    if let Some(path) = &args.cacerts_file {
        let cacerts = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read CA bundle {:?}: {}", path, e))?;
        settings.insert(settings::CA_CERTS, cacerts);
    }

    let options = RkeDriverOptions::new(NodeSource::Custom, args.server_url);
    let mut driver = RkeDriver::new(
        cluster,
        options,
        Arc::new(settings),
        Arc::new(MemoryTokenSource::new()),
    );

    driver.set_roles(RoleFlags {
        etcd: args.etcd,
        control_plane: args.controlplane,
        worker: args.worker,
    });

    let labels: Vec<(String, String)> = args
        .labels
        .iter()
        .map(|raw| {
            raw.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| anyhow::anyhow!("Invalid label {:?}, expected key=value", raw))
        })
        .collect::<anyhow::Result<_>>()?;
    driver.set_labels(labels);

    println!("{}", driver.agent_command());
    Ok(())
}
