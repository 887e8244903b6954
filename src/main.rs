//! Serpens - Docker Swarm bootstrap for the Serpens deployment cluster
//!
//! This is the main CLI entry point for Serpens.

use clap::{Parser, Subcommand};
use serde_json::json;
use serpens::config::BootstrapConfig;
use serpens::engine;
use serpens::error::Result;
use serpens::swarm::{
    BootstrapOptions, ClusterBootstrapper, ClusterState, JoinDirective, Node, NodeLabels,
    NodeRole, SELF_NODE,
};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Serpens - Docker Swarm bootstrap
#[derive(Parser)]
#[command(name = "serpens")]
#[command(author = "Evoker Industries")]
#[command(version)]
#[command(about = "Bootstrap, label and grow the Serpens Docker Swarm cluster", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Config file (defaults to the user config directory)
    #[arg(short, long, global = true, env = "SERPENS_CONFIG")]
    config: Option<PathBuf>,

    /// Engine host (unix://, ssh://, tcp://, http:// or https://)
    #[arg(short = 'H', long, global = true, env = "DOCKER_HOST")]
    host: Option<String>,

    /// Use TLS with client certificates for tcp:// hosts
    #[arg(
        long,
        global = true,
        env = "DOCKER_TLS_VERIFY",
        value_parser = clap::builder::FalseyValueParser::new()
    )]
    tlsverify: bool,

    /// Timeout for each engine call, in seconds
    #[arg(long, global = true, env = "SERPENS_TIMEOUT")]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the swarm on this host unless it already runs one
    Init {
        /// Listen address
        #[arg(long)]
        listen_addr: Option<String>,
        /// Advertise address
        #[arg(long)]
        advertise_addr: Option<String>,
        /// Overlay network to ensure
        #[arg(long, conflicts_with = "no_network")]
        network: Option<String>,
        /// Do not create the overlay network
        #[arg(long)]
        no_network: bool,
    },

    /// Show the control-plane state and members
    Status,

    /// Label a node with its role class and name
    Label {
        /// Node ID, hostname, or "self"
        #[arg(default_value = SELF_NODE)]
        node: String,
        /// Role class (manager, tiny, heavy, ...)
        #[arg(long = "type")]
        class: Option<String>,
        /// Human identifier
        #[arg(long)]
        name: Option<String>,
        /// Extra label (key=value)
        #[arg(short, long)]
        label: Vec<String>,
    },

    /// Print the command a new node runs to join
    #[command(name = "join-command")]
    JoinCommand {
        /// Join as a manager instead of a worker
        #[arg(long)]
        manager: bool,
        /// Rotate the token first
        #[arg(long)]
        rotate: bool,
    },

    /// List nodes
    Nodes,

    /// Inspect a node
    Inspect {
        /// Node ID, hostname, or "self"
        node: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = BootstrapConfig::load(cli.config.as_deref())?;
    if cli.host.is_some() {
        config.host = cli.host;
    }
    if cli.tlsverify {
        config.tls_verify = true;
    }
    if let Some(timeout) = cli.timeout {
        config.timeout_secs = timeout;
    }

    if let Commands::Init {
        listen_addr,
        advertise_addr,
        network,
        no_network,
    } = &cli.command
    {
        if let Some(addr) = listen_addr {
            config.listen_addr = addr.clone();
        }
        if let Some(addr) = advertise_addr {
            config.advertise_addr = Some(addr.clone());
        }
        if let Some(name) = network {
            config.network = Some(name.clone());
        }
        if *no_network {
            config.network = None;
        }
    }

    config.validate()?;
    debug!("Effective config: {:?}", config);

    let api = engine::connect(&config)?;
    let bootstrapper = ClusterBootstrapper::new(api, BootstrapOptions::from(&config));

    match cli.command {
        Commands::Init { .. } => {
            let state = bootstrapper.ensure_control_plane().await?;
            let worker = bootstrapper.issue_worker_join_directive().await?;
            let manager = bootstrapper.issue_join_directive(NodeRole::Manager).await?;

            if cli.json {
                print_json(&json!({
                    "cluster": state,
                    "worker": worker,
                    "manager": manager,
                }))?;
            } else {
                print_init(&state, &worker, &manager);
            }
        }

        Commands::Status => {
            let state = bootstrapper.cluster_state().await?;
            if cli.json {
                print_json(&state)?;
            } else {
                print_status(&state);
            }
        }

        Commands::Label {
            node,
            class,
            name,
            label,
        } => {
            let mut labels = NodeLabels::new();
            if let Some(class) = class {
                labels = labels.with_class(&class);
            }
            if let Some(name) = name {
                labels = labels.with_name(&name);
            }
            for pair in &label {
                labels.insert_pair(pair)?;
            }
            labels.validate()?;

            let target = bootstrapper.resolve_node(&node).await?;
            bootstrapper.label_node(&target.id, &labels).await?;
            let updated = bootstrapper.inspect_node(&target.id).await?;

            if cli.json {
                print_json(&updated)?;
            } else {
                println!("Labeled node {} ({})", updated.id, updated.hostname);
                for (key, value) in &updated.labels {
                    println!("    {}={}", key, value);
                }
            }
        }

        Commands::JoinCommand { manager, rotate } => {
            let role = if manager {
                NodeRole::Manager
            } else {
                NodeRole::Worker
            };
            let directive = if rotate {
                bootstrapper.rotate_join_token(role).await?
            } else {
                bootstrapper.issue_join_directive(role).await?
            };

            if cli.json {
                print_json(&directive)?;
            } else {
                println!("To add a {} to this swarm, run the following command:", role);
                println!();
                println!("    {}", directive.command());
                println!();
            }
        }

        Commands::Nodes => {
            let nodes = bootstrapper.list_nodes().await?;
            if cli.json {
                print_json(&nodes)?;
            } else {
                print_nodes(&nodes);
            }
        }

        Commands::Inspect { node } => {
            let node = bootstrapper.resolve_node(&node).await?;
            print_json(&node)?;
        }
    }

    Ok(())
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_init(state: &ClusterState, worker: &JoinDirective, manager: &JoinDirective) {
    let manager_id = state.manager_id.as_deref().unwrap_or("unknown");
    if state.initialized {
        println!(
            "Swarm initialized: current node ({}) is now a manager.",
            manager_id
        );
    } else {
        println!(
            "Swarm already active: current node ({}) is a manager.",
            manager_id
        );
    }
    if let Some(ref network) = state.network_created {
        println!("Created overlay network {}.", network);
    }

    println!("\nTo add a worker to this swarm, run:");
    println!("    {}", worker.command());
    println!("\nTo add a manager to this swarm, run:");
    println!("    {}", manager.command());
    println!("\nThen label the new node from this manager:");
    println!("    serpens label <hostname> --type <class> --name <name>");
}

fn print_status(state: &ClusterState) {
    println!("Swarm: {}", state.state);
    if state.is_worker() {
        println!("This host is a worker; run serpens against a manager instead.");
        return;
    }
    if !state.is_active() {
        println!("Local engine swarm state: {}", state.local_state);
        println!("Run `serpens init` to create the control plane.");
        return;
    }
    if let Some(ref id) = state.cluster_id {
        println!(" Cluster ID:   {}", id);
    }
    if let Some(ref id) = state.manager_id {
        println!(" Manager node: {}", id);
    }
    if let Some(ref addr) = state.manager_addr {
        println!(" Manager addr: {}", addr);
    }
    let unlabeled = state.nodes.iter().filter(|n| !n.is_fully_labeled()).count();
    println!(" Nodes:        {} ({} missing type/name labels)", state.nodes.len(), unlabeled);
}

fn print_nodes(nodes: &[Node]) {
    println!(
        "{:<27} {:<16} {:<8} {:<13} {:<15} {:<10} NAME",
        "ID", "HOSTNAME", "STATUS", "AVAILABILITY", "MANAGER STATUS", "TYPE"
    );
    for node in nodes {
        println!(
            "{:<27} {:<16} {:<8} {:<13} {:<15} {:<10} {}",
            node.id,
            node.hostname,
            node.state.to_string(),
            node.availability.to_string(),
            node.manager_status_display(),
            node.class().unwrap_or("-"),
            node.name().unwrap_or("-"),
        );
    }
}
