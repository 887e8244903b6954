//! Orchestration clients
//!
//! The bootstrapper only talks to the swarm through [`SwarmApi`]. Three
//! implementations exist:
//!
//! - [`HttpEngine`]: Docker Engine REST API over TCP
//! - [`CliEngine`]: the local `docker` binary with JSON output
//! - [`InMemoryEngine`]: an in-process swarm used by tests

pub mod api;
pub mod cli;
pub mod http;
pub mod memory;

pub use cli::CliEngine;
pub use http::HttpEngine;
pub use memory::InMemoryEngine;

use crate::config::{BootstrapConfig, EngineEndpoint};
use crate::error::Result;
use crate::swarm::cluster::{JoinTokens, LocalSwarmStatus, SwarmInitRequest};
use crate::swarm::node::{Node, NodeRole};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Operations the bootstrapper consumes from the orchestration layer
#[async_trait]
pub trait SwarmApi: Send + Sync {
    /// Swarm status of the local engine
    async fn swarm_status(&self) -> Result<LocalSwarmStatus>;

    /// Initialize a new swarm, returning the new manager node ID
    async fn init_swarm(&self, request: &SwarmInitRequest) -> Result<String>;

    /// Current join tokens (manager only)
    async fn join_tokens(&self) -> Result<JoinTokens>;

    /// Rotate the join token of a role (manager only)
    async fn rotate_join_token(&self, role: NodeRole) -> Result<()>;

    /// All nodes, in the order the engine reports them
    async fn list_nodes(&self) -> Result<Vec<Node>>;

    /// One node by ID
    async fn inspect_node(&self, node_id: &str) -> Result<Node>;

    /// Merge labels into a node's label set in a single update
    async fn add_node_labels(&self, node_id: &str, labels: &BTreeMap<String, String>)
        -> Result<()>;

    /// Whether a network with this exact name exists
    async fn network_exists(&self, name: &str) -> Result<bool>;

    /// Create an attachable overlay network
    async fn create_overlay_network(&self, name: &str) -> Result<()>;
}

/// Build the client for the configured engine endpoint
pub fn connect(config: &BootstrapConfig) -> Result<Arc<dyn SwarmApi>> {
    let endpoint = config.endpoint()?;
    debug!("Connecting to engine at {:?}", endpoint);

    let api: Arc<dyn SwarmApi> = match endpoint {
        EngineEndpoint::Http(base_url) => Arc::new(HttpEngine::new(
            &base_url,
            &config.api_version,
            config.timeout(),
        )?),
        EngineEndpoint::Local(host) => Arc::new(
            CliEngine::new(&config.docker_binary, host).with_tls_verify(config.tls_verify),
        ),
    };

    Ok(api)
}
