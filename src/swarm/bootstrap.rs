//! Cluster bootstrapper
//!
//! Makes the local host a swarm manager exactly once and hands operators
//! what they need to add and label more nodes. All state lives in the
//! orchestration layer; every call goes through the injected [`SwarmApi`]
//! and is bounded by the configured call timeout.

use super::cluster::{
    ClusterState, ControlPlaneState, JoinDirective, LocalNodeState, LocalSwarmStatus,
    SwarmInitRequest,
};
use super::labels::NodeLabels;
use super::node::{Node, NodeRole};
use crate::config::{BootstrapConfig, DEFAULT_TIMEOUT_SECS};
use crate::engine::SwarmApi;
use crate::error::{Result, SerpensError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Node reference meaning "the node this host runs"
pub const SELF_NODE: &str = "self";

/// Bootstrap options
#[derive(Debug, Clone)]
pub struct BootstrapOptions {
    /// Parameters used when the swarm has to be initialized
    pub init: SwarmInitRequest,
    /// Overlay network to ensure once the control plane is active
    pub network: Option<String>,
    /// Upper bound for each orchestration call
    pub call_timeout: Duration,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self {
            init: SwarmInitRequest::default(),
            network: None,
            call_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl From<&BootstrapConfig> for BootstrapOptions {
    fn from(config: &BootstrapConfig) -> Self {
        Self {
            init: config.init_request(),
            network: config.network.clone(),
            call_timeout: config.timeout(),
        }
    }
}

/// Converges the local host to an active swarm manager
pub struct ClusterBootstrapper {
    api: Arc<dyn SwarmApi>,
    options: BootstrapOptions,
}

impl ClusterBootstrapper {
    pub fn new(api: Arc<dyn SwarmApi>, options: BootstrapOptions) -> Self {
        Self { api, options }
    }

    pub fn options(&self) -> &BootstrapOptions {
        &self.options
    }

    /// Bound one orchestration call; expiry counts as the engine being unreachable
    async fn call<T, F>(&self, what: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        debug!("Engine call: {}", what);
        match tokio::time::timeout(self.options.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(SerpensError::OrchestrationUnavailable(format!(
                "{} timed out after {}s",
                what,
                self.options.call_timeout.as_secs_f64()
            ))),
        }
    }

    async fn status(&self) -> Result<LocalSwarmStatus> {
        self.call("swarm status", self.api.swarm_status()).await
    }

    /// Status of a host that must already run the control plane
    async fn require_manager(&self) -> Result<LocalSwarmStatus> {
        let status = self.status().await?;
        if status.is_manager() {
            return Ok(status);
        }

        let reason = match status.state {
            LocalNodeState::Active => "this node is a worker, not a swarm manager".to_string(),
            state => format!("swarm is {} on this host; run init first", state),
        };
        Err(SerpensError::ControlPlaneInactive(reason))
    }

    /// Make sure this host runs an active control plane
    ///
    /// Initializes the swarm only when the engine reports it inactive; an
    /// active manager is left untouched. Also ensures the configured overlay
    /// network.
    pub async fn ensure_control_plane(&self) -> Result<ClusterState> {
        let status = self.status().await?;

        let (status, initialized) = match status.state {
            LocalNodeState::Active if status.control_available => {
                info!("Swarm already active, manager node {}", status.node_id);
                (status, false)
            }
            LocalNodeState::Active => {
                return Err(SerpensError::InitializationFailed(
                    "this host is a worker in an existing swarm".to_string(),
                ));
            }
            LocalNodeState::Inactive => {
                info!(
                    "Initializing swarm (listen {}, advertise {})",
                    self.options.init.listen_addr,
                    self.options.init.advertise_addr.as_deref().unwrap_or("auto")
                );
                let node_id = self
                    .call("swarm init", self.api.init_swarm(&self.options.init))
                    .await?;
                info!("Swarm initialized, manager node {}", node_id);
                (self.status().await?, true)
            }
            state => {
                let detail = status
                    .error
                    .clone()
                    .unwrap_or_else(|| "remediate the engine and retry".to_string());
                return Err(SerpensError::InitializationFailed(format!(
                    "swarm is {} on this host: {}",
                    state, detail
                )));
            }
        };

        if !status.is_manager() {
            return Err(SerpensError::InitializationFailed(format!(
                "engine reports swarm {} without control plane after init",
                status.state
            )));
        }

        let network_created = match self.options.network.clone() {
            Some(name) => {
                if self.ensure_network(&name).await? {
                    Some(name)
                } else {
                    None
                }
            }
            None => None,
        };

        let nodes = self.list_nodes().await?;
        Ok(ClusterState {
            state: ControlPlaneState::Active,
            local_state: status.state,
            cluster_id: status.cluster_id.clone(),
            manager_id: Some(status.node_id.clone()),
            manager_addr: status.join_address(),
            initialized,
            network_created,
            nodes,
        })
    }

    /// Current cluster state without changing anything
    pub async fn cluster_state(&self) -> Result<ClusterState> {
        let status = self.status().await?;
        if !status.is_manager() {
            return Ok(ClusterState::without_control_plane(status.state));
        }

        let nodes = self.list_nodes().await?;
        Ok(ClusterState {
            state: ControlPlaneState::Active,
            local_state: status.state,
            cluster_id: status.cluster_id.clone(),
            manager_id: Some(status.node_id.clone()),
            manager_addr: status.join_address(),
            initialized: false,
            network_created: None,
            nodes,
        })
    }

    /// Apply labels to a node, last write wins per key
    pub async fn label_node(&self, node_id: &str, labels: &NodeLabels) -> Result<()> {
        labels.validate()?;
        info!("Labeling node {} with {:?}", node_id, labels.as_map());
        self.call(
            "node label update",
            self.api.add_node_labels(node_id, labels.as_map()),
        )
        .await
    }

    /// Worker join directive for this control plane
    pub async fn issue_worker_join_directive(&self) -> Result<JoinDirective> {
        self.issue_join_directive(NodeRole::Worker).await
    }

    /// Join directive for a role
    pub async fn issue_join_directive(&self, role: NodeRole) -> Result<JoinDirective> {
        let status = self.require_manager().await?;
        let address = status.join_address().ok_or_else(|| {
            SerpensError::ControlPlaneInactive("manager has no reachable address".to_string())
        })?;
        let tokens = self.call("join tokens", self.api.join_tokens()).await?;

        Ok(JoinDirective {
            role,
            token: tokens.for_role(role).to_string(),
            address,
        })
    }

    /// Rotate a role's join token and return the fresh directive
    pub async fn rotate_join_token(&self, role: NodeRole) -> Result<JoinDirective> {
        self.require_manager().await?;
        warn!("Rotating {} join token; the previous token stops working", role);
        self.call("join token rotation", self.api.rotate_join_token(role))
            .await?;
        self.issue_join_directive(role).await
    }

    /// Membership snapshot in engine order
    pub async fn list_nodes(&self) -> Result<Vec<Node>> {
        self.call("node list", self.api.list_nodes()).await
    }

    pub async fn inspect_node(&self, node_id: &str) -> Result<Node> {
        self.call("node inspect", self.api.inspect_node(node_id))
            .await
    }

    /// Find a node by `self`, ID or hostname
    pub async fn resolve_node(&self, reference: &str) -> Result<Node> {
        if reference == SELF_NODE {
            let status = self.require_manager().await?;
            return self.inspect_node(&status.node_id).await;
        }

        let nodes = self.list_nodes().await?;
        if let Some(node) = nodes.iter().find(|n| n.id == reference) {
            return Ok(node.clone());
        }

        let mut by_hostname = nodes.iter().filter(|n| n.hostname == reference);
        match (by_hostname.next(), by_hostname.next()) {
            (Some(node), None) => Ok(node.clone()),
            (Some(_), Some(_)) => Err(SerpensError::NodeNotFound(format!(
                "hostname {} matches several nodes; use the node ID",
                reference
            ))),
            _ => Err(SerpensError::NodeNotFound(reference.to_string())),
        }
    }

    /// Create the attachable overlay network unless it exists
    ///
    /// Returns whether it was created by this call.
    pub async fn ensure_network(&self, name: &str) -> Result<bool> {
        self.require_manager().await?;
        if self
            .call("network inspect", self.api.network_exists(name))
            .await?
        {
            debug!("Network {} already exists", name);
            return Ok(false);
        }

        info!("Creating overlay network {}", name);
        self.call("network create", self.api.create_overlay_network(name))
            .await?;
        Ok(true)
    }
}
