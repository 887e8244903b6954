//! Swarm cluster state and join directives

use super::node::{Node, NodeRole};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default swarm management port
pub const SWARM_PORT: u16 = 2377;

/// Default listen address for swarm communication
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:2377";

/// Parameters for initializing a new swarm
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwarmInitRequest {
    /// Listen address for swarm communication
    pub listen_addr: String,
    /// Advertise address; the engine picks one when unset
    pub advertise_addr: Option<String>,
    /// Force new cluster (ignore existing state)
    pub force_new_cluster: bool,
}

impl Default for SwarmInitRequest {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            advertise_addr: None,
            force_new_cluster: false,
        }
    }
}

/// Swarm state of the local engine, as the engine reports it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocalNodeState {
    /// Not part of a swarm
    #[default]
    Inactive,
    /// Pending join
    Pending,
    /// Active in swarm
    Active,
    /// Error state
    Error,
    /// Locked
    Locked,
}

impl fmt::Display for LocalNodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LocalNodeState::Inactive => "inactive",
            LocalNodeState::Pending => "pending",
            LocalNodeState::Active => "active",
            LocalNodeState::Error => "error",
            LocalNodeState::Locked => "locked",
        };
        f.write_str(s)
    }
}

/// Typed swarm status of the local engine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalSwarmStatus {
    pub state: LocalNodeState,
    /// Local node ID, empty when not in a swarm
    pub node_id: String,
    /// Local node address, empty when not in a swarm
    pub node_addr: String,
    /// Whether this engine is a manager that can serve control-plane calls
    pub control_available: bool,
    /// Cluster ID (only visible on managers)
    pub cluster_id: Option<String>,
    /// Reachable manager address of this node, when it is a manager
    pub manager_addr: Option<String>,
    /// Error reported by the engine
    pub error: Option<String>,
}

impl LocalSwarmStatus {
    /// Whether this host runs an active control plane
    pub fn is_manager(&self) -> bool {
        self.state == LocalNodeState::Active && self.control_available
    }

    /// Address workers should join through
    ///
    /// Uses the manager address the engine reports for this node and falls
    /// back to the node address on the default swarm port.
    pub fn join_address(&self) -> Option<String> {
        if let Some(addr) = self.manager_addr.as_ref().filter(|a| !a.is_empty()) {
            return Some(addr.clone());
        }
        if self.node_addr.is_empty() {
            None
        } else {
            Some(format!("{}:{}", self.node_addr, SWARM_PORT))
        }
    }
}

/// Control-plane state as seen by the bootstrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlPlaneState {
    Uninitialized,
    Active,
}

impl fmt::Display for ControlPlaneState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlPlaneState::Uninitialized => f.write_str("uninitialized"),
            ControlPlaneState::Active => f.write_str("active"),
        }
    }
}

/// Derived cluster state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterState {
    pub state: ControlPlaneState,
    /// Swarm state of the local engine; `active` without a control plane means a worker
    pub local_state: LocalNodeState,
    pub cluster_id: Option<String>,
    /// Manager node ID of this host
    pub manager_id: Option<String>,
    /// Reachable address of this manager
    pub manager_addr: Option<String>,
    /// True when this call performed the swarm initialization
    pub initialized: bool,
    /// Network created by this call, if any
    pub network_created: Option<String>,
    pub nodes: Vec<Node>,
}

impl ClusterState {
    /// State of a host that cannot serve the control plane
    pub fn without_control_plane(local_state: LocalNodeState) -> Self {
        Self {
            state: ControlPlaneState::Uninitialized,
            local_state,
            cluster_id: None,
            manager_id: None,
            manager_addr: None,
            initialized: false,
            network_created: None,
            nodes: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == ControlPlaneState::Active
    }

    /// Host takes part in a swarm as a worker only
    pub fn is_worker(&self) -> bool {
        !self.is_active() && self.local_state == LocalNodeState::Active
    }
}

/// Join tokens for both roles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinTokens {
    pub worker: String,
    pub manager: String,
}

impl JoinTokens {
    /// Token for a role
    pub fn for_role(&self, role: NodeRole) -> &str {
        match role {
            NodeRole::Worker => &self.worker,
            NodeRole::Manager => &self.manager,
        }
    }
}

/// Advisory join data for a new node
///
/// Nothing is sent to the new node; an operator runs [`JoinDirective::command`]
/// on it out of band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinDirective {
    pub role: NodeRole,
    pub token: String,
    pub address: String,
}

impl JoinDirective {
    /// The command to run verbatim on the joining host
    pub fn command(&self) -> String {
        format!("docker swarm join --token {} {}", self.token, self.address)
    }
}

impl fmt::Display for JoinDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_address_prefers_manager_addr() {
        let status = LocalSwarmStatus {
            state: LocalNodeState::Active,
            node_id: "abc".to_string(),
            node_addr: "192.168.1.10".to_string(),
            control_available: true,
            manager_addr: Some("192.168.1.10:2377".to_string()),
            ..Default::default()
        };
        assert!(status.is_manager());
        assert_eq!(status.join_address().as_deref(), Some("192.168.1.10:2377"));
    }

    #[test]
    fn test_join_address_falls_back_to_node_addr() {
        let status = LocalSwarmStatus {
            state: LocalNodeState::Active,
            node_addr: "10.1.1.1".to_string(),
            control_available: true,
            ..Default::default()
        };
        assert_eq!(status.join_address().as_deref(), Some("10.1.1.1:2377"));

        assert_eq!(LocalSwarmStatus::default().join_address(), None);
    }

    #[test]
    fn test_worker_is_not_manager() {
        let status = LocalSwarmStatus {
            state: LocalNodeState::Active,
            control_available: false,
            ..Default::default()
        };
        assert!(!status.is_manager());
    }

    #[test]
    fn test_directive_command() {
        let directive = JoinDirective {
            role: NodeRole::Worker,
            token: "SWMTKN-1-abc-def".to_string(),
            address: "192.168.1.10:2377".to_string(),
        };
        assert_eq!(
            directive.command(),
            "docker swarm join --token SWMTKN-1-abc-def 192.168.1.10:2377"
        );
    }

    #[test]
    fn test_tokens_for_role() {
        let tokens = JoinTokens {
            worker: "w".to_string(),
            manager: "m".to_string(),
        };
        assert_eq!(tokens.for_role(NodeRole::Worker), "w");
        assert_eq!(tokens.for_role(NodeRole::Manager), "m");
    }
}
