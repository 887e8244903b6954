//! Swarm node view

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Label key holding the node's role class (`manager`, `tiny`, `heavy`, ...)
pub const TYPE_LABEL: &str = "type";

/// Label key holding the node's human identifier
pub const NAME_LABEL: &str = "name";

/// Node role in the swarm
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Worker node
    #[default]
    Worker,
    /// Manager node
    Manager,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Worker => "worker",
            NodeRole::Manager => "manager",
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Node state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    /// Node is unknown
    #[default]
    Unknown,
    /// Node is down
    Down,
    /// Node is ready
    Ready,
    /// Node is disconnected
    Disconnected,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeState::Unknown => "unknown",
            NodeState::Down => "down",
            NodeState::Ready => "ready",
            NodeState::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}

/// Node availability
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeAvailability {
    /// Node is active
    #[default]
    Active,
    /// Node is paused
    Pause,
    /// Node is draining
    Drain,
}

impl fmt::Display for NodeAvailability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeAvailability::Active => "active",
            NodeAvailability::Pause => "pause",
            NodeAvailability::Drain => "drain",
        };
        f.write_str(s)
    }
}

/// Manager status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerStatus {
    /// Is leader
    pub leader: bool,
    /// Reachability
    pub reachability: String,
    /// Address other nodes use to reach this manager
    pub addr: String,
}

/// Swarm node as reported by the orchestration layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Node ID, assigned by the orchestration layer
    pub id: String,
    /// Node hostname
    pub hostname: String,
    /// Node role
    pub role: NodeRole,
    /// Node state
    pub state: NodeState,
    /// Node availability
    pub availability: NodeAvailability,
    /// Node address
    pub addr: String,
    /// Node labels
    pub labels: BTreeMap<String, String>,
    /// Manager status (if manager)
    pub manager_status: Option<ManagerStatus>,
    /// Engine version running on the node
    pub engine_version: Option<String>,
    /// Created timestamp
    pub created_at: Option<DateTime<Utc>>,
    /// Updated timestamp
    pub updated_at: Option<DateTime<Utc>>,
}

impl Node {
    /// Check if node is a manager
    pub fn is_manager(&self) -> bool {
        self.role == NodeRole::Manager
    }

    /// Check if node is leader
    pub fn is_leader(&self) -> bool {
        self.manager_status
            .as_ref()
            .map(|s| s.leader)
            .unwrap_or(false)
    }

    /// Check if node is ready
    pub fn is_ready(&self) -> bool {
        self.state == NodeState::Ready
    }

    /// Role class from the `type` label
    pub fn class(&self) -> Option<&str> {
        self.labels.get(TYPE_LABEL).map(String::as_str)
    }

    /// Human identifier from the `name` label
    pub fn name(&self) -> Option<&str> {
        self.labels.get(NAME_LABEL).map(String::as_str)
    }

    /// Whether both the `type` and `name` labels are set
    pub fn is_fully_labeled(&self) -> bool {
        self.class().is_some() && self.name().is_some()
    }

    /// Manager status column as `docker node ls` shows it
    pub fn manager_status_display(&self) -> &str {
        match &self.manager_status {
            Some(status) if status.leader => "Leader",
            Some(status) if status.reachability == "reachable" => "Reachable",
            Some(_) => "Unreachable",
            None => "",
        }
    }
}

#[cfg(test)]
pub(crate) fn test_node(id: &str, hostname: &str, role: NodeRole) -> Node {
    Node {
        id: id.to_string(),
        hostname: hostname.to_string(),
        role,
        state: NodeState::Ready,
        availability: NodeAvailability::Active,
        addr: "10.0.0.2".to_string(),
        labels: BTreeMap::new(),
        manager_status: None,
        engine_version: None,
        created_at: None,
        updated_at: None,
    }
}
