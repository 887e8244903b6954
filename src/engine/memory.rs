//! In-process swarm
//!
//! Simulates the parts of a swarm the bootstrapper touches: a local engine
//! that can be initialized once, join tokens, a node table with labels and
//! overlay networks. Remote joins are simulated with [`InMemoryEngine::join_worker`].

use super::SwarmApi;
use crate::error::{Result, SerpensError};
use crate::swarm::cluster::{
    JoinTokens, LocalNodeState, LocalSwarmStatus, SwarmInitRequest, SWARM_PORT,
};
use crate::swarm::node::{ManagerStatus, Node, NodeAvailability, NodeRole, NodeState};
use async_trait::async_trait;
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{OnceLock, RwLock};
use uuid::Uuid;

const NOT_A_MANAGER: &str = "This node is not a swarm manager.";

fn label_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9._/-]*[A-Za-z0-9])?$").expect("valid label pattern")
    })
}

/// Simulated cluster, present once initialized
struct ClusterInner {
    id: String,
    local_node_id: String,
    advertise_addr: String,
    /// Nodes in join order
    nodes: Vec<Node>,
    worker_token: String,
    manager_token: String,
    networks: BTreeSet<String>,
}

impl ClusterInner {
    fn node_mut(&mut self, node_id: &str) -> Result<&mut Node> {
        self.nodes
            .iter_mut()
            .find(|n| n.id == node_id)
            .ok_or_else(|| SerpensError::NodeNotFound(format!("node {} not found", node_id)))
    }
}

/// In-memory orchestration layer
pub struct InMemoryEngine {
    hostname: String,
    address: String,
    cluster: RwLock<Option<ClusterInner>>,
    reachable: AtomicBool,
    init_calls: AtomicUsize,
    /// Fail init with this message instead of initializing
    init_failure: RwLock<Option<String>>,
}

impl Default for InMemoryEngine {
    fn default() -> Self {
        let hostname = gethostname::gethostname().to_string_lossy().to_string();
        Self::new(&hostname, "127.0.0.1")
    }
}

impl InMemoryEngine {
    /// A host that is not part of any swarm yet
    pub fn new(hostname: &str, address: &str) -> Self {
        Self {
            hostname: hostname.to_string(),
            address: address.to_string(),
            cluster: RwLock::new(None),
            reachable: AtomicBool::new(true),
            init_calls: AtomicUsize::new(0),
            init_failure: RwLock::new(None),
        }
    }

    /// Make every call fail as if the engine were down
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Reject the next init attempts with `message`
    pub fn fail_init_with(&self, message: &str) -> Result<()> {
        let mut failure = self
            .init_failure
            .write()
            .map_err(|_| SerpensError::Lock("Failed to acquire write lock".to_string()))?;
        *failure = Some(message.to_string());
        Ok(())
    }

    /// Number of init requests that reached the engine
    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    /// Simulate a remote host running the join command with `token`
    pub fn join_worker(&self, hostname: &str, address: &str, token: &str) -> Result<String> {
        self.check_reachable()?;
        let mut cluster = self.write()?;
        let inner = cluster
            .as_mut()
            .ok_or_else(|| SerpensError::ControlPlaneInactive(NOT_A_MANAGER.to_string()))?;

        let role = if token == inner.worker_token {
            NodeRole::Worker
        } else if token == inner.manager_token {
            NodeRole::Manager
        } else {
            return Err(SerpensError::Internal("invalid join token".to_string()));
        };

        let mut node = new_node(hostname, address, role);
        if role == NodeRole::Manager {
            node.manager_status = Some(ManagerStatus {
                leader: false,
                reachability: "reachable".to_string(),
                addr: format!("{}:{}", address, SWARM_PORT),
            });
        }
        let id = node.id.clone();
        inner.nodes.push(node);
        Ok(id)
    }

    fn check_reachable(&self) -> Result<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SerpensError::OrchestrationUnavailable(
                "Cannot connect to the in-memory engine".to_string(),
            ))
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Option<ClusterInner>>> {
        self.cluster
            .read()
            .map_err(|_| SerpensError::Lock("Failed to acquire read lock".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Option<ClusterInner>>> {
        self.cluster
            .write()
            .map_err(|_| SerpensError::Lock("Failed to acquire write lock".to_string()))
    }
}

/// Engine-style node ID: 25 lowercase alphanumerics
fn generate_id() -> String {
    let raw = Uuid::new_v4().simple().to_string();
    raw[..25].to_string()
}

/// Generate a join token
fn generate_token(cluster_id: &str) -> String {
    let secret: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(25)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    format!("SWMTKN-1-{}-{}", cluster_id, secret)
}

fn new_node(hostname: &str, address: &str, role: NodeRole) -> Node {
    let now = Utc::now();
    Node {
        id: generate_id(),
        hostname: hostname.to_string(),
        role,
        state: NodeState::Ready,
        availability: NodeAvailability::Active,
        addr: address.to_string(),
        labels: BTreeMap::new(),
        manager_status: None,
        engine_version: Some(env!("CARGO_PKG_VERSION").to_string()),
        created_at: Some(now),
        updated_at: Some(now),
    }
}

#[async_trait]
impl SwarmApi for InMemoryEngine {
    async fn swarm_status(&self) -> Result<LocalSwarmStatus> {
        self.check_reachable()?;
        let cluster = self.read()?;
        Ok(match cluster.as_ref() {
            None => LocalSwarmStatus::default(),
            Some(inner) => LocalSwarmStatus {
                state: LocalNodeState::Active,
                node_id: inner.local_node_id.clone(),
                node_addr: inner.advertise_addr.clone(),
                control_available: true,
                cluster_id: Some(inner.id.clone()),
                manager_addr: Some(format!("{}:{}", inner.advertise_addr, SWARM_PORT)),
                error: None,
            },
        })
    }

    async fn init_swarm(&self, request: &SwarmInitRequest) -> Result<String> {
        self.check_reachable()?;
        self.init_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(message) = self
            .init_failure
            .read()
            .map_err(|_| SerpensError::Lock("Failed to acquire read lock".to_string()))?
            .clone()
        {
            return Err(SerpensError::InitializationFailed(message));
        }

        let mut cluster = self.write()?;
        if cluster.is_some() {
            return Err(SerpensError::InitializationFailed(
                "This node is already part of a swarm.".to_string(),
            ));
        }

        let advertise_addr = request
            .advertise_addr
            .clone()
            .unwrap_or_else(|| self.address.clone());
        let cluster_id = generate_id();

        let mut local = new_node(&self.hostname, &advertise_addr, NodeRole::Manager);
        local.manager_status = Some(ManagerStatus {
            leader: true,
            reachability: "reachable".to_string(),
            addr: format!("{}:{}", advertise_addr, SWARM_PORT),
        });
        let local_node_id = local.id.clone();

        *cluster = Some(ClusterInner {
            worker_token: generate_token(&cluster_id),
            manager_token: generate_token(&cluster_id),
            id: cluster_id,
            local_node_id: local_node_id.clone(),
            advertise_addr,
            nodes: vec![local],
            networks: BTreeSet::new(),
        });

        Ok(local_node_id)
    }

    async fn join_tokens(&self) -> Result<JoinTokens> {
        self.check_reachable()?;
        let cluster = self.read()?;
        let inner = cluster
            .as_ref()
            .ok_or_else(|| SerpensError::ControlPlaneInactive(NOT_A_MANAGER.to_string()))?;
        Ok(JoinTokens {
            worker: inner.worker_token.clone(),
            manager: inner.manager_token.clone(),
        })
    }

    async fn rotate_join_token(&self, role: NodeRole) -> Result<()> {
        self.check_reachable()?;
        let mut cluster = self.write()?;
        let inner = cluster
            .as_mut()
            .ok_or_else(|| SerpensError::ControlPlaneInactive(NOT_A_MANAGER.to_string()))?;

        let token = generate_token(&inner.id);
        match role {
            NodeRole::Worker => inner.worker_token = token,
            NodeRole::Manager => inner.manager_token = token,
        }
        Ok(())
    }

    async fn list_nodes(&self) -> Result<Vec<Node>> {
        self.check_reachable()?;
        let cluster = self.read()?;
        let inner = cluster
            .as_ref()
            .ok_or_else(|| SerpensError::ControlPlaneInactive(NOT_A_MANAGER.to_string()))?;
        Ok(inner.nodes.clone())
    }

    async fn inspect_node(&self, node_id: &str) -> Result<Node> {
        self.check_reachable()?;
        let cluster = self.read()?;
        let inner = cluster
            .as_ref()
            .ok_or_else(|| SerpensError::ControlPlaneInactive(NOT_A_MANAGER.to_string()))?;
        inner
            .nodes
            .iter()
            .find(|n| n.id == node_id)
            .cloned()
            .ok_or_else(|| SerpensError::NodeNotFound(format!("node {} not found", node_id)))
    }

    async fn add_node_labels(
        &self,
        node_id: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<()> {
        self.check_reachable()?;

        if let Some(key) = labels.keys().find(|k| !label_key_pattern().is_match(k)) {
            return Err(SerpensError::LabelRejected(format!(
                "invalid label key '{}'",
                key
            )));
        }

        let mut cluster = self.write()?;
        let inner = cluster
            .as_mut()
            .ok_or_else(|| SerpensError::ControlPlaneInactive(NOT_A_MANAGER.to_string()))?;
        let node = inner.node_mut(node_id)?;

        for (key, value) in labels {
            node.labels.insert(key.clone(), value.clone());
        }
        node.updated_at = Some(Utc::now());
        Ok(())
    }

    async fn network_exists(&self, name: &str) -> Result<bool> {
        self.check_reachable()?;
        let cluster = self.read()?;
        Ok(cluster
            .as_ref()
            .map(|inner| inner.networks.contains(name))
            .unwrap_or(false))
    }

    async fn create_overlay_network(&self, name: &str) -> Result<()> {
        self.check_reachable()?;
        let mut cluster = self.write()?;
        let inner = cluster
            .as_mut()
            .ok_or_else(|| SerpensError::ControlPlaneInactive(NOT_A_MANAGER.to_string()))?;
        inner.networks.insert(name.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_cluster() {
        let engine = InMemoryEngine::new("rpi4", "192.168.1.10");
        assert_eq!(
            engine.swarm_status().await.unwrap().state,
            LocalNodeState::Inactive
        );

        let node_id = engine
            .init_swarm(&SwarmInitRequest::default())
            .await
            .unwrap();
        let status = engine.swarm_status().await.unwrap();
        assert!(status.is_manager());
        assert_eq!(status.node_id, node_id);
        assert_eq!(status.node_id.len(), 25);

        let tokens = engine.join_tokens().await.unwrap();
        assert!(tokens.worker.starts_with("SWMTKN-1-"));
        assert_ne!(tokens.worker, tokens.manager);
    }

    #[tokio::test]
    async fn test_second_init_rejected() {
        let engine = InMemoryEngine::new("rpi4", "192.168.1.10");
        engine.init_swarm(&SwarmInitRequest::default()).await.unwrap();
        let err = engine
            .init_swarm(&SwarmInitRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SerpensError::InitializationFailed(_)));
        assert_eq!(engine.init_calls(), 2);
    }

    #[tokio::test]
    async fn test_rotate_token() {
        let engine = InMemoryEngine::new("rpi4", "192.168.1.10");
        engine.init_swarm(&SwarmInitRequest::default()).await.unwrap();

        let old = engine.join_tokens().await.unwrap();
        engine.rotate_join_token(NodeRole::Worker).await.unwrap();
        let new = engine.join_tokens().await.unwrap();

        assert_ne!(old.worker, new.worker);
        assert_eq!(old.manager, new.manager);

        let err = engine
            .join_worker("tiny-1", "192.168.1.20", &old.worker)
            .unwrap_err();
        assert!(matches!(err, SerpensError::Internal(_)));
        engine
            .join_worker("tiny-1", "192.168.1.20", &new.worker)
            .unwrap();
    }

    #[tokio::test]
    async fn test_label_key_validation() {
        let engine = InMemoryEngine::new("rpi4", "192.168.1.10");
        let id = engine.init_swarm(&SwarmInitRequest::default()).await.unwrap();

        let labels = BTreeMap::from([("bad key".to_string(), "x".to_string())]);
        let err = engine.add_node_labels(&id, &labels).await.unwrap_err();
        assert!(matches!(err, SerpensError::LabelRejected(_)));

        let labels = BTreeMap::from([("serpens.io/zone".to_string(), "garage".to_string())]);
        engine.add_node_labels(&id, &labels).await.unwrap();
    }

    #[tokio::test]
    async fn test_unreachable() {
        let engine = InMemoryEngine::new("rpi4", "192.168.1.10");
        engine.set_reachable(false);
        assert!(engine.swarm_status().await.unwrap_err().is_unavailable());
        assert!(engine
            .init_swarm(&SwarmInitRequest::default())
            .await
            .unwrap_err()
            .is_unavailable());
        assert_eq!(engine.init_calls(), 0);
    }
}
