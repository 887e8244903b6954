//! Docker Engine wire types
//!
//! These mirror the JSON the engine returns from its REST API and from
//! `docker info` / `docker node inspect`, so both clients share them.

use crate::swarm::cluster::{JoinTokens, LocalNodeState, LocalSwarmStatus, SwarmInitRequest};
use crate::swarm::node::{ManagerStatus, Node, NodeAvailability, NodeRole, NodeState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Error body returned by the engine
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorMessage {
    pub message: String,
}

/// `GET /info` response, reduced to what the bootstrapper reads
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SystemInfo {
    #[serde(default)]
    pub swarm: SwarmInfo,
}

/// `Swarm` section of the system info
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SwarmInfo {
    #[serde(rename = "NodeID", default)]
    pub node_id: String,
    #[serde(default)]
    pub node_addr: String,
    #[serde(default)]
    pub local_node_state: String,
    #[serde(default)]
    pub control_available: bool,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub remote_managers: Option<Vec<Peer>>,
    #[serde(default)]
    pub cluster: Option<ClusterInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Peer {
    #[serde(rename = "NodeID")]
    pub node_id: String,
    pub addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClusterInfo {
    #[serde(rename = "ID")]
    pub id: String,
}

fn parse_local_state(state: &str) -> LocalNodeState {
    match state {
        "" | "inactive" => LocalNodeState::Inactive,
        "pending" => LocalNodeState::Pending,
        "active" => LocalNodeState::Active,
        "locked" => LocalNodeState::Locked,
        _ => LocalNodeState::Error,
    }
}

impl From<SwarmInfo> for LocalSwarmStatus {
    fn from(info: SwarmInfo) -> Self {
        let manager_addr = info.remote_managers.as_ref().and_then(|managers| {
            managers
                .iter()
                .find(|peer| peer.node_id == info.node_id)
                .map(|peer| peer.addr.clone())
        });

        LocalSwarmStatus {
            state: parse_local_state(&info.local_node_state),
            node_id: info.node_id,
            node_addr: info.node_addr,
            control_available: info.control_available,
            cluster_id: info.cluster.map(|c| c.id),
            manager_addr,
            error: Some(info.error).filter(|e| !e.is_empty()),
        }
    }
}

/// `POST /swarm/init` body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SwarmInitBody {
    pub listen_addr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advertise_addr: Option<String>,
    pub force_new_cluster: bool,
}

impl From<&SwarmInitRequest> for SwarmInitBody {
    fn from(request: &SwarmInitRequest) -> Self {
        Self {
            listen_addr: request.listen_addr.clone(),
            advertise_addr: request.advertise_addr.clone(),
            force_new_cluster: request.force_new_cluster,
        }
    }
}

/// Object version used for optimistic updates
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ObjectVersion {
    #[serde(default)]
    pub index: u64,
}

/// `GET /swarm` response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SwarmInspect {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(default)]
    pub version: ObjectVersion,
    /// Kept opaque so updates send back exactly what the engine holds
    #[serde(default)]
    pub spec: serde_json::Value,
    pub join_tokens: JoinTokensObject,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct JoinTokensObject {
    pub worker: String,
    pub manager: String,
}

impl From<JoinTokensObject> for JoinTokens {
    fn from(tokens: JoinTokensObject) -> Self {
        JoinTokens {
            worker: tokens.worker,
            manager: tokens.manager,
        }
    }
}

/// Node as returned by `GET /nodes` and `docker node inspect`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NodeObject {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(default)]
    pub version: ObjectVersion,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    pub spec: NodeSpec,
    #[serde(default)]
    pub description: NodeDescription,
    #[serde(default)]
    pub status: NodeStatusObject,
    #[serde(default)]
    pub manager_status: Option<ManagerStatusObject>,
}

/// Mutable part of a node; unknown fields round-trip untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NodeSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub role: NodeRole,
    #[serde(default)]
    pub availability: NodeAvailability,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NodeDescription {
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub engine: Option<EngineDescription>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EngineDescription {
    #[serde(default)]
    pub engine_version: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NodeStatusObject {
    #[serde(default)]
    pub state: NodeState,
    #[serde(default)]
    pub addr: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ManagerStatusObject {
    #[serde(default)]
    pub leader: bool,
    #[serde(default)]
    pub reachability: String,
    #[serde(default)]
    pub addr: String,
}

impl NodeSpec {
    /// Merge labels; later values win per key
    pub fn merge_labels(&mut self, labels: &BTreeMap<String, String>) {
        let current = self.labels.get_or_insert_with(BTreeMap::new);
        for (key, value) in labels {
            current.insert(key.clone(), value.clone());
        }
    }
}

impl From<NodeObject> for Node {
    fn from(object: NodeObject) -> Self {
        Node {
            id: object.id,
            hostname: object.description.hostname,
            role: object.spec.role,
            state: object.status.state,
            availability: object.spec.availability,
            addr: object.status.addr,
            labels: object.spec.labels.unwrap_or_default(),
            manager_status: object.manager_status.map(|m| ManagerStatus {
                leader: m.leader,
                reachability: m.reachability,
                addr: m.addr,
            }),
            engine_version: object
                .description
                .engine
                .map(|e| e.engine_version)
                .filter(|v| !v.is_empty()),
            created_at: object.created_at,
            updated_at: object.updated_at,
        }
    }
}

/// `POST /networks/create` body
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkCreateBody {
    pub name: String,
    pub driver: String,
    pub attachable: bool,
}

impl NetworkCreateBody {
    pub fn overlay(name: &str) -> Self {
        Self {
            name: name.to_string(),
            driver: "overlay".to_string(),
            attachable: true,
        }
    }
}

#[cfg(test)]
pub(crate) const MANAGER_NODE_JSON: &str = r#"{
    "ID": "24ifsmvkjbyhk",
    "Version": {"Index": 373531},
    "CreatedAt": "2016-08-18T10:44:24.496525531Z",
    "UpdatedAt": "2017-08-09T07:09:37.632105588Z",
    "Spec": {
        "Availability": "active",
        "Name": "node-name",
        "Role": "manager",
        "Labels": {"foo": "bar"}
    },
    "Description": {
        "Hostname": "bf3067039e47",
        "Platform": {"Architecture": "x86_64", "OS": "linux"},
        "Resources": {"NanoCPUs": 4000000000, "MemoryBytes": 8272408576},
        "Engine": {"EngineVersion": "17.06.0", "Labels": {"foo": "bar"}}
    },
    "Status": {"State": "ready", "Message": "", "Addr": "172.17.0.2"},
    "ManagerStatus": {"Leader": true, "Reachability": "reachable", "Addr": "10.0.0.46:2377"}
}"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_object_to_node() {
        let object: NodeObject = serde_json::from_str(MANAGER_NODE_JSON).unwrap();
        assert_eq!(object.version.index, 373531);

        let node: Node = object.into();
        assert_eq!(node.id, "24ifsmvkjbyhk");
        assert_eq!(node.hostname, "bf3067039e47");
        assert!(node.is_manager());
        assert!(node.is_leader());
        assert!(node.is_ready());
        assert_eq!(node.addr, "172.17.0.2");
        assert_eq!(node.labels.get("foo").map(String::as_str), Some("bar"));
        assert_eq!(node.engine_version.as_deref(), Some("17.06.0"));
        assert!(node.created_at.is_some());
    }

    #[test]
    fn test_worker_without_manager_status_or_labels() {
        let json = r#"{
            "ID": "w1",
            "Spec": {"Role": "worker", "Availability": "drain"},
            "Description": {"Hostname": "heavy-1"},
            "Status": {"State": "down", "Addr": "10.0.0.7"}
        }"#;
        let node: Node = serde_json::from_str::<NodeObject>(json).unwrap().into();
        assert_eq!(node.role, NodeRole::Worker);
        assert_eq!(node.availability, NodeAvailability::Drain);
        assert_eq!(node.state, NodeState::Down);
        assert!(node.labels.is_empty());
        assert!(node.manager_status.is_none());
    }

    #[test]
    fn test_node_spec_keeps_unknown_fields() {
        let object: NodeObject = serde_json::from_str(
            r#"{"ID": "n", "Spec": {"Role": "worker", "Availability": "active", "Future": 1}}"#,
        )
        .unwrap();
        let value = serde_json::to_value(&object.spec).unwrap();
        assert_eq!(value["Future"], 1);
        assert_eq!(value["Role"], "worker");
    }

    #[test]
    fn test_merge_labels_overwrites_per_key() {
        let mut spec = NodeSpec::default();
        spec.merge_labels(&BTreeMap::from([("type".to_string(), "tiny".to_string())]));
        spec.merge_labels(&BTreeMap::from([
            ("type".to_string(), "manager".to_string()),
            ("name".to_string(), "rpi4".to_string()),
        ]));

        let labels = spec.labels.unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels["type"], "manager");
    }

    #[test]
    fn test_swarm_info_active_manager() {
        let json = r#"{
            "ID": "engine",
            "Swarm": {
                "NodeID": "24ifsmvkjbyhk",
                "NodeAddr": "10.0.0.46",
                "LocalNodeState": "active",
                "ControlAvailable": true,
                "Error": "",
                "RemoteManagers": [
                    {"NodeID": "71izy0goik036k48jg985xnds", "Addr": "10.0.0.158:2377"},
                    {"NodeID": "24ifsmvkjbyhk", "Addr": "10.0.0.46:2377"}
                ],
                "Cluster": {"ID": "abajmipo7b4xz5ip2nrla6b11"}
            }
        }"#;
        let info: SystemInfo = serde_json::from_str(json).unwrap();
        let status: LocalSwarmStatus = info.swarm.into();

        assert!(status.is_manager());
        assert_eq!(status.node_id, "24ifsmvkjbyhk");
        assert_eq!(status.manager_addr.as_deref(), Some("10.0.0.46:2377"));
        assert_eq!(status.cluster_id.as_deref(), Some("abajmipo7b4xz5ip2nrla6b11"));
        assert_eq!(status.error, None);
    }

    #[test]
    fn test_swarm_info_inactive() {
        let json = r#"{
            "NodeID": "",
            "NodeAddr": "",
            "LocalNodeState": "inactive",
            "ControlAvailable": false,
            "Error": "",
            "RemoteManagers": null
        }"#;
        let info: SwarmInfo = serde_json::from_str(json).unwrap();
        let status: LocalSwarmStatus = info.into();
        assert_eq!(status.state, LocalNodeState::Inactive);
        assert!(!status.is_manager());
        assert_eq!(status.join_address(), None);
    }

    #[test]
    fn test_init_body_omits_missing_advertise_addr() {
        let body = SwarmInitBody::from(&SwarmInitRequest::default());
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["ListenAddr"], "0.0.0.0:2377");
        assert!(value.get("AdvertiseAddr").is_none());
    }
}
