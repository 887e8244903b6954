//! Docker Engine REST client

use super::api::{
    ErrorMessage, NetworkCreateBody, NodeObject, SwarmInitBody, SwarmInspect, SystemInfo,
};
use super::SwarmApi;
use crate::error::{Result, SerpensError};
use crate::swarm::cluster::{JoinTokens, LocalSwarmStatus, SwarmInitRequest};
use crate::swarm::node::{Node, NodeRole};
use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// Engine reached over TCP
pub struct HttpEngine {
    /// Base URL including the API version prefix
    base_url: String,
    /// HTTP client
    client: reqwest::Client,
}

impl HttpEngine {
    /// Create a client for `base_url` (e.g. `http://10.0.0.1:2375`)
    pub fn new(base_url: &str, api_version: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SerpensError::Internal(e.to_string()))?;

        Ok(Self {
            base_url: format!("{}/v{}", base_url.trim_end_matches('/'), api_version),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response> {
        request.send().await.map_err(|e| {
            SerpensError::OrchestrationUnavailable(format!("{}: {}", self.base_url, e))
        })
    }

    async fn read_json<T: DeserializeOwned>(&self, response: Response) -> Result<T> {
        let body = response
            .bytes()
            .await
            .map_err(|e| SerpensError::OrchestrationUnavailable(e.to_string()))?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn swarm_inspect(&self) -> Result<SwarmInspect> {
        let response = self.send(self.client.get(self.url("/swarm"))).await?;
        let status = response.status();
        if !status.is_success() {
            let message = error_message(response).await;
            return Err(manager_error(status, message));
        }
        self.read_json(response).await
    }

    async fn node_object(&self, node_id: &str) -> Result<NodeObject> {
        let response = self
            .send(self.client.get(self.url(&format!("/nodes/{}", node_id))))
            .await?;
        let status = response.status();
        if !status.is_success() {
            let message = error_message(response).await;
            return Err(node_error(status, message));
        }
        self.read_json(response).await
    }
}

/// Pull the engine's `message` out of an error response
async fn error_message(response: Response) -> String {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorMessage>(&text) {
        Ok(err) => err.message,
        Err(_) if text.trim().is_empty() => status.to_string(),
        Err(_) => text.trim().to_string(),
    }
}

/// Errors from endpoints only a manager can serve
fn manager_error(status: StatusCode, message: String) -> SerpensError {
    match status {
        StatusCode::SERVICE_UNAVAILABLE => SerpensError::ControlPlaneInactive(message),
        _ => SerpensError::Internal(format!("{}: {}", status, message)),
    }
}

/// Errors from node endpoints
fn node_error(status: StatusCode, message: String) -> SerpensError {
    match status {
        StatusCode::NOT_FOUND => SerpensError::NodeNotFound(message),
        StatusCode::BAD_REQUEST => SerpensError::LabelRejected(message),
        _ => manager_error(status, message),
    }
}

#[async_trait]
impl SwarmApi for HttpEngine {
    async fn swarm_status(&self) -> Result<LocalSwarmStatus> {
        let response = self.send(self.client.get(self.url("/info"))).await?;
        let status = response.status();
        if !status.is_success() {
            let message = error_message(response).await;
            return Err(SerpensError::OrchestrationUnavailable(format!(
                "{}: {}",
                status, message
            )));
        }
        let info: SystemInfo = self.read_json(response).await?;
        Ok(info.swarm.into())
    }

    async fn init_swarm(&self, request: &SwarmInitRequest) -> Result<String> {
        debug!("POST /swarm/init listen_addr={}", request.listen_addr);
        let response = self
            .send(
                self.client
                    .post(self.url("/swarm/init"))
                    .json(&SwarmInitBody::from(request)),
            )
            .await?;
        let status = response.status();
        if !status.is_success() {
            let message = error_message(response).await;
            return Err(SerpensError::InitializationFailed(message));
        }
        // The engine answers with the new node ID as a JSON string
        self.read_json(response).await
    }

    async fn join_tokens(&self) -> Result<JoinTokens> {
        Ok(self.swarm_inspect().await?.join_tokens.into())
    }

    async fn rotate_join_token(&self, role: NodeRole) -> Result<()> {
        let swarm = self.swarm_inspect().await?;
        let flag = match role {
            NodeRole::Worker => "rotateWorkerToken",
            NodeRole::Manager => "rotateManagerToken",
        };
        let url = self.url(&format!(
            "/swarm/update?version={}&{}=true",
            swarm.version.index, flag
        ));

        let response = self.send(self.client.post(url).json(&swarm.spec)).await?;
        let status = response.status();
        if !status.is_success() {
            let message = error_message(response).await;
            return Err(manager_error(status, message));
        }
        Ok(())
    }

    async fn list_nodes(&self) -> Result<Vec<Node>> {
        let response = self.send(self.client.get(self.url("/nodes"))).await?;
        let status = response.status();
        if !status.is_success() {
            let message = error_message(response).await;
            return Err(manager_error(status, message));
        }
        let nodes: Vec<NodeObject> = self.read_json(response).await?;
        Ok(nodes.into_iter().map(Node::from).collect())
    }

    async fn inspect_node(&self, node_id: &str) -> Result<Node> {
        Ok(self.node_object(node_id).await?.into())
    }

    async fn add_node_labels(
        &self,
        node_id: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<()> {
        let node = self.node_object(node_id).await?;
        let mut spec = node.spec;
        spec.merge_labels(labels);

        let url = self.url(&format!(
            "/nodes/{}/update?version={}",
            node.id, node.version.index
        ));
        let response = self.send(self.client.post(url).json(&spec)).await?;
        let status = response.status();
        if !status.is_success() {
            let message = error_message(response).await;
            return Err(node_error(status, message));
        }
        Ok(())
    }

    async fn network_exists(&self, name: &str) -> Result<bool> {
        let response = self
            .send(self.client.get(self.url(&format!("/networks/{}", name))))
            .await?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let message = error_message(response).await;
                Err(SerpensError::Network(format!("{}: {}", status, message)))
            }
        }
    }

    async fn create_overlay_network(&self, name: &str) -> Result<()> {
        let response = self
            .send(
                self.client
                    .post(self.url("/networks/create"))
                    .json(&NetworkCreateBody::overlay(name)),
            )
            .await?;
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::CONFLICT => {
                debug!("Network {} already exists", name);
                Ok(())
            }
            StatusCode::SERVICE_UNAVAILABLE => {
                Err(SerpensError::ControlPlaneInactive(error_message(response).await))
            }
            status => {
                let message = error_message(response).await;
                Err(SerpensError::Network(format!("{}: {}", status, message)))
            }
        }
    }
}
