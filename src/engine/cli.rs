//! Docker CLI client
//!
//! Drives the local `docker` binary. State always comes back as JSON
//! (`--format '{{json ...}}'`, `node inspect`) and is decoded into the same
//! wire types as the REST client. Stderr is only used to classify failures.

use super::api::{NodeObject, SwarmInfo};
use super::SwarmApi;
use crate::error::{Result, SerpensError};
use crate::swarm::cluster::{JoinTokens, LocalSwarmStatus, SwarmInitRequest};
use crate::swarm::node::{Node, NodeRole};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Captured result of one CLI invocation
#[derive(Debug, Clone)]
struct CommandOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

/// Engine reached through the `docker` binary
pub struct CliEngine {
    binary: String,
    /// Explicit `-H` host; the CLI default otherwise
    host: Option<String>,
    tls_verify: bool,
}

impl CliEngine {
    pub fn new(binary: &str, host: Option<String>) -> Self {
        Self {
            binary: binary.to_string(),
            host,
            tls_verify: false,
        }
    }

    /// Pass `--tlsverify` so the CLI presents the certificates from `DOCKER_CERT_PATH`
    pub fn with_tls_verify(mut self, tls_verify: bool) -> Self {
        self.tls_verify = tls_verify;
        self
    }

    fn command_args(&self, args: &[&str]) -> Vec<String> {
        let mut full = Vec::with_capacity(args.len() + 3);
        if self.tls_verify {
            full.push("--tlsverify".to_string());
        }
        if let Some(ref host) = self.host {
            full.push("-H".to_string());
            full.push(host.clone());
        }
        full.extend(args.iter().map(|a| a.to_string()));
        full
    }

    async fn run(&self, args: &[&str]) -> Result<CommandOutput> {
        let args = self.command_args(args);
        debug!("Running {} {}", self.binary, args.join(" "));

        // A call abandoned on timeout must not go on changing the swarm
        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                SerpensError::OrchestrationUnavailable(format!(
                    "failed to run {}: {}",
                    self.binary, e
                ))
            })?;

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Run and require success, classifying failures with `fallback`
    async fn run_checked(
        &self,
        args: &[&str],
        fallback: fn(String) -> SerpensError,
    ) -> Result<String> {
        let output = self.run(args).await?;
        if output.success {
            Ok(output.stdout)
        } else {
            Err(classify_failure(&output.stderr, fallback))
        }
    }

    async fn join_token(&self, role: NodeRole) -> Result<String> {
        let stdout = self
            .run_checked(&["swarm", "join-token", "-q", role.as_str()], SerpensError::Internal)
            .await?;
        Ok(stdout.trim().to_string())
    }
}

/// Strip the CLI's framing from an error message
fn clean_message(stderr: &str) -> String {
    let message = stderr.trim();
    let message = message.strip_prefix("Error: ").unwrap_or(message);
    message
        .strip_prefix("Error response from daemon: ")
        .unwrap_or(message)
        .to_string()
}

/// Map CLI stderr onto the error taxonomy
fn classify_failure(stderr: &str, fallback: fn(String) -> SerpensError) -> SerpensError {
    let message = clean_message(stderr);
    let lower = message.to_lowercase();

    if lower.contains("cannot connect to the docker daemon")
        || lower.contains("error during connect")
        || lower.contains("is the docker daemon running")
    {
        SerpensError::OrchestrationUnavailable(message)
    } else if lower.contains("no such node")
        || (lower.contains("node") && lower.contains("not found"))
    {
        SerpensError::NodeNotFound(message)
    } else if lower.contains("not a swarm manager") || lower.contains("not part of a swarm") {
        SerpensError::ControlPlaneInactive(message)
    } else {
        fallback(message)
    }
}

fn is_missing_network(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("no such network") || (lower.contains("network") && lower.contains("not found"))
}

#[async_trait]
impl SwarmApi for CliEngine {
    async fn swarm_status(&self) -> Result<LocalSwarmStatus> {
        let stdout = self
            .run_checked(
                &["info", "--format", "{{json .Swarm}}"],
                SerpensError::OrchestrationUnavailable,
            )
            .await?;
        let info: SwarmInfo = serde_json::from_str(stdout.trim())?;
        Ok(info.into())
    }

    async fn init_swarm(&self, request: &SwarmInitRequest) -> Result<String> {
        let mut args = vec!["swarm", "init", "--listen-addr", request.listen_addr.as_str()];
        if let Some(ref addr) = request.advertise_addr {
            args.push("--advertise-addr");
            args.push(addr.as_str());
        }
        if request.force_new_cluster {
            args.push("--force-new-cluster");
        }

        self.run_checked(&args, SerpensError::InitializationFailed)
            .await?;

        // `swarm init` prints prose; read the node ID back from typed status
        let status = self.swarm_status().await?;
        if status.node_id.is_empty() {
            return Err(SerpensError::InitializationFailed(
                "engine reports no node ID after init".to_string(),
            ));
        }
        Ok(status.node_id)
    }

    async fn join_tokens(&self) -> Result<JoinTokens> {
        Ok(JoinTokens {
            worker: self.join_token(NodeRole::Worker).await?,
            manager: self.join_token(NodeRole::Manager).await?,
        })
    }

    async fn rotate_join_token(&self, role: NodeRole) -> Result<()> {
        self.run_checked(
            &["swarm", "join-token", "--rotate", "-q", role.as_str()],
            SerpensError::Internal,
        )
        .await?;
        Ok(())
    }

    async fn list_nodes(&self) -> Result<Vec<Node>> {
        let stdout = self
            .run_checked(&["node", "ls", "-q"], SerpensError::Internal)
            .await?;
        let ids: Vec<&str> = stdout.split_whitespace().collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut args = vec!["node", "inspect"];
        args.extend(ids);
        let stdout = self.run_checked(&args, SerpensError::Internal).await?;
        let nodes: Vec<NodeObject> = serde_json::from_str(stdout.trim())?;
        Ok(nodes.into_iter().map(Node::from).collect())
    }

    async fn inspect_node(&self, node_id: &str) -> Result<Node> {
        let stdout = self
            .run_checked(&["node", "inspect", node_id], SerpensError::Internal)
            .await?;
        let nodes: Vec<NodeObject> = serde_json::from_str(stdout.trim())?;
        nodes
            .into_iter()
            .next()
            .map(Node::from)
            .ok_or_else(|| SerpensError::NodeNotFound(node_id.to_string()))
    }

    async fn add_node_labels(
        &self,
        node_id: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<()> {
        let pairs: Vec<String> = labels.iter().map(|(k, v)| format!("{}={}", k, v)).collect();

        let mut args = vec!["node", "update"];
        for pair in &pairs {
            args.push("--label-add");
            args.push(pair.as_str());
        }
        args.push(node_id);

        self.run_checked(&args, SerpensError::LabelRejected).await?;
        Ok(())
    }

    async fn network_exists(&self, name: &str) -> Result<bool> {
        let output = self
            .run(&["network", "inspect", "--format", "{{.Name}}", name])
            .await?;
        if output.success {
            Ok(true)
        } else if is_missing_network(&output.stderr) {
            Ok(false)
        } else {
            Err(classify_failure(&output.stderr, SerpensError::Network))
        }
    }

    async fn create_overlay_network(&self, name: &str) -> Result<()> {
        let output = self
            .run(&["network", "create", "--driver", "overlay", "--attachable", name])
            .await?;
        if output.success || output.stderr.contains("already exists") {
            Ok(())
        } else {
            Err(classify_failure(&output.stderr, SerpensError::Network))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_is_passed_first() {
        let engine = CliEngine::new("docker", Some("unix:///run/docker.sock".to_string()));
        assert_eq!(
            engine.command_args(&["node", "ls"]),
            vec!["-H", "unix:///run/docker.sock", "node", "ls"]
        );

        let engine = CliEngine::new("docker", None);
        assert_eq!(engine.command_args(&["info"]), vec!["info"]);

        let engine = CliEngine::new("docker", Some("tcp://rpi4:2376".to_string()))
            .with_tls_verify(true);
        assert_eq!(
            engine.command_args(&["info"]),
            vec!["--tlsverify", "-H", "tcp://rpi4:2376", "info"]
        );
    }

    #[test]
    fn test_classify_failure() {
        let err = classify_failure(
            "Cannot connect to the Docker daemon at unix:///var/run/docker.sock. Is the docker daemon running?\n",
            SerpensError::Internal,
        );
        assert!(err.is_unavailable());

        let err = classify_failure(
            "Error response from daemon: node nope not found\n",
            SerpensError::LabelRejected,
        );
        assert!(matches!(err, SerpensError::NodeNotFound(ref m) if m == "node nope not found"));

        let err = classify_failure(
            "Error response from daemon: This node is not a swarm manager. Use \"docker swarm init\" or \"docker swarm join\" to connect this node to swarm and try again.",
            SerpensError::Internal,
        );
        assert!(matches!(err, SerpensError::ControlPlaneInactive(_)));

        let err = classify_failure(
            "Error response from daemon: could not choose an IP address to advertise since this system has multiple addresses",
            SerpensError::InitializationFailed,
        );
        assert!(matches!(err, SerpensError::InitializationFailed(_)));
    }

    #[test]
    fn test_missing_network() {
        assert!(is_missing_network("Error: No such network: serpens-net"));
        assert!(is_missing_network(
            "Error response from daemon: network serpens-net not found"
        ));
        assert!(!is_missing_network("permission denied"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let engine = CliEngine::new("/nonexistent/serpens-test/docker", None);
        let err = engine.swarm_status().await.unwrap_err();
        assert!(err.is_unavailable());
    }

    /// Write an executable `docker` stand-in running `body`
    #[cfg(unix)]
    fn fake_docker(dir: &std::path::Path, body: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("docker");
        std::fs::write(&script, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    const INACTIVE_SWARM_JSON: &str = r#"{"NodeID":"","NodeAddr":"","LocalNodeState":"inactive","ControlAvailable":false,"Error":"","RemoteManagers":null}"#;

    #[cfg(unix)]
    #[tokio::test]
    async fn test_status_from_fake_cli() {
        let dir = tempfile::tempdir().unwrap();
        let binary = fake_docker(dir.path(), &format!("echo '{}'", INACTIVE_SWARM_JSON));

        let engine = CliEngine::new(&binary, None);
        let status = engine.swarm_status().await.unwrap();
        assert!(!status.is_manager());
        assert!(status.node_id.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_labels_applied_in_one_update() {
        let dir = tempfile::tempdir().unwrap();
        let record = dir.path().join("argv");
        let binary = fake_docker(
            dir.path(),
            &format!("printf '%s\\n' \"$@\" >> '{}'", record.display()),
        );

        let labels = BTreeMap::from([
            ("type".to_string(), "heavy".to_string()),
            ("name".to_string(), "nuc".to_string()),
        ]);
        CliEngine::new(&binary, None)
            .add_node_labels("n1", &labels)
            .await
            .unwrap();

        let argv = std::fs::read_to_string(&record).unwrap();
        assert_eq!(
            argv.lines().collect::<Vec<_>>(),
            vec![
                "node",
                "update",
                "--label-add",
                "name=nuc",
                "--label-add",
                "type=heavy",
                "n1"
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_label_failure_is_classified() {
        let dir = tempfile::tempdir().unwrap();
        let binary = fake_docker(
            dir.path(),
            "echo 'Error response from daemon: node n1 not found' >&2\nexit 1",
        );

        let labels = BTreeMap::from([("type".to_string(), "tiny".to_string())]);
        let err = CliEngine::new(&binary, None)
            .add_node_labels("n1", &labels)
            .await
            .unwrap_err();
        assert!(matches!(err, SerpensError::NodeNotFound(ref m) if m == "node n1 not found"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timed_out_init_leaves_no_side_effect() {
        use crate::swarm::{BootstrapOptions, ClusterBootstrapper};
        use std::sync::Arc;
        use std::time::Duration;

        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("initialized");
        let binary = fake_docker(
            dir.path(),
            &format!(
                "case \"$1\" in\n  info) echo '{}' ;;\n  swarm) sleep 1; touch '{}' ;;\nesac",
                INACTIVE_SWARM_JSON,
                marker.display()
            ),
        );

        let options = BootstrapOptions {
            call_timeout: Duration::from_millis(300),
            ..Default::default()
        };
        let engine = Arc::new(CliEngine::new(&binary, None));
        let bootstrapper = ClusterBootstrapper::new(engine, options);

        let err = bootstrapper.ensure_control_plane().await.unwrap_err();
        assert!(err.is_unavailable());

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists());
    }
}
