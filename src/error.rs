//! Error types for Serpens

use thiserror::Error;

/// Result type for Serpens operations
pub type Result<T> = std::result::Result<T, SerpensError>;

/// Serpens error types
#[derive(Error, Debug)]
pub enum SerpensError {
    #[error("Orchestration unavailable: {0}")]
    OrchestrationUnavailable(String),

    #[error("Swarm initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Label rejected: {0}")]
    LabelRejected(String),

    #[error("Control plane inactive: {0}")]
    ControlPlaneInactive(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SerpensError {
    /// Whether the failure came from not reaching the orchestration layer at all
    pub fn is_unavailable(&self) -> bool {
        matches!(self, SerpensError::OrchestrationUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_underlying_detail() {
        let err = SerpensError::NodeNotFound("node abc123 not found".to_string());
        assert_eq!(err.to_string(), "Node not found: node abc123 not found");

        let err = SerpensError::ControlPlaneInactive(
            "This node is not a swarm manager.".to_string(),
        );
        assert!(err.to_string().contains("not a swarm manager"));
    }

    #[test]
    fn test_is_unavailable() {
        assert!(SerpensError::OrchestrationUnavailable("timeout".into()).is_unavailable());
        assert!(!SerpensError::LabelRejected("bad key".into()).is_unavailable());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: SerpensError = json_err.into();
        assert!(matches!(err, SerpensError::Json(_)));
    }
}
