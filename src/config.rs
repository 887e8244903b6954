//! Bootstrap configuration
//!
//! Settings come from an optional YAML file and are then overridden by
//! command-line flags and environment variables in `main`.

use crate::error::{Result, SerpensError};
use crate::swarm::cluster::{SwarmInitRequest, DEFAULT_LISTEN_ADDR};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Docker Engine API version used for REST calls
pub const DEFAULT_API_VERSION: &str = "1.43";

/// Overlay network the deployment stack attaches services to
pub const DEFAULT_NETWORK: &str = "serpens-net";

/// Per-call timeout against the orchestration layer
pub const DEFAULT_TIMEOUT_SECS: u64 = 20;

/// Config file name under the user config directory
pub const CONFIG_FILE_NAME: &str = "bootstrap.yaml";

/// Host schemes only the `docker` CLI can dial
const CLI_SCHEMES: &[&str] = &["unix://", "ssh://", "fd://", "npipe://"];

/// Where the orchestration layer is reached
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEndpoint {
    /// Docker Engine REST API base URL
    Http(String),
    /// Local `docker` CLI, optionally with an explicit `-H` host
    Local(Option<String>),
}

/// Bootstrap configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Engine host (`unix://`, `ssh://`, `tcp://`, `http://`, ...); local default when unset
    pub host: Option<String>,
    /// `tcp://` host requires TLS with client certificates (`DOCKER_TLS_VERIFY`)
    pub tls_verify: bool,
    /// Docker CLI binary for local hosts
    pub docker_binary: String,
    /// Engine API version for REST calls
    pub api_version: String,
    /// Swarm listen address used on init
    pub listen_addr: String,
    /// Swarm advertise address used on init
    pub advertise_addr: Option<String>,
    /// Overlay network ensured after init; none disables it
    pub network: Option<String>,
    /// Per-call timeout in seconds
    pub timeout_secs: u64,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            host: None,
            tls_verify: false,
            docker_binary: "docker".to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            advertise_addr: None,
            network: Some(DEFAULT_NETWORK.to_string()),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl BootstrapConfig {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("serpens").join(CONFIG_FILE_NAME))
    }

    /// Load configuration
    ///
    /// An explicit path must exist. Without one, the default path is read if
    /// present and built-in defaults are used otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::parse_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::parse_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Parse config file from path
    pub fn parse_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SerpensError::InvalidConfig(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Self::parse_str(&content)
    }

    /// Parse config from a YAML string
    pub fn parse_str(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| SerpensError::Yaml(format!("Failed to parse YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that would only fail later at call time
    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(SerpensError::InvalidConfig(
                "timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.listen_addr.trim().is_empty() {
            return Err(SerpensError::InvalidConfig(
                "listen_addr must not be empty".to_string(),
            ));
        }
        self.endpoint()?;
        Ok(())
    }

    /// Resolve the engine endpoint from `host`
    pub fn endpoint(&self) -> Result<EngineEndpoint> {
        let host = match self.host.as_deref().map(str::trim) {
            None | Some("") => return Ok(EngineEndpoint::Local(None)),
            Some(host) => host,
        };

        if CLI_SCHEMES.iter().any(|scheme| host.starts_with(scheme)) {
            Ok(EngineEndpoint::Local(Some(host.to_string())))
        } else if let Some(rest) = host.strip_prefix("tcp://") {
            if self.tls_verify {
                // Client certificates are read by the CLI from DOCKER_CERT_PATH
                Ok(EngineEndpoint::Local(Some(host.to_string())))
            } else {
                Ok(EngineEndpoint::Http(format!(
                    "http://{}",
                    rest.trim_end_matches('/')
                )))
            }
        } else if host.starts_with("http://") || host.starts_with("https://") {
            Ok(EngineEndpoint::Http(host.trim_end_matches('/').to_string()))
        } else {
            Err(SerpensError::InvalidConfig(format!(
                "unsupported engine host '{}': expected unix://, ssh://, fd://, npipe://, tcp://, http:// or https://",
                host
            )))
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Swarm init parameters from this configuration
    pub fn init_request(&self) -> SwarmInitRequest {
        SwarmInitRequest {
            listen_addr: self.listen_addr.clone(),
            advertise_addr: self.advertise_addr.clone(),
            force_new_cluster: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = BootstrapConfig::default();
        assert_eq!(config.network.as_deref(), Some("serpens-net"));
        assert_eq!(config.timeout(), Duration::from_secs(20));
        assert_eq!(config.endpoint().unwrap(), EngineEndpoint::Local(None));
        assert_eq!(config.init_request().listen_addr, "0.0.0.0:2377");
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = r#"
host: tcp://192.168.1.10:2375
advertise_addr: 192.168.1.10
timeout_secs: 10
"#;
        let config = BootstrapConfig::parse_str(yaml).unwrap();
        assert_eq!(
            config.endpoint().unwrap(),
            EngineEndpoint::Http("http://192.168.1.10:2375".to_string())
        );
        assert_eq!(config.advertise_addr.as_deref(), Some("192.168.1.10"));
        assert_eq!(config.timeout_secs, 10);
        assert_eq!(config.docker_binary, "docker");
        assert_eq!(config.network.as_deref(), Some("serpens-net"));
    }

    #[test]
    fn test_null_network_disables_it() {
        let config = BootstrapConfig::parse_str("network: null\n").unwrap();
        assert_eq!(config.network, None);
    }

    #[test]
    fn test_endpoint_schemes() {
        let mut config = BootstrapConfig {
            host: Some("unix:///run/docker.sock".to_string()),
            ..Default::default()
        };
        assert_eq!(
            config.endpoint().unwrap(),
            EngineEndpoint::Local(Some("unix:///run/docker.sock".to_string()))
        );

        config.host = Some("https://swarm.example.com:2376/".to_string());
        assert_eq!(
            config.endpoint().unwrap(),
            EngineEndpoint::Http("https://swarm.example.com:2376".to_string())
        );

        config.host = Some("ssh://pi@rpi4".to_string());
        assert_eq!(
            config.endpoint().unwrap(),
            EngineEndpoint::Local(Some("ssh://pi@rpi4".to_string()))
        );

        config.host = Some("fd://".to_string());
        assert_eq!(
            config.endpoint().unwrap(),
            EngineEndpoint::Local(Some("fd://".to_string()))
        );

        config.host = Some("ftp://rpi4".to_string());
        assert!(matches!(
            config.endpoint(),
            Err(SerpensError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_tls_tcp_host_goes_through_cli() {
        let mut config =
            BootstrapConfig::parse_str("host: tcp://rpi4:2376\ntls_verify: true\n").unwrap();
        assert_eq!(
            config.endpoint().unwrap(),
            EngineEndpoint::Local(Some("tcp://rpi4:2376".to_string()))
        );

        config.tls_verify = false;
        assert_eq!(
            config.endpoint().unwrap(),
            EngineEndpoint::Http("http://rpi4:2376".to_string())
        );
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = BootstrapConfig::parse_str("timeout_secs: 0\n").unwrap_err();
        assert!(matches!(err, SerpensError::InvalidConfig(_)));
    }

    #[test]
    fn test_invalid_yaml() {
        let err = BootstrapConfig::parse_str("timeout_secs: [1, 2\n").unwrap_err();
        assert!(matches!(err, SerpensError::Yaml(_)));
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "listen_addr: 0.0.0.0:2400").unwrap();

        let config = BootstrapConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:2400");
    }

    #[test]
    fn test_load_missing_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = BootstrapConfig::load(Some(&dir.path().join("missing.yaml"))).unwrap_err();
        assert!(matches!(err, SerpensError::InvalidConfig(_)));
    }
}
