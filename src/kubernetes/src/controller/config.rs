use std::fs;

use serde::{Deserialize, Serialize};

use crate::config::BackendKind;

use super::error::{ConfigError, Error};

pub const DEFAULT_HTTP_PORT: u32 = 8080;
pub const DEFAULT_REQUEUE_INTERVAL: u64 = 30 * 60;
pub const DEFAULT_BACKEND_NAMESPACE: &str = "metallb-system";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_http_port")]
    pub http_port: u32,
    #[serde(default = "default_requeue_interval")]
    pub requeue_interval: u64,
    pub cluster_id: String,
    pub project_id: String,
    pub default_external_network: String,
    #[serde(default)]
    pub additional_networks: Vec<String>,
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default = "default_backend_namespace")]
    pub backend_namespace: String,
    pub inventory_endpoint: String,
    pub inventory_token: String,
}

impl Config {
    pub fn load(file: &str) -> Result<Self, Error> {
        let contents = fs::read_to_string(file).map_err(Error::StdIo)?;
        serde_yaml::from_str(&contents).map_err(|_| Error::Config(ConfigError::FailedToLoad))
    }
}

fn default_http_port() -> u32 {
    DEFAULT_HTTP_PORT
}

fn default_requeue_interval() -> u64 {
    DEFAULT_REQUEUE_INTERVAL
}

fn default_backend_namespace() -> String {
    DEFAULT_BACKEND_NAMESPACE.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn works_config_defaults() {
        let yaml = r#"
cluster_id: cluster-a
project_id: project-a
default_external_network: internet
inventory_endpoint: http://inventory:8080
inventory_token: secret
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.http_port, DEFAULT_HTTP_PORT);
        assert_eq!(config.requeue_interval, DEFAULT_REQUEUE_INTERVAL);
        assert_eq!(config.backend, BackendKind::MetalLb);
        assert_eq!(config.backend_namespace, DEFAULT_BACKEND_NAMESPACE);
        assert!(config.additional_networks.is_empty());
    }

    #[test]
    fn works_config_backend_selection() {
        let yaml = r#"
cluster_id: cluster-a
project_id: project-a
default_external_network: internet
additional_networks:
  - storage
backend: cilium
inventory_endpoint: http://inventory:8080
inventory_token: secret
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.backend, BackendKind::Cilium);
        assert_eq!(config.additional_networks, vec!["storage".to_string()]);
    }
}
