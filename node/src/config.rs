// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::EngineError;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Index of this node in the network.
    pub node_index: u32,
    pub bind_addr: SocketAddr,
    pub auth_token: Option<String>,
    /// Journal and snapshot directory; `None` keeps persistence in memory.
    pub data_dir: Option<PathBuf>,
    pub max_list_items: usize,
    /// Time given to in-flight API requests before automation is drained.
    pub shutdown_grace_ms: u64,
    pub repo: RepoConfig,
    pub content_store: ContentStoreConfig,
    pub directory: DirectoryConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RepoConfig {
    /// Mutable root directory of the local tree in the content store.
    pub root_dir: String,
    pub publish_interval_ms: u64,
    pub discover_interval_ms: u64,
    pub discover_start_delay_ms: u64,
    /// Slack subtracted from the last retrieval time when asking for updated roots.
    pub directory_time_delay_ms: u64,
}

impl RepoConfig {
    pub fn publish_interval(&self) -> Duration {
        Duration::from_millis(self.publish_interval_ms)
    }

    pub fn discover_interval(&self) -> Duration {
        Duration::from_millis(self.discover_interval_ms)
    }

    pub fn discover_start_delay(&self) -> Duration {
        Duration::from_millis(self.discover_start_delay_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContentStoreConfig {
    pub api_url: String,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DirectorySourceConfig {
    /// Directory records given inline, one JSON object per string.
    Static { records: Vec<String> },
    /// Endpoint answering a JSON array of directory records.
    Http { url: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    pub source: DirectorySourceConfig,
    /// Host name template; `{index}` is replaced by the instance index.
    pub host_format: String,
    pub default_port: u16,
    pub default_secure: bool,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_index: 1,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            auth_token: None,
            data_dir: None,
            max_list_items: 500,
            shutdown_grace_ms: 5_000,
            repo: RepoConfig::default(),
            content_store: ContentStoreConfig::default(),
            directory: DirectoryConfig::default(),
        }
    }
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            root_dir: "/ocstore".to_string(),
            publish_interval_ms: 30_000,
            discover_interval_ms: 60_000,
            discover_start_delay_ms: 15_000,
            directory_time_delay_ms: 10_000,
        }
    }
}

impl Default for ContentStoreConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:5001".to_string(),
            request_timeout_ms: 30_000,
        }
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            source: DirectorySourceConfig::Static { records: Vec::new() },
            host_format: "ns{index}.localhost".to_string(),
            default_port: 8080,
            default_secure: false,
            connect_timeout_ms: 5_000,
            request_timeout_ms: 10_000,
        }
    }
}

impl NodeConfig {
    /// Defaults, overlaid with the JSON file named by `OCSTORE_CONFIG`, overlaid with
    /// `OCSTORE_*` environment variables.
    pub fn load() -> Result<Self, EngineError> {
        let mut cfg = match std::env::var("OCSTORE_CONFIG") {
            Ok(path) => {
                let raw = std::fs::read(&path)
                    .map_err(|e| EngineError::Config(format!("cannot read {}: {}", path, e)))?;
                serde_json::from_slice(&raw)
                    .map_err(|e| EngineError::Config(format!("cannot parse {}: {}", path, e)))?
            }
            Err(_) => NodeConfig::default(),
        };

        if let Ok(v) = std::env::var("OCSTORE_NODE_INDEX") {
            cfg.node_index = v
                .parse()
                .map_err(|_| EngineError::Config(format!("invalid OCSTORE_NODE_INDEX: {}", v)))?;
        }
        if let Ok(v) = std::env::var("OCSTORE_BIND_ADDR") {
            cfg.bind_addr = v
                .parse()
                .map_err(|_| EngineError::Config(format!("invalid OCSTORE_BIND_ADDR: {}", v)))?;
        }
        if let Ok(v) = std::env::var("OCSTORE_AUTH_TOKEN") {
            cfg.auth_token = Some(v);
        }
        if let Ok(v) = std::env::var("OCSTORE_DATA_DIR") {
            cfg.data_dir = Some(PathBuf::from(v));
        }

        Ok(cfg)
    }
}
