// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Peer directory: the set of name service instances that store every node's published root,
//! and the failover client used to talk to them.

pub mod client;
pub mod discovery;
pub mod memory;
pub mod transport;

use chrono::{DateTime, Utc};
use ocstore_kernel::ContentAddress;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use client::DirectoryClient;
pub use discovery::{DirectorySource, HttpDirectorySource, StaticDirectorySource};
pub use memory::{MemoryNameService, MemoryTransportFactory};
pub use transport::{DirectoryTransport, HttpDirectoryTransport, HttpTransportFactory, TransportFactory};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("No name service instances available")]
    NoInstances,
    #[error("Name service call failed: {0}")]
    Transport(String),
    #[error("Name service discovery failed: {0}")]
    Discovery(String),
    #[error("All name service instances failed after {attempts} attempts: {last}")]
    Exhausted { attempts: usize, last: String },
}

/// One name service instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerEntry {
    pub index: u32,
    pub public_key: String,
    pub host: String,
    pub port: u16,
    pub secure: bool,
}

impl PeerEntry {
    pub fn base_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

/// Root published by a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootRecord {
    #[serde(rename = "cid")]
    pub address: ContentAddress,
    #[serde(rename = "lastUpdatedDate")]
    pub last_updated: DateTime<Utc>,
}
