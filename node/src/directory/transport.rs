// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use ocstore_kernel::{ContentAddress, NodeIndex};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{DirectoryError, PeerEntry, RootRecord};

/// Calls understood by one name service instance.
#[async_trait]
pub trait DirectoryTransport: Send + Sync {
    async fn get_root(&self, node: NodeIndex) -> Result<Option<RootRecord>, DirectoryError>;

    /// Roots of every node, or only those updated after `updated_since`.
    async fn get_all_roots(
        &self,
        updated_since: Option<DateTime<Utc>>,
    ) -> Result<BTreeMap<NodeIndex, RootRecord>, DirectoryError>;

    async fn set_root(
        &self,
        node: NodeIndex,
        address: &ContentAddress,
        last_updated: Option<DateTime<Utc>>,
    ) -> Result<(), DirectoryError>;
}

/// Opens a transport to a given instance.
pub trait TransportFactory: Send + Sync {
    fn connect(&self, entry: &PeerEntry) -> Arc<dyn DirectoryTransport>;
}

#[derive(Deserialize)]
struct DataEnvelope<T> {
    data: Option<T>,
}

#[derive(Serialize)]
struct SetRootBody<'a> {
    cid: &'a ContentAddress,
    #[serde(rename = "lastUpdatedDate", skip_serializing_if = "Option::is_none")]
    last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct HttpDirectoryTransport {
    base_url: String,
    client: Client,
}

impl HttpDirectoryTransport {
    pub fn new(base_url: &str, client: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<Option<T>, DirectoryError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| DirectoryError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(DirectoryError::Transport(format!("GET {} failed: {}", path, resp.status())));
        }

        let body: DataEnvelope<T> = resp
            .json()
            .await
            .map_err(|e| DirectoryError::Transport(e.to_string()))?;
        Ok(body.data)
    }
}

#[async_trait]
impl DirectoryTransport for HttpDirectoryTransport {
    async fn get_root(&self, node: NodeIndex) -> Result<Option<RootRecord>, DirectoryError> {
        self.get(&format!("/ctn-node/{}/ipfs-root", node)).await
    }

    async fn get_all_roots(
        &self,
        updated_since: Option<DateTime<Utc>>,
    ) -> Result<BTreeMap<NodeIndex, RootRecord>, DirectoryError> {
        let path = match updated_since {
            Some(since) => format!(
                "/ctn-node/ipfs-root?updatedSince={}",
                since.to_rfc3339_opts(SecondsFormat::Millis, true)
            ),
            None => "/ctn-node/ipfs-root".to_string(),
        };
        Ok(self.get(&path).await?.unwrap_or_default())
    }

    async fn set_root(
        &self,
        node: NodeIndex,
        address: &ContentAddress,
        last_updated: Option<DateTime<Utc>>,
    ) -> Result<(), DirectoryError> {
        let url = format!("{}/ctn-node/{}/ipfs-root", self.base_url, node);
        let resp = self
            .client
            .post(&url)
            .json(&SetRootBody { cid: address, last_updated })
            .send()
            .await
            .map_err(|e| DirectoryError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(DirectoryError::Transport(format!("POST {} failed: {}", url, resp.status())));
        }
        Ok(())
    }
}

/// Builds HTTP transports sharing one connection pool.
#[derive(Debug, Clone)]
pub struct HttpTransportFactory {
    client: Client,
}

impl HttpTransportFactory {
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Result<Self, DirectoryError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .map_err(|e| DirectoryError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

impl TransportFactory for HttpTransportFactory {
    fn connect(&self, entry: &PeerEntry) -> Arc<dyn DirectoryTransport> {
        Arc::new(HttpDirectoryTransport::new(&entry.base_url(), self.client.clone()))
    }
}
