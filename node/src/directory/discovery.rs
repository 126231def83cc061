// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Resolution of the name service instance set.
//!
//! Each instance is described by a JSON record `{"idx": 1, "pubKey": "...", "host"?, "port"?, "secure"?}`.
//! Malformed records are skipped; missing connection fields take the configured defaults.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use super::{DirectoryError, PeerEntry};
use crate::config::{DirectoryConfig, DirectorySourceConfig};

#[async_trait]
pub trait DirectorySource: Send + Sync {
    async fn resolve(&self) -> Result<Vec<PeerEntry>, DirectoryError>;
}

#[derive(Debug, Clone)]
pub struct RecordDefaults {
    pub host_format: String,
    pub port: u16,
    pub secure: bool,
}

impl RecordDefaults {
    pub fn from_config(cfg: &DirectoryConfig) -> Self {
        Self {
            host_format: cfg.host_format.clone(),
            port: cfg.default_port,
            secure: cfg.default_secure,
        }
    }
}

pub fn parse_record(raw: &str, defaults: &RecordDefaults) -> Option<PeerEntry> {
    let value: Value = serde_json::from_str(raw).ok()?;
    parse_value(&value, defaults)
}

fn parse_value(value: &Value, defaults: &RecordDefaults) -> Option<PeerEntry> {
    let obj = value.as_object()?;

    let index = obj.get("idx")?.as_u64()?;
    if index < 1 || index > u32::MAX as u64 {
        return None;
    }
    let index = index as u32;
    let public_key = obj.get("pubKey")?.as_str()?.to_string();

    let port = match obj.get("port") {
        None => defaults.port,
        Some(v) => u16::try_from(v.as_u64()?).ok()?,
    };
    let secure = match obj.get("secure") {
        None => defaults.secure,
        Some(v) => v.as_bool()?,
    };
    let host = match obj.get("host") {
        None => defaults.host_format.replace("{index}", &index.to_string()),
        Some(v) => v.as_str()?.to_string(),
    };

    Some(PeerEntry {
        index,
        public_key,
        host,
        port,
        secure,
    })
}

/// Instance records fixed at start-up.
pub struct StaticDirectorySource {
    records: Vec<String>,
    defaults: RecordDefaults,
}

impl StaticDirectorySource {
    pub fn new(records: Vec<String>, defaults: RecordDefaults) -> Self {
        Self { records, defaults }
    }
}

#[async_trait]
impl DirectorySource for StaticDirectorySource {
    async fn resolve(&self) -> Result<Vec<PeerEntry>, DirectoryError> {
        Ok(self
            .records
            .iter()
            .filter_map(|r| parse_record(r, &self.defaults))
            .collect())
    }
}

/// Instance records served as a JSON array by an HTTP endpoint.
pub struct HttpDirectorySource {
    url: String,
    client: Client,
    defaults: RecordDefaults,
}

impl HttpDirectorySource {
    pub fn new(url: &str, request_timeout: Duration, defaults: RecordDefaults) -> Result<Self, DirectoryError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| DirectoryError::Discovery(e.to_string()))?;
        Ok(Self {
            url: url.to_string(),
            client,
            defaults,
        })
    }
}

#[async_trait]
impl DirectorySource for HttpDirectorySource {
    async fn resolve(&self) -> Result<Vec<PeerEntry>, DirectoryError> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| DirectoryError::Discovery(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(DirectoryError::Discovery(format!("{} returned {}", self.url, resp.status())));
        }

        let records: Vec<Value> = resp
            .json()
            .await
            .map_err(|e| DirectoryError::Discovery(e.to_string()))?;

        Ok(records
            .iter()
            .filter_map(|v| match v {
                Value::String(raw) => parse_record(raw, &self.defaults),
                other => parse_value(other, &self.defaults),
            })
            .collect())
    }
}

/// Source described by the node configuration.
pub fn source_from_config(cfg: &DirectoryConfig) -> Result<Box<dyn DirectorySource>, DirectoryError> {
    let defaults = RecordDefaults::from_config(cfg);
    Ok(match &cfg.source {
        DirectorySourceConfig::Static { records } => Box::new(StaticDirectorySource::new(records.clone(), defaults)),
        DirectorySourceConfig::Http { url } => Box::new(HttpDirectorySource::new(
            url,
            Duration::from_millis(cfg.request_timeout_ms),
            defaults,
        )?),
    })
}
