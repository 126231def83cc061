// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::time::Duration;

use async_trait::async_trait;
use ocstore_kernel::ContentAddress;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::Deserialize;

use super::{ContentError, ContentStore, EntryType, LsEntry, Stat, WriteOptions};

/// RPC messages that mean "the path is not there".
const NOT_FOUND_MESSAGES: [&str; 3] = ["file does not exist", "no link named", "no such file or directory"];

/// Client for a Kubo-compatible `/api/v0` RPC endpoint.
#[derive(Debug, Clone)]
pub struct IpfsHttpClient {
    base_url: String,
    client: Client,
}

#[derive(Deserialize)]
struct RpcError {
    #[serde(rename = "Message")]
    message: String,
}

#[derive(Deserialize)]
struct FilesStatResponse {
    #[serde(rename = "Hash")]
    hash: String,
    #[serde(rename = "Size")]
    size: u64,
    #[serde(rename = "Type")]
    entry_type: String,
}

#[derive(Deserialize)]
struct LsResponse {
    #[serde(rename = "Objects")]
    objects: Vec<LsObject>,
}

#[derive(Deserialize)]
struct LsObject {
    #[serde(rename = "Links", default)]
    links: Vec<LsLink>,
}

#[derive(Deserialize)]
struct LsLink {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Hash")]
    hash: String,
    #[serde(rename = "Type")]
    link_type: u8,
}

// unixfs node types
const UNIXFS_DIRECTORY: u8 = 1;
const UNIXFS_HAMT_SHARD: u8 = 5;

impl LsResponse {
    /// Links of every listed object, sorted by name.
    fn into_entries(self) -> Vec<LsEntry> {
        let mut entries: Vec<LsEntry> = self
            .objects
            .into_iter()
            .flat_map(|o| o.links)
            .map(|l| LsEntry {
                name: l.name,
                address: ContentAddress::new(l.hash),
                entry_type: match l.link_type {
                    UNIXFS_DIRECTORY | UNIXFS_HAMT_SHARD => EntryType::Directory,
                    _ => EntryType::File,
                },
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }
}

impl IpfsHttpClient {
    pub fn new(url: &str, request_timeout: Duration) -> Result<Self, ContentError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ContentError::Transport(e.to_string()))?;

        Ok(Self {
            base_url: url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn rpc(&self, command: &str, args: &[(&str, &str)], form: Option<Form>) -> Result<Response, ContentError> {
        let url = format!("{}/api/v0/{}", self.base_url, command);
        let mut req = self.client.post(&url).query(args);
        if let Some(form) = form {
            req = req.multipart(form);
        }

        let resp = req.send().await.map_err(|e| ContentError::Transport(e.to_string()))?;
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status();
        let message = match resp.json::<RpcError>().await {
            Ok(err) => err.message,
            Err(_) => format!("{} returned {}", command, status),
        };
        Err(classify(command, args, message))
    }

    async fn rpc_json<T: for<'de> Deserialize<'de>>(&self, command: &str, args: &[(&str, &str)]) -> Result<T, ContentError> {
        self.rpc(command, args, None)
            .await?
            .json()
            .await
            .map_err(|e| ContentError::Decode(e.to_string()))
    }
}

fn classify(command: &str, args: &[(&str, &str)], message: String) -> ContentError {
    if NOT_FOUND_MESSAGES.iter().any(|m| message.contains(m)) {
        let target = args
            .iter()
            .find(|(k, _)| *k == "arg")
            .map(|(_, v)| v.to_string())
            .unwrap_or_else(|| command.to_string());
        ContentError::NotFound(target)
    } else {
        ContentError::Rpc(message)
    }
}

fn flag(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

#[async_trait]
impl ContentStore for IpfsHttpClient {
    async fn files_stat(&self, path: &str) -> Result<Stat, ContentError> {
        let resp: FilesStatResponse = self.rpc_json("files/stat", &[("arg", path), ("hash", "false")]).await?;
        let entry_type = match resp.entry_type.as_str() {
            "directory" => EntryType::Directory,
            "file" => EntryType::File,
            other => return Err(ContentError::Decode(format!("unknown entry type {}", other))),
        };

        Ok(Stat {
            address: ContentAddress::new(resp.hash),
            size: resp.size,
            entry_type,
        })
    }

    async fn files_write(&self, path: &str, data: Vec<u8>, opts: WriteOptions) -> Result<(), ContentError> {
        let form = Form::new().part("file", Part::bytes(data).file_name("data"));
        self.rpc(
            "files/write",
            &[
                ("arg", path),
                ("create", flag(opts.create)),
                ("parents", flag(opts.parents)),
                ("truncate", "true"),
            ],
            Some(form),
        )
        .await?;
        Ok(())
    }

    async fn files_mkdir(&self, path: &str, parents: bool) -> Result<(), ContentError> {
        self.rpc("files/mkdir", &[("arg", path), ("parents", flag(parents))], None).await?;
        Ok(())
    }

    async fn files_cp(&self, src: &str, dst: &str) -> Result<(), ContentError> {
        self.rpc("files/cp", &[("arg", src), ("arg", dst)], None).await?;
        Ok(())
    }

    async fn ls(&self, path: &str) -> Result<Vec<LsEntry>, ContentError> {
        let resp: LsResponse = self.rpc_json("ls", &[("arg", path), ("resolve-type", "true")]).await?;

        Ok(resp.into_entries())
    }

    async fn cat(&self, address: &ContentAddress) -> Result<Vec<u8>, ContentError> {
        let resp = self.rpc("cat", &[("arg", address.as_str())], None).await?;
        let bytes = resp.bytes().await.map_err(|e| ContentError::Transport(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn pin_add(&self, address: &ContentAddress) -> Result<(), ContentError> {
        self.rpc("pin/add", &[("arg", address.as_str())], None).await?;
        Ok(())
    }

    async fn pin_update(&self, old: &ContentAddress, new: &ContentAddress) -> Result<(), ContentError> {
        self.rpc("pin/update", &[("arg", old.as_str()), ("arg", new.as_str())], None).await?;
        Ok(())
    }
}
