// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Content-addressed storage used by the repository engine.
//!
//! Paths are either mutable (rooted at `/`, e.g. the node's root dir) or immutable
//! (`/ipfs/<address>/...`). Every operation can fail with [`ContentError::NotFound`], which
//! callers walking a tree treat as an empty result.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use ocstore_kernel::ContentAddress;
use thiserror::Error;

pub use http::IpfsHttpClient;
pub use memory::{MemoryContentStore, MemoryDag};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContentError {
    #[error("No such path: {0}")]
    NotFound(String),
    #[error("Content store rejected request: {0}")]
    Rpc(String),
    #[error("Content store unreachable: {0}")]
    Transport(String),
    #[error("Malformed content store response: {0}")]
    Decode(String),
}

impl ContentError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ContentError::NotFound(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    File,
    Directory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    pub address: ContentAddress,
    pub size: u64,
    pub entry_type: EntryType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LsEntry {
    pub name: String,
    pub address: ContentAddress,
    pub entry_type: EntryType,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    pub create: bool,
    pub parents: bool,
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn files_stat(&self, path: &str) -> Result<Stat, ContentError>;

    async fn files_write(&self, path: &str, data: Vec<u8>, opts: WriteOptions) -> Result<(), ContentError>;

    async fn files_mkdir(&self, path: &str, parents: bool) -> Result<(), ContentError>;

    async fn files_cp(&self, src: &str, dst: &str) -> Result<(), ContentError>;

    /// Lists a directory, entries sorted by name.
    async fn ls(&self, path: &str) -> Result<Vec<LsEntry>, ContentError>;

    async fn cat(&self, address: &ContentAddress) -> Result<Vec<u8>, ContentError>;

    async fn pin_add(&self, address: &ContentAddress) -> Result<(), ContentError>;

    async fn pin_update(&self, old: &ContentAddress, new: &ContentAddress) -> Result<(), ContentError>;
}
