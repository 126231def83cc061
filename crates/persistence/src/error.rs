use thiserror::Error;
use std::io;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Invalid magic bytes in header")]
    InvalidMagic,
    #[error("Unsupported snapshot version: {0}")]
    UnsupportedVersion(u32),
    #[error("Checksum mismatch: expected {expected}, found {found}")]
    ChecksumMismatch {
        expected: u64,
        found: u64,
    },
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Invalid data format: {0}")]
    InvalidFormat(String),
    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("Duplicate key in {collection}: {key}")]
    DuplicateKey {
        collection: &'static str,
        key: String,
    },
}

impl PersistenceError {
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, PersistenceError::DuplicateKey { .. })
    }
}

pub type Result<T> = std::result::Result<T, PersistenceError>;
