//! Error types.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    /// A leaf path is not `/YYYY/MM/DD/HH/mm` or names an impossible date.
    #[error("Invalid leaf path: {0}")]
    InvalidLeafPath(String),
    /// An artifact filename does not carry `<prefix><5-digit ms><3-digit counter>`.
    #[error("Invalid artifact filename: {0}")]
    InvalidFilename(String),
    /// Unknown artifact kind name.
    #[error("Unknown artifact kind: {0}")]
    UnknownKind(String),
    /// Collision counter outside `0..=999`.
    #[error("Collision counter out of range: {0}")]
    CounterOutOfRange(u32),
}

pub type KernelResult<T> = core::result::Result<T, KernelError>;
