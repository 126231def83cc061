// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Identity and kind types.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::KernelError;

/// Numeric index of a participating node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct NodeIndex(pub u32);

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Content address (CID) of an immutable file or directory in the content store.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentAddress(pub String);

impl ContentAddress {
    pub fn new(value: impl Into<String>) -> Self {
        ContentAddress(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Immutable content store path rooted at this address.
    pub fn ipfs_path(&self) -> String {
        format!("/ipfs/{}", self.0)
    }
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentAddress {
    fn from(value: &str) -> Self {
        ContentAddress(value.to_string())
    }
}

/// Kind of off-chain message data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ArtifactKind {
    #[serde(rename = "msg-envelope")]
    Envelope,
    #[serde(rename = "msg-receipt")]
    Receipt,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 2] = [ArtifactKind::Envelope, ArtifactKind::Receipt];

    pub fn name(&self) -> &'static str {
        match self {
            ArtifactKind::Envelope => "msg-envelope",
            ArtifactKind::Receipt => "msg-receipt",
        }
    }

    /// Directory under a leaf path holding files of this kind.
    pub fn sub_dir(&self) -> &'static str {
        match self {
            ArtifactKind::Envelope => "msg",
            ArtifactKind::Receipt => "rcpt",
        }
    }

    pub fn filename_prefix(&self) -> &'static str {
        match self {
            ArtifactKind::Envelope => "msg-",
            ArtifactKind::Receipt => "rcpt-",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ArtifactKind {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "msg-envelope" => Ok(ArtifactKind::Envelope),
            "msg-receipt" => Ok(ArtifactKind::Receipt),
            other => Err(KernelError::UnknownKind(other.to_string())),
        }
    }
}
