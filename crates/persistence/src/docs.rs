//! Documents stored by the node.

use chrono::{DateTime, Utc};
use ocstore_kernel::{ArtifactKind, ContentAddress, NodeIndex, ScanCheckpoint};
use serde::{Deserialize, Serialize};

use crate::collection::Document;

/// Single application-wide document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppStateDoc {
    /// Reference time of the last discover cycle that harvested every peer successfully.
    pub last_roots_retrieval: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCheckpointDoc {
    pub peer: NodeIndex,
    pub subtype: String,
    pub checkpoint: ScanCheckpoint,
}

impl Document for ScanCheckpointDoc {
    const COLLECTION: &'static str = "ScanCheckpoints";
    type Key = (NodeIndex, String);

    fn unique_key(&self) -> Self::Key {
        (self.peer, self.subtype.clone())
    }
}

/// Artifact written by this node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedArtifactDoc {
    pub address: ContentAddress,
    pub kind: ArtifactKind,
    pub data: Vec<u8>,
    pub saved_at: DateTime<Utc>,
    pub saved_counter: u32,
}

impl Document for SavedArtifactDoc {
    const COLLECTION: &'static str = "SavedArtifacts";
    type Key = (ArtifactKind, DateTime<Utc>, u32);

    fn unique_key(&self) -> Self::Key {
        (self.kind, self.saved_at, self.saved_counter)
    }

    fn secondary_key(&self) -> Option<&str> {
        Some(self.address.as_str())
    }
}

/// Artifact harvested from a node's tree (this node's own tree included).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievedArtifactDoc {
    pub address: ContentAddress,
    pub kind: ArtifactKind,
    pub data: Vec<u8>,
    pub saved_at: DateTime<Utc>,
    pub saved_counter: u32,
    pub retrieved_at: DateTime<Utc>,
    pub peer: NodeIndex,
}

impl Document for RetrievedArtifactDoc {
    const COLLECTION: &'static str = "RetrievedArtifacts";
    type Key = (NodeIndex, ArtifactKind, DateTime<Utc>, u32);

    fn unique_key(&self) -> Self::Key {
        (self.peer, self.kind, self.saved_at, self.saved_counter)
    }

    fn secondary_key(&self) -> Option<&str> {
        Some(self.address.as_str())
    }
}
