// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use chrono::{DateTime, Utc};
use ocstore_kernel::{ArtifactKind, ContentAddress, NodeIndex};
use ocstore_persistence::{RetrievedArtifactDoc, RetrievedQuery, SavedArtifactDoc};

use super::ContentRepo;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactView {
    pub address: ContentAddress,
    pub kind: ArtifactKind,
    pub data: Vec<u8>,
    pub saved_at: DateTime<Utc>,
    /// Unset for artifacts saved here but not harvested yet.
    pub retrieved_at: Option<DateTime<Utc>>,
    pub peer: Option<NodeIndex>,
}

impl From<RetrievedArtifactDoc> for ArtifactView {
    fn from(doc: RetrievedArtifactDoc) -> Self {
        Self {
            address: doc.address,
            kind: doc.kind,
            data: doc.data,
            saved_at: doc.saved_at,
            retrieved_at: Some(doc.retrieved_at),
            peer: Some(doc.peer),
        }
    }
}

impl From<SavedArtifactDoc> for ArtifactView {
    fn from(doc: SavedArtifactDoc) -> Self {
        Self {
            address: doc.address,
            kind: doc.kind,
            data: doc.data,
            saved_at: doc.saved_at,
            retrieved_at: None,
            peer: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactPage {
    pub items: Vec<ArtifactView>,
    pub has_more: bool,
}

impl ContentRepo {
    pub fn get_artifact_by_address(&self, address: &ContentAddress, include_saved_only: bool) -> Option<ArtifactView> {
        if let Some(doc) = self.db.find_retrieved_by_address(address) {
            return Some(doc.into());
        }
        if include_saved_only {
            return self.db.find_saved_by_address(address).map(Into::into);
        }
        None
    }

    /// Harvested artifacts ordered by retrieval time, then saved time.
    pub fn list_harvested_artifacts(
        &self,
        retrieved_after: Option<DateTime<Utc>>,
        limit: Option<usize>,
        skip: usize,
    ) -> ArtifactPage {
        let mut items = self.db.find_retrieved(&RetrievedQuery {
            retrieved_after,
            skip,
            limit: limit.map(|l| l.saturating_add(1)),
        });

        let has_more = matches!(limit, Some(l) if items.len() > l);
        if let Some(l) = limit {
            items.truncate(l);
        }

        ArtifactPage {
            items: items.into_iter().map(Into::into).collect(),
            has_more,
        }
    }
}
