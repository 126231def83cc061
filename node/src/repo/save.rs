// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ocstore_kernel::{ArtifactKind, ArtifactLocation, ContentAddress, MAX_COLLISION_COUNTER};
use ocstore_persistence::SavedArtifactDoc;

use super::{ContentRepo, MSG_DATA};
use crate::content::WriteOptions;
use crate::errors::EngineError;
use crate::telemetry;

/// Where an artifact landed in the local tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedArtifact {
    /// Address of the file itself.
    pub address: ContentAddress,
    pub saved_at: DateTime<Utc>,
    pub counter: u32,
    pub path: String,
    /// Root of the local tree right after the write.
    pub root: ContentAddress,
}

impl ContentRepo {
    /// Writes an artifact under the date/time leaf of `reference`.
    ///
    /// Fails with [`EngineError::AllocationExhausted`] when every collision counter of the
    /// millisecond bucket is taken. Recording the artifact in the database is best effort.
    pub async fn save_artifact(
        self: &Arc<Self>,
        data: Vec<u8>,
        kind: ArtifactKind,
        reference: DateTime<Utc>,
        harvest_now: bool,
    ) -> Result<SavedArtifact, EngineError> {
        let saved = self
            .save_section
            .execute(|| self.write_artifact(&data, kind, &reference))
            .await?;

        tracing::debug!("Saved {} at {} ({})", kind, saved.path, saved.address);
        metrics::counter!(telemetry::ARTIFACTS_SAVED, 1);

        let doc = SavedArtifactDoc {
            address: saved.address.clone(),
            kind,
            data,
            saved_at: saved.saved_at,
            saved_counter: saved.counter,
        };
        if let Err(e) = self.db.insert_saved(doc) {
            tracing::error!("Could not record saved artifact {}: {}", saved.address, e);
        }

        if harvest_now {
            self.harvest_local_now();
        }

        Ok(saved)
    }

    async fn write_artifact(
        &self,
        data: &[u8],
        kind: ArtifactKind,
        reference: &DateTime<Utc>,
    ) -> Result<SavedArtifact, EngineError> {
        let location = ArtifactLocation::new(&self.root_dir, MSG_DATA, reference, kind);

        let mut free = None;
        for counter in 0..=MAX_COLLISION_COUNTER {
            let path = location.path(counter)?;
            match self.store.files_stat(&path).await {
                Ok(_) => continue,
                Err(e) if e.is_not_found() => {
                    free = Some((counter, path));
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }
        let Some((counter, path)) = free else {
            tracing::error!("No free slot left under {}", location.kind_dir());
            return Err(EngineError::AllocationExhausted);
        };

        self.store
            .files_write(
                &path,
                data.to_vec(),
                WriteOptions {
                    create: true,
                    parents: true,
                },
            )
            .await?;

        let address = self.store.files_stat(&path).await?.address;
        let root = self.store.files_stat(&self.root_dir).await?.address;
        self.roots().current = root.clone();

        Ok(SavedArtifact {
            address,
            saved_at: location.saved_at()?,
            counter,
            path,
            root,
        })
    }
}
