// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Incremental walk of a node's tree.
//!
//! Only the part of the date/time hierarchy at or after the peer's checkpoint is descended, and
//! in the checkpoint leaf itself only files past the per-kind cursor are fetched.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use ocstore_kernel::{reconstruct_saved_at, ArtifactKind, ContentAddress, LeafPath, NodeIndex, ObservedFiles, ScanCheckpoint};
use ocstore_persistence::{RetrievedArtifactDoc, ScanCheckpointDoc};

use super::{ContentRepo, MSG_DATA};
use crate::content::{EntryType, LsEntry};
use crate::errors::EngineError;
use crate::telemetry;

impl ContentRepo {
    /// Harvests the tree published as `root` by `peer`; returns the number of new artifacts stored.
    pub async fn harvest_tree(
        &self,
        peer: NodeIndex,
        root: &ContentAddress,
        reference: DateTime<Utc>,
    ) -> Result<usize, EngineError> {
        let started = Instant::now();
        let prev = self.db.find_checkpoint(peer, MSG_DATA.name).map(|d| d.checkpoint);
        let base = MSG_DATA.root_in(&root.ipfs_path());

        let leaves = self.scan_leaves(&base, prev.as_ref()).await?;
        let Some(last_leaf) = leaves.last().cloned() else {
            tracing::trace!("Nothing to scan in tree of node {}", peer);
            return Ok(0);
        };

        let mut staged = Vec::new();
        let mut observed = ObservedFiles::default();
        for leaf in &leaves {
            let leaf_path = match LeafPath::parse(leaf) {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!("Skipping leaf {} of node {}: {}", leaf, peer, e);
                    continue;
                }
            };

            for kind in ArtifactKind::ALL {
                let dir = format!("{}{}/{}", base, leaf, kind.sub_dir());
                let mut last_seen = None;

                for entry in self.list_or_empty(&dir).await? {
                    if entry.entry_type != EntryType::File {
                        continue;
                    }
                    if let Some(cp) = &prev {
                        if !cp.admits_file(leaf, kind, &entry.name) {
                            continue;
                        }
                    }
                    last_seen = Some(entry.name.clone());

                    let (saved_at, saved_counter) = match reconstruct_saved_at(&leaf_path, kind, &entry.name) {
                        Ok(v) => v,
                        Err(e) => {
                            tracing::warn!("Skipping {}/{} of node {}: {}", dir, entry.name, peer, e);
                            continue;
                        }
                    };
                    let data = self.store.cat(&entry.address).await?;

                    staged.push(RetrievedArtifactDoc {
                        address: entry.address,
                        kind,
                        data,
                        saved_at,
                        saved_counter,
                        retrieved_at: reference,
                        peer,
                    });
                }
                if *leaf == last_leaf {
                    observed.set(kind, last_seen);
                }
            }
        }

        let inserted = if staged.is_empty() {
            0
        } else {
            let report = self.db.insert_retrieved_many(staged)?;
            for key in &report.duplicates {
                tracing::warn!("Artifact {} of node {} already stored", key, peer);
            }
            report.inserted
        };

        if inserted > 0 {
            metrics::counter!(telemetry::ARTIFACTS_HARVESTED, inserted as u64);
            self.notifier.notify_new_artifacts();
        }

        if let Some(checkpoint) = ScanCheckpoint::advance(prev.as_ref(), &last_leaf, observed) {
            let doc = ScanCheckpointDoc {
                peer,
                subtype: MSG_DATA.name.to_string(),
                checkpoint,
            };
            if prev.is_some() {
                self.db.update_checkpoint(doc)?;
            } else {
                self.db.insert_checkpoint(doc)?;
            }
        }

        metrics::histogram!(telemetry::HARVEST_DURATION, started.elapsed().as_secs_f64());
        tracing::debug!(
            "Harvested {} new artifacts from {} leaves of node {}",
            inserted,
            leaves.len(),
            peer
        );
        Ok(inserted)
    }

    /// Leaf paths (relative to `base`) that may hold data newer than `checkpoint`, in order.
    async fn scan_leaves(&self, base: &str, checkpoint: Option<&ScanCheckpoint>) -> Result<Vec<String>, EngineError> {
        let mut leaves = Vec::new();
        // Breadth first over sorted listings yields leaves in lexicographic order.
        let mut work: VecDeque<Vec<String>> = VecDeque::from([Vec::new()]);

        while let Some(walked) = work.pop_front() {
            if walked.len() == MSG_DATA.depth {
                leaves.push(format!("/{}", walked.join("/")));
                continue;
            }

            let dir = if walked.is_empty() {
                base.to_string()
            } else {
                format!("{}/{}", base, walked.join("/"))
            };

            for entry in self.list_or_empty(&dir).await? {
                if entry.entry_type != EntryType::Directory {
                    continue;
                }
                if checkpoint.map_or(true, |cp| cp.admits_child(&walked, &entry.name)) {
                    let mut child = walked.clone();
                    child.push(entry.name);
                    work.push_back(child);
                }
            }
        }

        Ok(leaves)
    }

    async fn list_or_empty(&self, path: &str) -> Result<Vec<LsEntry>, EngineError> {
        match self.store.ls(path).await {
            Ok(entries) => Ok(entries),
            Err(e) if e.is_not_found() => {
                tracing::debug!("{} not found; treating as empty", path);
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Harvests this node's own current tree.
    pub async fn harvest_local(&self) -> Result<usize, EngineError> {
        self.local_section
            .execute(|| async {
                let root = self.current_root();
                self.harvest_tree(self.node, &root, Utc::now()).await
            })
            .await
    }

    /// Starts a local harvest in the background, or folds the request into the one running.
    pub fn harvest_local_now(self: &Arc<Self>) {
        if !self.local_harvest.request() {
            tracing::trace!("Local harvest already running; request coalesced");
            return;
        }

        let repo = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                if let Err(e) = repo.harvest_local().await {
                    tracing::error!("Local harvest failed: {}", e);
                    metrics::counter!(telemetry::CYCLES_FAILED, 1, "cycle" => "local-harvest");
                }
                if !repo.local_harvest.finish_round() {
                    break;
                }
            }
        });
    }
}
