// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Scan checkpoints.
//!
//! A checkpoint is the resumption cursor into a peer's tree: the last leaf path walked and, per
//! kind, the last filename seen in that leaf.

use serde::{Deserialize, Serialize};

use crate::types::ArtifactKind;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCheckpoint {
    /// Leaf path relative to the subtype root, e.g. `/2024/03/02/10/15`.
    pub last_scanned_leaf: String,
    pub last_envelope: Option<String>,
    pub last_receipt: Option<String>,
}

/// Last filename per kind observed in the final leaf of a walk.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObservedFiles {
    pub envelope: Option<String>,
    pub receipt: Option<String>,
}

impl ObservedFiles {
    pub fn set(&mut self, kind: ArtifactKind, filename: Option<String>) {
        match kind {
            ArtifactKind::Envelope => self.envelope = filename,
            ArtifactKind::Receipt => self.receipt = filename,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.envelope.is_none() && self.receipt.is_none()
    }
}

impl ScanCheckpoint {
    pub fn new(leaf: impl Into<String>, observed: ObservedFiles) -> Self {
        ScanCheckpoint {
            last_scanned_leaf: leaf.into(),
            last_envelope: observed.envelope,
            last_receipt: observed.receipt,
        }
    }

    pub fn cursor(&self, kind: ArtifactKind) -> Option<&str> {
        match kind {
            ArtifactKind::Envelope => self.last_envelope.as_deref(),
            ArtifactKind::Receipt => self.last_receipt.as_deref(),
        }
    }

    fn leaf_components(&self) -> Vec<&str> {
        self.last_scanned_leaf
            .split('/')
            .filter(|c| !c.is_empty())
            .collect()
    }

    /// Whether a child directory may hold data newer than the checkpoint.
    ///
    /// `walked` holds the directory names from the subtype root down to the child's parent.
    /// Off the checkpoint branch every child is admitted; on it, only children `>=` the
    /// checkpointed component at that level.
    pub fn admits_child(&self, walked: &[String], child: &str) -> bool {
        let levels = self.leaf_components();
        if walked.len() >= levels.len() {
            return true;
        }
        let on_branch = walked.iter().zip(levels.iter()).all(|(a, b)| a == b);
        !on_branch || child >= levels[walked.len()]
    }

    /// Whether a file in `leaf` was not seen by the walk that produced this checkpoint.
    pub fn admits_file(&self, leaf: &str, kind: ArtifactKind, filename: &str) -> bool {
        if leaf != self.last_scanned_leaf {
            return true;
        }
        match self.cursor(kind) {
            Some(cursor) => filename > cursor,
            None => true,
        }
    }

    /// Checkpoint to store after a walk whose final leaf was `last_leaf`.
    ///
    /// Returns `None` when the stored checkpoint is already current. On the same leaf only the
    /// cursors that advanced are replaced; a new leaf replaces the leaf and both cursors.
    pub fn advance(
        prev: Option<&ScanCheckpoint>,
        last_leaf: &str,
        observed: ObservedFiles,
    ) -> Option<ScanCheckpoint> {
        match prev {
            None => Some(ScanCheckpoint::new(last_leaf, observed)),
            Some(prev) if prev.last_scanned_leaf == last_leaf => {
                if observed.is_empty() {
                    return None;
                }
                Some(ScanCheckpoint {
                    last_scanned_leaf: prev.last_scanned_leaf.clone(),
                    last_envelope: observed.envelope.or_else(|| prev.last_envelope.clone()),
                    last_receipt: observed.receipt.or_else(|| prev.last_receipt.clone()),
                })
            }
            Some(_) => Some(ScanCheckpoint::new(last_leaf, observed)),
        }
    }
}
