// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.

//! ocstore-kernel: repository layout and scan cursor rules for off-chain message data.
//!
//! Everything here is pure: no I/O, no async. The node crate drives the content store and
//! persistence with the paths, filenames and checkpoints computed by this crate.

pub mod error;
pub mod types;
pub mod layout;
pub mod checkpoint;

pub use checkpoint::{ObservedFiles, ScanCheckpoint};
pub use error::{KernelError, KernelResult};
pub use layout::{
    artifact_filename, parse_artifact_filename, reconstruct_saved_at, ArtifactLocation, LeafPath, RepoSubtype,
    MAX_COLLISION_COUNTER,
};
pub use types::{ArtifactKind, ContentAddress, NodeIndex};

#[cfg(test)]
pub mod tests;
