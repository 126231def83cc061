//! ocstore-persistence: journaled document collections backing the repository engine.

pub mod error;
pub mod wal;
pub mod snapshot;
pub mod collection;
pub mod docs;
pub mod database;

pub use database::{Database, InsertManyReport, RetrievedQuery};
pub use docs::{AppStateDoc, RetrievedArtifactDoc, SavedArtifactDoc, ScanCheckpointDoc};
pub use error::{PersistenceError, Result};
