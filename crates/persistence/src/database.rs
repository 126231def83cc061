//! Durable document database.
//!
//! All collections live in memory behind one mutex. With a data directory, every mutation is
//! journaled before it is applied, and `compact` folds the journal into a snapshot.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use ocstore_kernel::{ContentAddress, NodeIndex};
use serde::{Deserialize, Serialize};

use crate::collection::{Collection, Document};
use crate::docs::{AppStateDoc, RetrievedArtifactDoc, SavedArtifactDoc, ScanCheckpointDoc};
use crate::error::Result;
use crate::snapshot::{self, SnapshotHeader};
use crate::wal::{JournalReader, JournalWriter};

const SNAPSHOT_FILE: &str = "collections.snap";
const JOURNAL_FILE: &str = "journal.wal";

/// Outcome of an unordered bulk insert.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InsertManyReport {
    pub inserted: usize,
    /// Unique keys rejected as already present.
    pub duplicates: Vec<String>,
}

/// Filter and paging for harvested artifact listings.
#[derive(Debug, Default, Clone)]
pub struct RetrievedQuery {
    pub retrieved_after: Option<DateTime<Utc>>,
    pub skip: usize,
    pub limit: Option<usize>,
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "op", content = "doc")]
enum JournalOp {
    AppState(AppStateDoc),
    Checkpoint(ScanCheckpointDoc),
    Saved(SavedArtifactDoc),
    Retrieved(RetrievedArtifactDoc),
}

#[derive(Serialize, Deserialize, Default)]
struct SnapshotBody {
    app: AppStateDoc,
    checkpoints: Vec<ScanCheckpointDoc>,
    saved: Vec<SavedArtifactDoc>,
    retrieved: Vec<RetrievedArtifactDoc>,
}

struct Storage {
    dir: PathBuf,
    journal: JournalWriter,
}

#[derive(Default)]
struct Inner {
    app: AppStateDoc,
    checkpoints: Collection<ScanCheckpointDoc>,
    saved: Collection<SavedArtifactDoc>,
    retrieved: Collection<RetrievedArtifactDoc>,
    seq: u64,
    storage: Option<Storage>,
}

impl Inner {
    fn apply(&mut self, op: JournalOp) {
        match op {
            JournalOp::AppState(doc) => self.app = doc,
            JournalOp::Checkpoint(doc) => self.checkpoints.upsert(doc),
            JournalOp::Saved(doc) => self.saved.upsert(doc),
            JournalOp::Retrieved(doc) => self.retrieved.upsert(doc),
        }
    }

    /// Journals `op` (when durable) and applies it.
    fn commit(&mut self, op: JournalOp) -> Result<()> {
        if let Some(storage) = self.storage.as_mut() {
            let payload = serde_json::to_vec(&op)?;
            let seq = self.seq + 1;
            storage.journal.append(seq, &payload)?;
            self.seq = seq;
        }
        self.apply(op);
        Ok(())
    }

    /// Journals every op with a single sync, then applies them.
    fn commit_many(&mut self, ops: Vec<JournalOp>) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }
        if let Some(storage) = self.storage.as_mut() {
            let mut seq = self.seq;
            for op in &ops {
                seq += 1;
                storage.journal.write_entry(seq, &serde_json::to_vec(op)?)?;
            }
            storage.journal.sync()?;
            self.seq = seq;
        }
        for op in ops {
            self.apply(op);
        }
        Ok(())
    }

    fn snapshot_body(&self) -> SnapshotBody {
        SnapshotBody {
            app: self.app.clone(),
            checkpoints: self.checkpoints.iter().cloned().collect(),
            saved: self.saved.iter().cloned().collect(),
            retrieved: self.retrieved.iter().cloned().collect(),
        }
    }

    fn restore(&mut self, body: SnapshotBody) {
        self.app = body.app;
        for doc in body.checkpoints {
            self.checkpoints.upsert(doc);
        }
        for doc in body.saved {
            self.saved.upsert(doc);
        }
        for doc in body.retrieved {
            self.retrieved.upsert(doc);
        }
    }
}

pub struct Database {
    inner: Mutex<Inner>,
}

impl Database {
    /// Volatile database; nothing survives the process.
    pub fn in_memory() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Opens (or creates) a database in `dir`, loading the snapshot and replaying the journal.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let mut inner = Inner::default();

        let snapshot_path = dir.join(SNAPSHOT_FILE);
        if snapshot_path.exists() {
            let (header, body) = snapshot::read_snapshot(&snapshot_path)?;
            inner.restore(serde_json::from_slice(&body)?);
            inner.seq = header.last_seq;
        }

        let journal_path = dir.join(JOURNAL_FILE);
        let mut valid_len = 0;
        if journal_path.exists() {
            let mut reader = JournalReader::open(&journal_path)?;
            for entry in reader.by_ref() {
                let entry = entry?;
                if entry.header.seq <= inner.seq {
                    continue;
                }
                let op: JournalOp = serde_json::from_slice(&entry.payload)?;
                inner.apply(op);
                inner.seq = entry.header.seq;
            }
            valid_len = reader.valid_len();
        }

        inner.storage = Some(Storage {
            journal: JournalWriter::open_at(&journal_path, valid_len)?,
            dir,
        });

        Ok(Self {
            inner: Mutex::new(inner),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Folds the journal into a fresh snapshot. No-op for in-memory databases.
    pub fn compact(&self) -> Result<()> {
        let mut inner = self.lock();
        let body = serde_json::to_vec(&inner.snapshot_body())?;
        let seq = inner.seq;

        let Some(storage) = inner.storage.as_mut() else {
            return Ok(());
        };

        let timestamp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let header = SnapshotHeader::new(seq, timestamp, &body);
        snapshot::write_atomic(storage.dir.join(SNAPSHOT_FILE), &header, &body)?;
        storage.journal.truncate()?;
        Ok(())
    }

    // Application

    pub fn app_state(&self) -> AppStateDoc {
        self.lock().app.clone()
    }

    pub fn set_last_roots_retrieval(&self, at: DateTime<Utc>) -> Result<()> {
        self.lock().commit(JournalOp::AppState(AppStateDoc {
            last_roots_retrieval: Some(at),
        }))
    }

    // Scan checkpoints

    pub fn find_checkpoint(&self, peer: NodeIndex, subtype: &str) -> Option<ScanCheckpointDoc> {
        self.lock()
            .checkpoints
            .get(&(peer, subtype.to_string()))
            .cloned()
    }

    pub fn insert_checkpoint(&self, doc: ScanCheckpointDoc) -> Result<()> {
        let mut inner = self.lock();
        inner.checkpoints.check_insert(&doc)?;
        inner.commit(JournalOp::Checkpoint(doc))
    }

    /// Replaces an existing checkpoint; returns false when there is none to replace.
    pub fn update_checkpoint(&self, doc: ScanCheckpointDoc) -> Result<bool> {
        let mut inner = self.lock();
        if inner.checkpoints.get(&doc.unique_key()).is_none() {
            return Ok(false);
        }
        inner.commit(JournalOp::Checkpoint(doc))?;
        Ok(true)
    }

    // Saved artifacts

    pub fn insert_saved(&self, doc: SavedArtifactDoc) -> Result<()> {
        let mut inner = self.lock();
        inner.saved.check_insert(&doc)?;
        inner.commit(JournalOp::Saved(doc))
    }

    pub fn find_saved_by_address(&self, address: &ContentAddress) -> Option<SavedArtifactDoc> {
        self.lock()
            .saved
            .find_by_secondary(address.as_str())
            .first()
            .map(|d| (*d).clone())
    }

    // Retrieved artifacts

    /// Inserts every document whose unique key is free; the rest are reported, not failed.
    pub fn insert_retrieved_many(&self, docs: Vec<RetrievedArtifactDoc>) -> Result<InsertManyReport> {
        let mut inner = self.lock();
        let mut report = InsertManyReport::default();
        let mut batch_keys = BTreeSet::new();
        let mut ops = Vec::new();

        for doc in docs {
            let key = doc.unique_key();
            let taken = match inner.retrieved.check_insert(&doc) {
                Ok(()) => !batch_keys.insert(key.clone()),
                Err(e) if e.is_duplicate_key() => true,
                Err(e) => return Err(e),
            };
            if taken {
                report.duplicates.push(format!("{:?}", key));
                continue;
            }
            ops.push(JournalOp::Retrieved(doc));
        }

        report.inserted = ops.len();
        inner.commit_many(ops)?;
        Ok(report)
    }

    pub fn find_retrieved_by_address(&self, address: &ContentAddress) -> Option<RetrievedArtifactDoc> {
        self.lock()
            .retrieved
            .find_by_secondary(address.as_str())
            .first()
            .map(|d| (*d).clone())
    }

    /// Harvested artifacts ordered by retrieval time, then saved time.
    pub fn find_retrieved(&self, query: &RetrievedQuery) -> Vec<RetrievedArtifactDoc> {
        self.lock().retrieved.find(
            |d| query.retrieved_after.map_or(true, |after| d.retrieved_at > after),
            |d| (d.retrieved_at, d.saved_at, d.saved_counter),
            query.skip,
            query.limit,
        )
    }

    pub fn retrieved_count(&self) -> usize {
        self.lock().retrieved.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ocstore_kernel::{ArtifactKind, ScanCheckpoint};
    use tempfile::tempdir;

    fn retrieved(peer: u32, counter: u32, minute: u32) -> RetrievedArtifactDoc {
        let saved_at = Utc.with_ymd_and_hms(2024, 3, 2, 10, minute, 30).unwrap();
        RetrievedArtifactDoc {
            address: ContentAddress::new(format!("addr-{}-{}-{}", peer, minute, counter)),
            kind: ArtifactKind::Envelope,
            data: vec![counter as u8],
            saved_at,
            saved_counter: counter,
            retrieved_at: Utc.with_ymd_and_hms(2024, 3, 2, 11, minute, 0).unwrap(),
            peer: NodeIndex(peer),
        }
    }

    fn checkpoint(peer: u32, leaf: &str) -> ScanCheckpointDoc {
        ScanCheckpointDoc {
            peer: NodeIndex(peer),
            subtype: "off-chain-msg-data".into(),
            checkpoint: ScanCheckpoint {
                last_scanned_leaf: leaf.into(),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_insert_many_reports_duplicates() {
        let db = Database::in_memory();
        let first = db.insert_retrieved_many(vec![retrieved(1, 0, 15), retrieved(1, 1, 15)]).unwrap();
        assert_eq!(first.inserted, 2);
        assert!(first.duplicates.is_empty());

        let second = db.insert_retrieved_many(vec![retrieved(1, 1, 15), retrieved(1, 2, 15)]).unwrap();
        assert_eq!(second.inserted, 1);
        assert_eq!(second.duplicates.len(), 1);
        assert_eq!(db.retrieved_count(), 3);
    }

    #[test]
    fn test_unique_checkpoint_per_peer() {
        let db = Database::in_memory();
        db.insert_checkpoint(checkpoint(1, "/2024/03/02/10/15")).unwrap();
        let err = db.insert_checkpoint(checkpoint(1, "/2024/03/02/10/16")).unwrap_err();
        assert!(err.is_duplicate_key());

        assert!(db.update_checkpoint(checkpoint(1, "/2024/03/02/10/16")).unwrap());
        assert!(!db.update_checkpoint(checkpoint(2, "/2024/03/02/10/16")).unwrap());
        assert_eq!(
            db.find_checkpoint(NodeIndex(1), "off-chain-msg-data").unwrap().checkpoint.last_scanned_leaf,
            "/2024/03/02/10/16"
        );
    }

    #[test]
    fn test_find_retrieved_ordering_and_paging() {
        let db = Database::in_memory();
        db.insert_retrieved_many(vec![retrieved(1, 0, 20), retrieved(2, 0, 10), retrieved(1, 0, 15)]).unwrap();

        let all = db.find_retrieved(&RetrievedQuery::default());
        let minutes: Vec<_> = all.iter().map(|d| d.address.0.clone()).collect();
        assert_eq!(minutes, vec!["addr-2-10-0", "addr-1-15-0", "addr-1-20-0"]);

        let page = db.find_retrieved(&RetrievedQuery {
            retrieved_after: Some(Utc.with_ymd_and_hms(2024, 3, 2, 11, 10, 0).unwrap()),
            skip: 1,
            limit: Some(5),
        });
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].address.0, "addr-1-20-0");
    }

    #[test]
    fn test_reopen_replays_journal_and_snapshot() {
        let dir = tempdir().unwrap();
        let at = Utc.with_ymd_and_hms(2024, 3, 2, 12, 0, 0).unwrap();

        {
            let db = Database::open(dir.path()).unwrap();
            db.insert_checkpoint(checkpoint(3, "/2024/03/02/10/15")).unwrap();
            db.insert_retrieved_many(vec![retrieved(3, 0, 15)]).unwrap();
            db.compact().unwrap();
            db.set_last_roots_retrieval(at).unwrap();
            db.update_checkpoint(checkpoint(3, "/2024/03/02/10/16")).unwrap();
        }

        let db = Database::open(dir.path()).unwrap();
        assert_eq!(db.app_state().last_roots_retrieval, Some(at));
        assert_eq!(db.retrieved_count(), 1);
        assert_eq!(
            db.find_checkpoint(NodeIndex(3), "off-chain-msg-data").unwrap().checkpoint.last_scanned_leaf,
            "/2024/03/02/10/16"
        );
        assert!(db.find_retrieved_by_address(&ContentAddress::new("addr-3-15-0")).is_some());
    }

    #[test]
    fn test_torn_tail_is_cut_before_new_writes() {
        use std::io::Write;

        let dir = tempdir().unwrap();
        {
            let db = Database::open(dir.path()).unwrap();
            db.insert_checkpoint(checkpoint(1, "/2024/03/02/10/15")).unwrap();
        }

        // A crash in the middle of the next entry.
        let header = crate::wal::JournalEntryHeader::for_payload(2, b"half written entry");
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(dir.path().join(JOURNAL_FILE))
            .unwrap();
        file.write_all(&header.to_bytes()).unwrap();
        file.write_all(b"half").unwrap();
        drop(file);

        {
            let db = Database::open(dir.path()).unwrap();
            assert!(db.find_checkpoint(NodeIndex(1), "off-chain-msg-data").is_some());
            db.insert_checkpoint(checkpoint(2, "/2024/03/02/10/16")).unwrap();
            db.insert_retrieved_many(vec![retrieved(2, 0, 16)]).unwrap();
        }

        let db = Database::open(dir.path()).unwrap();
        assert!(db.find_checkpoint(NodeIndex(1), "off-chain-msg-data").is_some());
        assert!(db.find_checkpoint(NodeIndex(2), "off-chain-msg-data").is_some());
        assert_eq!(db.retrieved_count(), 1);
    }

    #[test]
    fn test_insert_many_rejects_duplicates_within_batch() {
        let dir = tempdir().unwrap();
        {
            let db = Database::open(dir.path()).unwrap();
            let report = db
                .insert_retrieved_many(vec![retrieved(1, 0, 15), retrieved(1, 0, 15), retrieved(1, 1, 15)])
                .unwrap();
            assert_eq!(report.inserted, 2);
            assert_eq!(report.duplicates.len(), 1);
        }

        let db = Database::open(dir.path()).unwrap();
        assert_eq!(db.retrieved_count(), 2);
    }
}
