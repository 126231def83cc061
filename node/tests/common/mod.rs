// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use ocstore_kernel::{ContentAddress, NodeIndex};
use ocstore_node::config::RepoConfig;
use ocstore_node::content::{ContentError, ContentStore, LsEntry, MemoryContentStore, MemoryDag, Stat, WriteOptions};
use ocstore_node::directory::discovery::{RecordDefaults, StaticDirectorySource};
use ocstore_node::directory::{DirectoryClient, MemoryNameService, MemoryTransportFactory};
use ocstore_node::notify::NotificationSink;
use ocstore_node::repo::ContentRepo;
use ocstore_persistence::Database;
use tokio::sync::Semaphore;

pub const ROOT_DIR: &str = "/ocstore";

#[derive(Default)]
pub struct CountingNotifier {
    count: AtomicUsize,
}

impl CountingNotifier {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl NotificationSink for CountingNotifier {
    fn notify_new_artifacts(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn defaults() -> RecordDefaults {
    RecordDefaults {
        host_format: "ns{index}.test".to_string(),
        port: 8080,
        secure: false,
    }
}

pub fn records(instances: u32) -> Vec<String> {
    (1..=instances)
        .map(|i| format!(r#"{{"idx": {}, "pubKey": "key{}"}}"#, i, i))
        .collect()
}

pub fn repo_config() -> RepoConfig {
    RepoConfig {
        root_dir: ROOT_DIR.to_string(),
        ..RepoConfig::default()
    }
}

/// Simulated network: one shared block store and one replicated name service.
pub struct Network {
    pub dag: MemoryDag,
    pub names: Arc<MemoryNameService>,
    pub factory: Arc<MemoryTransportFactory>,
    pub instances: u32,
}

pub struct TestNode {
    pub index: NodeIndex,
    pub repo: Arc<ContentRepo>,
    pub store: Arc<MemoryContentStore>,
    pub db: Arc<Database>,
    pub notifier: Arc<CountingNotifier>,
}

impl Network {
    pub fn new(instances: u32) -> Self {
        let names = MemoryNameService::new();
        Self {
            dag: MemoryDag::new(),
            factory: Arc::new(MemoryTransportFactory::new(names.clone())),
            names,
            instances,
        }
    }

    pub fn directory_client(&self, index: u32) -> Arc<DirectoryClient> {
        Arc::new(DirectoryClient::new(
            NodeIndex(index),
            Box::new(StaticDirectorySource::new(records(self.instances), defaults())),
            self.factory.clone(),
        ))
    }

    pub async fn node(&self, index: u32) -> TestNode {
        self.node_with(index, Arc::new(Database::in_memory()), repo_config()).await
    }

    pub async fn node_with(&self, index: u32, db: Arc<Database>, cfg: RepoConfig) -> TestNode {
        let store = Arc::new(MemoryContentStore::new(self.dag.clone()));
        let notifier = Arc::new(CountingNotifier::default());
        let repo = ContentRepo::new(
            NodeIndex(index),
            &cfg,
            store.clone(),
            self.directory_client(index),
            db.clone(),
            notifier.clone(),
        )
        .await
        .unwrap();

        TestNode {
            index: NodeIndex(index),
            repo,
            store,
            db,
            notifier,
        }
    }
}

/// Memory store whose pin and cat calls can be held until released.
pub struct GatedStore {
    inner: MemoryContentStore,
    pin_gate: Semaphore,
    cat_gate: Semaphore,
    pins: AtomicUsize,
    cats: AtomicUsize,
    tree_scans: AtomicUsize,
}

const OPEN: usize = 1 << 20;

impl GatedStore {
    pub fn new(dag: MemoryDag, hold_pins: bool, hold_cats: bool) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryContentStore::new(dag),
            pin_gate: Semaphore::new(if hold_pins { 0 } else { OPEN }),
            cat_gate: Semaphore::new(if hold_cats { 0 } else { OPEN }),
            pins: AtomicUsize::new(0),
            cats: AtomicUsize::new(0),
            tree_scans: AtomicUsize::new(0),
        })
    }

    pub fn release_pins(&self) {
        self.pin_gate.add_permits(OPEN);
    }

    pub fn release_cats(&self) {
        self.cat_gate.add_permits(OPEN);
    }

    /// Pin calls entered, held ones included.
    pub fn pins(&self) -> usize {
        self.pins.load(Ordering::SeqCst)
    }

    pub fn cats(&self) -> usize {
        self.cats.load(Ordering::SeqCst)
    }

    /// Listings of a published tree's subtype root, one per harvest that found a root.
    pub fn tree_scans(&self) -> usize {
        self.tree_scans.load(Ordering::SeqCst)
    }

    async fn pass(gate: &Semaphore) -> Result<(), ContentError> {
        gate.acquire()
            .await
            .map(|_| ())
            .map_err(|e| ContentError::Transport(e.to_string()))
    }
}

#[async_trait]
impl ContentStore for GatedStore {
    async fn files_stat(&self, path: &str) -> Result<Stat, ContentError> {
        self.inner.files_stat(path).await
    }

    async fn files_write(&self, path: &str, data: Vec<u8>, opts: WriteOptions) -> Result<(), ContentError> {
        self.inner.files_write(path, data, opts).await
    }

    async fn files_mkdir(&self, path: &str, parents: bool) -> Result<(), ContentError> {
        self.inner.files_mkdir(path, parents).await
    }

    async fn files_cp(&self, src: &str, dst: &str) -> Result<(), ContentError> {
        self.inner.files_cp(src, dst).await
    }

    async fn ls(&self, path: &str) -> Result<Vec<LsEntry>, ContentError> {
        if path.starts_with("/ipfs/") && path.ends_with("/msgs") {
            self.tree_scans.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.ls(path).await
    }

    async fn cat(&self, address: &ContentAddress) -> Result<Vec<u8>, ContentError> {
        self.cats.fetch_add(1, Ordering::SeqCst);
        Self::pass(&self.cat_gate).await?;
        self.inner.cat(address).await
    }

    async fn pin_add(&self, address: &ContentAddress) -> Result<(), ContentError> {
        self.pins.fetch_add(1, Ordering::SeqCst);
        Self::pass(&self.pin_gate).await?;
        self.inner.pin_add(address).await
    }

    async fn pin_update(&self, old: &ContentAddress, new: &ContentAddress) -> Result<(), ContentError> {
        self.pins.fetch_add(1, Ordering::SeqCst);
        Self::pass(&self.pin_gate).await?;
        self.inner.pin_update(old, new).await
    }
}

impl Network {
    /// Repository of node `index` over an arbitrary store, with in-memory persistence.
    pub async fn repo_over(
        &self,
        index: u32,
        store: Arc<dyn ContentStore>,
    ) -> (Arc<ContentRepo>, Arc<Database>, Arc<CountingNotifier>) {
        let db = Arc::new(Database::in_memory());
        let notifier = Arc::new(CountingNotifier::default());
        let repo = ContentRepo::new(
            NodeIndex(index),
            &repo_config(),
            store,
            self.directory_client(index),
            db.clone(),
            notifier.clone(),
        )
        .await
        .unwrap();
        (repo, db, notifier)
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_env_filter("debug").try_init();
}
