// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Content repository engine.
//!
//! Owns the node's tree in the content store and its root address. Writes and root publishing
//! share the save section; harvesting of the node's own tree runs through a separate local
//! section so the two paths never block each other.

mod discover;
mod publish;
mod query;
mod save;
mod walk;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ocstore_kernel::{ContentAddress, NodeIndex, RepoSubtype};
use ocstore_persistence::Database;

use crate::config::RepoConfig;
use crate::content::ContentStore;
use crate::critical_section::CriticalSection;
use crate::directory::DirectoryClient;
use crate::errors::EngineError;
use crate::inflight::{Coalescer, InFlight};
use crate::notify::NotificationSink;

pub use discover::DiscoverReport;
pub use query::{ArtifactPage, ArtifactView};
pub use save::SavedArtifact;

/// Subtype harvested and written by this engine.
pub const MSG_DATA: RepoSubtype = RepoSubtype::OFF_CHAIN_MSG_DATA;

#[derive(Debug, Clone)]
struct RootState {
    current: ContentAddress,
    last_published: Option<ContentAddress>,
}

pub struct ContentRepo {
    node: NodeIndex,
    root_dir: String,
    directory_time_delay: chrono::Duration,
    store: Arc<dyn ContentStore>,
    directory: Arc<DirectoryClient>,
    db: Arc<Database>,
    notifier: Arc<dyn NotificationSink>,
    roots: Mutex<RootState>,
    save_section: CriticalSection,
    local_section: CriticalSection,
    publishing: InFlight,
    discovering: InFlight,
    local_harvest: Coalescer,
}

impl ContentRepo {
    /// Establishes the local tree and its starting root.
    ///
    /// The root published last by this node is looked up first. When the local root dir is
    /// missing it is restored from that root, or created empty if nothing was ever published.
    pub async fn new(
        node: NodeIndex,
        cfg: &RepoConfig,
        store: Arc<dyn ContentStore>,
        directory: Arc<DirectoryClient>,
        db: Arc<Database>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Result<Arc<Self>, EngineError> {
        let root_dir = cfg.root_dir.trim_end_matches('/').to_string();
        if !root_dir.starts_with('/') || root_dir.len() < 2 {
            return Err(EngineError::Config(format!("invalid root dir {:?}", cfg.root_dir)));
        }

        let published = directory
            .get_own_root()
            .await
            .map_err(|e| EngineError::Initialization(format!("cannot read published root: {}", e)))?
            .map(|r| r.address);

        let current = match store.files_stat(&root_dir).await {
            Ok(stat) => stat.address,
            Err(e) if e.is_not_found() => match &published {
                Some(addr) => {
                    tracing::info!("Restoring {} from published root {}", root_dir, addr);
                    store
                        .files_cp(&addr.ipfs_path(), &root_dir)
                        .await
                        .map_err(|e| EngineError::Initialization(format!("cannot restore root: {}", e)))?;
                    addr.clone()
                }
                None => {
                    tracing::info!("Creating empty repository root {}", root_dir);
                    store
                        .files_mkdir(&root_dir, true)
                        .await
                        .map_err(|e| EngineError::Initialization(format!("cannot create root: {}", e)))?;
                    store
                        .files_stat(&root_dir)
                        .await
                        .map_err(|e| EngineError::Initialization(format!("cannot stat new root: {}", e)))?
                        .address
                }
            },
            Err(e) => return Err(EngineError::Initialization(format!("cannot stat root: {}", e))),
        };

        tracing::info!("Repository root {} (published: {:?})", current, published);

        Ok(Arc::new(Self {
            node,
            root_dir,
            directory_time_delay: chrono::Duration::milliseconds(cfg.directory_time_delay_ms as i64),
            store,
            directory,
            db,
            notifier,
            roots: Mutex::new(RootState {
                current,
                last_published: published,
            }),
            save_section: CriticalSection::new("save"),
            local_section: CriticalSection::new("local-harvest"),
            publishing: InFlight::new(),
            discovering: InFlight::new(),
            local_harvest: Coalescer::new(),
        }))
    }

    fn roots(&self) -> MutexGuard<'_, RootState> {
        self.roots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn node(&self) -> NodeIndex {
        self.node
    }

    pub fn root_dir(&self) -> &str {
        &self.root_dir
    }

    pub fn current_root(&self) -> ContentAddress {
        self.roots().current.clone()
    }

    pub fn last_published_root(&self) -> Option<ContentAddress> {
        self.roots().last_published.clone()
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Waits until no publish, discover or local harvest is running.
    pub async fn wait_idle(&self) {
        self.publishing.wait_idle().await;
        self.discovering.wait_idle().await;
        self.local_harvest.wait_idle().await;
    }
}
