// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! In-process name service with per-instance failure injection.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ocstore_kernel::{ContentAddress, NodeIndex};

use super::{DirectoryError, DirectoryTransport, PeerEntry, RootRecord, TransportFactory};

/// Root records shared by every simulated instance.
#[derive(Default)]
pub struct MemoryNameService {
    roots: Mutex<BTreeMap<NodeIndex, RootRecord>>,
}

impl MemoryNameService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn roots(&self) -> MutexGuard<'_, BTreeMap<NodeIndex, RootRecord>> {
        self.roots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn root_of(&self, node: NodeIndex) -> Option<RootRecord> {
        self.roots().get(&node).cloned()
    }

    pub fn set(&self, node: NodeIndex, record: RootRecord) {
        self.roots().insert(node, record);
    }
}

#[derive(Default)]
struct InstanceState {
    failing: AtomicBool,
    calls: AtomicUsize,
}

struct MemoryTransport {
    service: Arc<MemoryNameService>,
    state: Arc<InstanceState>,
    index: u32,
}

impl MemoryTransport {
    fn enter(&self) -> Result<(), DirectoryError> {
        self.state.calls.fetch_add(1, Ordering::SeqCst);
        if self.state.failing.load(Ordering::SeqCst) {
            return Err(DirectoryError::Transport(format!("instance {} unreachable", self.index)));
        }
        Ok(())
    }
}

#[async_trait]
impl DirectoryTransport for MemoryTransport {
    async fn get_root(&self, node: NodeIndex) -> Result<Option<RootRecord>, DirectoryError> {
        self.enter()?;
        Ok(self.service.root_of(node))
    }

    async fn get_all_roots(
        &self,
        updated_since: Option<DateTime<Utc>>,
    ) -> Result<BTreeMap<NodeIndex, RootRecord>, DirectoryError> {
        self.enter()?;
        Ok(self
            .service
            .roots()
            .iter()
            .filter(|(_, r)| updated_since.map_or(true, |since| r.last_updated > since))
            .map(|(n, r)| (*n, r.clone()))
            .collect())
    }

    async fn set_root(
        &self,
        node: NodeIndex,
        address: &ContentAddress,
        last_updated: Option<DateTime<Utc>>,
    ) -> Result<(), DirectoryError> {
        self.enter()?;
        self.service.set(
            node,
            RootRecord {
                address: address.clone(),
                last_updated: last_updated.unwrap_or_else(Utc::now),
            },
        );
        Ok(())
    }
}

/// Connects to simulated instances of one [`MemoryNameService`].
pub struct MemoryTransportFactory {
    service: Arc<MemoryNameService>,
    instances: Mutex<BTreeMap<u32, Arc<InstanceState>>>,
}

impl MemoryTransportFactory {
    pub fn new(service: Arc<MemoryNameService>) -> Self {
        Self {
            service,
            instances: Mutex::new(BTreeMap::new()),
        }
    }

    fn instance(&self, index: u32) -> Arc<InstanceState> {
        self.instances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(index)
            .or_default()
            .clone()
    }

    pub fn set_failing(&self, index: u32, failing: bool) {
        self.instance(index).failing.store(failing, Ordering::SeqCst);
    }

    /// Calls received by an instance, failed ones included.
    pub fn calls(&self, index: u32) -> usize {
        self.instance(index).calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.instances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|s| s.calls.load(Ordering::SeqCst))
            .sum()
    }
}

impl TransportFactory for MemoryTransportFactory {
    fn connect(&self, entry: &PeerEntry) -> Arc<dyn DirectoryTransport> {
        Arc::new(MemoryTransport {
            service: self.service.clone(),
            state: self.instance(entry.index),
            index: entry.index,
        })
    }
}
