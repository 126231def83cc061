// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Failover client over the name service instance set.
//!
//! A call goes to the currently selected instance. When it fails, the client moves to the next
//! populated index (wrapping) and retries, until every instance of the round has been tried once.
//! A failed round drops the selection so the next call re-resolves the instance set and starts a
//! new round at a random instance.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use ocstore_kernel::{ContentAddress, NodeIndex};
use rand::seq::IteratorRandom;

use super::{DirectoryError, DirectorySource, DirectoryTransport, PeerEntry, RootRecord, TransportFactory};

#[derive(Default)]
struct Cursor {
    instances: BTreeMap<u32, PeerEntry>,
    current: Option<u32>,
    initial: Option<u32>,
    connection: Option<Arc<dyn DirectoryTransport>>,
}

impl Cursor {
    /// Next populated index after `current`, wrapping, stopping before `initial`.
    fn next_index(&self) -> Option<u32> {
        let (cur, init) = (self.current?, self.initial?);
        // Cyclic order starting right after `cur`.
        let order = |idx: u32| if idx > cur { (0, idx) } else { (1, idx) };

        self.instances
            .range(cur.saturating_add(1)..)
            .chain(self.instances.range(..=cur))
            .map(|(idx, _)| *idx)
            .next()
            .filter(|idx| order(*idx) < order(init))
    }

    fn clear(&mut self) {
        self.current = None;
        self.connection = None;
    }
}

pub struct DirectoryClient {
    node: NodeIndex,
    source: Box<dyn DirectorySource>,
    factory: Arc<dyn TransportFactory>,
    cursor: Mutex<Cursor>,
}

impl DirectoryClient {
    pub fn new(node: NodeIndex, source: Box<dyn DirectorySource>, factory: Arc<dyn TransportFactory>) -> Self {
        Self {
            node,
            source,
            factory,
            cursor: Mutex::new(Cursor::default()),
        }
    }

    fn cursor(&self) -> MutexGuard<'_, Cursor> {
        self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Index of the instance calls currently go to.
    pub fn current_instance(&self) -> Option<u32> {
        self.cursor().current
    }

    /// Root last published by this node.
    pub async fn get_own_root(&self) -> Result<Option<RootRecord>, DirectoryError> {
        let node = self.node;
        self.call("get_root", move |t| Box::pin(async move { t.get_root(node).await }))
            .await
    }

    pub async fn get_all_roots(
        &self,
        updated_since: Option<DateTime<Utc>>,
    ) -> Result<BTreeMap<NodeIndex, RootRecord>, DirectoryError> {
        self.call("get_all_roots", move |t| {
            Box::pin(async move { t.get_all_roots(updated_since).await })
        })
        .await
    }

    pub async fn set_own_root(&self, address: &ContentAddress) -> Result<(), DirectoryError> {
        let node = self.node;
        self.call("set_root", move |t| {
            let address = address.clone();
            Box::pin(async move { t.set_root(node, &address, None).await })
        })
        .await
    }

    async fn call<T, F>(&self, method: &'static str, op: F) -> Result<T, DirectoryError>
    where
        F: Fn(Arc<dyn DirectoryTransport>) -> BoxFuture<'static, Result<T, DirectoryError>>,
    {
        let mut refreshed = false;
        if self.cursor().connection.is_none() {
            self.change_instance(true).await?;
            refreshed = true;
        }

        let mut attempts = 0usize;
        loop {
            let (index, connection) = {
                let cursor = self.cursor();
                (cursor.current, cursor.connection.clone())
            };
            let Some(connection) = connection else {
                return Err(DirectoryError::NoInstances);
            };

            attempts += 1;
            let err = match op(connection).await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            tracing::error!("Name service call {} failed on instance {:?}: {}", method, index, err);

            // The first failure of a call re-resolves the set, unless the call just did.
            if !self.change_instance(!refreshed && attempts == 1).await? {
                tracing::error!("Name service call {} failed on every instance", method);
                return Err(DirectoryError::Exhausted {
                    attempts,
                    last: err.to_string(),
                });
            }
        }
    }

    async fn refresh(&self) {
        match self.source.resolve().await {
            Ok(entries) if !entries.is_empty() => {
                let instances: BTreeMap<u32, PeerEntry> = entries.into_iter().map(|e| (e.index, e)).collect();
                tracing::debug!("Resolved {} name service instances", instances.len());
                self.cursor().instances = instances;
            }
            Ok(_) => tracing::warn!("Name service instance set came back empty; keeping current set"),
            Err(e) => tracing::warn!("Could not resolve name service instances ({}); keeping current set", e),
        }
    }

    /// Selects the instance to use next. Returns false once the round is over.
    async fn change_instance(&self, reset: bool) -> Result<bool, DirectoryError> {
        if reset {
            self.refresh().await;
        }

        let mut cursor = self.cursor();
        if cursor.instances.is_empty() {
            tracing::error!("No name service instances to use");
            return Err(DirectoryError::NoInstances);
        }

        let next = match cursor.current {
            None => {
                let picked = cursor
                    .instances
                    .keys()
                    .copied()
                    .choose(&mut rand::thread_rng())
                    .ok_or(DirectoryError::NoInstances)?;
                cursor.initial = Some(picked);
                picked
            }
            Some(current) => {
                if reset {
                    cursor.initial = Some(current);
                }
                match cursor.next_index() {
                    Some(next) => next,
                    None => {
                        cursor.clear();
                        return Ok(false);
                    }
                }
            }
        };

        let entry = cursor
            .instances
            .get(&next)
            .cloned()
            .ok_or(DirectoryError::NoInstances)?;
        cursor.current = Some(next);
        cursor.connection = Some(self.factory.connect(&entry));
        Ok(true)
    }
}
