//! In-memory document collection with a unique index and an optional secondary index.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{PersistenceError, Result};

pub trait Document: Clone + Serialize + DeserializeOwned {
    const COLLECTION: &'static str;
    type Key: Ord + Clone + Debug;

    fn unique_key(&self) -> Self::Key;

    /// Non-unique lookup key.
    fn secondary_key(&self) -> Option<&str> {
        None
    }
}

pub struct Collection<D: Document> {
    docs: BTreeMap<D::Key, D>,
    secondary: HashMap<String, BTreeSet<D::Key>>,
}

impl<D: Document> Default for Collection<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Document> Collection<D> {
    pub fn new() -> Self {
        Self {
            docs: BTreeMap::new(),
            secondary: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn get(&self, key: &D::Key) -> Option<&D> {
        self.docs.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &D> {
        self.docs.values()
    }

    pub fn duplicate_error(key: &D::Key) -> PersistenceError {
        PersistenceError::DuplicateKey {
            collection: D::COLLECTION,
            key: format!("{:?}", key),
        }
    }

    /// Fails with `DuplicateKey` when the unique key is already taken.
    pub fn check_insert(&self, doc: &D) -> Result<()> {
        let key = doc.unique_key();
        if self.docs.contains_key(&key) {
            return Err(Self::duplicate_error(&key));
        }
        Ok(())
    }

    pub fn insert(&mut self, doc: D) -> Result<()> {
        self.check_insert(&doc)?;
        self.upsert(doc);
        Ok(())
    }

    /// Inserts or replaces by unique key.
    pub fn upsert(&mut self, doc: D) {
        let key = doc.unique_key();
        if let Some(old) = self.docs.remove(&key) {
            if let Some(sec) = old.secondary_key() {
                if let Some(keys) = self.secondary.get_mut(sec) {
                    keys.remove(&key);
                    if keys.is_empty() {
                        self.secondary.remove(sec);
                    }
                }
            }
        }
        if let Some(sec) = doc.secondary_key() {
            self.secondary
                .entry(sec.to_string())
                .or_default()
                .insert(key.clone());
        }
        self.docs.insert(key, doc);
    }

    /// Documents sharing a secondary key, in unique key order.
    pub fn find_by_secondary(&self, secondary: &str) -> Vec<&D> {
        self.secondary
            .get(secondary)
            .map(|keys| keys.iter().filter_map(|k| self.docs.get(k)).collect())
            .unwrap_or_default()
    }

    pub fn find<P, S, K>(&self, predicate: P, sort_by: S, skip: usize, limit: Option<usize>) -> Vec<D>
    where
        P: Fn(&D) -> bool,
        S: Fn(&D) -> K,
        K: Ord,
    {
        let mut matched: Vec<&D> = self.docs.values().filter(|d| predicate(d)).collect();
        matched.sort_by_key(|d| sort_by(d));
        matched
            .into_iter()
            .skip(skip)
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }
}
