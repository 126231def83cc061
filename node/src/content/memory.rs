// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! In-process content store.
//!
//! A [`MemoryDag`] holds immutable file and directory blocks addressed by their blake3 digest and
//! can be shared by several [`MemoryContentStore`]s, each owning a mutable root the way a node owns
//! its mutable file system. Writing below the mutable root re-hashes every directory on the way up,
//! so the root address changes with every write while older addresses stay readable.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use ocstore_kernel::ContentAddress;

use super::{ContentError, ContentStore, EntryType, LsEntry, Stat, WriteOptions};

#[derive(Clone, Debug)]
enum Block {
    File(Vec<u8>),
    Dir(BTreeMap<String, ContentAddress>),
}

impl Block {
    fn address(&self) -> ContentAddress {
        let mut hasher = blake3::Hasher::new();
        match self {
            Block::File(data) => {
                hasher.update(b"file\0");
                hasher.update(data);
            }
            Block::Dir(links) => {
                hasher.update(b"dir\0");
                for (name, addr) in links {
                    hasher.update(name.as_bytes());
                    hasher.update(b"\0");
                    hasher.update(addr.as_str().as_bytes());
                    hasher.update(b"\n");
                }
            }
        }
        ContentAddress::new(format!("b3{}", hasher.finalize().to_hex()))
    }

    fn entry_type(&self) -> EntryType {
        match self {
            Block::File(_) => EntryType::File,
            Block::Dir(_) => EntryType::Directory,
        }
    }
}

type Blocks = HashMap<ContentAddress, Block>;

/// Block store shared between simulated nodes.
#[derive(Clone, Default)]
pub struct MemoryDag {
    blocks: Arc<Mutex<Blocks>>,
}

impl MemoryDag {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Blocks> {
        self.blocks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn put(blocks: &mut Blocks, block: Block) -> ContentAddress {
    let addr = block.address();
    blocks.entry(addr.clone()).or_insert(block);
    addr
}

enum Base {
    Immutable(ContentAddress),
    Mutable,
}

fn parse_path(path: &str) -> Result<(Base, Vec<String>), ContentError> {
    if !path.starts_with('/') {
        return Err(ContentError::Rpc(format!("paths must start with a leading slash: {}", path)));
    }
    let comps: Vec<String> = path
        .split('/')
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect();

    if comps.first().map(String::as_str) == Some("ipfs") {
        let addr = comps
            .get(1)
            .ok_or_else(|| ContentError::Rpc(format!("invalid path: {}", path)))?;
        return Ok((Base::Immutable(ContentAddress::new(addr.as_str())), comps[2..].to_vec()));
    }

    Ok((Base::Mutable, comps))
}

fn resolve(blocks: &Blocks, start: &ContentAddress, comps: &[String], path: &str) -> Result<ContentAddress, ContentError> {
    let mut cur = start.clone();
    for comp in comps {
        cur = match blocks.get(&cur) {
            Some(Block::Dir(links)) => links
                .get(comp)
                .cloned()
                .ok_or_else(|| ContentError::NotFound(path.to_string()))?,
            _ => return Err(ContentError::NotFound(path.to_string())),
        };
    }
    if !blocks.contains_key(&cur) {
        return Err(ContentError::NotFound(path.to_string()));
    }
    Ok(cur)
}

/// Rebuilds the directory chain from `dir` down to `comps`, linking `value` at the end.
fn set_link(
    blocks: &mut Blocks,
    dir: &ContentAddress,
    comps: &[String],
    value: &ContentAddress,
    parents: bool,
    path: &str,
) -> Result<ContentAddress, ContentError> {
    let mut links = match blocks.get(dir) {
        Some(Block::Dir(links)) => links.clone(),
        _ => return Err(ContentError::NotFound(path.to_string())),
    };

    match comps {
        [] => return Err(ContentError::Rpc("cannot replace the root directory".to_string())),
        [name] => {
            links.insert(name.clone(), value.clone());
        }
        [name, rest @ ..] => {
            let child = match links.get(name) {
                Some(addr) => addr.clone(),
                None if parents => put(blocks, Block::Dir(BTreeMap::new())),
                None => return Err(ContentError::NotFound(path.to_string())),
            };
            let updated = set_link(blocks, &child, rest, value, parents, path)?;
            links.insert(name.clone(), updated);
        }
    }

    Ok(put(blocks, Block::Dir(links)))
}

/// One node's view: a mutable root over a shared [`MemoryDag`].
pub struct MemoryContentStore {
    dag: MemoryDag,
    root: Mutex<ContentAddress>,
    pins: Mutex<BTreeSet<ContentAddress>>,
}

impl MemoryContentStore {
    pub fn new(dag: MemoryDag) -> Self {
        let root = put(&mut dag.lock(), Block::Dir(BTreeMap::new()));
        Self {
            dag,
            root: Mutex::new(root),
            pins: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn is_pinned(&self, address: &ContentAddress) -> bool {
        self.pins
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(address)
    }

    fn root(&self) -> MutexGuard<'_, ContentAddress> {
        self.root.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lookup(&self, path: &str) -> Result<(ContentAddress, Block), ContentError> {
        let (base, comps) = parse_path(path)?;
        let start = match base {
            Base::Immutable(addr) => addr,
            Base::Mutable => self.root().clone(),
        };
        let blocks = self.dag.lock();
        let addr = resolve(&blocks, &start, &comps, path)?;
        let block = blocks
            .get(&addr)
            .cloned()
            .ok_or_else(|| ContentError::NotFound(path.to_string()))?;
        Ok((addr, block))
    }

    fn mutable_comps(path: &str) -> Result<Vec<String>, ContentError> {
        match parse_path(path)? {
            (Base::Mutable, comps) => Ok(comps),
            (Base::Immutable(_), _) => Err(ContentError::Rpc(format!("cannot modify immutable path {}", path))),
        }
    }

    /// Links `value` at `comps` below the mutable root and swaps in the new root.
    fn link(&self, comps: &[String], value: &ContentAddress, parents: bool, path: &str) -> Result<(), ContentError> {
        let mut root = self.root();
        let mut blocks = self.dag.lock();
        let new_root = set_link(&mut blocks, &root, comps, value, parents, path)?;
        *root = new_root;
        Ok(())
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn files_stat(&self, path: &str) -> Result<Stat, ContentError> {
        let (address, block) = self.lookup(path)?;
        let size = match &block {
            Block::File(data) => data.len() as u64,
            Block::Dir(_) => 0,
        };
        Ok(Stat {
            address,
            size,
            entry_type: block.entry_type(),
        })
    }

    async fn files_write(&self, path: &str, data: Vec<u8>, opts: WriteOptions) -> Result<(), ContentError> {
        let comps = Self::mutable_comps(path)?;
        match self.lookup(path) {
            Ok((_, Block::Dir(_))) => return Err(ContentError::Rpc(format!("{} is a directory", path))),
            Ok(_) => {}
            Err(e) if e.is_not_found() && opts.create => {}
            Err(e) => return Err(e),
        }

        let file = put(&mut self.dag.lock(), Block::File(data));
        self.link(&comps, &file, opts.parents, path)
    }

    async fn files_mkdir(&self, path: &str, parents: bool) -> Result<(), ContentError> {
        let comps = Self::mutable_comps(path)?;
        match self.lookup(path) {
            Ok((_, Block::Dir(_))) if parents => return Ok(()),
            Ok(_) => return Err(ContentError::Rpc("file already exists".to_string())),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let dir = put(&mut self.dag.lock(), Block::Dir(BTreeMap::new()));
        self.link(&comps, &dir, parents, path)
    }

    async fn files_cp(&self, src: &str, dst: &str) -> Result<(), ContentError> {
        let (source, _) = self.lookup(src)?;
        let comps = Self::mutable_comps(dst)?;
        match self.lookup(dst) {
            Ok(_) => return Err(ContentError::Rpc("directory already has entry by that name".to_string())),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
        self.link(&comps, &source, false, dst)
    }

    async fn ls(&self, path: &str) -> Result<Vec<LsEntry>, ContentError> {
        let (_, block) = self.lookup(path)?;
        let links = match block {
            Block::Dir(links) => links,
            Block::File(_) => return Ok(Vec::new()),
        };

        let blocks = self.dag.lock();
        Ok(links
            .into_iter()
            .map(|(name, address)| {
                let entry_type = blocks
                    .get(&address)
                    .map(Block::entry_type)
                    .unwrap_or(EntryType::File);
                LsEntry { name, address, entry_type }
            })
            .collect())
    }

    async fn cat(&self, address: &ContentAddress) -> Result<Vec<u8>, ContentError> {
        match self.dag.lock().get(address) {
            Some(Block::File(data)) => Ok(data.clone()),
            Some(Block::Dir(_)) => Err(ContentError::Rpc("this dag node is a directory".to_string())),
            None => Err(ContentError::NotFound(address.to_string())),
        }
    }

    async fn pin_add(&self, address: &ContentAddress) -> Result<(), ContentError> {
        if !self.dag.lock().contains_key(address) {
            return Err(ContentError::NotFound(address.to_string()));
        }
        self.pins
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(address.clone());
        Ok(())
    }

    async fn pin_update(&self, old: &ContentAddress, new: &ContentAddress) -> Result<(), ContentError> {
        if !self.dag.lock().contains_key(new) {
            return Err(ContentError::NotFound(new.to_string()));
        }
        let mut pins = self.pins.lock().unwrap_or_else(PoisonError::into_inner);
        pins.remove(old);
        pins.insert(new.clone());
        Ok(())
    }
}
