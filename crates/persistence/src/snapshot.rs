//! Checksummed snapshots of every collection.

use crate::error::{PersistenceError, Result};
use crc64fast::Digest;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotHeader {
    pub magic: [u8; 4],
    pub version: u32,
    /// Sequence number of the last journal entry folded into this snapshot.
    pub last_seq: u64,
    pub timestamp: u64,
    pub body_len: u64,
    pub body_checksum: u64,
}

impl SnapshotHeader {
    pub const SIZE: usize = 4 + 4 + 8 + 8 + 8 + 8; // 40 bytes
    pub const MAGIC: [u8; 4] = *b"OCST";
    pub const VERSION: u32 = 1;

    pub fn new(last_seq: u64, timestamp: u64, body: &[u8]) -> Self {
        Self {
            magic: Self::MAGIC,
            version: Self::VERSION,
            last_seq,
            timestamp,
            body_len: body.len() as u64,
            body_checksum: body_checksum(body),
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.magic);
        buf[4..8].copy_from_slice(&self.version.to_le_bytes());
        buf[8..16].copy_from_slice(&self.last_seq.to_le_bytes());
        buf[16..24].copy_from_slice(&self.timestamp.to_le_bytes());
        buf[24..32].copy_from_slice(&self.body_len.to_le_bytes());
        buf[32..40].copy_from_slice(&self.body_checksum.to_le_bytes());
        buf
    }

    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let mut buf = [0u8; Self::SIZE];
        reader.read_exact(&mut buf)?;

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&buf[0..4]);
        if magic != Self::MAGIC {
            return Err(PersistenceError::InvalidMagic);
        }

        let u32_at = |at: usize| {
            let mut b = [0u8; 4];
            b.copy_from_slice(&buf[at..at + 4]);
            u32::from_le_bytes(b)
        };
        let u64_at = |at: usize| {
            let mut b = [0u8; 8];
            b.copy_from_slice(&buf[at..at + 8]);
            u64::from_le_bytes(b)
        };

        let version = u32_at(4);
        if version != Self::VERSION {
            return Err(PersistenceError::UnsupportedVersion(version));
        }

        Ok(Self {
            magic,
            version,
            last_seq: u64_at(8),
            timestamp: u64_at(16),
            body_len: u64_at(24),
            body_checksum: u64_at(32),
        })
    }
}

fn body_checksum(body: &[u8]) -> u64 {
    let mut digest = Digest::new();
    digest.write(body);
    digest.sum64()
}

/// Writes the snapshot next to `path` and renames it into place.
pub fn write_atomic(path: impl AsRef<Path>, header: &SnapshotHeader, body: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let tmp_path = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(&header.to_bytes())?;
        file.write_all(body)?;
        file.sync_data()?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

pub fn read_snapshot(path: impl AsRef<Path>) -> Result<(SnapshotHeader, Vec<u8>)> {
    let mut file = File::open(path)?;
    let header = SnapshotHeader::read_from(&mut file)?;
    let mut body = Vec::new();
    file.read_to_end(&mut body)?;

    if body.len() as u64 != header.body_len {
        return Err(PersistenceError::InvalidFormat(format!(
            "Truncated snapshot body: expected {} bytes, found {}",
            header.body_len,
            body.len()
        )));
    }
    let found = body_checksum(&body);
    if found != header.body_checksum {
        return Err(PersistenceError::ChecksumMismatch {
            expected: header.body_checksum,
            found,
        });
    }

    Ok((header, body))
}
