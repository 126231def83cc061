//! Append-only journal of document mutations.
//!
//! Entry layout: `[seq u64][payload_len u32][crc64 u64][payload]`, little endian. The checksum
//! covers seq, length and payload.

use crate::error::{PersistenceError, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::Path;
use crc64fast::Digest;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntryHeader {
    pub seq: u64,
    pub payload_len: u32,
    pub checksum: u64,
}

impl JournalEntryHeader {
    pub const SIZE: usize = 8 + 4 + 8; // 20 bytes

    pub fn for_payload(seq: u64, payload: &[u8]) -> Self {
        Self {
            seq,
            payload_len: payload.len() as u32,
            checksum: checksum(seq, payload),
        }
    }

    pub fn from_bytes(buf: &[u8; Self::SIZE]) -> Self {
        let mut seq = [0u8; 8];
        let mut len = [0u8; 4];
        let mut crc = [0u8; 8];
        seq.copy_from_slice(&buf[0..8]);
        len.copy_from_slice(&buf[8..12]);
        crc.copy_from_slice(&buf[12..20]);

        Self {
            seq: u64::from_le_bytes(seq),
            payload_len: u32::from_le_bytes(len),
            checksum: u64::from_le_bytes(crc),
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..8].copy_from_slice(&self.seq.to_le_bytes());
        buf[8..12].copy_from_slice(&self.payload_len.to_le_bytes());
        buf[12..20].copy_from_slice(&self.checksum.to_le_bytes());
        buf
    }
}

fn checksum(seq: u64, payload: &[u8]) -> u64 {
    let mut digest = Digest::new();
    digest.write(&seq.to_le_bytes());
    digest.write(&(payload.len() as u32).to_le_bytes());
    digest.write(payload);
    digest.sum64()
}

pub struct JournalEntry {
    pub header: JournalEntryHeader,
    pub payload: Vec<u8>,
}

/// Open handle appending to a journal file.
pub struct JournalWriter {
    file: File,
}

impl JournalWriter {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file })
    }

    /// Opens the journal cut back to `valid_len` bytes, dropping a torn tail.
    pub fn open_at(path: impl AsRef<Path>, valid_len: u64) -> Result<Self> {
        let writer = Self::open(path)?;
        if writer.file.metadata()?.len() > valid_len {
            writer.file.set_len(valid_len)?;
            writer.file.sync_all()?;
        }
        Ok(writer)
    }

    pub fn append(&mut self, seq: u64, payload: &[u8]) -> Result<()> {
        self.write_entry(seq, payload)?;
        self.sync()
    }

    /// Writes an entry without syncing; pair with [`JournalWriter::sync`].
    pub fn write_entry(&mut self, seq: u64, payload: &[u8]) -> Result<()> {
        let header = JournalEntryHeader::for_payload(seq, payload);
        self.file.write_all(&header.to_bytes())?;
        self.file.write_all(payload)?;
        Ok(())
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }

    /// Drops every entry; used after the journal has been folded into a snapshot.
    pub fn truncate(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        self.file.sync_all()?;
        Ok(())
    }
}

pub struct JournalReader {
    reader: BufReader<File>,
    valid_len: u64,
}

impl JournalReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            reader: BufReader::new(file),
            valid_len: 0,
        })
    }

    /// Byte offset just past the last complete entry read so far.
    pub fn valid_len(&self) -> u64 {
        self.valid_len
    }
}

impl Iterator for JournalReader {
    type Item = Result<JournalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut buf = [0u8; JournalEntryHeader::SIZE];
        match self.reader.read_exact(&mut buf) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return None,
            Err(e) => return Some(Err(e.into())),
        }
        let header = JournalEntryHeader::from_bytes(&buf);

        let mut payload = vec![0u8; header.payload_len as usize];
        match self.reader.read_exact(&mut payload) {
            Ok(()) => {}
            // Torn final write: the entry never completed, so it was never applied.
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return None,
            Err(e) => return Some(Err(e.into())),
        }

        let found = checksum(header.seq, &payload);
        if found != header.checksum {
            return Some(Err(PersistenceError::ChecksumMismatch {
                expected: header.checksum,
                found,
            }));
        }

        self.valid_len += (JournalEntryHeader::SIZE + payload.len()) as u64;
        Some(Ok(JournalEntry { header, payload }))
    }
}
