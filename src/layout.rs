// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Repository layout.
//!
//! Off-chain message data lives under `<root>/msgs/YYYY/MM/DD/HH/mm/<kind dir>/<file>`, where the
//! filename is the kind prefix, the zero padded milliseconds within the minute (5 digits) and a
//! collision counter (3 digits). Zero padding keeps lexicographic order equal to chronological order.

use core::fmt;

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc};

use crate::error::{KernelError, KernelResult};
use crate::types::ArtifactKind;

/// Highest collision counter a filename can carry.
pub const MAX_COLLISION_COUNTER: u32 = 999;

const MILLIS_PER_MINUTE: u32 = 60_000;

/// Named subtree of the repository reserved for one category of data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RepoSubtype {
    pub name: &'static str,
    pub sub_dir: &'static str,
    /// Number of date/time directory levels above a leaf.
    pub depth: usize,
}

impl RepoSubtype {
    pub const OFF_CHAIN_MSG_DATA: RepoSubtype = RepoSubtype {
        name: "off-chain-msg-data",
        sub_dir: "/msgs",
        depth: 5,
    };

    /// Subtype root below `base` (a mutable root dir or an `/ipfs/<address>` path).
    pub fn root_in(&self, base: &str) -> String {
        format!("{}{}", base.trim_end_matches('/'), self.sub_dir)
    }
}

/// Minute-resolution directory at the bottom of the date/time hierarchy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LeafPath {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
}

impl LeafPath {
    pub fn from_timestamp(ts: &DateTime<Utc>) -> Self {
        LeafPath {
            year: ts.year(),
            month: ts.month(),
            day: ts.day(),
            hour: ts.hour(),
            minute: ts.minute(),
        }
    }

    /// Parses `/YYYY/MM/DD/HH/mm`.
    pub fn parse(path: &str) -> KernelResult<Self> {
        let invalid = || KernelError::InvalidLeafPath(path.to_string());

        let rest = path.strip_prefix('/').ok_or_else(invalid)?;
        let parts: Vec<&str> = rest.split('/').collect();
        if parts.len() != RepoSubtype::OFF_CHAIN_MSG_DATA.depth {
            return Err(invalid());
        }

        let widths = [4usize, 2, 2, 2, 2];
        let mut values = [0u32; 5];
        for (i, part) in parts.iter().enumerate() {
            if part.len() != widths[i] || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            values[i] = part.parse().map_err(|_| invalid())?;
        }

        let leaf = LeafPath {
            year: values[0] as i32,
            month: values[1],
            day: values[2],
            hour: values[3],
            minute: values[4],
        };

        if NaiveDate::from_ymd_opt(leaf.year, leaf.month, leaf.day).is_none()
            || leaf.hour > 23
            || leaf.minute > 59
        {
            return Err(invalid());
        }

        Ok(leaf)
    }

    /// Directory names from year down to minute.
    pub fn components(&self) -> [String; 5] {
        [
            format!("{:04}", self.year),
            format!("{:02}", self.month),
            format!("{:02}", self.day),
            format!("{:02}", self.hour),
            format!("{:02}", self.minute),
        ]
    }

    /// First instant of the minute this leaf covers.
    pub fn start(&self) -> KernelResult<DateTime<Utc>> {
        Utc.with_ymd_and_hms(self.year, self.month, self.day, self.hour, self.minute, 0)
            .single()
            .ok_or_else(|| KernelError::InvalidLeafPath(self.to_string()))
    }
}

impl fmt::Display for LeafPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.components().join("/"))
    }
}

/// Milliseconds elapsed since the start of the minute.
pub fn millis_in_minute(ts: &DateTime<Utc>) -> u32 {
    // A leap second reports more than 999 sub-second millis.
    let millis = ts.timestamp_subsec_millis().min(999);
    ts.second() * 1000 + millis
}

pub fn artifact_filename(kind: ArtifactKind, millis: u32, counter: u32) -> String {
    format!("{}{:05}{:03}", kind.filename_prefix(), millis, counter)
}

/// Splits a filename into (milliseconds within minute, collision counter).
pub fn parse_artifact_filename(kind: ArtifactKind, filename: &str) -> KernelResult<(u32, u32)> {
    let invalid = || KernelError::InvalidFilename(filename.to_string());

    let digits = filename.strip_prefix(kind.filename_prefix()).ok_or_else(invalid)?;
    if digits.len() != 8 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    let millis: u32 = digits[..5].parse().map_err(|_| invalid())?;
    let counter: u32 = digits[5..].parse().map_err(|_| invalid())?;
    if millis >= MILLIS_PER_MINUTE {
        return Err(invalid());
    }

    Ok((millis, counter))
}

/// Recovers the timestamp an artifact was saved with from its leaf and filename.
pub fn reconstruct_saved_at(
    leaf: &LeafPath,
    kind: ArtifactKind,
    filename: &str,
) -> KernelResult<(DateTime<Utc>, u32)> {
    let (millis, counter) = parse_artifact_filename(kind, filename)?;
    Ok((leaf.start()? + Duration::milliseconds(millis as i64), counter))
}

/// Write location of an artifact, minus the collision counter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactLocation {
    root_dir: String,
    subtype: RepoSubtype,
    pub leaf: LeafPath,
    pub kind: ArtifactKind,
    pub millis: u32,
}

impl ArtifactLocation {
    pub fn new(root_dir: &str, subtype: RepoSubtype, ts: &DateTime<Utc>, kind: ArtifactKind) -> Self {
        ArtifactLocation {
            root_dir: root_dir.trim_end_matches('/').to_string(),
            subtype,
            leaf: LeafPath::from_timestamp(ts),
            kind,
            millis: millis_in_minute(ts),
        }
    }

    /// `<root>/msgs/YYYY/MM/DD/HH/mm/<kind dir>`
    pub fn kind_dir(&self) -> String {
        format!(
            "{}{}/{}",
            self.subtype.root_in(&self.root_dir),
            self.leaf,
            self.kind.sub_dir()
        )
    }

    pub fn filename(&self, counter: u32) -> KernelResult<String> {
        if counter > MAX_COLLISION_COUNTER {
            return Err(KernelError::CounterOutOfRange(counter));
        }
        Ok(artifact_filename(self.kind, self.millis, counter))
    }

    pub fn path(&self, counter: u32) -> KernelResult<String> {
        Ok(format!("{}/{}", self.kind_dir(), self.filename(counter)?))
    }

    /// Saved timestamp at millisecond precision, as it will be reconstructed by a harvester.
    pub fn saved_at(&self) -> KernelResult<DateTime<Utc>> {
        Ok(self.leaf.start()? + Duration::milliseconds(self.millis as i64))
    }
}
