//! Cache entry definitions.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::scanner::{DigestKind, FileRecord, Hash};

/// Identity of a file version: path plus the metadata that changes with it.
///
/// Two keys are equal only when path, size and modification time all match,
/// so a modified file never matches the entry of its previous version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Absolute path to the file
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Modification time in nanoseconds relative to the Unix epoch
    pub mtime_ns: i64,
}

impl CacheKey {
    /// Build a key from raw parts.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, size: u64, modified: SystemTime) -> Self {
        Self {
            path: path.into(),
            size,
            mtime_ns: system_time_to_nanos(modified),
        }
    }

    /// Path of the keyed file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl From<&FileRecord> for CacheKey {
    fn from(record: &FileRecord) -> Self {
        Self::new(record.path.clone(), record.size, record.modified)
    }
}

/// A stored digest for one file version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// File version the digest belongs to
    pub key: CacheKey,
    /// Partial or full digest
    pub kind: DigestKind,
    /// Digest value
    pub digest: Hash,
}

impl CacheEntry {
    /// Create an entry.
    #[must_use]
    pub fn new(key: CacheKey, kind: DigestKind, digest: Hash) -> Self {
        Self { key, kind, digest }
    }

    /// Create an entry from a record and one of its digests.
    #[must_use]
    pub fn from_record(record: &FileRecord, kind: DigestKind, digest: Hash) -> Self {
        Self::new(CacheKey::from(record), kind, digest)
    }
}

/// Nanoseconds since the Unix epoch, negative for earlier times.
///
/// Saturates at the `i64` range, which covers several centuries either way.
#[must_use]
pub fn system_time_to_nanos(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => i64::try_from(after.as_nanos()).unwrap_or(i64::MAX),
        Err(before) => i64::try_from(before.duration().as_nanos())
            .map(|n| -n)
            .unwrap_or(i64::MIN),
    }
}

/// Inverse of [`system_time_to_nanos`].
#[must_use]
pub fn nanos_to_system_time(nanos: i64) -> SystemTime {
    if nanos >= 0 {
        UNIX_EPOCH + Duration::from_nanos(nanos.unsigned_abs())
    } else {
        UNIX_EPOCH - Duration::from_nanos(nanos.unsigned_abs())
    }
}
