//! BLAKE3 content hashing.
//!
//! # Overview
//!
//! Digests are computed by streaming the file through a fixed 32 KiB buffer,
//! so memory use is bounded regardless of file size. Two modes exist:
//!
//! - **Partial**: the leading [`PARTIAL_HASH_BYTES`] of the file. Cheap
//!   prefilter; files whose partial digests differ cannot be identical.
//! - **Full**: the entire content. Authoritative.
//!
//! For a file no larger than the partial budget both digests are equal,
//! since both cover exactly the same bytes.
//!
//! # Cancellation
//!
//! When a shutdown flag is attached, it is polled before every chunk and
//! hashing stops with [`HashError::Cancelled`] at the next chunk boundary.

use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::HashError;

/// 32-byte BLAKE3 digest.
pub type Hash = [u8; 32];

/// Read buffer size.
pub const CHUNK_SIZE: usize = 32 * 1024;

/// Bytes covered by a partial digest.
pub const PARTIAL_HASH_BYTES: u64 = 64 * 1024;

/// Which digest of a file is being computed or cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestKind {
    /// Leading bytes only
    Partial,
    /// Entire content
    Full,
}

impl DigestKind {
    /// Stable integer code used by the cache schema.
    #[must_use]
    pub fn code(self) -> i64 {
        match self {
            Self::Partial => 0,
            Self::Full => 1,
        }
    }

    /// Inverse of [`DigestKind::code`].
    #[must_use]
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Partial),
            1 => Some(Self::Full),
            _ => None,
        }
    }
}

impl std::fmt::Display for DigestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Partial => write!(f, "partial"),
            Self::Full => write!(f, "full"),
        }
    }
}

/// Streaming file hasher.
#[derive(Debug, Clone)]
pub struct Hasher {
    partial_bytes: u64,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher {
    /// Create a hasher with the default partial budget.
    #[must_use]
    pub fn new() -> Self {
        Self {
            partial_bytes: PARTIAL_HASH_BYTES,
            shutdown_flag: None,
        }
    }

    /// Override the number of leading bytes covered by a partial digest.
    #[must_use]
    pub fn with_partial_bytes(mut self, bytes: u64) -> Self {
        self.partial_bytes = bytes.max(1);
        self
    }

    /// Set the shutdown flag polled between chunks.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Bytes covered by a partial digest.
    #[must_use]
    pub fn partial_bytes(&self) -> u64 {
        self.partial_bytes
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Compute the digest of the given kind.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] if the file cannot be read or hashing was cancelled.
    pub fn digest(&self, path: &Path, kind: DigestKind) -> Result<Hash, HashError> {
        match kind {
            DigestKind::Partial => self.prehash(path),
            DigestKind::Full => self.full_hash(path),
        }
    }

    /// Digest of the leading bytes of the file.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] if the file cannot be read or hashing was cancelled.
    pub fn prehash(&self, path: &Path) -> Result<Hash, HashError> {
        self.hash_range(path, 0..self.partial_bytes)
    }

    /// Digest of the entire file.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] if the file cannot be read or hashing was cancelled.
    pub fn full_hash(&self, path: &Path) -> Result<Hash, HashError> {
        self.hash_range(path, 0..u64::MAX)
    }

    /// Digest of the bytes in `range`, clamped to the end of the file.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] if the file cannot be read or hashing was cancelled.
    pub fn hash_range(&self, path: &Path, range: Range<u64>) -> Result<Hash, HashError> {
        let mut file = File::open(path).map_err(|e| HashError::from_io(path, e))?;
        if range.start > 0 {
            file.seek(SeekFrom::Start(range.start))
                .map_err(|e| HashError::from_io(path, e))?;
        }
        let limit = range.end.saturating_sub(range.start);
        self.hash_reader(path, file.take(limit))
    }

    fn hash_reader<R: Read>(&self, path: &Path, mut reader: R) -> Result<Hash, HashError> {
        let mut hasher = blake3::Hasher::new();
        let mut buffer = vec![0u8; CHUNK_SIZE];

        loop {
            if self.is_shutdown_requested() {
                log::trace!("Hashing cancelled at chunk boundary: {}", path.display());
                return Err(HashError::Cancelled(path.to_path_buf()));
            }
            let read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(HashError::from_io(path, e)),
            };
            hasher.update(&buffer[..read]);
        }

        Ok(*hasher.finalize().as_bytes())
    }
}

/// Convert a digest to lowercase hexadecimal.
#[must_use]
pub fn hash_to_hex(hash: &Hash) -> String {
    use std::fmt::Write;

    hash.iter().fold(String::with_capacity(64), |mut out, byte| {
        let _ = write!(out, "{byte:02x}");
        out
    })
}

/// Parse a 64-character hexadecimal digest.
#[must_use]
pub fn hex_to_hash(hex: &str) -> Option<Hash> {
    if hex.len() != 64 || !hex.is_ascii() {
        return None;
    }
    let mut hash = [0u8; 32];
    for (i, byte) in hash.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(hash)
}
