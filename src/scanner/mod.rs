//! Scanner module for directory traversal and content hashing.
//!
//! This module provides functionality for:
//! - Parallel directory walking using jwalk
//! - Multi-root scanning with overlapping roots collapsed
//! - Content hashing with BLAKE3 (partial and full digests)
//! - Perceptual fingerprints for images and video keyframes
//!
//! # Architecture
//!
//! The scanner is divided into submodules:
//! - [`walker`]: Directory traversal and file discovery
//! - [`filters`]: Skip-list and extension allow-list
//! - [`hasher`]: BLAKE3 file hashing (streaming, chunked)
//! - [`perceptual`]: Perceptual hashes for similarity detection
//! - [`video`]: Keyframe extraction through ffmpeg
//!
//! # Example
//!
//! ```no_run
//! use dupehound::scanner::{Scanner, WalkerConfig};
//! use std::path::PathBuf;
//!
//! let config = WalkerConfig {
//!     min_size: Some(1024),
//!     skip_hidden: true,
//!     ..Default::default()
//! };
//!
//! let scanner = Scanner::new(vec![PathBuf::from(".")], config);
//! for entry in scanner.scan() {
//!     match entry {
//!         Ok(file) => println!("{}: {} bytes", file.path.display(), file.size),
//!         Err(e) => eprintln!("Warning: {}", e),
//!     }
//! }
//! ```

pub mod filters;
pub mod hasher;
pub mod perceptual;
pub mod video;
pub mod walker;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

pub use filters::ExtensionFilter;
pub use hasher::{hash_to_hex, hex_to_hash, DigestKind, Hash, Hasher, CHUNK_SIZE, PARTIAL_HASH_BYTES};
pub use walker::Walker;

/// Metadata for a discovered file.
///
/// Digests start out empty and are filled in by the duplicate pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Absolute path to the file
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modification time
    pub modified: SystemTime,
    /// Digest of the leading bytes, once computed
    pub partial: Option<Hash>,
    /// Digest of the whole content, once computed
    pub full: Option<Hash>,
}

impl FileRecord {
    /// Create a record with no digests.
    #[must_use]
    pub fn new(path: PathBuf, size: u64, modified: SystemTime) -> Self {
        Self {
            path,
            size,
            modified,
            partial: None,
            full: None,
        }
    }

    /// Digest of the given kind, if it has been computed.
    #[must_use]
    pub fn digest(&self, kind: DigestKind) -> Option<Hash> {
        match kind {
            DigestKind::Partial => self.partial,
            DigestKind::Full => self.full,
        }
    }

    /// Record a digest of the given kind.
    pub fn set_digest(&mut self, kind: DigestKind, digest: Hash) {
        match kind {
            DigestKind::Partial => self.partial = Some(digest),
            DigestKind::Full => self.full = Some(digest),
        }
    }
}

/// Configuration for directory walking.
///
/// Controls filtering, symlink handling, and other walk behavior.
#[derive(Debug, Clone, Default)]
pub struct WalkerConfig {
    /// Follow symbolic links during traversal.
    /// Warning: May cause infinite loops with symlink cycles.
    pub follow_symlinks: bool,

    /// Skip hidden files and directories (names starting with `.`).
    pub skip_hidden: bool,

    /// Minimum file size to include (in bytes).
    pub min_size: Option<u64>,

    /// Maximum file size to include (in bytes).
    pub max_size: Option<u64>,

    /// Glob patterns to ignore (gitignore-style).
    /// These are applied in addition to any .gitignore files.
    pub ignore_patterns: Vec<String>,

    /// Extension allow-list. Empty means every extension.
    pub extensions: ExtensionFilter,
}

impl WalkerConfig {
    /// Restrict the walk to the given extensions.
    #[must_use]
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = ExtensionFilter::new(extensions);
        self
    }
}

/// Errors that can occur during directory scanning.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Permission was denied when accessing a file or directory.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The specified path was not found.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// The specified path is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// An I/O error occurred while accessing a file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A directory could not be listed; nothing beneath it was scanned.
    #[error("Cannot read directory {path}: {source}")]
    UnreadableDirectory {
        /// The directory
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl ScanError {
    /// Path the error refers to.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::PermissionDenied(path) | Self::NotFound(path) | Self::NotADirectory(path) => {
                path
            }
            Self::Io { path, .. } | Self::UnreadableDirectory { path, .. } => path,
        }
    }

    /// Whether a whole directory was skipped rather than a single entry.
    #[must_use]
    pub fn is_directory(&self) -> bool {
        matches!(self, Self::UnreadableDirectory { .. })
    }
}

/// Errors that can occur during file hashing.
///
/// Cloneable so a single failure can be reported to several consumers.
#[derive(thiserror::Error, Debug, Clone)]
pub enum HashError {
    /// The specified file was not found.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// An I/O error occurred while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: Arc<std::io::Error>,
    },

    /// Hashing stopped at a chunk boundary because cancellation was requested.
    #[error("Hashing cancelled: {0}")]
    Cancelled(PathBuf),
}

impl HashError {
    /// Classify an I/O error raised while reading `path`.
    #[must_use]
    pub fn from_io(path: &Path, error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: Arc::new(error),
            },
        }
    }

    /// Path the error refers to.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::NotFound(path) | Self::PermissionDenied(path) | Self::Cancelled(path) => path,
            Self::Io { path, .. } => path,
        }
    }

    /// Whether this error is the cancellation marker rather than a read failure.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

/// Collapse overlapping roots so every directory is walked once.
///
/// Roots are made absolute, sorted, and any root nested inside an earlier one
/// is dropped. Exact duplicates collapse as well.
#[must_use]
pub fn collapse_roots(roots: &[PathBuf]) -> Vec<PathBuf> {
    let mut absolute: Vec<PathBuf> = roots.iter().map(|root| absolutize(root)).collect();
    absolute.sort();
    absolute.dedup();

    let mut collapsed: Vec<PathBuf> = Vec::with_capacity(absolute.len());
    for root in absolute {
        if let Some(parent) = collapsed.iter().find(|kept| root.starts_with(kept)) {
            log::debug!(
                "Root {} is inside {}, scanning once",
                root.display(),
                parent.display()
            );
            continue;
        }
        collapsed.push(root);
    }
    collapsed
}

/// Make a path absolute without touching symlinks when canonicalization fails.
fn absolutize(path: &Path) -> PathBuf {
    if let Ok(canonical) = std::fs::canonicalize(path) {
        return canonical;
    }
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

/// Multi-root scanner.
///
/// Each call to [`Scanner::scan`] starts a fresh walk over the collapsed
/// root set, so the scanner can be reused across runs.
#[derive(Debug, Clone)]
pub struct Scanner {
    roots: Vec<PathBuf>,
    config: WalkerConfig,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Scanner {
    /// Create a scanner over the given roots.
    #[must_use]
    pub fn new(roots: Vec<PathBuf>, config: WalkerConfig) -> Self {
        Self {
            roots: collapse_roots(&roots),
            config,
            shutdown_flag: None,
        }
    }

    /// Set the shutdown flag for graceful termination.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Roots after collapsing overlaps.
    #[must_use]
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Walk every root in order, yielding each regular file once.
    pub fn scan(&self) -> impl Iterator<Item = Result<FileRecord, ScanError>> + '_ {
        let mut seen: HashSet<PathBuf> = HashSet::new();
        self.roots
            .iter()
            .flat_map(move |root| {
                let mut walker = Walker::new(root, self.config.clone());
                if let Some(flag) = &self.shutdown_flag {
                    walker = walker.with_shutdown_flag(Arc::clone(flag));
                }
                walker.into_walk()
            })
            .filter(move |entry| match entry {
                Ok(record) => seen.insert(record.path.clone()),
                Err(_) => true,
            })
    }
}
