//! Size grouping, digest regrouping and confirmed duplicate groups.
//!
//! # Overview
//!
//! Size grouping is the first filter of the exact pipeline. Files with
//! different sizes cannot be duplicates, so partitioning by exact size
//! eliminates most files without reading a byte. The surviving groups are
//! then split by partial digest and finally by full digest with
//! [`regroup_by_digest`].
//!
//! # Example
//!
//! ```
//! use dupehound::scanner::FileRecord;
//! use dupehound::duplicates::{group_by_size, GroupingStats};
//! use std::path::PathBuf;
//! use std::time::SystemTime;
//!
//! let files = vec![
//!     FileRecord::new(PathBuf::from("/file1.txt"), 1024, SystemTime::now()),
//!     FileRecord::new(PathBuf::from("/file2.txt"), 1024, SystemTime::now()),
//!     FileRecord::new(PathBuf::from("/file3.txt"), 2048, SystemTime::now()),
//! ];
//!
//! let (groups, stats) = group_by_size(files);
//!
//! assert_eq!(stats.total_files, 3);
//! assert_eq!(stats.potential_duplicates, 2);
//! assert_eq!(groups.len(), 1);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::scanner::{hash_to_hex, DigestKind, FileRecord, Hash};

/// Confirmed duplicate group of files.
///
/// Every member has the same size and the same full digest, and a group
/// always has at least two members, sorted by path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    /// BLAKE3 digest of the full content
    #[serde(with = "hex_digest")]
    pub digest: Hash,
    /// File size in bytes, shared by all members
    pub size: u64,
    /// Member files
    pub files: Vec<FileRecord>,
}

impl DuplicateGroup {
    /// Create a new duplicate group. Members are sorted by path.
    #[must_use]
    pub fn new(digest: Hash, size: u64, mut files: Vec<FileRecord>) -> Self {
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Self {
            digest,
            size,
            files,
        }
    }

    /// Number of files in this group.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Check if this group is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Total size of all files in this group.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.size * self.files.len() as u64
    }

    /// Total wasted space (all copies minus one).
    #[must_use]
    pub fn wasted_space(&self) -> u64 {
        self.size * self.duplicate_count() as u64
    }

    /// Number of duplicate copies (total - 1 original).
    #[must_use]
    pub fn duplicate_count(&self) -> usize {
        self.files.len().saturating_sub(1)
    }

    /// Digest as hexadecimal string.
    #[must_use]
    pub fn hash_hex(&self) -> String {
        hash_to_hex(&self.digest)
    }

    /// Get just the paths of files in this group.
    #[must_use]
    pub fn paths(&self) -> Vec<std::path::PathBuf> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }
}

/// Order groups by descending total size, ties broken by digest.
pub fn sort_groups(groups: &mut [DuplicateGroup]) {
    groups.sort_by(|a, b| {
        b.total_size()
            .cmp(&a.total_size())
            .then_with(|| a.digest.cmp(&b.digest))
    });
}

mod hex_digest {
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::scanner::{hash_to_hex, hex_to_hash, Hash};

    pub fn serialize<S: Serializer>(digest: &Hash, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hash_to_hex(digest))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Hash, D::Error> {
        let hex = String::deserialize(deserializer)?;
        hex_to_hash(&hex).ok_or_else(|| serde::de::Error::custom("invalid digest"))
    }
}

/// Statistics from size grouping phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupingStats {
    /// Total number of files processed
    pub total_files: usize,
    /// Total size of all files in bytes
    pub total_size: u64,
    /// Number of unique file sizes
    pub unique_sizes: usize,
    /// Number of files that could be duplicates (in groups of 2+)
    pub potential_duplicates: usize,
    /// Number of files eliminated as unique (singleton groups)
    pub eliminated_unique: usize,
    /// Number of empty files encountered
    pub empty_files: usize,
    /// Number of size groups with 2+ files
    pub duplicate_groups: usize,
}

impl GroupingStats {
    /// Percentage of files eliminated by size grouping.
    #[must_use]
    pub fn elimination_rate(&self) -> f64 {
        if self.total_files == 0 {
            0.0
        } else {
            (self.eliminated_unique as f64 / self.total_files as f64) * 100.0
        }
    }
}

/// Group files by size.
///
/// Returns only sizes shared by two or more files, ordered by size. Empty
/// files are left out; they all share the same content and the scanner does
/// not yield them anyway.
///
/// # Example
///
/// ```
/// use dupehound::scanner::FileRecord;
/// use dupehound::duplicates::group_by_size;
/// use std::path::PathBuf;
/// use std::time::SystemTime;
///
/// let files = vec![
///     FileRecord::new(PathBuf::from("/a.txt"), 100, SystemTime::now()),
///     FileRecord::new(PathBuf::from("/b.txt"), 100, SystemTime::now()),
///     FileRecord::new(PathBuf::from("/c.txt"), 200, SystemTime::now()),
/// ];
///
/// let (groups, stats) = group_by_size(files);
///
/// assert_eq!(groups.len(), 1);
/// assert_eq!(groups[&100].len(), 2);
/// assert_eq!(stats.eliminated_unique, 1);
/// ```
#[must_use]
pub fn group_by_size(
    files: impl IntoIterator<Item = FileRecord>,
) -> (BTreeMap<u64, Vec<FileRecord>>, GroupingStats) {
    let mut all_groups: BTreeMap<u64, Vec<FileRecord>> = BTreeMap::new();
    let mut stats = GroupingStats::default();

    for file in files {
        stats.total_files += 1;
        stats.total_size += file.size;

        if file.size == 0 {
            stats.empty_files += 1;
            log::debug!("Empty file encountered: {}", file.path.display());
            continue;
        }

        all_groups.entry(file.size).or_default().push(file);
    }

    stats.unique_sizes = all_groups.len();

    let filtered_groups: BTreeMap<u64, Vec<FileRecord>> = all_groups
        .into_iter()
        .filter(|(size, files)| {
            if files.len() == 1 {
                stats.eliminated_unique += 1;
                log::trace!(
                    "Eliminated unique size {}: {}",
                    size,
                    files[0].path.display()
                );
                false
            } else {
                stats.potential_duplicates += files.len();
                stats.duplicate_groups += 1;
                log::debug!(
                    "Size group {} bytes: {} potential duplicates",
                    size,
                    files.len()
                );
                true
            }
        })
        .collect();

    log::info!(
        "Phase 1 complete: {} files → {} potential duplicates ({:.1}% eliminated)",
        stats.total_files,
        stats.potential_duplicates,
        stats.elimination_rate()
    );

    (filtered_groups, stats)
}

/// Split candidate sets by digest of the given kind, dropping singletons.
///
/// Files without a digest of that kind are dropped. Output sets keep the
/// input order of their members and are ordered by (size, digest).
#[must_use]
pub fn regroup_by_digest(
    sets: impl IntoIterator<Item = Vec<FileRecord>>,
    kind: DigestKind,
) -> Vec<Vec<FileRecord>> {
    let mut buckets: BTreeMap<(u64, Hash), Vec<FileRecord>> = BTreeMap::new();

    for file in sets.into_iter().flatten() {
        if let Some(digest) = file.digest(kind) {
            buckets.entry((file.size, digest)).or_default().push(file);
        }
    }

    buckets
        .into_iter()
        .filter_map(|((size, digest), files)| {
            if files.len() < 2 {
                log::trace!(
                    "Eliminated unique {} digest {}: {}",
                    kind,
                    hash_to_hex(&digest),
                    files[0].path.display()
                );
                return None;
            }
            log::debug!(
                "{} group {} ({} bytes): {} candidates",
                kind,
                hash_to_hex(&digest),
                size,
                files.len()
            );
            Some(files)
        })
        .collect()
}

/// Build confirmed groups from full-digest candidate sets.
#[must_use]
pub fn into_duplicate_groups(sets: Vec<Vec<FileRecord>>) -> Vec<DuplicateGroup> {
    let mut groups: Vec<DuplicateGroup> = sets
        .into_iter()
        .filter_map(|files| {
            let first = files.first()?;
            let digest = first.full?;
            let size = first.size;
            debug_assert!(files.iter().all(|f| f.full == Some(digest) && f.size == size));
            (files.len() > 1).then(|| DuplicateGroup::new(digest, size, files))
        })
        .collect();
    sort_groups(&mut groups);
    groups
}
