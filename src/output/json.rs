//! JSON reports for scripting.
//!
//! # Exact duplicates
//!
//! ```json
//! {
//!   "status": "completed",
//!   "groups": [
//!     { "hash": "af13...", "size": 1024, "wasted": 1024, "files": ["/a", "/b"] }
//!   ],
//!   "summary": { "total_files": 100, "reclaimable_space": 1024, "scan_duration_ms": 12, ... },
//!   "warnings": [ { "kind": "read", "path": "/c", "message": "..." } ],
//!   "exit_code": 0,
//!   "exit_code_name": "DH000"
//! }
//! ```
//!
//! A failed run carries `"status": "failed", "error": "..."`. Similarity
//! reports have the same envelope with `clusters` instead of `groups`.

use std::io::Write;

use serde::Serialize;

use crate::duplicates::{DuplicateGroup, FinderOutcome, ScanSummary};
use crate::error::{ExitCode, ScanWarning};
use crate::job::RunStatus;
use crate::scanner::perceptual::MediaKind;
use crate::similarity::{SimilarityCluster, SimilarityOutcome, SimilaritySummary};

/// One exact duplicate group.
#[derive(Debug, Clone, Serialize)]
pub struct JsonDuplicateGroup {
    /// BLAKE3 digest as hexadecimal
    pub hash: String,
    /// Size of each member in bytes
    pub size: u64,
    /// Bytes freed by keeping one copy
    pub wasted: u64,
    /// Member paths, sorted
    pub files: Vec<String>,
}

impl From<&DuplicateGroup> for JsonDuplicateGroup {
    fn from(group: &DuplicateGroup) -> Self {
        Self {
            hash: group.hash_hex(),
            size: group.size,
            wasted: group.wasted_space(),
            files: group
                .files
                .iter()
                .map(|f| f.path.to_string_lossy().into_owned())
                .collect(),
        }
    }
}

/// One member of a similarity cluster.
#[derive(Debug, Clone, Serialize)]
pub struct JsonClusterMember {
    /// File path
    pub path: String,
    /// File size in bytes
    pub size: u64,
    /// Hamming distance to the representative
    pub distance: u32,
    /// Similarity to the representative, 0-100
    pub similarity: f64,
}

/// One similarity cluster.
#[derive(Debug, Clone, Serialize)]
pub struct JsonCluster {
    /// Media kind of every member
    pub media: MediaKind,
    /// Representative fingerprint as hexadecimal
    pub fingerprint: String,
    /// Members, representative first
    pub members: Vec<JsonClusterMember>,
}

impl From<&SimilarityCluster> for JsonCluster {
    fn from(cluster: &SimilarityCluster) -> Self {
        Self {
            media: cluster.media,
            fingerprint: cluster.representative().to_hex(),
            members: cluster
                .members
                .iter()
                .map(|m| JsonClusterMember {
                    path: m.file.path.to_string_lossy().into_owned(),
                    size: m.file.size,
                    distance: m.distance,
                    similarity: (m.similarity * 100.0).round() / 100.0,
                })
                .collect(),
        }
    }
}

/// Exact-duplicate summary with the duration in milliseconds.
#[derive(Debug, Clone, Serialize)]
pub struct JsonSummary {
    /// Files found by the scanner
    pub total_files: usize,
    /// Their combined size
    pub total_size: u64,
    /// Files ruled out by a unique size
    pub eliminated_by_size: usize,
    /// Files ruled out by a unique partial digest
    pub eliminated_by_prehash: usize,
    /// Partial digests served by the cache
    pub cache_prehash_hits: usize,
    /// Partial digests computed
    pub cache_prehash_misses: usize,
    /// Full digests served by the cache
    pub cache_fullhash_hits: usize,
    /// Full digests computed
    pub cache_fullhash_misses: usize,
    /// Groups reported
    pub duplicate_groups: usize,
    /// Redundant copies across all groups
    pub duplicate_files: usize,
    /// Bytes freed by keeping one copy per group
    pub reclaimable_space: u64,
    /// Files left out because of errors
    pub skipped_files: usize,
    /// Directories that could not be listed
    pub skipped_directories: usize,
    /// Wall-clock duration
    pub scan_duration_ms: u64,
}

impl From<&ScanSummary> for JsonSummary {
    fn from(summary: &ScanSummary) -> Self {
        Self {
            total_files: summary.total_files,
            total_size: summary.total_size,
            eliminated_by_size: summary.eliminated_by_size,
            eliminated_by_prehash: summary.eliminated_by_prehash,
            cache_prehash_hits: summary.cache_prehash_hits,
            cache_prehash_misses: summary.cache_prehash_misses,
            cache_fullhash_hits: summary.cache_fullhash_hits,
            cache_fullhash_misses: summary.cache_fullhash_misses,
            duplicate_groups: summary.duplicate_groups,
            duplicate_files: summary.duplicate_files,
            reclaimable_space: summary.reclaimable_space,
            skipped_files: summary.skipped_files,
            skipped_directories: summary.skipped_directories,
            scan_duration_ms: summary.scan_duration.as_millis() as u64,
        }
    }
}

/// Similarity summary with the duration in milliseconds.
#[derive(Debug, Clone, Serialize)]
pub struct JsonSimilaritySummary {
    /// Files found by the scanner
    pub total_files: usize,
    /// Files with a fingerprint
    pub fingerprinted: usize,
    /// Files skipped as unsupported
    pub unsupported: usize,
    /// Files that could not be read or decoded
    pub failed: usize,
    /// Clusters reported
    pub clusters: usize,
    /// Files inside a cluster
    pub clustered_files: usize,
    /// Hamming distance limit
    pub max_distance: u32,
    /// Files left out because of errors
    pub skipped_files: usize,
    /// Directories that could not be listed
    pub skipped_directories: usize,
    /// Wall-clock duration
    pub scan_duration_ms: u64,
}

impl From<&SimilaritySummary> for JsonSimilaritySummary {
    fn from(summary: &SimilaritySummary) -> Self {
        Self {
            total_files: summary.total_files,
            fingerprinted: summary.fingerprinted,
            unsupported: summary.unsupported,
            failed: summary.failed,
            clusters: summary.clusters,
            clustered_files: summary.clustered_files,
            max_distance: summary.max_distance,
            skipped_files: summary.skipped_files,
            skipped_directories: summary.skipped_directories,
            scan_duration_ms: summary.scan_duration.as_millis() as u64,
        }
    }
}

/// Complete JSON report for an exact-duplicate run.
#[derive(Debug, Clone, Serialize)]
pub struct JsonOutput {
    /// Terminal state
    #[serde(flatten)]
    pub status: RunStatus,
    /// Duplicate groups
    pub groups: Vec<JsonDuplicateGroup>,
    /// Statistics
    pub summary: JsonSummary,
    /// Recovered errors
    pub warnings: Vec<ScanWarning>,
    /// Process exit code
    pub exit_code: i32,
    /// Machine-readable exit code name
    pub exit_code_name: String,
}

impl JsonOutput {
    /// Build the report for a finished exact run.
    #[must_use]
    pub fn new(outcome: &FinderOutcome, exit_code: ExitCode) -> Self {
        Self {
            status: outcome.status.clone(),
            groups: outcome.groups.iter().map(JsonDuplicateGroup::from).collect(),
            summary: JsonSummary::from(&outcome.summary),
            warnings: outcome.warnings.clone(),
            exit_code: exit_code.as_i32(),
            exit_code_name: exit_code.code_prefix().to_string(),
        }
    }

    /// Write the report followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W, pretty: bool) -> Result<(), JsonOutputError> {
        write_json(self, writer, pretty)
    }
}

/// Complete JSON report for a similarity run.
#[derive(Debug, Clone, Serialize)]
pub struct JsonSimilarityOutput {
    /// Terminal state
    #[serde(flatten)]
    pub status: RunStatus,
    /// Similarity clusters
    pub clusters: Vec<JsonCluster>,
    /// Statistics
    pub summary: JsonSimilaritySummary,
    /// Recovered errors
    pub warnings: Vec<ScanWarning>,
    /// Process exit code
    pub exit_code: i32,
    /// Machine-readable exit code name
    pub exit_code_name: String,
}

impl JsonSimilarityOutput {
    /// Build the report for a finished similarity run.
    #[must_use]
    pub fn new(outcome: &SimilarityOutcome, exit_code: ExitCode) -> Self {
        Self {
            status: outcome.status.clone(),
            clusters: outcome.groups.iter().map(JsonCluster::from).collect(),
            summary: JsonSimilaritySummary::from(&outcome.summary),
            warnings: outcome.warnings.clone(),
            exit_code: exit_code.as_i32(),
            exit_code_name: exit_code.code_prefix().to_string(),
        }
    }

    /// Write the report followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W, pretty: bool) -> Result<(), JsonOutputError> {
        write_json(self, writer, pretty)
    }
}

fn write_json<T: Serialize, W: Write>(
    value: &T,
    writer: &mut W,
    pretty: bool,
) -> Result<(), JsonOutputError> {
    if pretty {
        serde_json::to_writer_pretty(&mut *writer, value)?;
    } else {
        serde_json::to_writer(&mut *writer, value)?;
    }
    writer.write_all(b"\n")?;
    Ok(())
}

/// Errors that can occur during JSON output.
#[derive(thiserror::Error, Debug)]
pub enum JsonOutputError {
    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error during writing
    #[error("I/O error during JSON generation: {0}")]
    Io(#[from] std::io::Error),
}
