//! Plain-text reports for terminals.

use std::io::{self, Write};

use bytesize::ByteSize;

use crate::cache::CacheStats;
use crate::duplicates::FinderOutcome;
use crate::job::{RunOutcome, RunStatus};
use crate::similarity::SimilarityOutcome;

/// Print exact duplicate groups and the run summary.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_duplicates<W: Write>(writer: &mut W, outcome: &FinderOutcome) -> io::Result<()> {
    for (index, group) in outcome.groups.iter().enumerate() {
        writeln!(
            writer,
            "Group {} ({} files, {} each, {} wasted) {}",
            index + 1,
            group.len(),
            ByteSize::b(group.size),
            ByteSize::b(group.wasted_space()),
            &group.hash_hex()[..16]
        )?;
        for file in &group.files {
            writeln!(writer, "  {}", file.path.display())?;
        }
        writeln!(writer)?;
    }

    let summary = &outcome.summary;
    writeln!(
        writer,
        "{} files scanned ({}), {} duplicate groups, {} redundant copies",
        summary.total_files,
        summary.total_size_display(),
        summary.duplicate_groups,
        summary.duplicate_files
    )?;
    writeln!(
        writer,
        "Reclaimable: {} ({:.1}%)",
        summary.reclaimable_display(),
        summary.wasted_percentage()
    )?;
    writeln!(
        writer,
        "Cache: partial {} hit / {} miss, full {} hit / {} miss",
        summary.cache_prehash_hits,
        summary.cache_prehash_misses,
        summary.cache_fullhash_hits,
        summary.cache_fullhash_misses
    )?;
    write_footer(writer, outcome, summary.scan_duration.as_secs_f64())
}

/// Print similarity clusters and the run summary.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_clusters<W: Write>(writer: &mut W, outcome: &SimilarityOutcome) -> io::Result<()> {
    for (index, cluster) in outcome.groups.iter().enumerate() {
        writeln!(
            writer,
            "Cluster {} ({} {}s, {})",
            index + 1,
            cluster.len(),
            cluster.media,
            ByteSize::b(cluster.total_size())
        )?;
        for member in &cluster.members {
            writeln!(
                writer,
                "  {:>6.2}%  d={:<3} {}",
                member.similarity,
                member.distance,
                member.file.path.display()
            )?;
        }
        writeln!(writer)?;
    }

    let summary = &outcome.summary;
    writeln!(
        writer,
        "{} files scanned, {} fingerprinted, {} clusters covering {} files (distance <= {})",
        summary.total_files,
        summary.fingerprinted,
        summary.clusters,
        summary.clustered_files,
        summary.max_distance
    )?;
    write_footer(writer, outcome, summary.scan_duration.as_secs_f64())
}

fn write_footer<W: Write, G, S>(
    writer: &mut W,
    outcome: &RunOutcome<G, S>,
    seconds: f64,
) -> io::Result<()> {
    if let Some(note) = outcome.skipped_note() {
        writeln!(writer, "{note}")?;
    }
    match &outcome.status {
        RunStatus::Completed => writeln!(writer, "Completed in {seconds:.2}s"),
        RunStatus::Cancelled => writeln!(writer, "Cancelled after {seconds:.2}s"),
        RunStatus::Failed { error } => writeln!(writer, "Failed: {error}"),
    }
}

/// Print cache statistics.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_cache_stats<W: Write>(writer: &mut W, stats: &CacheStats) -> io::Result<()> {
    writeln!(
        writer,
        "Entries:       {} ({} partial, {} full)",
        stats.entries, stats.partial_entries, stats.full_entries
    )?;
    writeln!(writer, "File versions: {}", stats.file_versions)?;
    writeln!(writer, "Cached bytes:  {}", ByteSize::b(stats.cached_bytes))?;
    writeln!(writer, "Database size: {}", ByteSize::b(stats.database_bytes))?;
    if let (Some(oldest), Some(newest)) = (stats.oldest, stats.newest) {
        writeln!(writer, "Oldest entry:  {}", oldest.format("%Y-%m-%d %H:%M:%S UTC"))?;
        writeln!(writer, "Newest entry:  {}", newest.format("%Y-%m-%d %H:%M:%S UTC"))?;
    }
    Ok(())
}
