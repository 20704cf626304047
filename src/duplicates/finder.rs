//! Multi-stage exact duplicate detection.
//!
//! # Pipeline
//!
//! 1. **Scanning** - Collect every regular file under the roots
//! 2. **SizeGrouping** - Partition by exact size, drop unique sizes
//! 3. **PartialHashing** - Digest the leading bytes of size-group members,
//!    regroup by (size, partial digest), drop singletons
//! 4. **FullHashing** - Digest the full content of the survivors and emit
//!    one [`DuplicateGroup`] per (size, full digest) with two or more files
//!
//! Both hashing stages consult the cache first with one batched lookup,
//! send only the misses to the executor and store the new digests in one
//! batched write. Every file of a candidate set is resolved before the set
//! moves on, so a stage never starts for a set whose previous stage is
//! incomplete.
//!
//! # Cancellation
//!
//! A cancelled run keeps every digest it already stored. Groups are only
//! reported when [`FinderConfig::partial_results`] is set, and then only
//! those whose candidate set was fully hashed.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytesize::ByteSize;
use serde::Serialize;

use super::groups::{group_by_size, into_duplicate_groups, regroup_by_digest, DuplicateGroup};
use crate::cache::{CacheEntry, CacheError, CacheKey, HashCache};
use crate::error::ScanWarning;
use crate::executor::{ExecutionMode, Executor, ExecutorConfig, Job, JobOutcome, Output, Task};
use crate::job::{FinderError, RunOutcome, RunStatus, ScanJob};
use crate::progress::{ProgressCallback, Stage};
use crate::scanner::{DigestKind, FileRecord, Scanner, WalkerConfig};

/// Configuration for the duplicate finder.
#[derive(Clone, Default)]
pub struct FinderConfig {
    /// Walker configuration for directory traversal.
    pub walker_config: WalkerConfig,
    /// Executor configuration for hashing jobs.
    pub executor: ExecutorConfig,
    /// Optional hash cache for faster rescans.
    pub cache: Option<Arc<HashCache>>,
    /// Optional shutdown flag for graceful termination.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Optional progress callback for reporting.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
    /// Report fully hashed groups when the run is cancelled.
    pub partial_results: bool,
}

impl std::fmt::Debug for FinderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinderConfig")
            .field("walker_config", &self.walker_config)
            .field("executor", &self.executor)
            .field("cache", &self.cache.as_ref().map(|_| "<cache>"))
            .field("shutdown_flag", &self.shutdown_flag)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .field("partial_results", &self.partial_results)
            .finish()
    }
}

impl FinderConfig {
    /// Set the worker budget. Zero means one per CPU.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.executor.workers = workers;
        self
    }

    /// Set the execution strategy.
    #[must_use]
    pub fn with_execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.executor.mode = mode;
        self
    }

    /// Set the whole executor configuration.
    #[must_use]
    pub fn with_executor_config(mut self, config: ExecutorConfig) -> Self {
        self.executor = config;
        self
    }

    /// Set the number of leading bytes covered by partial digests.
    #[must_use]
    pub fn with_partial_bytes(mut self, bytes: u64) -> Self {
        self.executor.partial_bytes = bytes.max(1);
        self
    }

    /// Set the hash cache.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<HashCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Set the walker configuration.
    #[must_use]
    pub fn with_walker_config(mut self, config: WalkerConfig) -> Self {
        self.walker_config = config;
        self
    }

    /// Set the shutdown flag for graceful termination.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Report finalized groups from cancelled runs.
    #[must_use]
    pub fn with_partial_results(mut self, enabled: bool) -> Self {
        self.partial_results = enabled;
        self
    }
}

/// Summary statistics from a duplicate scan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanSummary {
    /// Total number of files scanned
    pub total_files: usize,
    /// Total size of all scanned files in bytes
    pub total_size: u64,
    /// Number of files eliminated by size grouping (unique sizes)
    pub eliminated_by_size: usize,
    /// Number of files eliminated by partial digest
    pub eliminated_by_prehash: usize,
    /// Number of cache hits for partial digests
    pub cache_prehash_hits: usize,
    /// Number of cache misses for partial digests
    pub cache_prehash_misses: usize,
    /// Number of cache hits for full digests
    pub cache_fullhash_hits: usize,
    /// Number of cache misses for full digests
    pub cache_fullhash_misses: usize,
    /// Number of confirmed duplicate groups
    pub duplicate_groups: usize,
    /// Total number of duplicate files (excluding originals)
    pub duplicate_files: usize,
    /// Total space that can be reclaimed by removing duplicates
    pub reclaimable_space: u64,
    /// Files left out because of recoverable errors
    pub skipped_files: usize,
    /// Directories that could not be listed
    pub skipped_directories: usize,
    /// Duration of the entire scan
    pub scan_duration: Duration,
}

impl ScanSummary {
    /// Calculate the percentage of space that is wasted by duplicates.
    #[must_use]
    pub fn wasted_percentage(&self) -> f64 {
        if self.total_size == 0 {
            0.0
        } else {
            (self.reclaimable_space as f64 / self.total_size as f64) * 100.0
        }
    }

    /// Format reclaimable space as human-readable string.
    #[must_use]
    pub fn reclaimable_display(&self) -> String {
        ByteSize::b(self.reclaimable_space).to_string()
    }

    /// Format total size as human-readable string.
    #[must_use]
    pub fn total_size_display(&self) -> String {
        ByteSize::b(self.total_size).to_string()
    }

    fn record_cache(&mut self, kind: DigestKind, hits: usize, misses: usize) {
        match kind {
            DigestKind::Partial => {
                self.cache_prehash_hits += hits;
                self.cache_prehash_misses += misses;
            }
            DigestKind::Full => {
                self.cache_fullhash_hits += hits;
                self.cache_fullhash_misses += misses;
            }
        }
    }

    fn record_groups(&mut self, groups: &[DuplicateGroup]) {
        self.duplicate_groups = groups.len();
        self.duplicate_files = groups.iter().map(DuplicateGroup::duplicate_count).sum();
        self.reclaimable_space = groups.iter().map(DuplicateGroup::wasted_space).sum();
    }
}

/// Exact duplicate run result.
pub type FinderOutcome = RunOutcome<DuplicateGroup, ScanSummary>;

/// Tracks whether the cache failed for reads and for writes during a run.
#[derive(Debug, Default)]
struct CacheHealth {
    read_failed: bool,
    write_failed: bool,
}

/// How a hashing stage ended.
enum StageResult {
    /// Every file was resolved; failed files are gone from their sets
    Done(Vec<Vec<FileRecord>>),
    /// Cancellation hit; only sets whose members were all resolved remain
    Cancelled(Vec<Vec<FileRecord>>),
    /// The run cannot continue
    Failed(FinderError),
}

/// Resolution state of one file within a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileState {
    Pending,
    Resolved,
    Failed,
}

/// Duplicate finder that orchestrates the multi-stage detection pipeline.
///
/// # Example
///
/// ```no_run
/// use dupehound::duplicates::{DuplicateFinder, FinderConfig};
/// use std::path::PathBuf;
///
/// let finder = DuplicateFinder::new(FinderConfig::default().with_workers(4));
/// let outcome = finder.find_duplicates(&[PathBuf::from("/some/path")]).unwrap();
///
/// println!("Found {} duplicate groups", outcome.summary.duplicate_groups);
/// println!("Reclaimable space: {}", outcome.summary.reclaimable_display());
/// ```
#[derive(Debug)]
pub struct DuplicateFinder {
    config: FinderConfig,
}

impl DuplicateFinder {
    /// Create a new duplicate finder with the given configuration.
    #[must_use]
    pub fn new(config: FinderConfig) -> Self {
        Self { config }
    }

    /// Create a new duplicate finder with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(FinderConfig::default())
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &FinderConfig {
        &self.config
    }

    /// Find all exact duplicates under the given roots.
    ///
    /// Per-file problems become warnings on the outcome. Cancellation and
    /// fatal cache or executor failures end the run early with a
    /// `Cancelled` or `Failed` status rather than an `Err`.
    ///
    /// # Errors
    ///
    /// Returns [`FinderError`] before any stage runs if the root set is
    /// empty or a root is missing or not a directory.
    pub fn find_duplicates(&self, roots: &[PathBuf]) -> Result<FinderOutcome, FinderError> {
        let start_time = Instant::now();
        let mut job = ScanJob::new(
            roots,
            self.config.shutdown_flag.clone(),
            self.config.progress_callback.clone(),
        )?;
        let executor =
            Executor::new(self.config.executor.clone()).with_shutdown_flag(job.cancel_flag());
        let mut summary = ScanSummary::default();
        let mut health = CacheHealth::default();

        // Scanning
        job.begin(Stage::Scanning, 0);
        log::info!("Scanning {} root(s)", job.roots().len());
        let files = self.scan(&mut job);
        summary.total_files = files.len();
        summary.total_size = files.iter().map(|f| f.size).sum();
        if job.is_cancelled() {
            return Ok(self.finish_cancelled(job, Vec::new(), summary, start_time));
        }

        // Size grouping
        job.begin(Stage::SizeGrouping, files.len());
        let (size_groups, stats) = group_by_size(files);
        summary.eliminated_by_size = stats.eliminated_unique + stats.empty_files;
        let candidates: Vec<Vec<FileRecord>> = size_groups.into_values().collect();
        if job.is_cancelled() {
            return Ok(self.finish_cancelled(job, Vec::new(), summary, start_time));
        }

        // Partial hashing
        let partial_input: usize = candidates.iter().map(Vec::len).sum();
        let resolved = match self.hash_stage(
            &mut job,
            &executor,
            DigestKind::Partial,
            candidates,
            &mut summary,
            &mut health,
        ) {
            StageResult::Done(sets) => sets,
            StageResult::Cancelled(_) => {
                return Ok(self.finish_cancelled(job, Vec::new(), summary, start_time));
            }
            StageResult::Failed(e) => return Ok(finish_failed(job, &e, summary, start_time)),
        };
        let survivors = regroup_by_digest(resolved, DigestKind::Partial);
        let surviving: usize = survivors.iter().map(Vec::len).sum();
        summary.eliminated_by_prehash = partial_input.saturating_sub(surviving);
        log::info!(
            "Phase 2 complete: {} files → {} potential duplicates",
            partial_input,
            surviving
        );

        // Full hashing
        let groups = match self.hash_stage(
            &mut job,
            &executor,
            DigestKind::Full,
            survivors,
            &mut summary,
            &mut health,
        ) {
            StageResult::Done(sets) => into_duplicate_groups(regroup_by_digest(sets, DigestKind::Full)),
            StageResult::Cancelled(complete) => {
                let groups = if self.config.partial_results {
                    into_duplicate_groups(regroup_by_digest(complete, DigestKind::Full))
                } else {
                    Vec::new()
                };
                return Ok(self.finish_cancelled(job, groups, summary, start_time));
            }
            StageResult::Failed(e) => return Ok(finish_failed(job, &e, summary, start_time)),
        };

        summary.record_groups(&groups);
        summary.scan_duration = start_time.elapsed();
        log::info!(
            "Phase 3 complete: {} duplicate groups, {} reclaimable",
            summary.duplicate_groups,
            summary.reclaimable_display()
        );

        let mut outcome = job.finish(RunStatus::Completed, groups, summary);
        outcome.summary.skipped_files = outcome.skipped_files();
        outcome.summary.skipped_directories = outcome.skipped_directories();
        Ok(outcome)
    }

    fn scan(&self, job: &mut ScanJob) -> Vec<FileRecord> {
        let scanner = Scanner::new(job.roots().to_vec(), self.config.walker_config.clone())
            .with_shutdown_flag(job.cancel_flag());

        let mut files = Vec::new();
        for entry in scanner.scan() {
            match entry {
                Ok(file) => {
                    job.record_scanned(&file.path);
                    files.push(file);
                }
                Err(e) => job.warn(ScanWarning::from(&e)),
            }
            if job.is_cancelled() {
                log::info!("Scan interrupted by shutdown signal");
                break;
            }
        }

        log::info!("Scan complete: {} files found", files.len());
        files
    }

    /// Resolve one digest kind for every member of every candidate set.
    fn hash_stage(
        &self,
        job: &mut ScanJob,
        executor: &Executor,
        kind: DigestKind,
        sets: Vec<Vec<FileRecord>>,
        summary: &mut ScanSummary,
        health: &mut CacheHealth,
    ) -> StageResult {
        let stage = match kind {
            DigestKind::Partial => Stage::PartialHashing,
            DigestKind::Full => Stage::FullHashing,
        };

        let mut set_of = Vec::new();
        let mut files = Vec::new();
        for (set_index, set) in sets.into_iter().enumerate() {
            for file in set {
                set_of.push(set_index);
                files.push(file);
            }
        }
        let set_count = set_of.last().map_or(0, |last| last + 1);
        let mut state = vec![FileState::Pending; files.len()];

        job.begin(stage, files.len());
        log::info!("Computing {} digests for {} files", kind, files.len());

        // Cache lookup
        let mut hits = 0;
        if let Some(cache) = &self.config.cache {
            let keys: Vec<CacheKey> = files.iter().map(CacheKey::from).collect();
            match cache.lookup_batch(kind, &keys) {
                Ok(found) => {
                    for (i, key) in keys.iter().enumerate() {
                        if let Some(digest) = found.get(key) {
                            log::trace!("{} cache hit: {}", kind, files[i].path.display());
                            files[i].set_digest(kind, *digest);
                            state[i] = FileState::Resolved;
                            hits += 1;
                            job.record_completed(&files[i].path);
                        }
                    }
                }
                Err(e) => {
                    if let Some(failure) = cache_failure(job, health, true, e) {
                        return StageResult::Failed(failure);
                    }
                }
            }
        }

        // Misses go to the executor
        let jobs: Vec<Job> = state
            .iter()
            .enumerate()
            .filter(|(_, s)| **s == FileState::Pending)
            .map(|(i, _)| Job::new(i, files[i].path.clone(), Task::Digest(kind)))
            .collect();
        let misses = jobs.len();
        summary.record_cache(kind, hits, misses);
        for (i, file) in files.iter().enumerate() {
            if state[i] == FileState::Pending {
                log::trace!("{} cache miss: {}", kind, file.path.display());
            }
        }

        let report = {
            let mut on_complete = |outcome: &JobOutcome| {
                job.record_completed(&outcome.path);
                if let Err(e) = &outcome.result {
                    if !e.is_cancelled() {
                        job.warn(ScanWarning::from(e));
                    }
                }
            };
            match executor.run(jobs, &mut on_complete) {
                Ok(report) => report,
                Err(e) => return StageResult::Failed(FinderError::Executor(e)),
            }
        };

        let mut new_entries = Vec::new();
        for outcome in report.outcomes {
            let i = outcome.id;
            match outcome.result {
                Ok(Output::Digest(digest)) => {
                    files[i].set_digest(kind, digest);
                    state[i] = FileState::Resolved;
                    new_entries.push(CacheEntry::from_record(&files[i], kind, digest));
                }
                Ok(Output::Fingerprint(_)) => {
                    log::warn!("Unexpected fingerprint for {}", files[i].path.display());
                    state[i] = FileState::Failed;
                }
                Err(e) if e.is_cancelled() => {}
                Err(_) => state[i] = FileState::Failed,
            }
        }

        // Store what was computed, even when cancelled
        if let Some(cache) = &self.config.cache {
            match cache.store_batch(&new_entries) {
                Ok(stored) => log::debug!("Stored {} {} digests in cache", stored, kind),
                Err(e) => {
                    if let Some(failure) = cache_failure(job, health, false, e) {
                        return StageResult::Failed(failure);
                    }
                }
            }
        }

        let cancelled = report.cancelled || job.is_cancelled();
        let mut complete = vec![true; set_count];
        for (i, s) in state.iter().enumerate() {
            if *s == FileState::Pending {
                complete[set_of[i]] = false;
            }
        }

        let mut resolved_sets: Vec<Vec<FileRecord>> = vec![Vec::new(); set_count];
        for ((file, s), set_index) in files.into_iter().zip(state).zip(set_of) {
            if s == FileState::Resolved && (!cancelled || complete[set_index]) {
                resolved_sets[set_index].push(file);
            }
        }
        resolved_sets.retain(|set| !set.is_empty());

        if cancelled {
            log::info!("{} hashing interrupted by shutdown signal", kind);
            StageResult::Cancelled(resolved_sets)
        } else {
            StageResult::Done(resolved_sets)
        }
    }

    fn finish_cancelled(
        &self,
        job: ScanJob,
        groups: Vec<DuplicateGroup>,
        mut summary: ScanSummary,
        start_time: Instant,
    ) -> FinderOutcome {
        summary.record_groups(&groups);
        summary.scan_duration = start_time.elapsed();
        log::info!(
            "Scan cancelled after {:.2?}: {} finalized groups reported",
            summary.scan_duration,
            groups.len()
        );
        let mut outcome = job.finish(RunStatus::Cancelled, groups, summary);
        outcome.summary.skipped_files = outcome.skipped_files();
        outcome.summary.skipped_directories = outcome.skipped_directories();
        outcome
    }
}

fn finish_failed(
    job: ScanJob,
    error: &FinderError,
    mut summary: ScanSummary,
    start_time: Instant,
) -> FinderOutcome {
    summary.scan_duration = start_time.elapsed();
    log::error!("Scan failed: {}", error);
    let mut outcome = job.finish(
        RunStatus::Failed {
            error: error.to_string(),
        },
        Vec::new(),
        summary,
    );
    outcome.summary.skipped_files = outcome.skipped_files();
    outcome.summary.skipped_directories = outcome.skipped_directories();
    outcome
}

/// Record a cache failure. Returns the fatal error once reads and writes
/// have both failed during the run.
fn cache_failure(
    job: &mut ScanJob,
    health: &mut CacheHealth,
    during_read: bool,
    error: CacheError,
) -> Option<FinderError> {
    if during_read {
        health.read_failed = true;
    } else {
        health.write_failed = true;
    }

    if health.read_failed && health.write_failed {
        return Some(FinderError::Cache(error));
    }

    let mut warning = ScanWarning::from(&error);
    if during_read {
        warning.message = format!("cache lookup failed, treating as misses: {}", warning.message);
    } else {
        warning.message = format!("cache write failed, digests not saved: {}", warning.message);
    }
    job.warn(warning);
    None
}
