//! Per-run state shared by the detection pipelines.
//!
//! A [`ScanJob`] is created for every invocation. It owns the validated root
//! set, the cancellation flag, the stage machine, the progress counters and
//! the warnings collected so far, and is consumed into a [`RunOutcome`]
//! when the run ends.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::CacheError;
use crate::error::{ErrorKind, ScanWarning};
use crate::executor::ExecutorError;
use crate::progress::{ProgressCallback, ProgressUpdate, Stage};
use crate::scanner::collapse_roots;

/// Errors that stop a run.
#[derive(thiserror::Error, Debug)]
pub enum FinderError {
    /// No root paths were given.
    #[error("No root paths given")]
    NoRoots,

    /// A root path does not exist.
    #[error("Root path not found: {0}")]
    RootNotFound(PathBuf),

    /// A root path is not a directory.
    #[error("Root path is not a directory: {0}")]
    NotADirectory(PathBuf),

    /// The similarity percentage is outside 0–100.
    #[error("Similarity threshold must be between 0 and 100, got {0}")]
    InvalidThreshold(f64),

    /// The cache failed for both reads and writes during the run.
    #[error("Hash cache unusable: {0}")]
    Cache(#[from] CacheError),

    /// Workers could not be started or talked to.
    #[error("Executor failure: {0}")]
    Executor(#[from] ExecutorError),
}

impl FinderError {
    /// Category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Cache(_) => ErrorKind::CacheUnavailable,
            _ => ErrorKind::FatalConfiguration,
        }
    }
}

/// Terminal status of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    /// All stages finished.
    Completed,
    /// Cancellation was requested before the run finished.
    Cancelled,
    /// A fatal error stopped the run.
    Failed {
        /// Description of the error
        error: String,
    },
}

impl RunStatus {
    /// Stage matching this status.
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            Self::Completed => Stage::Completed,
            Self::Cancelled => Stage::Cancelled,
            Self::Failed { .. } => Stage::Failed,
        }
    }
}

/// Result of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome<G, S> {
    /// Terminal status
    pub status: RunStatus,
    /// Groups found, in the pipeline's documented order
    pub groups: Vec<G>,
    /// Pipeline statistics
    pub summary: S,
    /// Recovered errors, in the order they happened
    pub warnings: Vec<ScanWarning>,
}

impl<G, S> RunOutcome<G, S> {
    /// Whether every stage finished.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// Whether the run was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.status == RunStatus::Cancelled
    }

    /// Files left out because of recoverable errors.
    #[must_use]
    pub fn skipped_files(&self) -> usize {
        self.warnings.iter().filter(|w| w.kind.skips_file()).count()
    }

    /// Directories that could not be listed.
    #[must_use]
    pub fn skipped_directories(&self) -> usize {
        self.warnings.iter().filter(|w| w.kind.skips_directory()).count()
    }

    /// Files and directories left out, the count that decides the exit code.
    #[must_use]
    pub fn skipped_entries(&self) -> usize {
        self.skipped_files() + self.skipped_directories()
    }

    /// "N files skipped due to errors", with unlisted directories counted
    /// separately, or `None` when nothing was skipped.
    #[must_use]
    pub fn skipped_note(&self) -> Option<String> {
        let files = match self.skipped_files() {
            0 => None,
            1 => Some("1 file".to_string()),
            n => Some(format!("{n} files")),
        };
        let directories = match self.skipped_directories() {
            0 => None,
            1 => Some("1 directory".to_string()),
            n => Some(format!("{n} directories")),
        };
        let skipped = match (files, directories) {
            (None, None) => return None,
            (Some(files), None) => files,
            (None, Some(directories)) => directories,
            (Some(files), Some(directories)) => format!("{files} and {directories}"),
        };
        Some(format!("{skipped} skipped due to errors"))
    }
}

/// Check that every root exists and is a directory, then collapse overlaps.
///
/// # Errors
///
/// Returns [`FinderError::NoRoots`], [`FinderError::RootNotFound`] or
/// [`FinderError::NotADirectory`].
pub fn validate_roots(roots: &[PathBuf]) -> Result<Vec<PathBuf>, FinderError> {
    if roots.is_empty() {
        return Err(FinderError::NoRoots);
    }
    for root in roots {
        if !root.exists() {
            return Err(FinderError::RootNotFound(root.clone()));
        }
        if !root.is_dir() {
            return Err(FinderError::NotADirectory(root.clone()));
        }
    }
    Ok(collapse_roots(roots))
}

/// Transient state of one run.
pub struct ScanJob {
    roots: Vec<PathBuf>,
    cancel: Arc<AtomicBool>,
    progress: Option<Arc<dyn ProgressCallback>>,
    stage: Stage,
    files_scanned: usize,
    completed: usize,
    total: usize,
    warnings: Vec<ScanWarning>,
}

impl std::fmt::Debug for ScanJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanJob")
            .field("roots", &self.roots)
            .field("stage", &self.stage)
            .field("files_scanned", &self.files_scanned)
            .field("completed", &self.completed)
            .field("total", &self.total)
            .field("warnings", &self.warnings.len())
            .finish()
    }
}

impl ScanJob {
    /// Validate the roots and create the job in the `Idle` stage.
    ///
    /// Without a shutdown flag the job gets a private one that is never set.
    ///
    /// # Errors
    ///
    /// Returns a [`FinderError`] if the root set is invalid.
    pub fn new(
        roots: &[PathBuf],
        cancel: Option<Arc<AtomicBool>>,
        progress: Option<Arc<dyn ProgressCallback>>,
    ) -> Result<Self, FinderError> {
        let roots = validate_roots(roots)?;
        Ok(Self {
            roots,
            cancel: cancel.unwrap_or_default(),
            progress,
            stage: Stage::Idle,
            files_scanned: 0,
            completed: 0,
            total: 0,
            warnings: Vec::new(),
        })
    }

    /// Roots after validation and collapsing.
    #[must_use]
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// The shared cancellation flag.
    #[must_use]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Current stage.
    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Files found by the scanner so far.
    #[must_use]
    pub fn files_scanned(&self) -> usize {
        self.files_scanned
    }

    /// Enter a new stage with `total` items to process.
    pub fn begin(&mut self, next: Stage, total: usize) {
        debug_assert!(
            self.stage.can_advance_to(next),
            "illegal stage transition {:?} -> {:?}",
            self.stage,
            next
        );
        self.end_current();
        log::debug!("Stage {} -> {}", self.stage, next);

        self.stage = next;
        self.completed = 0;
        self.total = total;
        if let Some(progress) = &self.progress {
            progress.on_phase_start(next, total);
        }
    }

    fn end_current(&self) {
        if matches!(self.stage, Stage::Idle) || self.stage.is_terminal() {
            return;
        }
        if let Some(progress) = &self.progress {
            progress.on_phase_end(self.stage);
        }
    }

    /// Count one scanned file.
    pub fn record_scanned(&mut self, path: &Path) {
        self.files_scanned += 1;
        self.report(Some(path));
    }

    /// Count one finished item in the current stage.
    pub fn record_completed(&mut self, path: &Path) {
        self.completed += 1;
        self.report(Some(path));
    }

    /// Count one finished item that has no path of its own.
    pub fn record_step(&mut self) {
        self.completed += 1;
        self.report(None);
    }

    /// Record a recovered error. This is the one place it is logged.
    pub fn warn(&mut self, warning: ScanWarning) {
        log::warn!("{}", warning);
        if let Some(progress) = &self.progress {
            progress.on_warning(&warning);
        }
        self.warnings.push(warning);
    }

    /// Snapshot of the counters.
    #[must_use]
    pub fn update(&self, path: Option<&Path>) -> ProgressUpdate {
        ProgressUpdate {
            stage: self.stage,
            files_scanned: self.files_scanned,
            completed: self.completed,
            total: self.total,
            fraction: self.stage.fraction(self.completed, self.total),
            path: path.map(Path::to_path_buf),
        }
    }

    fn report(&self, path: Option<&Path>) {
        if let Some(progress) = &self.progress {
            progress.on_progress(&self.update(path));
        }
    }

    /// End the run and package the results.
    pub fn finish<G, S>(mut self, status: RunStatus, groups: Vec<G>, summary: S) -> RunOutcome<G, S> {
        self.end_current();
        let terminal = status.stage();
        log::debug!("Stage {} -> {}", self.stage, terminal);
        self.stage = terminal;
        if let Some(progress) = &self.progress {
            progress.on_progress(&self.update(None));
        }

        RunOutcome {
            status,
            groups,
            summary,
            warnings: self.warnings,
        }
    }
}
