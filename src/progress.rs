//! Pipeline stages and progress reporting.
//!
//! Pipelines report through the [`ProgressCallback`] trait. The [`Progress`]
//! struct implements it with indicatif bars for terminal use; library callers
//! can implement it to drive their own UI.

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};

use crate::error::ScanWarning;

/// Stage of a detection run.
///
/// The exact pipeline moves `Idle → Scanning → SizeGrouping →
/// PartialHashing → FullHashing → Completed`; the similarity pipeline moves
/// `Idle → Scanning → Fingerprinting → Clustering → Completed`. Any
/// non-terminal stage may end in `Cancelled` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Not started
    Idle,
    /// Walking the roots
    Scanning,
    /// Partitioning by exact size
    SizeGrouping,
    /// Hashing leading bytes of size-group candidates
    PartialHashing,
    /// Hashing full content of partial-hash candidates
    FullHashing,
    /// Computing perceptual fingerprints
    Fingerprinting,
    /// Grouping fingerprints by distance
    Clustering,
    /// Finished normally
    Completed,
    /// Stopped by cancellation
    Cancelled,
    /// Stopped by a fatal error
    Failed,
}

impl Stage {
    /// Whether the run is over.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    #[must_use]
    pub fn can_advance_to(self, next: Self) -> bool {
        use Stage::*;

        if self.is_terminal() {
            return false;
        }
        if matches!(next, Cancelled | Failed) {
            return true;
        }
        matches!(
            (self, next),
            (Idle, Scanning)
                | (Scanning, SizeGrouping)
                | (SizeGrouping, PartialHashing)
                | (PartialHashing, FullHashing)
                | (FullHashing, Completed)
                | (Scanning, Fingerprinting)
                | (Fingerprinting, Clustering)
                | (Clustering, Completed)
        )
    }

    /// Share of the overall run covered by this stage, as `(start, end)`.
    #[must_use]
    pub fn fraction_span(self) -> (f64, f64) {
        match self {
            Self::Idle => (0.0, 0.0),
            Self::Scanning => (0.0, 0.10),
            Self::SizeGrouping => (0.10, 0.15),
            Self::PartialHashing => (0.15, 0.45),
            Self::FullHashing => (0.45, 1.0),
            Self::Fingerprinting => (0.10, 0.95),
            Self::Clustering => (0.95, 1.0),
            Self::Completed | Self::Cancelled | Self::Failed => (1.0, 1.0),
        }
    }

    /// Estimated overall completion after `completed` of `total` items.
    #[must_use]
    pub fn fraction(self, completed: usize, total: usize) -> f64 {
        let (start, end) = self.fraction_span();
        if total == 0 {
            return start;
        }
        let within = (completed.min(total) as f64) / (total as f64);
        start + (end - start) * within
    }

    /// Human-readable name.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Scanning => "Scanning",
            Self::SizeGrouping => "Grouping by size",
            Self::PartialHashing => "Partial hashing",
            Self::FullHashing => "Full hashing",
            Self::Fingerprinting => "Fingerprinting",
            Self::Clustering => "Clustering",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
            Self::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One progress report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressUpdate {
    /// Current stage
    pub stage: Stage,
    /// Files found by the scanner so far
    pub files_scanned: usize,
    /// Items finished in the current stage
    pub completed: usize,
    /// Items in the current stage, zero when unknown
    pub total: usize,
    /// Estimated overall completion in `[0, 1]`
    pub fraction: f64,
    /// Path of the item just finished, if any
    pub path: Option<PathBuf>,
}

/// Progress callback for detection pipelines.
///
/// Implement this trait to receive progress updates during a run. Methods
/// are called from the driver thread only.
pub trait ProgressCallback: Send + Sync {
    /// Called when a stage starts.
    ///
    /// # Arguments
    ///
    /// * `stage` - The stage being entered
    /// * `total` - Items the stage will process, zero when unknown
    fn on_phase_start(&self, stage: Stage, total: usize);

    /// Called as items complete.
    fn on_progress(&self, update: &ProgressUpdate);

    /// Called when a stage completes.
    fn on_phase_end(&self, stage: Stage);

    /// Called for every recovered error.
    fn on_warning(&self, _warning: &ScanWarning) {}

    /// Called to update the progress message.
    fn on_message(&self, _message: &str) {}
}

/// Progress reporter using indicatif.
///
/// Stages run one after another, so a single bar is active at a time.
pub struct Progress {
    multi: MultiProgress,
    active: Mutex<Option<(Stage, ProgressBar)>>,
    quiet: bool,
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress").field("quiet", &self.quiet).finish()
    }
}

impl Progress {
    /// Create a new progress reporter.
    ///
    /// # Arguments
    ///
    /// * `quiet` - If true, no progress bars will be displayed.
    ///
    /// # Examples
    ///
    /// ```
    /// use dupehound::progress::Progress;
    ///
    /// let progress = Progress::new(false);
    /// ```
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        Self {
            multi: MultiProgress::new(),
            active: Mutex::new(None),
            quiet,
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed_precise}] {pos} files")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg} (ETA: {eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█>-")
    }
}

impl ProgressCallback for Progress {
    fn on_phase_start(&self, stage: Stage, total: usize) {
        if self.quiet {
            return;
        }

        let bar = if total == 0 {
            let pb = self.multi.add(ProgressBar::new_spinner());
            pb.set_style(Self::spinner_style());
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        } else {
            let pb = self.multi.add(ProgressBar::new(total as u64));
            pb.set_style(Self::bar_style());
            pb
        };
        bar.set_message(stage.label());

        if let Ok(mut active) = self.active.lock() {
            if let Some((_, previous)) = active.replace((stage, bar)) {
                previous.finish_and_clear();
            }
        }
    }

    fn on_progress(&self, update: &ProgressUpdate) {
        if self.quiet {
            return;
        }

        if let Ok(active) = self.active.lock() {
            if let Some((stage, pb)) = active.as_ref() {
                if *stage == Stage::Scanning {
                    pb.set_position(update.files_scanned as u64);
                } else {
                    pb.set_position(update.completed as u64);
                }
                if let Some(path) = &update.path {
                    pb.set_message(format!(
                        "{}: {}",
                        stage.label(),
                        truncate_path(&path.to_string_lossy(), 30)
                    ));
                }
            }
        }
    }

    fn on_phase_end(&self, stage: Stage) {
        if self.quiet {
            return;
        }

        if let Ok(mut active) = self.active.lock() {
            if active.as_ref().is_some_and(|(current, _)| *current == stage) {
                if let Some((_, pb)) = active.take() {
                    pb.finish_with_message(format!("{} complete", stage.label()));
                }
            }
        }
    }

    fn on_message(&self, message: &str) {
        if self.quiet {
            return;
        }

        if let Ok(active) = self.active.lock() {
            if let Some((_, pb)) = active.as_ref() {
                pb.set_message(message.to_string());
            }
        }
    }
}

/// Truncate a path for display in the progress bar.
fn truncate_path(path: &str, max_len: usize) -> String {
    if path.chars().count() <= max_len {
        return path.to_string();
    }

    let file_name = std::path::Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let name_len = file_name.chars().count();
    if name_len + 4 > max_len {
        let tail: String = file_name.chars().skip(name_len + 3 - max_len).collect();
        return format!("...{tail}");
    }

    format!(".../{file_name}")
}
