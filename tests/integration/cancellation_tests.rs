use dupehound::duplicates::{DuplicateFinder, FinderConfig};
use dupehound::error::ExitCode;
use dupehound::executor::ExecutionMode;
use dupehound::job::RunStatus;
use dupehound::progress::{ProgressCallback, ProgressUpdate, Stage};
use dupehound::signal::ShutdownHandler;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

/// Raises the flag once `after` items of `stage` have completed.
struct CancelAt {
    stage: Stage,
    after: usize,
    flag: Arc<AtomicBool>,
    stages: Mutex<Vec<Stage>>,
}

impl CancelAt {
    fn new(stage: Stage, after: usize, flag: Arc<AtomicBool>) -> Self {
        Self {
            stage,
            after,
            flag,
            stages: Mutex::new(Vec::new()),
        }
    }
}

impl ProgressCallback for CancelAt {
    fn on_phase_start(&self, stage: Stage, _total: usize) {
        self.stages.lock().unwrap().push(stage);
        if stage == self.stage && self.after == 0 {
            self.flag.store(true, Ordering::SeqCst);
        }
    }

    fn on_progress(&self, update: &ProgressUpdate) {
        if update.stage == self.stage && update.completed >= self.after {
            self.flag.store(true, Ordering::SeqCst);
        }
    }

    fn on_phase_end(&self, _stage: Stage) {}
}

fn three_pairs(dir: &Path) {
    for (i, content) in ["aa", "bbbb", "cccccc"].iter().enumerate() {
        fs::write(dir.join(format!("first_{i}.txt")), content).unwrap();
        fs::write(dir.join(format!("second_{i}.txt")), content).unwrap();
    }
}

fn sequential_finder(flag: &Arc<AtomicBool>, callback: Arc<CancelAt>, partial: bool) -> DuplicateFinder {
    DuplicateFinder::new(
        FinderConfig::default()
            .with_execution_mode(ExecutionMode::Disabled)
            .with_shutdown_flag(Arc::clone(flag))
            .with_progress_callback(callback)
            .with_partial_results(partial),
    )
}

#[test]
fn test_flag_set_before_start() {
    let dir = tempdir().unwrap();
    three_pairs(dir.path());

    let handler = ShutdownHandler::new();
    handler.request_shutdown();
    let outcome = DuplicateFinder::new(FinderConfig::default().with_shutdown_flag(handler.get_flag()))
        .find_duplicates(&[dir.path().to_path_buf()])
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Cancelled);
    assert!(outcome.groups.is_empty());
    assert_eq!(
        ExitCode::for_run(&outcome.status, outcome.groups.len(), outcome.skipped_entries()),
        ExitCode::Interrupted
    );
}

#[test]
fn test_cancel_during_partial_hashing_skips_full_hashing() {
    let dir = tempdir().unwrap();
    three_pairs(dir.path());

    let flag = Arc::new(AtomicBool::new(false));
    let callback = Arc::new(CancelAt::new(Stage::PartialHashing, 1, Arc::clone(&flag)));
    let outcome = sequential_finder(&flag, Arc::clone(&callback), true)
        .find_duplicates(&[dir.path().to_path_buf()])
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Cancelled);
    assert!(outcome.groups.is_empty());
    let stages = callback.stages.lock().unwrap();
    assert!(stages.contains(&Stage::PartialHashing));
    assert!(!stages.contains(&Stage::FullHashing));
}

#[test]
fn test_cancel_during_full_hashing_keeps_finished_sets_on_request() {
    let dir = tempdir().unwrap();
    three_pairs(dir.path());

    // Sequential jobs run set by set, smallest size first
    let flag = Arc::new(AtomicBool::new(false));
    let callback = Arc::new(CancelAt::new(Stage::FullHashing, 2, Arc::clone(&flag)));
    let outcome = sequential_finder(&flag, callback, true)
        .find_duplicates(&[dir.path().to_path_buf()])
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Cancelled);
    assert_eq!(outcome.groups.len(), 1);
    assert_eq!(outcome.groups[0].size, 2);
    assert_eq!(outcome.groups[0].len(), 2);
}

#[test]
fn test_cancel_during_full_hashing_reports_nothing_by_default() {
    let dir = tempdir().unwrap();
    three_pairs(dir.path());

    let flag = Arc::new(AtomicBool::new(false));
    let callback = Arc::new(CancelAt::new(Stage::FullHashing, 2, Arc::clone(&flag)));
    let outcome = sequential_finder(&flag, callback, false)
        .find_duplicates(&[dir.path().to_path_buf()])
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Cancelled);
    assert!(outcome.groups.is_empty());
}

#[test]
fn test_cancelled_run_produces_no_warnings_for_unstarted_jobs() {
    let dir = tempdir().unwrap();
    three_pairs(dir.path());

    let flag = Arc::new(AtomicBool::new(false));
    let callback = Arc::new(CancelAt::new(Stage::PartialHashing, 0, Arc::clone(&flag)));
    let outcome = DuplicateFinder::new(
        FinderConfig::default()
            .with_execution_mode(ExecutionMode::Threads)
            .with_shutdown_flag(Arc::clone(&flag))
            .with_progress_callback(callback),
    )
    .find_duplicates(&[dir.path().to_path_buf()])
    .unwrap();

    assert_eq!(outcome.status, RunStatus::Cancelled);
    assert!(outcome.warnings.is_empty());
    assert_eq!(outcome.skipped_files(), 0);
}

#[test]
fn test_handler_reset_allows_a_second_run() {
    let dir = tempdir().unwrap();
    three_pairs(dir.path());
    let roots = vec![dir.path().to_path_buf()];

    let handler = ShutdownHandler::new();
    let finder = DuplicateFinder::new(FinderConfig::default().with_shutdown_flag(handler.get_flag()));

    handler.request_shutdown();
    assert!(finder.find_duplicates(&roots).unwrap().is_cancelled());

    handler.reset();
    let outcome = finder.find_duplicates(&roots).unwrap();
    assert!(outcome.is_completed());
    assert_eq!(outcome.groups.len(), 3);
}
