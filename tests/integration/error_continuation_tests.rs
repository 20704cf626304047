use dupehound::duplicates::{DuplicateFinder, FinderConfig, FinderError};
use dupehound::error::{ErrorKind, ExitCode};
use dupehound::executor::{ExecutionMode, Executor, ExecutorConfig, Job, Task};
use dupehound::job::RunStatus;
use dupehound::progress::{ProgressCallback, ProgressUpdate, Stage};
use dupehound::scanner::DigestKind;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::tempdir;

#[test]
fn test_missing_files_do_not_stop_a_batch() {
    let dir = tempdir().unwrap();
    let present = dir.path().join("present.txt");
    fs::write(&present, b"here").unwrap();

    let jobs = vec![
        Job::new(0, dir.path().join("gone_1.txt"), Task::Digest(DigestKind::Full)),
        Job::new(1, &present, Task::Digest(DigestKind::Full)),
        Job::new(2, dir.path().join("gone_2.txt"), Task::Digest(DigestKind::Full)),
    ];

    let executor = Executor::new(ExecutorConfig::default().with_mode(ExecutionMode::Threads));
    let report = executor.run(jobs, &mut |_| {}).unwrap();

    assert!(!report.cancelled);
    assert_eq!(report.outcomes.len(), 3);
    let ok: Vec<_> = report
        .outcomes
        .iter()
        .filter(|o| o.result.is_ok())
        .map(|o| o.id)
        .collect();
    assert_eq!(ok, vec![1]);
}

/// Deletes one candidate after the scan has listed it.
struct VanishAtPartialHash {
    victim: PathBuf,
}

impl ProgressCallback for VanishAtPartialHash {
    fn on_phase_start(&self, stage: Stage, _total: usize) {
        if stage == Stage::PartialHashing {
            fs::remove_file(&self.victim).unwrap();
        }
    }
    fn on_progress(&self, _update: &ProgressUpdate) {}
    fn on_phase_end(&self, _stage: Stage) {}
}

#[test]
fn test_unreadable_member_leaves_rest_of_group() {
    let dir = tempdir().unwrap();
    for name in ["a.txt", "b.txt", "c.txt"] {
        fs::write(dir.path().join(name), b"triplicate").unwrap();
    }
    let victim = dir.path().join("c.txt");

    for mode in [ExecutionMode::Threads, ExecutionMode::Disabled] {
        fs::write(&victim, b"triplicate").unwrap();
        let config = FinderConfig::default()
            .with_execution_mode(mode)
            .with_progress_callback(Arc::new(VanishAtPartialHash {
                victim: victim.clone(),
            }));
        let outcome = DuplicateFinder::new(config)
            .find_duplicates(&[dir.path().to_path_buf()])
            .unwrap();

        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(outcome.groups.len(), 1);
        assert_eq!(outcome.groups[0].len(), 2);
        assert!(!outcome.groups[0].paths().contains(&victim));
        assert_eq!(outcome.skipped_files(), 1);
        assert_eq!(outcome.warnings[0].kind, ErrorKind::Read);
        assert_eq!(
            outcome.skipped_note().as_deref(),
            Some("1 file skipped due to errors")
        );
        assert_eq!(
            ExitCode::for_run(&outcome.status, outcome.groups.len(), outcome.skipped_entries()),
            ExitCode::PartialSuccess
        );
    }
}

#[cfg(unix)]
#[test]
fn test_unreadable_directory_is_a_traversal_warning() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    let closed = dir.path().join("closed");
    fs::create_dir(&closed).unwrap();
    fs::write(closed.join("inner.txt"), b"x").unwrap();
    fs::write(dir.path().join("a.txt"), b"pair").unwrap();
    fs::write(dir.path().join("b.txt"), b"pair").unwrap();
    fs::set_permissions(&closed, fs::Permissions::from_mode(0o000)).unwrap();

    if fs::read_dir(&closed).is_ok() {
        fs::set_permissions(&closed, fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let outcome = DuplicateFinder::with_defaults()
        .find_duplicates(&[dir.path().to_path_buf()])
        .unwrap();
    fs::set_permissions(&closed, fs::Permissions::from_mode(0o755)).unwrap();

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.groups.len(), 1);
    assert!(outcome
        .warnings
        .iter()
        .any(|w| w.kind == ErrorKind::Traversal));
    assert_eq!(outcome.skipped_files(), 0);
    assert_eq!(outcome.skipped_directories(), 1);
    assert_eq!(
        outcome.skipped_note().as_deref(),
        Some("1 directory skipped due to errors")
    );
}

#[test]
fn test_root_that_is_a_file_is_rejected() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("plain.txt");
    fs::write(&file, b"x").unwrap();

    let result = DuplicateFinder::with_defaults().find_duplicates(&[file.clone()]);
    assert!(matches!(result, Err(FinderError::NotADirectory(p)) if p == file));
}

#[test]
fn test_empty_root_set_is_rejected() {
    let result = DuplicateFinder::with_defaults().find_duplicates(&[]);
    assert!(matches!(result, Err(FinderError::NoRoots)));
    assert_eq!(
        FinderError::NoRoots.kind(),
        ErrorKind::FatalConfiguration
    );
}

#[test]
fn test_missing_worker_program_fails_the_run() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), b"same").unwrap();
    fs::write(dir.path().join("b.txt"), b"same").unwrap();

    let executor = ExecutorConfig::default()
        .with_mode(ExecutionMode::Processes)
        .with_worker_program(PathBuf::from("/nonexistent/dupehound-worker"));
    let outcome = DuplicateFinder::new(FinderConfig::default().with_executor_config(executor))
        .find_duplicates(&[dir.path().to_path_buf()])
        .unwrap();

    assert!(matches!(outcome.status, RunStatus::Failed { .. }));
    assert!(outcome.groups.is_empty());
}
