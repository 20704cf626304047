use dupehound::duplicates::{DuplicateFinder, DuplicateGroup, FinderConfig};
use dupehound::executor::{ExecutionMode, Executor, ExecutorConfig, Job, Output, Task};
use dupehound::job::RunStatus;
use dupehound::scanner::{DigestKind, Hasher};
use dupehound::similarity::{SimilarityConfig, SimilarityDetector};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn worker_config(workers: usize) -> ExecutorConfig {
    ExecutorConfig::default()
        .with_mode(ExecutionMode::Processes)
        .with_workers(workers)
        .with_worker_program(env!("CARGO_BIN_EXE_dupehound"))
}

fn group_paths(groups: &[DuplicateGroup]) -> Vec<Vec<PathBuf>> {
    groups.iter().map(DuplicateGroup::paths).collect()
}

fn populate(dir: &Path) {
    for i in 0..12 {
        fs::write(dir.join(format!("copy_a_{i}.txt")), format!("set {}", i % 4)).unwrap();
    }
    let big = vec![3u8; 200 * 1024];
    fs::write(dir.join("big_1.bin"), &big).unwrap();
    fs::write(dir.join("big_2.bin"), &big).unwrap();
    fs::write(dir.join("lonely.bin"), b"nothing like it").unwrap();
}

#[test]
fn test_worker_digests_match_in_process() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("data.bin");
    fs::write(&file, vec![9u8; 100 * 1024]).unwrap();

    let jobs = vec![
        Job::new(0, &file, Task::Digest(DigestKind::Partial)),
        Job::new(1, &file, Task::Digest(DigestKind::Full)),
    ];
    let report = Executor::new(worker_config(1)).run(jobs, &mut |_| {}).unwrap();
    assert_eq!(report.outcomes.len(), 2);

    let hasher = Hasher::new();
    for outcome in report.outcomes {
        let expected = match outcome.id {
            0 => hasher.prehash(&file).unwrap(),
            _ => hasher.full_hash(&file).unwrap(),
        };
        match outcome.result {
            Ok(Output::Digest(digest)) => assert_eq!(digest, expected),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}

#[test]
fn test_processes_and_threads_agree() {
    let dir = tempdir().unwrap();
    populate(dir.path());
    let roots = vec![dir.path().to_path_buf()];

    let threads = DuplicateFinder::new(FinderConfig::default().with_execution_mode(ExecutionMode::Threads))
        .find_duplicates(&roots)
        .unwrap();
    let processes = DuplicateFinder::new(FinderConfig::default().with_executor_config(worker_config(3)))
        .find_duplicates(&roots)
        .unwrap();

    assert_eq!(processes.status, RunStatus::Completed);
    assert_eq!(processes.groups.len(), 5);
    assert_eq!(group_paths(&threads.groups), group_paths(&processes.groups));
    assert_eq!(
        threads.summary.reclaimable_space,
        processes.summary.reclaimable_space
    );
}

#[test]
fn test_worker_errors_become_warnings() {
    let dir = tempdir().unwrap();
    let present = dir.path().join("present.txt");
    fs::write(&present, b"here").unwrap();

    let jobs = vec![
        Job::new(0, dir.path().join("missing.txt"), Task::Digest(DigestKind::Full)),
        Job::new(1, &present, Task::Digest(DigestKind::Full)),
    ];
    let report = Executor::new(worker_config(1)).run(jobs, &mut |_| {}).unwrap();

    let failed: Vec<_> = report.outcomes.iter().filter(|o| o.result.is_err()).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id, 0);
    assert!(failed[0].path.ends_with("missing.txt"));
}

#[test]
fn test_fingerprints_in_worker_processes() {
    let dir = tempdir().unwrap();
    for (name, side) in [("a.png", 32), ("b.png", 64)] {
        let image = image::GrayImage::from_fn(side, side, |x, y| {
            image::Luma([if (x * 4 / side + y * 4 / side) % 2 == 0 { 20 } else { 230 }])
        });
        image.save(dir.path().join(name)).unwrap();
    }

    let outcome = SimilarityDetector::new(SimilarityConfig::default().with_executor_config(worker_config(2)))
        .find_similar(&[dir.path().to_path_buf()])
        .unwrap();

    assert!(outcome.is_completed());
    assert_eq!(outcome.summary.fingerprinted, 2);
    assert_eq!(outcome.groups.len(), 1);
}
