use dupehound::duplicates::{DuplicateFinder, FinderConfig};
use dupehound::executor::ExecutionMode;
use dupehound::job::RunStatus;
use dupehound::scanner::WalkerConfig;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn write(path: &Path, content: &[u8]) {
    File::create(path).unwrap().write_all(content).unwrap();
}

fn roots(paths: &[&Path]) -> Vec<PathBuf> {
    paths.iter().map(|p| p.to_path_buf()).collect()
}

#[test]
fn test_scan_empty_directory() {
    let dir = tempdir().unwrap();
    let outcome = DuplicateFinder::with_defaults()
        .find_duplicates(&roots(&[dir.path()]))
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Completed);
    assert!(outcome.groups.is_empty());
    assert_eq!(outcome.summary.total_files, 0);
    assert!(outcome.warnings.is_empty());
}

#[test]
fn test_scan_unique_files() {
    let dir = tempdir().unwrap();
    write(&dir.path().join("a.txt"), b"content a");
    write(&dir.path().join("b.txt"), b"content b");
    write(&dir.path().join("c.txt"), b"content c");

    let outcome = DuplicateFinder::with_defaults()
        .find_duplicates(&roots(&[dir.path()]))
        .unwrap();

    assert!(outcome.groups.is_empty());
    assert_eq!(outcome.summary.total_files, 3);
    assert_eq!(outcome.summary.eliminated_by_prehash, 3);
}

#[test]
fn test_scan_nested_duplicates() {
    let dir = tempdir().unwrap();
    let deep = dir.path().join("one").join("two").join("three");
    fs::create_dir_all(&deep).unwrap();

    write(&dir.path().join("top.bin"), b"nested duplicate");
    write(&deep.join("bottom.bin"), b"nested duplicate");

    let outcome = DuplicateFinder::with_defaults()
        .find_duplicates(&roots(&[dir.path()]))
        .unwrap();

    assert_eq!(outcome.groups.len(), 1);
    let names: Vec<_> = outcome.groups[0]
        .files
        .iter()
        .map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert!(names.contains(&"top.bin".to_string()));
    assert!(names.contains(&"bottom.bin".to_string()));
}

#[test]
fn test_large_files_with_shared_prefix() {
    let dir = tempdir().unwrap();
    let mut a = vec![7u8; 300 * 1024];
    let b = a.clone();
    write(&dir.path().join("a.bin"), &a);
    write(&dir.path().join("b.bin"), &b);
    *a.last_mut().unwrap() = 8;
    write(&dir.path().join("c.bin"), &a);

    let outcome = DuplicateFinder::with_defaults()
        .find_duplicates(&roots(&[dir.path()]))
        .unwrap();

    assert_eq!(outcome.groups.len(), 1);
    assert_eq!(outcome.groups[0].len(), 2);
    assert!(outcome.groups[0]
        .paths()
        .iter()
        .all(|p| !p.ends_with("c.bin")));
    assert_eq!(outcome.summary.reclaimable_space, 300 * 1024);
}

#[test]
fn test_two_roots_cross_directory_duplicates() {
    let dir1 = tempdir().unwrap();
    let dir2 = tempdir().unwrap();
    write(&dir1.path().join("a.txt"), b"shared");
    write(&dir2.path().join("b.txt"), b"shared");

    let outcome = DuplicateFinder::with_defaults()
        .find_duplicates(&roots(&[dir1.path(), dir2.path()]))
        .unwrap();

    assert_eq!(outcome.groups.len(), 1);
    assert_eq!(outcome.groups[0].len(), 2);
    assert_eq!(outcome.summary.total_files, 2);
}

#[test]
fn test_nested_root_scanned_once() {
    let dir = tempdir().unwrap();
    let sub = dir.path().join("sub");
    fs::create_dir(&sub).unwrap();
    write(&dir.path().join("a.txt"), b"content");
    write(&sub.join("b.txt"), b"content");

    let outcome = DuplicateFinder::with_defaults()
        .find_duplicates(&roots(&[dir.path(), &sub, dir.path()]))
        .unwrap();

    assert_eq!(outcome.summary.total_files, 2);
    assert_eq!(outcome.groups.len(), 1);
    assert_eq!(outcome.groups[0].len(), 2);
}

#[test]
fn test_execution_modes_agree() {
    let dir = tempdir().unwrap();
    for i in 0..6 {
        write(&dir.path().join(format!("x{i}.dat")), format!("group {}", i % 3).as_bytes());
    }
    write(&dir.path().join("odd.dat"), b"group 9 but longer");

    let threads = DuplicateFinder::new(
        FinderConfig::default()
            .with_execution_mode(ExecutionMode::Threads)
            .with_workers(3),
    )
    .find_duplicates(&roots(&[dir.path()]))
    .unwrap();
    let sequential =
        DuplicateFinder::new(FinderConfig::default().with_execution_mode(ExecutionMode::Disabled))
            .find_duplicates(&roots(&[dir.path()]))
            .unwrap();

    assert_eq!(threads.groups.len(), 3);
    let paths = |groups: &[dupehound::duplicates::DuplicateGroup]| -> Vec<Vec<PathBuf>> {
        groups.iter().map(|g| g.paths()).collect()
    };
    assert_eq!(paths(&threads.groups), paths(&sequential.groups));
}

#[test]
fn test_extension_filter_normalized() {
    let dir = tempdir().unwrap();
    write(&dir.path().join("a.JPG"), b"pixels");
    write(&dir.path().join("b.jpg"), b"pixels");
    write(&dir.path().join("c.txt"), b"pixels");

    let config = FinderConfig::default()
        .with_walker_config(WalkerConfig::default().with_extensions([".jpg"]));
    let outcome = DuplicateFinder::new(config)
        .find_duplicates(&roots(&[dir.path()]))
        .unwrap();

    assert_eq!(outcome.summary.total_files, 2);
    assert_eq!(outcome.groups.len(), 1);
    assert_eq!(outcome.groups[0].len(), 2);
}

#[test]
fn test_ignore_patterns_and_hidden_files() {
    let dir = tempdir().unwrap();
    write(&dir.path().join("keep1.txt"), b"same");
    write(&dir.path().join("keep2.txt"), b"same");
    write(&dir.path().join("skip.tmp"), b"same");
    write(&dir.path().join(".hidden"), b"same");

    let walker = WalkerConfig {
        skip_hidden: true,
        ignore_patterns: vec!["*.tmp".to_string()],
        ..WalkerConfig::default()
    };
    let outcome = DuplicateFinder::new(FinderConfig::default().with_walker_config(walker))
        .find_duplicates(&roots(&[dir.path()]))
        .unwrap();

    assert_eq!(outcome.summary.total_files, 2);
    assert_eq!(outcome.groups[0].len(), 2);
}

#[test]
fn test_unusual_file_names() {
    let dir = tempdir().unwrap();
    write(&dir.path().join("with space.txt"), b"content");
    write(&dir.path().join("ünïcödé.txt"), b"content");
    if cfg!(not(windows)) {
        write(&dir.path().join("quote\"d.txt"), b"content");
    }

    let outcome = DuplicateFinder::with_defaults()
        .find_duplicates(&roots(&[dir.path()]))
        .unwrap();

    assert_eq!(outcome.groups.len(), 1);
    assert!(outcome.groups[0]
        .paths()
        .iter()
        .any(|p| p.to_string_lossy().contains("ünïcödé")));
}

#[test]
fn test_missing_root_is_an_error() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("nope");
    let result = DuplicateFinder::with_defaults().find_duplicates(&[missing]);
    assert!(result.is_err());
}
