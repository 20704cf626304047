use dupehound::cache::{CacheEntry, CacheError, CacheKey, HashCache};
use dupehound::duplicates::{DuplicateFinder, FinderConfig};
use dupehound::error::{ErrorKind, ExitCode};
use dupehound::job::RunStatus;
use dupehound::scanner::DigestKind;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tempfile::{tempdir, NamedTempFile};

#[test]
fn test_open_corrupted_database() {
    let temp_file = NamedTempFile::new().unwrap();
    fs::write(temp_file.path(), b"not a sqlite database, only some garbage text").unwrap();

    let result = HashCache::new(temp_file.path());
    assert!(matches!(result, Err(CacheError::Corrupt { .. })));
}

#[test]
fn test_recovery_discards_corrupt_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cache.db");
    fs::write(&path, b"corrupted garbage that is long enough to have a header").unwrap();

    let cache = HashCache::open_or_recover(&path).unwrap();
    assert_eq!(cache.stats().unwrap().entries, 0);

    let key = CacheKey::new(PathBuf::from("/x"), 3, SystemTime::UNIX_EPOCH);
    cache
        .store_batch(&[CacheEntry::new(key.clone(), DigestKind::Full, [1u8; 32])])
        .unwrap();
    let found = cache.lookup_batch(DigestKind::Full, &[key.clone()]).unwrap();
    assert_eq!(found.get(&key), Some(&[1u8; 32]));
}

fn duplicate_pair() -> tempfile::TempDir {
    let data = tempdir().unwrap();
    fs::write(data.path().join("a.txt"), b"same").unwrap();
    fs::write(data.path().join("b.txt"), b"same").unwrap();
    data
}

/// Run SQL against the cache file behind the open `HashCache`'s back.
fn tamper(path: &Path, sql: &str) {
    let conn = rusqlite::Connection::open(path).unwrap();
    conn.execute_batch(sql).unwrap();
}

#[test]
fn test_cache_failing_reads_and_writes_fails_the_run() {
    let data = duplicate_pair();
    let cache_dir = tempdir().unwrap();
    let path = cache_dir.path().join("cache.db");
    let cache = Arc::new(HashCache::new(&path).unwrap());
    tamper(&path, "DROP TABLE hash_cache;");

    let outcome = DuplicateFinder::new(FinderConfig::default().with_cache(cache))
        .find_duplicates(&[data.path().to_path_buf()])
        .unwrap();

    match &outcome.status {
        RunStatus::Failed { error } => assert!(error.contains("Hash cache unusable"), "{error}"),
        other => panic!("expected a failed run, got {other:?}"),
    }
    assert!(outcome.groups.is_empty());
    assert_eq!(
        ExitCode::for_run(&outcome.status, outcome.groups.len(), outcome.skipped_entries()),
        ExitCode::GeneralError
    );
}

#[test]
fn test_cache_rejecting_writes_only_warns() {
    let data = duplicate_pair();
    let cache_dir = tempdir().unwrap();
    let path = cache_dir.path().join("cache.db");
    let cache = Arc::new(HashCache::new(&path).unwrap());
    tamper(
        &path,
        "CREATE TRIGGER reject_writes BEFORE INSERT ON hash_cache
         BEGIN SELECT RAISE(ABORT, 'read-only cache'); END;",
    );

    let outcome = DuplicateFinder::new(FinderConfig::default().with_cache(cache.clone()))
        .find_duplicates(&[data.path().to_path_buf()])
        .unwrap();

    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.groups.len(), 1);
    assert_eq!(outcome.groups[0].len(), 2);
    assert!(!outcome.warnings.is_empty());
    assert!(outcome
        .warnings
        .iter()
        .all(|w| w.kind == ErrorKind::CacheUnavailable
            && w.message.starts_with("cache write failed")));
    assert_eq!(outcome.skipped_entries(), 0);
    assert_eq!(cache.stats().unwrap().entries, 0);
}

#[test]
fn test_cache_failing_reads_only_recomputes() {
    let data = duplicate_pair();
    let cache_dir = tempdir().unwrap();
    let path = cache_dir.path().join("cache.db");
    let cache = Arc::new(HashCache::new(&path).unwrap());
    let finder = DuplicateFinder::new(FinderConfig::default().with_cache(cache));

    let first = finder.find_duplicates(&[data.path().to_path_buf()]).unwrap();
    assert_eq!(first.groups.len(), 1);
    assert!(first.warnings.is_empty());

    // Partial digests stored as integers cannot be read back
    tamper(&path, "UPDATE hash_cache SET digest = 42 WHERE kind = 0;");

    let second = finder.find_duplicates(&[data.path().to_path_buf()]).unwrap();
    assert_eq!(second.status, RunStatus::Completed);
    assert_eq!(second.groups.len(), 1);
    assert_eq!(second.groups[0].paths(), first.groups[0].paths());
    assert_eq!(second.groups[0].digest, first.groups[0].digest);
    assert_eq!(second.warnings.len(), 1);
    assert_eq!(second.warnings[0].kind, ErrorKind::CacheUnavailable);
    assert!(second.warnings[0]
        .message
        .starts_with("cache lookup failed, treating as misses"));
    assert_eq!(second.summary.cache_prehash_misses, 2);
    assert_eq!(second.summary.cache_fullhash_hits, 2);
}
