use dupehound::cache::HashCache;
use dupehound::duplicates::{DuplicateFinder, FinderConfig};
use dupehound::scanner::DigestKind;
use filetime::FileTime;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::tempdir;

fn write(path: &Path, content: &[u8]) {
    File::create(path).unwrap().write_all(content).unwrap();
}

fn cached_finder(cache: &Arc<HashCache>) -> DuplicateFinder {
    DuplicateFinder::new(FinderConfig::default().with_cache(Arc::clone(cache)))
}

#[test]
fn test_initial_scan_and_rescan() {
    let dir = tempdir().unwrap();
    let cache_dir = tempdir().unwrap();
    write(&dir.path().join("file1.txt"), b"duplicate content");
    write(&dir.path().join("file2.txt"), b"duplicate content");

    let cache = Arc::new(HashCache::new(&cache_dir.path().join("cache.db")).unwrap());
    let finder = cached_finder(&cache);
    let roots = vec![dir.path().to_path_buf()];

    let first = finder.find_duplicates(&roots).unwrap();
    assert_eq!(first.groups.len(), 1);
    assert_eq!(first.summary.cache_prehash_hits, 0);
    assert_eq!(first.summary.cache_prehash_misses, 2);
    assert_eq!(first.summary.cache_fullhash_misses, 2);

    let second = finder.find_duplicates(&roots).unwrap();
    assert_eq!(second.groups.len(), 1);
    assert_eq!(second.summary.cache_prehash_hits, 2);
    assert_eq!(second.summary.cache_prehash_misses, 0);
    assert_eq!(second.summary.cache_fullhash_hits, 2);
    assert_eq!(second.summary.cache_fullhash_misses, 0);
    assert_eq!(first.groups[0].digest, second.groups[0].digest);
}

#[test]
fn test_changed_mtime_is_a_miss() {
    let dir = tempdir().unwrap();
    let cache_dir = tempdir().unwrap();
    let file1 = dir.path().join("file1.txt");
    let file2 = dir.path().join("file2.txt");
    write(&file1, b"identical content 21b");
    write(&file2, b"identical content 21b");

    let cache = Arc::new(HashCache::new(&cache_dir.path().join("cache.db")).unwrap());
    let finder = cached_finder(&cache);
    let roots = vec![dir.path().to_path_buf()];
    finder.find_duplicates(&roots).unwrap();

    // Same size, different content, explicitly different mtime
    write(&file1, b"different content 21b");
    filetime::set_file_mtime(&file1, FileTime::from_unix_time(1_000_000, 0)).unwrap();

    let outcome = finder.find_duplicates(&roots).unwrap();
    assert!(outcome.groups.is_empty());
    assert_eq!(outcome.summary.cache_prehash_hits, 1);
    assert_eq!(outcome.summary.cache_prehash_misses, 1);
}

#[test]
fn test_stale_entry_never_returned_after_rewrite() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("a.bin");
    write(&file, b"first version");
    let mtime = FileTime::from_unix_time(1_500_000_000, 0);
    filetime::set_file_mtime(&file, mtime).unwrap();
    write(&dir.path().join("b.bin"), b"first version");

    let cache = Arc::new(HashCache::in_memory().unwrap());
    let finder = cached_finder(&cache);
    let roots = vec![dir.path().to_path_buf()];
    assert_eq!(finder.find_duplicates(&roots).unwrap().groups.len(), 1);

    // Content and size change; the old key can no longer match
    write(&file, b"second version, longer");
    filetime::set_file_mtime(&file, mtime).unwrap();

    let outcome = finder.find_duplicates(&roots).unwrap();
    assert!(outcome.groups.is_empty());
    assert_eq!(outcome.summary.eliminated_by_size, 2);
}

#[test]
fn test_cache_shared_between_runs_only_holds_computed_digests() {
    let dir = tempdir().unwrap();
    write(&dir.path().join("unique.txt"), b"only one of these");
    write(&dir.path().join("p1.txt"), b"pair");
    write(&dir.path().join("p2.txt"), b"pair");

    let cache = Arc::new(HashCache::in_memory().unwrap());
    cached_finder(&cache)
        .find_duplicates(&[dir.path().to_path_buf()])
        .unwrap();

    let stats = cache.stats().unwrap();
    assert_eq!(stats.partial_entries, 2);
    assert_eq!(stats.full_entries, 2);
    assert_eq!(stats.file_versions, 2);
}

#[test]
fn test_no_cache_counts_every_digest_as_miss() {
    let dir = tempdir().unwrap();
    write(&dir.path().join("file1.txt"), b"duplicate content");
    write(&dir.path().join("file2.txt"), b"duplicate content");

    let outcome = DuplicateFinder::with_defaults()
        .find_duplicates(&[dir.path().to_path_buf()])
        .unwrap();

    assert_eq!(outcome.summary.cache_prehash_hits, 0);
    assert_eq!(outcome.summary.cache_prehash_misses, 2);
    assert_eq!(outcome.summary.cache_fullhash_hits, 0);
}

#[test]
fn test_many_files_rescan_hits() {
    let dir = tempdir().unwrap();
    for i in 0..50 {
        let content = format!("content {i:010}");
        write(&dir.path().join(format!("file_{i}.txt")), content.as_bytes());
        write(&dir.path().join(format!("dup_{i}.txt")), content.as_bytes());
    }

    let cache = Arc::new(HashCache::in_memory().unwrap());
    let finder = cached_finder(&cache);
    let roots = vec![dir.path().to_path_buf()];

    let first = finder.find_duplicates(&roots).unwrap();
    assert_eq!(first.groups.len(), 50);

    let second = finder.find_duplicates(&roots).unwrap();
    assert_eq!(second.summary.cache_prehash_hits, 100);
    assert_eq!(second.summary.cache_fullhash_hits, 100);
    assert_eq!(second.groups.len(), 50);
}

#[test]
fn test_housekeeping_operations() {
    let dir = tempdir().unwrap();
    let sub = dir.path().join("sub");
    fs::create_dir(&sub).unwrap();
    write(&dir.path().join("a.txt"), b"same bytes");
    write(&sub.join("b.txt"), b"same bytes");
    write(&sub.join("c.txt"), b"same bytes");

    let cache = Arc::new(HashCache::in_memory().unwrap());
    let root = fs::canonicalize(dir.path()).unwrap();
    cached_finder(&cache).find_duplicates(&[root.clone()]).unwrap();
    assert_eq!(cache.stats().unwrap().file_versions, 3);

    // Invalidate one file
    let removed = cache.invalidate(&root.join("a.txt")).unwrap();
    assert_eq!(removed, 2);

    // Prune after deleting a file on disk
    fs::remove_file(sub.join("c.txt")).unwrap();
    assert_eq!(cache.prune_missing().unwrap(), 2);
    assert_eq!(cache.stats().unwrap().file_versions, 1);

    // Prefix invalidation removes the rest
    assert_eq!(cache.invalidate_prefix(&root.join("sub")).unwrap(), 2);
    assert_eq!(cache.stats().unwrap().entries, 0);

    cached_finder(&cache).find_duplicates(&[root]).unwrap();
    assert!(cache.clear().unwrap() > 0);
    assert_eq!(cache.stats().unwrap().entries, 0);
}

#[test]
fn test_lookup_by_kind_is_separate() {
    let dir = tempdir().unwrap();
    let path: PathBuf = dir.path().join("x.bin");
    write(&path, b"abc");
    write(&dir.path().join("y.bin"), b"abc");

    let cache = Arc::new(HashCache::in_memory().unwrap());
    cached_finder(&cache)
        .find_duplicates(&[dir.path().to_path_buf()])
        .unwrap();

    let stats = cache.stats().unwrap();
    assert_eq!(stats.entries, stats.partial_entries + stats.full_entries);
    assert_eq!(DigestKind::from_code(DigestKind::Full.code()), Some(DigestKind::Full));
}
