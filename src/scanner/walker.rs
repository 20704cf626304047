//! Directory walker implementation using jwalk for parallel traversal.
//!
//! # Overview
//!
//! This module provides the [`Walker`] struct for traversing a single root
//! and collecting [`FileRecord`] values for duplicate detection. It uses
//! [`jwalk`] for parallel directory reading with children sorted by name,
//! so the yielded sequence is deterministic for a given filesystem snapshot.
//!
//! # Filtering
//!
//! - Skip-list entries (bundles, disk images, metadata files, `._` forks)
//!   are pruned while reading a directory, so skipped directories are never
//!   descended into
//! - Gitignore-style patterns via the `ignore` crate
//! - Size bounds and zero-byte files
//! - Hidden files
//! - Extension allow-list
//!
//! Unreadable directories and files are reported as [`ScanError`] items and
//! the walk continues with their siblings.

use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use jwalk::WalkDir;

use super::filters::skip_reason;
use super::{FileRecord, ScanError, WalkerConfig};

/// Directory walker for a single root.
#[derive(Debug, Clone)]
pub struct Walker {
    /// Root path to walk
    root: PathBuf,
    /// Walker configuration
    config: WalkerConfig,
    /// Optional shutdown flag for graceful termination
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Walker {
    /// Create a new walker for the given path.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use dupehound::scanner::{Walker, WalkerConfig};
    /// use std::path::Path;
    ///
    /// let walker = Walker::new(Path::new("."), WalkerConfig::default());
    /// ```
    #[must_use]
    pub fn new(path: &Path, config: WalkerConfig) -> Self {
        Self {
            root: path.to_path_buf(),
            config,
            shutdown_flag: None,
        }
    }

    /// Set the shutdown flag for graceful termination.
    ///
    /// When the flag is set to `true`, the walker stops yielding entries.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Build gitignore matcher from config patterns and .gitignore file.
    fn build_gitignore(&self) -> Option<Gitignore> {
        let mut builder = GitignoreBuilder::new(&self.root);

        let gitignore_path = self.root.join(".gitignore");
        if gitignore_path.exists() {
            if let Some(e) = builder.add(&gitignore_path) {
                log::warn!(
                    "Failed to load .gitignore from {}: {}",
                    gitignore_path.display(),
                    e
                );
            } else {
                log::debug!("Loaded .gitignore from {}", gitignore_path.display());
            }
        }

        for pattern in &self.config.ignore_patterns {
            if let Err(e) = builder.add_line(None, pattern) {
                log::warn!("Invalid ignore pattern '{}': {}", pattern, e);
            }
        }

        match builder.build() {
            Ok(gitignore) if gitignore.is_empty() => None,
            Ok(gitignore) => Some(gitignore),
            Err(e) => {
                log::warn!("Failed to build ignore patterns: {}", e);
                None
            }
        }
    }

    /// Check a path against the ignore patterns, including its parents so a
    /// pattern naming a directory also excludes everything beneath it.
    fn should_ignore(&self, path: &Path, is_dir: bool, gitignore: &Option<Gitignore>) -> bool {
        let Some(gi) = gitignore else {
            return false;
        };
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return false;
        };
        if relative.as_os_str().is_empty() {
            return false;
        }
        gi.matched_path_or_any_parents(relative, is_dir).is_ignore()
    }

    fn passes_size_filter(&self, size: u64) -> bool {
        if self.config.min_size.is_some_and(|min| size < min) {
            return false;
        }
        if self.config.max_size.is_some_and(|max| size > max) {
            return false;
        }
        true
    }

    /// Walk the directory tree, yielding file records.
    ///
    /// Errors are yielded as [`ScanError`] values rather than stopping
    /// iteration.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use dupehound::scanner::{Walker, WalkerConfig};
    /// use std::path::Path;
    ///
    /// let walker = Walker::new(Path::new("."), WalkerConfig::default());
    /// let files: Vec<_> = walker.walk().filter_map(Result::ok).collect();
    /// println!("Found {} files", files.len());
    /// ```
    pub fn walk(&self) -> impl Iterator<Item = Result<FileRecord, ScanError>> {
        self.clone().into_walk()
    }

    /// Consuming variant of [`Walker::walk`].
    pub fn into_walk(self) -> impl Iterator<Item = Result<FileRecord, ScanError>> {
        let gitignore = self.build_gitignore();

        let walk_dir = WalkDir::new(&self.root)
            .follow_links(self.config.follow_symlinks)
            .skip_hidden(self.config.skip_hidden)
            .process_read_dir(|_depth, _path, _read_dir_state, children| {
                // Prune skip-listed names so their subtrees are never read
                children.retain(|child| match child {
                    Ok(entry) => skip_reason(entry.file_name()).is_none(),
                    Err(_) => true,
                });
                // Sort children for deterministic output
                children.sort_by(|a, b| match (a, b) {
                    (Ok(a), Ok(b)) => a.file_name().cmp(b.file_name()),
                    (Ok(_), Err(_)) => std::cmp::Ordering::Less,
                    (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
                    (Err(_), Err(_)) => std::cmp::Ordering::Equal,
                });
            });

        walk_dir.into_iter().filter_map(move |entry_result| {
            if self.is_shutdown_requested() {
                log::debug!("Walker: Shutdown requested, stopping iteration");
                return None;
            }

            match entry_result {
                Ok(mut entry) => {
                    let path = entry.path();
                    let file_type = entry.file_type();

                    if self.should_ignore(&path, file_type.is_dir(), &gitignore) {
                        log::trace!("Ignoring: {}", path.display());
                        return None;
                    }

                    // jwalk reports a failed read_dir on the directory entry itself
                    if let Some(error) = entry.read_children_error.take() {
                        return Some(Err(unreadable_directory(path, &error)));
                    }

                    if path == self.root || file_type.is_dir() {
                        return None;
                    }

                    if file_type.is_symlink() && !self.config.follow_symlinks {
                        log::trace!("Skipping symlink: {}", path.display());
                        return None;
                    }

                    let metadata = if self.config.follow_symlinks {
                        std::fs::metadata(&path)
                    } else {
                        std::fs::symlink_metadata(&path)
                    };
                    match metadata {
                        Ok(metadata) => self.process_file(path, &metadata).map(Ok),
                        Err(e) => Some(Err(entry_error(&path, e))),
                    }
                }
                Err(e) => {
                    let path = e
                        .path()
                        .map_or_else(|| self.root.clone(), std::borrow::ToOwned::to_owned);
                    Some(Err(entry_error(&path, owned_io_error(&e))))
                }
            }
        })
    }

    /// Apply the per-file filters and build the record.
    fn process_file(&self, path: PathBuf, metadata: &Metadata) -> Option<FileRecord> {
        if !metadata.is_file() {
            return None;
        }

        let size = metadata.len();
        if size == 0 {
            log::trace!("Skipping empty file: {}", path.display());
            return None;
        }

        if !self.passes_size_filter(size) {
            log::trace!(
                "Skipping file due to size filter ({}): {}",
                size,
                path.display()
            );
            return None;
        }

        if !self.config.extensions.allows(&path) {
            log::trace!("Skipping file due to extension filter: {}", path.display());
            return None;
        }

        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        Some(FileRecord::new(path, size, modified))
    }
}

/// Classify an I/O error raised while examining a single entry.
fn entry_error(path: &Path, error: std::io::Error) -> ScanError {
    use std::io::ErrorKind;

    match error.kind() {
        ErrorKind::PermissionDenied => {
            log::debug!("Permission denied: {}", path.display());
            ScanError::PermissionDenied(path.to_path_buf())
        }
        ErrorKind::NotFound => {
            log::debug!("File not found (may have been deleted): {}", path.display());
            ScanError::NotFound(path.to_path_buf())
        }
        _ => {
            log::debug!("I/O error for {}: {}", path.display(), error);
            ScanError::Io {
                path: path.to_path_buf(),
                source: error,
            }
        }
    }
}

/// A directory whose children could not be listed.
fn unreadable_directory(path: PathBuf, error: &jwalk::Error) -> ScanError {
    directory_error(path, owned_io_error(error))
}

fn directory_error(path: PathBuf, source: std::io::Error) -> ScanError {
    log::debug!("Cannot read directory {}: {}", path.display(), source);
    ScanError::UnreadableDirectory { path, source }
}

/// jwalk only lends out its I/O error; rebuild one with the same kind.
fn owned_io_error(error: &jwalk::Error) -> std::io::Error {
    match error.io_error() {
        Some(io) => std::io::Error::new(io.kind(), io.to_string()),
        None => std::io::Error::other(error.to_string()),
    }
}
