//! Skip-list and extension allow-list applied during traversal.
//!
//! The skip-list is a fixed approximation: it names the platform bundle and
//! disk image extensions and the metadata files that operating systems drop
//! into directories. Entries matching it are never yielded and, for
//! directories, never descended into.

use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::path::Path;

/// Bundle, package and disk image extensions that are never scanned.
pub const SKIP_EXTENSIONS: &[&str] = &["app", "bundle", "pkg", "dmg", "iso"];

/// Well-known system metadata names that are never scanned.
pub const SKIP_NAMES: &[&str] = &[".DS_Store", "Thumbs.db", ".Spotlight-V100", ".Trashes"];

/// Filename prefix used by AppleDouble resource-fork files.
pub const RESOURCE_FORK_PREFIX: &str = "._";

/// Why an entry was left out of the scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Bundle or disk image extension
    Bundle,
    /// System metadata file or directory
    Metadata,
    /// AppleDouble resource fork
    ResourceFork,
}

/// Check a file or directory name against the skip-list.
#[must_use]
pub fn skip_reason(name: &OsStr) -> Option<SkipReason> {
    let name = name.to_string_lossy();

    if name.starts_with(RESOURCE_FORK_PREFIX) {
        return Some(SkipReason::ResourceFork);
    }
    if SKIP_NAMES.iter().any(|skip| name == *skip) {
        return Some(SkipReason::Metadata);
    }
    let extension = Path::new(&*name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase());
    if let Some(extension) = extension {
        if SKIP_EXTENSIONS.contains(&extension.as_str()) {
            return Some(SkipReason::Bundle);
        }
    }
    None
}

/// Normalize an extension: trim, strip leading dots, lowercase.
#[must_use]
pub fn normalize_extension(extension: &str) -> String {
    extension.trim().trim_start_matches('.').to_lowercase()
}

/// Extension allow-list.
///
/// `JPG`, `.jpg` and `jpg` are the same entry. An empty filter allows every
/// file, including files without an extension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionFilter {
    allowed: BTreeSet<String>,
}

impl ExtensionFilter {
    /// Build a filter from raw extension strings.
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed = extensions
            .into_iter()
            .map(|ext| normalize_extension(ext.as_ref()))
            .filter(|ext| !ext.is_empty())
            .collect();
        Self { allowed }
    }

    /// Whether the filter lets everything through.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }

    /// Normalized extensions in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.allowed.iter().map(String::as_str)
    }

    /// Check a path against the allow-list.
    #[must_use]
    pub fn allows(&self, path: &Path) -> bool {
        if self.allowed.is_empty() {
            return true;
        }
        path.extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| self.allowed.contains(&ext))
    }
}
