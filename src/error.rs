//! Error taxonomy, run warnings and exit codes.
//!
//! Component errors ([`ScanError`], [`HashError`], [`PerceptualError`],
//! [`CacheError`]) stay with their modules. This module classifies the
//! recoverable ones into [`ErrorKind`] and wraps them as [`ScanWarning`]
//! values that are attached to a run outcome instead of failing it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cache::CacheError;
use crate::executor::JobError;
use crate::job::RunStatus;
use crate::scanner::perceptual::PerceptualError;
use crate::scanner::{HashError, ScanError};

/// Closed set of error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A directory could not be listed; everything beneath it is skipped.
    Traversal,
    /// A file could not be examined or read; it is left out of its batch.
    Read,
    /// A file type cannot be fingerprinted; it is skipped.
    Unsupported,
    /// The cache could not be used; every lookup counts as a miss.
    CacheUnavailable,
    /// The cache held unusable data; it is discarded and recomputed.
    CacheCorrupt,
    /// The run was cancelled.
    Cancelled,
    /// The run could not start.
    FatalConfiguration,
}

impl ErrorKind {
    /// Whether a warning of this kind means a file was left out of the results.
    #[must_use]
    pub fn skips_file(self) -> bool {
        matches!(self, Self::Read | Self::Unsupported)
    }

    /// Whether a warning of this kind means a directory was left unscanned.
    #[must_use]
    pub fn skips_directory(self) -> bool {
        matches!(self, Self::Traversal)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Traversal => "traversal",
            Self::Read => "read",
            Self::Unsupported => "unsupported",
            Self::CacheUnavailable => "cache unavailable",
            Self::CacheCorrupt => "cache corrupt",
            Self::Cancelled => "cancelled",
            Self::FatalConfiguration => "configuration",
        };
        f.write_str(name)
    }
}

/// A recovered error, reported alongside the results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanWarning {
    /// Category
    pub kind: ErrorKind,
    /// Affected path, when there is one
    pub path: Option<PathBuf>,
    /// Human-readable description
    pub message: String,
}

impl ScanWarning {
    /// Create a warning.
    #[must_use]
    pub fn new(kind: ErrorKind, path: Option<&Path>, message: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.map(Path::to_path_buf),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ScanWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl From<&ScanError> for ScanWarning {
    fn from(error: &ScanError) -> Self {
        let kind = if error.is_directory() {
            ErrorKind::Traversal
        } else {
            ErrorKind::Read
        };
        Self::new(kind, Some(error.path()), error.to_string())
    }
}

impl From<&HashError> for ScanWarning {
    fn from(error: &HashError) -> Self {
        let kind = if error.is_cancelled() {
            ErrorKind::Cancelled
        } else {
            ErrorKind::Read
        };
        Self::new(kind, Some(error.path()), error.to_string())
    }
}

impl From<&PerceptualError> for ScanWarning {
    fn from(error: &PerceptualError) -> Self {
        let kind = match error {
            PerceptualError::Read(inner) => return Self::from(inner),
            PerceptualError::Unsupported(_) | PerceptualError::ToolUnavailable { .. } => {
                ErrorKind::Unsupported
            }
            PerceptualError::Decode { .. } => ErrorKind::Read,
        };
        Self::new(kind, Some(error.path()), error.to_string())
    }
}

impl From<&JobError> for ScanWarning {
    fn from(error: &JobError) -> Self {
        match error {
            JobError::Hash(e) => Self::from(e),
            JobError::Perceptual(e) => Self::from(e),
            JobError::Worker { path, .. } => {
                Self::new(ErrorKind::Read, Some(path), error.to_string())
            }
        }
    }
}

impl From<&CacheError> for ScanWarning {
    fn from(error: &CacheError) -> Self {
        let kind = match error {
            CacheError::Corrupt { .. } => ErrorKind::CacheCorrupt,
            _ => ErrorKind::CacheUnavailable,
        };
        let path = match error {
            CacheError::Corrupt { path, .. } | CacheError::Io { path, .. } => Some(path.as_path()),
            _ => None,
        };
        Self::new(kind, path, error.to_string())
    }
}

/// Exit codes for the dupehound binary.
///
/// - 0: Success (completed normally, groups found)
/// - 1: General error (unexpected failure)
/// - 2: Nothing found (completed normally, no groups)
/// - 3: Partial success (completed, but some files were skipped)
/// - 130: Interrupted by user (Ctrl+C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Success: Scan completed and groups were found.
    Success = 0,
    /// General error: An unexpected error occurred.
    GeneralError = 1,
    /// Nothing found: Scan completed but no groups were found.
    NoDuplicates = 2,
    /// Partial success: Scan completed but skipped some files.
    PartialSuccess = 3,
    /// Interrupted: Scan was cancelled.
    Interrupted = 130,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "DH000",
            Self::GeneralError => "DH001",
            Self::NoDuplicates => "DH002",
            Self::PartialSuccess => "DH003",
            Self::Interrupted => "DH130",
        }
    }

    /// Exit code for a finished run.
    #[must_use]
    pub fn for_run(status: &RunStatus, groups: usize, skipped: usize) -> Self {
        match status {
            RunStatus::Cancelled => Self::Interrupted,
            RunStatus::Failed { .. } => Self::GeneralError,
            RunStatus::Completed if skipped > 0 => Self::PartialSuccess,
            RunStatus::Completed if groups == 0 => Self::NoDuplicates,
            RunStatus::Completed => Self::Success,
        }
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "DH001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message
    pub message: String,
    /// Whether the operation was interrupted
    pub interrupted: bool,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
