//! Command-line interface definitions for dupehound.
//!
//! Global options (verbosity, settings file, JSON errors) come before the
//! subcommand. Every flag that mirrors a [`Settings`] field overrides the
//! file and environment layers only when given.
//!
//! ```bash
//! # Exact duplicates across two roots, as JSON
//! dupehound scan ~/Pictures /mnt/backup/Pictures --output json
//!
//! # Near-duplicate photos at 90% similarity, in worker processes
//! dupehound similar ~/Pictures --threshold 90 --mode processes
//!
//! # Cache housekeeping
//! dupehound cache stats
//! dupehound cache prune
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::Settings;
use crate::executor::ExecutionMode;
use crate::scanner::perceptual::PerceptualAlgorithm;
use crate::similarity::ClusterPolicy;

/// Duplicate and near-duplicate file finder.
///
/// Exact duplicates are found by size, then a partial BLAKE3 digest, then a
/// full digest. Near-duplicate images and videos are clustered by perceptual
/// hash distance.
#[derive(Debug, Parser)]
#[command(name = "dupehound")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Settings file (default: dupehound.toml in the platform config directory)
    #[arg(long, value_name = "PATH", global = true, env = "DUPEHOUND_CONFIG")]
    pub config: Option<PathBuf>,

    /// Report fatal errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Find files with identical content
    Scan(ScanArgs),
    /// Find visually similar images and videos
    Similar(SimilarArgs),
    /// Inspect or maintain the hash cache
    Cache(CacheArgs),
    /// Serve hashing jobs on stdin/stdout (used by --mode processes)
    #[command(hide = true)]
    HashWorker(WorkerArgs),
}

/// Options shared by `scan` and `similar`.
#[derive(Debug, Args)]
pub struct WalkArgs {
    /// Directories to scan
    #[arg(value_name = "PATH", required = true)]
    pub paths: Vec<PathBuf>,

    /// How hashing jobs run
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Worker threads or processes (0 = one per CPU)
    #[arg(short = 'j', long, value_name = "N")]
    pub workers: Option<usize>,

    /// Only consider these extensions (comma separated or repeated)
    #[arg(short = 'e', long = "ext", value_name = "EXT", value_delimiter = ',')]
    pub extensions: Vec<String>,

    /// Glob patterns to ignore (can be specified multiple times)
    ///
    /// These patterns are added to any .gitignore patterns found.
    #[arg(short, long = "ignore", value_name = "PATTERN")]
    pub ignore_patterns: Vec<String>,

    /// Minimum file size to consider (e.g., 1KB, 1MB, 1GB)
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub min_size: Option<u64>,

    /// Maximum file size to consider (e.g., 1KB, 1MB, 1GB)
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub max_size: Option<u64>,

    /// Follow symbolic links during scan
    ///
    /// Warning: May cause infinite loops if symlinks form cycles.
    #[arg(long)]
    pub follow_symlinks: bool,

    /// Skip hidden files and directories (starting with .)
    #[arg(long)]
    pub skip_hidden: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,
}

impl WalkArgs {
    /// Apply the flags that were given on top of loaded settings.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(mode) = self.mode {
            settings.execution_mode = mode.into();
        }
        if let Some(workers) = self.workers {
            settings.workers = workers;
        }
        if !self.extensions.is_empty() {
            settings.walk.extensions.clone_from(&self.extensions);
        }
        settings
            .walk
            .ignore_patterns
            .extend(self.ignore_patterns.iter().cloned());
        if self.min_size.is_some() {
            settings.walk.min_size = self.min_size;
        }
        if self.max_size.is_some() {
            settings.walk.max_size = self.max_size;
        }
        settings.walk.follow_symlinks |= self.follow_symlinks;
        settings.walk.skip_hidden |= self.skip_hidden;
    }
}

/// Arguments for the scan subcommand.
#[derive(Debug, Args)]
pub struct ScanArgs {
    #[command(flatten)]
    pub walk: WalkArgs,

    /// Leading bytes covered by the partial digest (e.g., 64KiB)
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub partial_bytes: Option<u64>,

    /// Report fully verified groups if the scan is interrupted
    #[arg(long)]
    pub partial_results: bool,

    /// Path to the hash cache database
    #[arg(long, value_name = "PATH")]
    pub cache: Option<PathBuf>,

    /// Disable hash caching
    #[arg(long, conflicts_with = "cache")]
    pub no_cache: bool,
}

impl ScanArgs {
    /// Apply the flags that were given on top of loaded settings.
    pub fn apply(&self, settings: &mut Settings) {
        self.walk.apply(settings);
        if let Some(bytes) = self.partial_bytes {
            settings.partial_bytes = bytes;
        }
        settings.partial_results |= self.partial_results;
        if let Some(path) = &self.cache {
            settings.cache.enabled = true;
            settings.cache.path = Some(path.clone());
        }
        if self.no_cache {
            settings.cache.enabled = false;
        }
    }
}

/// Arguments for the similar subcommand.
#[derive(Debug, Args)]
pub struct SimilarArgs {
    #[command(flatten)]
    pub walk: WalkArgs,

    /// Minimum similarity percentage (0-100)
    #[arg(short, long, value_name = "PERCENT")]
    pub threshold: Option<f64>,

    /// Perceptual hash algorithm
    #[arg(long, value_enum)]
    pub algorithm: Option<AlgorithmArg>,

    /// How similar files are grouped into clusters
    #[arg(long, value_enum)]
    pub clustering: Option<ClusteringArg>,

    /// Skip videos even when ffmpeg is available
    #[arg(long)]
    pub no_video: bool,
}

impl SimilarArgs {
    /// Apply the flags that were given on top of loaded settings.
    pub fn apply(&self, settings: &mut Settings) {
        self.walk.apply(settings);
        if let Some(threshold) = self.threshold {
            settings.similarity_threshold = threshold;
        }
        if let Some(algorithm) = self.algorithm {
            settings.algorithm = algorithm.into();
        }
        if let Some(clustering) = self.clustering {
            settings.clustering = clustering.into();
        }
        if self.no_video {
            settings.video = false;
        }
    }
}

/// Arguments for the cache subcommand.
#[derive(Debug, Args)]
pub struct CacheArgs {
    /// Path to the hash cache database
    #[arg(long, value_name = "PATH", global = true)]
    pub cache: Option<PathBuf>,

    /// Cache operation
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache operations.
#[derive(Debug, Clone, Subcommand)]
pub enum CacheAction {
    /// Show entry counts and sizes
    Stats {
        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        output: OutputFormat,
    },
    /// Remove every entry
    Clear,
    /// Remove entries for files that no longer exist
    Prune,
    /// Remove entries for a file or everything under a directory
    Invalidate {
        /// File or directory
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
}

/// Arguments for the hidden worker subcommand.
#[derive(Debug, Args)]
pub struct WorkerArgs {
    /// Leading bytes covered by a partial digest
    #[arg(long, value_name = "BYTES", default_value_t = crate::scanner::PARTIAL_HASH_BYTES)]
    pub partial_bytes: u64,

    /// Do not look for ffmpeg; video jobs report unsupported
    #[arg(long)]
    pub no_video: bool,
}

/// Output format for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable listing
    Text,
    /// JSON document for scripting
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Execution mode as a CLI value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Worker threads in this process
    Threads,
    /// Isolated worker processes
    Processes,
    /// Everything on the main thread
    Disabled,
}

impl From<ModeArg> for ExecutionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Threads => Self::Threads,
            ModeArg::Processes => Self::Processes,
            ModeArg::Disabled => Self::Disabled,
        }
    }
}

/// Perceptual algorithm as a CLI value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AlgorithmArg {
    /// DCT-based, most tolerant of edits
    Phash,
    /// Gradient-based, fast
    Dhash,
    /// Mean-based, fastest
    Ahash,
}

impl From<AlgorithmArg> for PerceptualAlgorithm {
    fn from(algorithm: AlgorithmArg) -> Self {
        match algorithm {
            AlgorithmArg::Phash => Self::Phash,
            AlgorithmArg::Dhash => Self::Dhash,
            AlgorithmArg::Ahash => Self::Ahash,
        }
    }
}

/// Clustering policy as a CLI value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ClusteringArg {
    /// Complete linkage; raising the threshold never splits a cluster
    Linkage,
    /// First fit in path order; faster on large sets
    Greedy,
}

impl From<ClusteringArg> for ClusterPolicy {
    fn from(clustering: ClusteringArg) -> Self {
        match clustering {
            ClusteringArg::Linkage => Self::Linkage,
            ClusteringArg::Greedy => Self::Greedy,
        }
    }
}

/// Parse a human-readable size string into bytes.
///
/// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB
/// Case-insensitive. Numbers without suffix are treated as bytes.
///
/// # Examples
///
/// ```
/// use dupehound::cli::parse_size;
///
/// assert_eq!(parse_size("1024").unwrap(), 1024);
/// assert_eq!(parse_size("1KB").unwrap(), 1000);
/// assert_eq!(parse_size("64KiB").unwrap(), 65_536);
/// ```
/// # Errors
///
/// Returns an error if the string is empty, contains an invalid number,
/// a negative number, or an unknown size suffix.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Size cannot be empty".to_string());
    }

    let (num_str, suffix) = match s.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(idx) => (&s[..idx], s[idx..].trim().to_uppercase()),
        None => (s, String::new()),
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number: '{num_str}'"))?;

    let multiplier: u64 = match suffix.as_str() {
        "" | "B" => 1,
        "KB" | "K" => 1_000,
        "KIB" => 1_024,
        "MB" | "M" => 1_000_000,
        "MIB" => 1_048_576,
        "GB" | "G" => 1_000_000_000,
        "GIB" => 1_073_741_824,
        "TB" | "T" => 1_000_000_000_000,
        "TIB" => 1_099_511_627_776,
        _ => return Err(format!("Unknown size suffix: '{suffix}'")),
    };

    Ok((num * multiplier as f64) as u64)
}
