//! Layered application settings.
//!
//! Sources, lowest precedence first:
//!
//! 1. Built-in defaults ([`Settings::default`])
//! 2. A TOML file: an explicit `--config` path, or `dupehound.toml` in the
//!    platform config directory when it exists
//! 3. Environment variables prefixed `DUPEHOUND_`, with `__` separating
//!    nested keys (`DUPEHOUND_CACHE__PATH=/tmp/h.db`)
//! 4. Command-line flags, applied by the CLI after extraction
//!
//! A [`Settings`] value is converted into explicit per-run engine
//! configuration ([`FinderConfig`], [`SimilarityConfig`]); nothing here is
//! global.
//!
//! ```toml
//! workers = 8
//! execution_mode = "processes"
//! similarity_threshold = 85.0
//! algorithm = "dhash"
//! clustering = "linkage"
//!
//! [cache]
//! path = "/var/cache/dupehound/hashes.db"
//!
//! [walk]
//! extensions = ["jpg", "png"]
//! skip_hidden = true
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::cache::{CacheError, HashCache};
use crate::duplicates::FinderConfig;
use crate::executor::{ExecutionMode, ExecutorConfig};
use crate::scanner::perceptual::PerceptualAlgorithm;
use crate::scanner::video::VideoTools;
use crate::scanner::{WalkerConfig, PARTIAL_HASH_BYTES};
use crate::similarity::{ClusterPolicy, SimilarityConfig, DEFAULT_THRESHOLD};

/// Name of the settings file looked up in the config directory.
pub const CONFIG_FILE_NAME: &str = "dupehound.toml";

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "DUPEHOUND_";

/// Errors raised while loading settings.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// An explicitly requested settings file does not exist.
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// A source could not be parsed or had the wrong shape.
    #[error("Invalid configuration: {0}")]
    Invalid(#[from] Box<figment::Error>),
}

/// Hash cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Use the persistent cache
    pub enabled: bool,
    /// Database file; the platform cache directory when unset
    pub path: Option<PathBuf>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            path: None,
        }
    }
}

/// Directory walk settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkSettings {
    /// Extension allow-list, empty for all
    pub extensions: Vec<String>,
    /// Gitignore-style patterns to skip
    pub ignore_patterns: Vec<String>,
    /// Follow symbolic links
    pub follow_symlinks: bool,
    /// Skip dot-files and dot-directories
    pub skip_hidden: bool,
    /// Smallest file considered, in bytes
    pub min_size: Option<u64>,
    /// Largest file considered, in bytes
    pub max_size: Option<u64>,
}

/// Engine defaults shared by every subcommand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Worker budget, 0 for one per CPU
    pub workers: usize,
    /// How hashing and fingerprinting jobs run
    pub execution_mode: ExecutionMode,
    /// Leading bytes covered by a partial digest
    pub partial_bytes: u64,
    /// Minimum similarity percentage for near-duplicates
    pub similarity_threshold: f64,
    /// Perceptual hash algorithm
    pub algorithm: PerceptualAlgorithm,
    /// How near-duplicates are grouped
    pub clustering: ClusterPolicy,
    /// Report fully verified groups from a cancelled exact run
    pub partial_results: bool,
    /// Fingerprint videos when ffmpeg and ffprobe are on PATH
    pub video: bool,
    /// Hash cache
    pub cache: CacheSettings,
    /// Directory walk
    pub walk: WalkSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            workers: 0,
            execution_mode: ExecutionMode::default(),
            partial_bytes: PARTIAL_HASH_BYTES,
            similarity_threshold: DEFAULT_THRESHOLD,
            algorithm: PerceptualAlgorithm::default(),
            clustering: ClusterPolicy::default(),
            partial_results: false,
            video: true,
            cache: CacheSettings::default(),
            walk: WalkSettings::default(),
        }
    }
}

impl Settings {
    /// Load defaults, the settings file and the environment.
    ///
    /// # Arguments
    ///
    /// * `file` - Explicit settings file. When `None`, the platform file is
    ///   used if present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] if `file` does not exist and
    /// [`ConfigError::Invalid`] if any source fails to parse.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match file {
            Some(path) if !path.exists() => return Err(ConfigError::NotFound(path.to_path_buf())),
            Some(path) => Some(path.to_path_buf()),
            None => default_config_path().filter(|p| p.exists()),
        };

        let mut figment = Self::figment(file.as_deref());
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        let settings = Self::extract(&figment)?;

        match &file {
            Some(path) => log::debug!("Loaded settings from {}", path.display()),
            None => log::debug!("No settings file, using defaults and environment"),
        }
        Ok(settings)
    }

    /// Defaults merged with an optional TOML file, without the environment.
    #[must_use]
    pub fn figment(file: Option<&Path>) -> Figment {
        let figment = Figment::from(Serialized::defaults(Self::default()));
        match file {
            Some(path) => figment.merge(Toml::file(path)),
            None => figment,
        }
    }

    /// Extract settings from a prepared figment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a value has the wrong type.
    pub fn extract(figment: &Figment) -> Result<Self, ConfigError> {
        figment.extract().map_err(|e| ConfigError::Invalid(Box::new(e)))
    }

    /// Write these settings as TOML, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Walker configuration for these settings.
    #[must_use]
    pub fn walker_config(&self) -> WalkerConfig {
        WalkerConfig {
            follow_symlinks: self.walk.follow_symlinks,
            skip_hidden: self.walk.skip_hidden,
            min_size: self.walk.min_size,
            max_size: self.walk.max_size,
            ignore_patterns: self.walk.ignore_patterns.clone(),
            ..WalkerConfig::default()
        }
        .with_extensions(&self.walk.extensions)
    }

    /// Executor configuration for these settings.
    ///
    /// Video tools are probed on PATH only when video is enabled.
    #[must_use]
    pub fn executor_config(&self) -> ExecutorConfig {
        let video = if self.video { VideoTools::detect() } else { None };
        ExecutorConfig::default()
            .with_mode(self.execution_mode)
            .with_workers(self.workers)
            .with_partial_bytes(self.partial_bytes)
            .with_video_tools(video)
    }

    /// Exact-duplicate configuration, with an already opened cache.
    #[must_use]
    pub fn finder_config(&self, cache: Option<Arc<HashCache>>) -> FinderConfig {
        let config = FinderConfig::default()
            .with_walker_config(self.walker_config())
            .with_executor_config(self.executor_config())
            .with_partial_results(self.partial_results);
        match cache {
            Some(cache) => config.with_cache(cache),
            None => config,
        }
    }

    /// Near-duplicate configuration.
    #[must_use]
    pub fn similarity_config(&self) -> SimilarityConfig {
        SimilarityConfig::default()
            .with_walker_config(self.walker_config())
            .with_executor_config(self.executor_config())
            .with_algorithm(self.algorithm)
            .with_threshold(self.similarity_threshold)
            .with_cluster_policy(self.clustering)
    }

    /// Cache database path, if one can be determined.
    #[must_use]
    pub fn cache_path(&self) -> Option<PathBuf> {
        self.cache.path.clone().or_else(default_cache_path)
    }

    /// Open the configured cache.
    ///
    /// Returns `Ok(None)` when the cache is disabled or no path can be
    /// determined. A corrupt database is recreated.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the database cannot be opened.
    pub fn open_cache(&self) -> Result<Option<Arc<HashCache>>, CacheError> {
        if !self.cache.enabled {
            return Ok(None);
        }
        let Some(path) = self.cache_path() else {
            log::warn!("No cache directory available, running without a cache");
            return Ok(None);
        };
        HashCache::open_or_recover(&path).map(|cache| Some(Arc::new(cache)))
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("io", "dupehound", "dupehound")
}

/// Platform location of `dupehound.toml`.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

/// Platform location of the hash cache database.
#[must_use]
pub fn default_cache_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.cache_dir().join("hashes.db"))
}
