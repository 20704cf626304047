//! Near-duplicate detection for images and videos.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use super::cluster::{cluster, ClusterPolicy, SimilarityCluster};
use crate::error::{ErrorKind, ScanWarning};
use crate::executor::{ExecutionMode, Executor, ExecutorConfig, Job, JobOutcome, Output, Task};
use crate::job::{FinderError, RunOutcome, RunStatus, ScanJob};
use crate::progress::{ProgressCallback, Stage};
use crate::scanner::perceptual::{
    threshold_distance, Fingerprint, MediaKind, PerceptualAlgorithm, HASH_BITS, IMAGE_EXTENSIONS,
    VIDEO_EXTENSIONS,
};
use crate::scanner::{ExtensionFilter, FileRecord, Scanner, WalkerConfig};

/// Default similarity percentage.
pub const DEFAULT_THRESHOLD: f64 = 80.0;

/// Configuration for the similarity detector.
#[derive(Clone)]
pub struct SimilarityConfig {
    /// Walker configuration. An empty extension list means "all media".
    pub walker_config: WalkerConfig,
    /// Executor configuration for fingerprint jobs.
    pub executor: ExecutorConfig,
    /// Perceptual hash algorithm.
    pub algorithm: PerceptualAlgorithm,
    /// Minimum similarity percentage (0–100) for two files to cluster.
    pub threshold: f64,
    /// How fingerprints within the threshold are grouped.
    pub policy: ClusterPolicy,
    /// Optional shutdown flag for graceful termination.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Optional progress callback for reporting.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            walker_config: WalkerConfig::default(),
            executor: ExecutorConfig::default(),
            algorithm: PerceptualAlgorithm::default(),
            threshold: DEFAULT_THRESHOLD,
            policy: ClusterPolicy::default(),
            shutdown_flag: None,
            progress_callback: None,
        }
    }
}

impl std::fmt::Debug for SimilarityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimilarityConfig")
            .field("walker_config", &self.walker_config)
            .field("executor", &self.executor)
            .field("algorithm", &self.algorithm)
            .field("threshold", &self.threshold)
            .field("policy", &self.policy)
            .field("shutdown_flag", &self.shutdown_flag)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl SimilarityConfig {
    /// Set the similarity percentage.
    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the clustering policy.
    #[must_use]
    pub fn with_cluster_policy(mut self, policy: ClusterPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the perceptual algorithm.
    #[must_use]
    pub fn with_algorithm(mut self, algorithm: PerceptualAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Set the worker budget. Zero means one per CPU.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.executor.workers = workers;
        self
    }

    /// Set the execution strategy.
    #[must_use]
    pub fn with_execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.executor.mode = mode;
        self
    }

    /// Set the whole executor configuration.
    #[must_use]
    pub fn with_executor_config(mut self, config: ExecutorConfig) -> Self {
        self.executor = config;
        self
    }

    /// Set the walker configuration.
    #[must_use]
    pub fn with_walker_config(mut self, config: WalkerConfig) -> Self {
        self.walker_config = config;
        self
    }

    /// Set the shutdown flag for graceful termination.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Largest Hamming distance allowed by the threshold.
    #[must_use]
    pub fn max_distance(&self) -> u32 {
        threshold_distance(self.threshold, HASH_BITS)
    }
}

/// Summary statistics from a similarity scan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimilaritySummary {
    /// Files found by the scanner
    pub total_files: usize,
    /// Files with a fingerprint
    pub fingerprinted: usize,
    /// Files skipped as unsupported
    pub unsupported: usize,
    /// Files skipped because they could not be read or decoded
    pub failed: usize,
    /// Clusters reported
    pub clusters: usize,
    /// Files that belong to a cluster
    pub clustered_files: usize,
    /// Hamming distance limit used
    pub max_distance: u32,
    /// Files left out because of recoverable errors
    pub skipped_files: usize,
    /// Directories that could not be listed
    pub skipped_directories: usize,
    /// Duration of the entire scan
    pub scan_duration: Duration,
}

/// Similarity run result.
pub type SimilarityOutcome = RunOutcome<SimilarityCluster, SimilaritySummary>;

/// Clusters images and videos by perceptual fingerprint distance.
///
/// # Example
///
/// ```no_run
/// use dupehound::similarity::{SimilarityConfig, SimilarityDetector};
/// use std::path::PathBuf;
///
/// let detector = SimilarityDetector::new(SimilarityConfig::default().with_threshold(90.0));
/// let outcome = detector.find_similar(&[PathBuf::from("/photos")]).unwrap();
///
/// for cluster in &outcome.groups {
///     println!("{} similar files", cluster.len());
/// }
/// ```
#[derive(Debug)]
pub struct SimilarityDetector {
    config: SimilarityConfig,
}

impl SimilarityDetector {
    /// Create a detector with the given configuration.
    #[must_use]
    pub fn new(config: SimilarityConfig) -> Self {
        Self { config }
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &SimilarityConfig {
        &self.config
    }

    /// Find clusters of similar media under the given roots.
    ///
    /// Images are only compared with images and videos with videos.
    /// Clusters are ordered images first, then by the path of their
    /// representative. A cancelled run reports no clusters.
    ///
    /// # Errors
    ///
    /// Returns [`FinderError`] before any stage runs if the threshold is
    /// outside 0–100 or the root set is invalid.
    pub fn find_similar(&self, roots: &[PathBuf]) -> Result<SimilarityOutcome, FinderError> {
        let threshold = self.config.threshold;
        if !(0.0..=100.0).contains(&threshold) {
            return Err(FinderError::InvalidThreshold(threshold));
        }

        let start_time = Instant::now();
        let mut job = ScanJob::new(
            roots,
            self.config.shutdown_flag.clone(),
            self.config.progress_callback.clone(),
        )?;
        let mut summary = SimilaritySummary {
            max_distance: self.config.max_distance(),
            ..SimilaritySummary::default()
        };

        // Scanning
        job.begin(Stage::Scanning, 0);
        let mut files = self.scan(&mut job);
        files.sort_by(|a, b| a.path.cmp(&b.path));
        summary.total_files = files.len();
        if job.is_cancelled() {
            return Ok(finish(job, RunStatus::Cancelled, Vec::new(), summary, start_time));
        }

        // Fingerprinting
        job.begin(Stage::Fingerprinting, files.len());
        log::info!(
            "Computing {} fingerprints for {} files",
            self.config.algorithm,
            files.len()
        );
        let executor =
            Executor::new(self.config.executor.clone()).with_shutdown_flag(job.cancel_flag());
        let jobs: Vec<Job> = files
            .iter()
            .enumerate()
            .map(|(i, f)| Job::new(i, f.path.clone(), Task::Fingerprint(self.config.algorithm)))
            .collect();

        let report = {
            let mut on_complete = |outcome: &JobOutcome| {
                job.record_completed(&outcome.path);
                if let Err(e) = &outcome.result {
                    if !e.is_cancelled() {
                        job.warn(ScanWarning::from(e));
                    }
                }
            };
            match executor.run(jobs, &mut on_complete) {
                Ok(report) => report,
                Err(e) => {
                    let error = FinderError::Executor(e);
                    log::error!("Similarity scan failed: {}", error);
                    let status = RunStatus::Failed {
                        error: error.to_string(),
                    };
                    return Ok(finish(job, status, Vec::new(), summary, start_time));
                }
            }
        };

        if report.cancelled || job.is_cancelled() {
            log::info!("Fingerprinting interrupted by shutdown signal");
            return Ok(finish(job, RunStatus::Cancelled, Vec::new(), summary, start_time));
        }

        let mut fingerprints: Vec<Option<Fingerprint>> = vec![None; files.len()];
        for outcome in report.outcomes {
            match outcome.result {
                Ok(Output::Fingerprint(fingerprint)) => fingerprints[outcome.id] = Some(fingerprint),
                Ok(Output::Digest(_)) => {
                    log::warn!("Unexpected digest for {}", outcome.path.display());
                    summary.failed += 1;
                }
                Err(e) => {
                    if ScanWarning::from(&e).kind == ErrorKind::Unsupported {
                        summary.unsupported += 1;
                    } else {
                        summary.failed += 1;
                    }
                }
            }
        }

        // Clustering
        job.begin(Stage::Clustering, 2);
        let mut images = Vec::new();
        let mut videos = Vec::new();
        for (file, fingerprint) in files.into_iter().zip(fingerprints) {
            let Some(fingerprint) = fingerprint else {
                continue;
            };
            summary.fingerprinted += 1;
            match MediaKind::of(&file.path) {
                Some(MediaKind::Video) => videos.push((file, fingerprint)),
                _ => images.push((file, fingerprint)),
            }
        }

        let max_distance = summary.max_distance;
        let policy = self.config.policy;
        let mut clusters = cluster(policy, MediaKind::Image, images, max_distance);
        job.record_step();
        clusters.extend(cluster(policy, MediaKind::Video, videos, max_distance));
        job.record_step();

        summary.clusters = clusters.len();
        summary.clustered_files = clusters.iter().map(SimilarityCluster::len).sum();
        log::info!(
            "Clustering complete: {} clusters covering {} files (max distance {}, {})",
            summary.clusters,
            summary.clustered_files,
            max_distance,
            policy
        );
        for cluster in &clusters {
            log::debug!(
                "Cluster {}: {} members",
                cluster.representative().to_hex(),
                cluster.len()
            );
        }

        Ok(finish(job, RunStatus::Completed, clusters, summary, start_time))
    }

    fn scan(&self, job: &mut ScanJob) -> Vec<FileRecord> {
        let mut walker_config = self.config.walker_config.clone();
        if walker_config.extensions.is_empty() {
            walker_config.extensions =
                ExtensionFilter::new(IMAGE_EXTENSIONS.iter().chain(VIDEO_EXTENSIONS));
        }

        let scanner =
            Scanner::new(job.roots().to_vec(), walker_config).with_shutdown_flag(job.cancel_flag());
        let mut files = Vec::new();
        for entry in scanner.scan() {
            match entry {
                Ok(file) => {
                    job.record_scanned(&file.path);
                    files.push(file);
                }
                Err(e) => job.warn(ScanWarning::from(&e)),
            }
            if job.is_cancelled() {
                break;
            }
        }

        log::info!("Scan complete: {} candidate files found", files.len());
        files
    }
}

fn finish(
    job: ScanJob,
    status: RunStatus,
    clusters: Vec<SimilarityCluster>,
    mut summary: SimilaritySummary,
    start_time: Instant,
) -> SimilarityOutcome {
    summary.scan_duration = start_time.elapsed();
    let mut outcome = job.finish(status, clusters, summary);
    outcome.summary.skipped_files = outcome.skipped_files();
    outcome.summary.skipped_directories = outcome.skipped_directories();
    outcome
}
