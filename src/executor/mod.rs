//! Parallel execution of hashing and fingerprinting jobs.
//!
//! The driver hands a batch of independent [`Job`]s to an [`Executor`] and
//! receives one [`JobOutcome`] per job, in completion order, through a
//! callback. Three strategies produce identical outputs:
//!
//! - [`ExecutionMode::Threads`]: a rayon pool in this process.
//! - [`ExecutionMode::Processes`]: isolated `dupehound hash-worker` children
//!   fed line-delimited JSON (see [`worker`]).
//! - [`ExecutionMode::Disabled`]: jobs run one by one on the driver thread.
//!
//! # Cancellation
//!
//! The shutdown flag is polled before every job and between chunks inside the
//! hasher. Once it is raised no new job starts; every job that did not finish
//! is reported with a cancelled error and the batch is marked cancelled.

pub mod process_pool;
pub mod thread_pool;
pub mod worker;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scanner::perceptual::{Fingerprint, PerceptualAlgorithm, PerceptualError};
use crate::scanner::video::VideoTools;
use crate::scanner::{DigestKind, Hash, HashError, PARTIAL_HASH_BYTES};

pub use worker::WorkerContext;

/// How jobs are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Shared-memory worker threads
    #[default]
    Threads,
    /// Isolated worker processes
    Processes,
    /// Sequential execution on the calling thread
    Disabled,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Threads => write!(f, "threads"),
            Self::Processes => write!(f, "processes"),
            Self::Disabled => write!(f, "disabled"),
        }
    }
}

/// What a job computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    /// Content digest of the given kind
    Digest(DigestKind),
    /// Perceptual fingerprint with the given algorithm
    Fingerprint(PerceptualAlgorithm),
}

/// One unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Identifier echoed back in the outcome
    pub id: usize,
    /// File to process
    pub path: PathBuf,
    /// Computation to run
    pub task: Task,
}

impl Job {
    /// Create a job.
    #[must_use]
    pub fn new(id: usize, path: impl Into<PathBuf>, task: Task) -> Self {
        Self {
            id,
            path: path.into(),
            task,
        }
    }
}

/// Successful job result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Output {
    /// A content digest
    Digest(Hash),
    /// A perceptual fingerprint
    Fingerprint(Fingerprint),
}

/// Why a single job failed.
#[derive(Debug, Clone, Error)]
pub enum JobError {
    /// Reading the file failed or was cancelled.
    #[error(transparent)]
    Hash(#[from] HashError),

    /// Fingerprinting failed.
    #[error(transparent)]
    Perceptual(#[from] PerceptualError),

    /// A worker process died or answered with garbage.
    #[error("Worker failed on {path}: {message}")]
    Worker {
        /// File the worker was processing
        path: PathBuf,
        /// What went wrong
        message: String,
    },
}

impl JobError {
    /// Cancellation marker for a job that did not run to completion.
    #[must_use]
    pub fn cancelled(path: &Path) -> Self {
        Self::Hash(HashError::Cancelled(path.to_path_buf()))
    }

    /// Whether the job stopped because of cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Hash(e) | Self::Perceptual(PerceptualError::Read(e)) => e.is_cancelled(),
            _ => false,
        }
    }

    /// Path the error refers to.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Hash(e) => e.path(),
            Self::Perceptual(e) => e.path(),
            Self::Worker { path, .. } => path,
        }
    }
}

/// Result of one job, tagged with its identity.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    /// Identifier of the job
    pub id: usize,
    /// File the job processed
    pub path: PathBuf,
    /// What the job produced
    pub result: Result<Output, JobError>,
}

impl JobOutcome {
    /// Outcome for a job that never started.
    #[must_use]
    pub fn cancelled(job: Job) -> Self {
        Self {
            id: job.id,
            result: Err(JobError::cancelled(&job.path)),
            path: job.path,
        }
    }
}

/// Everything a batch produced.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// One outcome per submitted job, in completion order
    pub outcomes: Vec<JobOutcome>,
    /// Whether cancellation was observed during the batch
    pub cancelled: bool,
}

/// Errors that prevent a batch from running at all.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The thread pool could not be built.
    #[error("Failed to build worker thread pool: {0}")]
    Pool(String),

    /// The worker executable could not be located.
    #[error("Cannot locate worker executable: {0}")]
    WorkerProgram(#[source] std::io::Error),

    /// A worker process could not be started.
    #[error("Failed to spawn worker {program}: {source}")]
    Spawn {
        /// Program that failed to start
        program: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Configuration for an [`Executor`].
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Execution strategy.
    pub mode: ExecutionMode,
    /// Worker budget. Zero means one per available CPU.
    pub workers: usize,
    /// Executable run as a worker process. Defaults to the current executable.
    pub worker_program: Option<PathBuf>,
    /// Leading bytes covered by a partial digest.
    pub partial_bytes: u64,
    /// Tools used for video fingerprints, if any.
    pub video: Option<VideoTools>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::default(),
            workers: 0,
            worker_program: None,
            partial_bytes: PARTIAL_HASH_BYTES,
            video: None,
        }
    }
}

impl ExecutorConfig {
    /// Set the execution strategy.
    #[must_use]
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the worker budget.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the executable spawned in process mode.
    #[must_use]
    pub fn with_worker_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.worker_program = Some(program.into());
        self
    }

    /// Set the partial digest budget.
    #[must_use]
    pub fn with_partial_bytes(mut self, bytes: u64) -> Self {
        self.partial_bytes = bytes.max(1);
        self
    }

    /// Set the video tools.
    #[must_use]
    pub fn with_video_tools(mut self, tools: Option<VideoTools>) -> Self {
        self.video = tools;
        self
    }

    /// Worker count after resolving the automatic setting.
    #[must_use]
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            std::thread::available_parallelism().map_or(4, |n| n.get())
        }
    }
}

/// Runs batches of jobs with the configured strategy.
#[derive(Debug, Clone)]
pub struct Executor {
    config: ExecutorConfig,
    shutdown_flag: Arc<AtomicBool>,
}

impl Executor {
    /// Create an executor with its own, never-raised shutdown flag.
    #[must_use]
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            config,
            shutdown_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Set the shutdown flag for cooperative cancellation.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = flag;
        self
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag.load(Ordering::SeqCst)
    }

    fn context(&self) -> WorkerContext {
        WorkerContext::new(self.config.partial_bytes)
            .with_shutdown_flag(Arc::clone(&self.shutdown_flag))
            .with_video_tools(self.config.video.clone())
    }

    /// Run a batch, calling `on_complete` for each outcome as it arrives.
    ///
    /// Exactly one outcome is produced per job, whether it succeeded, failed
    /// or was cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError`] if the workers cannot be started.
    pub fn run(
        &self,
        jobs: Vec<Job>,
        on_complete: &mut dyn FnMut(&JobOutcome),
    ) -> Result<BatchReport, ExecutorError> {
        if jobs.is_empty() {
            return Ok(BatchReport {
                outcomes: Vec::new(),
                cancelled: self.is_shutdown_requested(),
            });
        }

        let workers = self.config.effective_workers().min(jobs.len());
        log::debug!(
            "Executing {} jobs in {} mode with {} workers",
            jobs.len(),
            self.config.mode,
            workers
        );

        let mut report = match self.config.mode {
            ExecutionMode::Threads => thread_pool::run(
                jobs,
                workers,
                Arc::new(self.context()),
                &self.shutdown_flag,
                on_complete,
            )?,
            ExecutionMode::Processes => {
                let program = match &self.config.worker_program {
                    Some(program) => program.clone(),
                    None => std::env::current_exe().map_err(ExecutorError::WorkerProgram)?,
                };
                let args = worker::worker_args(self.config.partial_bytes, self.config.video.is_some());
                process_pool::run(jobs, workers, &program, &args, &self.shutdown_flag, on_complete)?
            }
            ExecutionMode::Disabled => self.run_sequential(jobs, on_complete),
        };

        report.cancelled |= self.is_shutdown_requested();
        Ok(report)
    }

    fn run_sequential(&self, jobs: Vec<Job>, on_complete: &mut dyn FnMut(&JobOutcome)) -> BatchReport {
        let context = self.context();
        let mut outcomes = Vec::with_capacity(jobs.len());

        for job in jobs {
            let outcome = if self.is_shutdown_requested() {
                JobOutcome::cancelled(job)
            } else {
                let result = context.execute(&job);
                JobOutcome {
                    id: job.id,
                    path: job.path,
                    result,
                }
            };
            on_complete(&outcome);
            outcomes.push(outcome);
        }

        BatchReport {
            outcomes,
            cancelled: self.is_shutdown_requested(),
        }
    }
}
