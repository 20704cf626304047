//! Job execution shared by every strategy, and the worker process protocol.
//!
//! A worker process reads one JSON [`Job`] per line on stdin and writes one
//! JSON [`WorkerReply`] per line on stdout, in the same order. It exits when
//! stdin closes.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{Job, JobError, Output, Task};
use crate::scanner::perceptual::{PerceptualError, PerceptualHasher};
use crate::scanner::video::VideoTools;
use crate::scanner::{HashError, Hasher};

/// Everything a worker needs to run a job.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    hasher: Hasher,
    video: Option<VideoTools>,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl WorkerContext {
    /// Create a context hashing `partial_bytes` leading bytes for partial digests.
    #[must_use]
    pub fn new(partial_bytes: u64) -> Self {
        Self {
            hasher: Hasher::new().with_partial_bytes(partial_bytes),
            video: None,
            shutdown_flag: None,
        }
    }

    /// Set the shutdown flag polled between chunks and between video frames.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.hasher = self.hasher.with_shutdown_flag(flag.clone());
        self.shutdown_flag = Some(flag);
        self
    }

    /// Set the tools used for video fingerprints.
    #[must_use]
    pub fn with_video_tools(mut self, tools: Option<VideoTools>) -> Self {
        self.video = tools;
        self
    }

    /// Run one job.
    ///
    /// # Errors
    ///
    /// Returns [`JobError`] if the file cannot be read or fingerprinted.
    pub fn execute(&self, job: &Job) -> Result<Output, JobError> {
        match job.task {
            Task::Digest(kind) => {
                let digest = self.hasher.digest(&job.path, kind)?;
                log::trace!("{} digest computed: {}", kind, job.path.display());
                Ok(Output::Digest(digest))
            }
            Task::Fingerprint(algorithm) => {
                let hasher = PerceptualHasher::new(algorithm)
                    .with_video_tools(self.video.clone())
                    .with_shutdown_flag(self.shutdown_flag.clone());
                Ok(Output::Fingerprint(hasher.fingerprint(&job.path)?))
            }
        }
    }
}

/// Arguments passed to a worker process after the subcommand name.
#[must_use]
pub fn worker_args(partial_bytes: u64, video: bool) -> Vec<String> {
    let mut args = vec![
        "hash-worker".to_string(),
        "--partial-bytes".to_string(),
        partial_bytes.to_string(),
    ];
    if !video {
        args.push("--no-video".to_string());
    }
    args
}

/// Error category carried over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireErrorKind {
    /// File not found
    NotFound,
    /// Permission denied
    PermissionDenied,
    /// Other read failure
    Io,
    /// Stopped by cancellation
    Cancelled,
    /// Media could not be decoded
    Decode,
    /// Media type not supported
    Unsupported,
    /// External video tools missing or failing
    ToolUnavailable,
    /// Worker-side failure unrelated to the file
    Worker,
}

/// A [`JobError`] flattened for transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    /// Category
    pub kind: WireErrorKind,
    /// Detail text
    pub message: String,
}

impl From<&JobError> for WireError {
    fn from(error: &JobError) -> Self {
        let (kind, message) = match error {
            JobError::Hash(e) | JobError::Perceptual(PerceptualError::Read(e)) => match e {
                HashError::NotFound(_) => (WireErrorKind::NotFound, String::new()),
                HashError::PermissionDenied(_) => (WireErrorKind::PermissionDenied, String::new()),
                HashError::Io { source, .. } => (WireErrorKind::Io, source.to_string()),
                HashError::Cancelled(_) => (WireErrorKind::Cancelled, String::new()),
            },
            JobError::Perceptual(PerceptualError::Decode { message, .. }) => {
                (WireErrorKind::Decode, message.clone())
            }
            JobError::Perceptual(PerceptualError::Unsupported(_)) => {
                (WireErrorKind::Unsupported, String::new())
            }
            JobError::Perceptual(PerceptualError::ToolUnavailable { message, .. }) => {
                (WireErrorKind::ToolUnavailable, message.clone())
            }
            JobError::Worker { message, .. } => (WireErrorKind::Worker, message.clone()),
        };
        Self { kind, message }
    }
}

impl WireError {
    /// Rebuild the job error for `path`.
    #[must_use]
    pub fn into_job_error(self, path: &Path) -> JobError {
        let path_buf = path.to_path_buf();
        match self.kind {
            WireErrorKind::NotFound => HashError::NotFound(path_buf).into(),
            WireErrorKind::PermissionDenied => HashError::PermissionDenied(path_buf).into(),
            WireErrorKind::Io => HashError::Io {
                path: path_buf,
                source: Arc::new(std::io::Error::other(self.message)),
            }
            .into(),
            WireErrorKind::Cancelled => JobError::cancelled(path),
            WireErrorKind::Decode => PerceptualError::Decode {
                path: path_buf,
                message: self.message,
            }
            .into(),
            WireErrorKind::Unsupported => PerceptualError::Unsupported(path_buf).into(),
            WireErrorKind::ToolUnavailable => PerceptualError::ToolUnavailable {
                path: path_buf,
                message: self.message,
            }
            .into(),
            WireErrorKind::Worker => JobError::Worker {
                path: path_buf,
                message: self.message,
            },
        }
    }
}

/// One response line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerReply {
    /// Identifier of the job answered
    pub id: usize,
    /// Output or error
    pub result: Result<Output, WireError>,
}

impl WorkerReply {
    /// Convert into an outcome for a job on `path`.
    #[must_use]
    pub fn into_outcome(self, path: PathBuf) -> super::JobOutcome {
        let result = self.result.map_err(|e| e.into_job_error(&path));
        super::JobOutcome {
            id: self.id,
            path,
            result,
        }
    }
}

/// Serve jobs from `reader` until it closes, writing replies to `writer`.
///
/// A line that is not a valid job is answered with a worker error for id 0
/// and an empty path, so the driver never waits on a silent worker.
///
/// # Errors
///
/// Returns an I/O error if reading or writing the pipes fails.
pub fn serve<R: BufRead, W: Write>(
    reader: R,
    mut writer: W,
    context: &WorkerContext,
) -> std::io::Result<usize> {
    let mut served = 0;

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<Job>(&line) {
            Ok(job) => WorkerReply {
                id: job.id,
                result: context.execute(&job).map_err(|e| WireError::from(&e)),
            },
            Err(e) => WorkerReply {
                id: 0,
                result: Err(WireError {
                    kind: WireErrorKind::Worker,
                    message: format!("malformed job: {e}"),
                }),
            },
        };

        serde_json::to_writer(&mut writer, &reply)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        served += 1;
    }

    log::debug!("Worker served {} jobs", served);
    Ok(served)
}
