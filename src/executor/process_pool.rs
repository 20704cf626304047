//! Isolated worker processes.
//!
//! Each child runs `dupehound hash-worker` and is driven by one feeder thread
//! that writes a job, waits for the reply and forwards it to the driver. A
//! crashing child fails only the job it was holding; the others keep going.
//! On cancellation the driver kills every child, so in-flight jobs end at
//! once and are reported as cancelled.

use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Mutex};
use std::time::Duration;

use super::worker::WorkerReply;
use super::{BatchReport, ExecutorError, Job, JobError, JobOutcome};

/// How often the driver checks the shutdown flag while waiting on workers.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

struct WorkerPipes {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

pub(super) fn run(
    jobs: Vec<Job>,
    workers: usize,
    program: &Path,
    args: &[String],
    shutdown: &AtomicBool,
    on_complete: &mut dyn FnMut(&JobOutcome),
) -> Result<BatchReport, ExecutorError> {
    let total = jobs.len();
    let mut children = Vec::with_capacity(workers);
    let mut pipes = Vec::with_capacity(workers);

    for _ in 0..workers.max(1) {
        match spawn_worker(program, args) {
            Ok((child, worker_pipes)) => {
                children.push(child);
                pipes.push(worker_pipes);
            }
            Err(e) => {
                kill_all(&mut children);
                return Err(e);
            }
        }
    }
    log::debug!("Started {} worker processes", children.len());

    let queue = Mutex::new(VecDeque::from(jobs));
    let (tx, rx) = mpsc::channel::<JobOutcome>();
    let mut outcomes = Vec::with_capacity(total);

    std::thread::scope(|scope| {
        for worker_pipes in pipes {
            let tx = tx.clone();
            let queue = &queue;
            scope.spawn(move || feed(worker_pipes, queue, shutdown, &tx));
        }
        drop(tx);

        let mut killed = false;
        loop {
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(outcome) => {
                    on_complete(&outcome);
                    outcomes.push(outcome);
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
            if !killed && shutdown.load(Ordering::SeqCst) {
                log::debug!("Cancellation requested, stopping worker processes");
                kill_all(&mut children);
                killed = true;
            }
        }
    });

    for child in &mut children {
        if let Err(e) = child.wait() {
            log::warn!("Failed to reap worker process {}: {}", child.id(), e);
        }
    }

    // Jobs left queued when every worker has gone
    let cancelled = shutdown.load(Ordering::SeqCst);
    let leftover: Vec<Job> = queue
        .into_inner()
        .map(Vec::from)
        .unwrap_or_default();
    for job in leftover {
        let outcome = if cancelled {
            JobOutcome::cancelled(job)
        } else {
            JobOutcome {
                id: job.id,
                result: Err(JobError::Worker {
                    path: job.path.clone(),
                    message: "no worker process left".to_string(),
                }),
                path: job.path,
            }
        };
        on_complete(&outcome);
        outcomes.push(outcome);
    }

    Ok(BatchReport {
        outcomes,
        cancelled,
    })
}

fn spawn_worker(program: &Path, args: &[String]) -> Result<(Child, WorkerPipes), ExecutorError> {
    let spawn_error = |source| ExecutorError::Spawn {
        program: program.to_path_buf(),
        source,
    };

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(spawn_error)?;

    let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
        let _ = child.kill();
        return Err(spawn_error(std::io::Error::other("worker pipes unavailable")));
    };

    Ok((
        child,
        WorkerPipes {
            stdin,
            stdout: BufReader::new(stdout),
        },
    ))
}

fn kill_all(children: &mut [Child]) {
    for child in children {
        // Already exited
        let _ = child.kill();
    }
}

/// Pull jobs from the queue and run them on one worker until the queue is
/// empty, cancellation is requested or the worker dies.
fn feed(
    mut pipes: WorkerPipes,
    queue: &Mutex<VecDeque<Job>>,
    shutdown: &AtomicBool,
    tx: &mpsc::Sender<JobOutcome>,
) {
    let mut line = String::new();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        let Some(job) = queue.lock().ok().and_then(|mut q| q.pop_front()) else {
            break;
        };

        let outcome = match exchange(&mut pipes, &job, &mut line) {
            Ok(reply) if reply.id == job.id => reply.into_outcome(job.path),
            Ok(reply) => worker_failure(
                job,
                format!("reply for job {} while waiting on another job", reply.id),
                shutdown,
            ),
            Err(message) => {
                let outcome = worker_failure(job, message, shutdown);
                let _ = tx.send(outcome);
                break;
            }
        };

        if tx.send(outcome).is_err() {
            break;
        }
    }
    // Dropping stdin closes the pipe and the worker exits
}

fn exchange(pipes: &mut WorkerPipes, job: &Job, line: &mut String) -> Result<WorkerReply, String> {
    let request = serde_json::to_string(job).map_err(|e| format!("cannot encode job: {e}"))?;
    writeln!(pipes.stdin, "{request}")
        .and_then(|()| pipes.stdin.flush())
        .map_err(|e| format!("cannot send job: {e}"))?;

    line.clear();
    match pipes.stdout.read_line(line) {
        Ok(0) => Err("worker exited".to_string()),
        Ok(_) => serde_json::from_str(line.trim_end()).map_err(|e| format!("bad reply: {e}")),
        Err(e) => Err(format!("cannot read reply: {e}")),
    }
}

fn worker_failure(job: Job, message: String, shutdown: &AtomicBool) -> JobOutcome {
    if shutdown.load(Ordering::SeqCst) {
        return JobOutcome::cancelled(job);
    }
    log::debug!("Worker failed on {}: {}", job.path.display(), message);
    JobOutcome {
        id: job.id,
        result: Err(JobError::Worker {
            path: job.path.clone(),
            message,
        }),
        path: job.path,
    }
}
