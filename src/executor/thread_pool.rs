//! Shared-memory worker threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};

use super::{BatchReport, ExecutorError, Job, JobOutcome, WorkerContext};

/// Run `jobs` on a dedicated rayon pool of `workers` threads.
///
/// Each job is spawned onto the pool and reports through a completion
/// channel, so the driver sees outcomes as soon as they finish. A dedicated
/// pool keeps I/O parallelism bounded independently of the global pool.
pub(super) fn run(
    jobs: Vec<Job>,
    workers: usize,
    context: Arc<WorkerContext>,
    shutdown: &Arc<AtomicBool>,
    on_complete: &mut dyn FnMut(&JobOutcome),
) -> Result<BatchReport, ExecutorError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .thread_name(|i| format!("dupehound-worker-{i}"))
        .build()
        .map_err(|e| ExecutorError::Pool(e.to_string()))?;

    let total = jobs.len();
    let (tx, rx) = mpsc::channel::<JobOutcome>();

    for job in jobs {
        let tx = tx.clone();
        let context = Arc::clone(&context);
        let shutdown = Arc::clone(shutdown);

        pool.spawn(move || {
            let outcome = if shutdown.load(Ordering::SeqCst) {
                JobOutcome::cancelled(job)
            } else {
                let result = context.execute(&job);
                JobOutcome {
                    id: job.id,
                    path: job.path,
                    result,
                }
            };
            // The driver only hangs up after every sender is gone
            let _ = tx.send(outcome);
        });
    }
    drop(tx);

    let mut outcomes = Vec::with_capacity(total);
    for outcome in rx {
        on_complete(&outcome);
        outcomes.push(outcome);
    }

    Ok(BatchReport {
        outcomes,
        cancelled: shutdown.load(Ordering::SeqCst),
    })
}
