//! Ctrl+C handling and the run cancellation handle.
//!
//! A [`ShutdownHandler`] owns the `Arc<AtomicBool>` every pipeline polls:
//! the walker between entries, the hasher between chunks, and the executor
//! before dispatching each job. Setting it never interrupts a job that is
//! already running; the run drains and reports `cancelled`.
//!
//! ```rust,no_run
//! use dupehound::duplicates::FinderConfig;
//! use dupehound::signal::install_handler;
//!
//! let handler = install_handler().expect("signal handler");
//! let config = FinderConfig::default().with_shutdown_flag(handler.get_flag());
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Exit code for SIGINT (128 + 2).
pub const EXIT_CODE_INTERRUPTED: i32 = 130;

/// Shared cancellation flag.
///
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandler {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandler {
    /// Create a handler with no cancellation requested.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Request cancellation. Idempotent.
    pub fn request_shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// The flag to pass into finders, walkers, hashers and executors.
    #[must_use]
    pub fn get_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    /// Clear the flag so the handler can drive another run.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Error type for signal handler installation.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// Failed to install the Ctrl+C handler.
    #[error("Failed to install signal handler: {0}")]
    InstallFailed(#[from] ctrlc::Error),
}

static GLOBAL_HANDLER: OnceLock<ShutdownHandler> = OnceLock::new();

/// Install a Ctrl+C hook that requests cancellation.
///
/// `ctrlc` allows one hook per process. Later calls (several `run_app`
/// invocations in one test binary, say) get the already installed handler
/// with its flag reset. If another component registered a hook first, an
/// unhooked handler is returned; it still works through
/// [`ShutdownHandler::request_shutdown`].
///
/// # Errors
///
/// Currently always succeeds; the `Result` is kept for callers that want to
/// treat a missing hook as fatal in the future.
pub fn install_handler() -> Result<ShutdownHandler, SignalError> {
    if let Some(handler) = GLOBAL_HANDLER.get() {
        handler.reset();
        return Ok(handler.clone());
    }

    let handler = ShutdownHandler::new();
    let flag = handler.get_flag();

    let installed = ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
        let _ = writeln!(std::io::stderr(), "\nInterrupted. Finishing in-flight work...");
        let _ = std::io::stderr().flush();
        log::info!("Shutdown signal received");
    });

    match installed {
        Ok(()) => {
            let _ = GLOBAL_HANDLER.set(handler.clone());
            Ok(handler)
        }
        Err(e) => {
            if let Some(existing) = GLOBAL_HANDLER.get() {
                existing.reset();
                return Ok(existing.clone());
            }
            log::debug!("Ctrl+C handler not installed ({e}), using unhooked handler");
            let fallback = ShutdownHandler::new();
            let _ = GLOBAL_HANDLER.set(fallback.clone());
            Ok(fallback)
        }
    }
}

/// A handler with no signal hook, for tests and embedding.
#[must_use]
pub fn create_handler() -> ShutdownHandler {
    ShutdownHandler::new()
}
