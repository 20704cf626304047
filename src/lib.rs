//! dupehound - duplicate and near-duplicate file finder
//!
//! Two pipelines share one scanner, one job executor and one hash cache:
//!
//! - [`duplicates::DuplicateFinder`] narrows candidates by size, then a
//!   partial BLAKE3 digest, then a full digest, and reports groups of
//!   byte-identical files.
//! - [`similarity::SimilarityDetector`] fingerprints images (and videos,
//!   through ffmpeg) with a perceptual hash and clusters files whose
//!   fingerprints are within a Hamming distance threshold.
//!
//! Both run through the stages in [`progress::Stage`], report through a
//! [`progress::ProgressCallback`], honor a shared cancellation flag, and
//! return a [`job::RunOutcome`] with recovered errors attached as
//! [`error::ScanWarning`]s.

pub mod cache;
pub mod cli;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod executor;
pub mod job;
pub mod logging;
pub mod output;
pub mod progress;
pub mod scanner;
pub mod signal;
pub mod similarity;

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;

use crate::cache::HashCache;
use crate::cli::{
    CacheAction, CacheArgs, Cli, Commands, OutputFormat, ScanArgs, SimilarArgs, WorkerArgs,
};
use crate::config::Settings;
use crate::duplicates::DuplicateFinder;
use crate::error::ExitCode;
use crate::executor::{worker, WorkerContext};
use crate::output::{text, JsonOutput, JsonSimilarityOutput};
use crate::progress::{Progress, ProgressCallback};
use crate::scanner::video::VideoTools;
use crate::similarity::SimilarityDetector;

/// Run the command described by `cli`.
///
/// # Errors
///
/// Returns an error for invalid settings or roots, an unusable cache in the
/// `cache` subcommand, or a failure writing the report. Runs that start and
/// then fail are reported through the exit code instead.
pub fn run_app(cli: Cli) -> anyhow::Result<ExitCode> {
    match &cli.command {
        Commands::HashWorker(args) => run_worker(args),
        Commands::Scan(args) => {
            let mut settings = load_settings(&cli)?;
            args.apply(&mut settings);
            run_scan(args, &settings, cli.quiet)
        }
        Commands::Similar(args) => {
            let mut settings = load_settings(&cli)?;
            args.apply(&mut settings);
            run_similar(args, &settings, cli.quiet)
        }
        Commands::Cache(args) => {
            let settings = load_settings(&cli)?;
            run_cache(args, &settings)
        }
    }
}

fn load_settings(cli: &Cli) -> anyhow::Result<Settings> {
    logging::init_logging(cli.verbose, cli.quiet);
    Ok(Settings::load(cli.config.as_deref())?)
}

fn run_scan(args: &ScanArgs, settings: &Settings, quiet: bool) -> anyhow::Result<ExitCode> {
    let cache = match settings.open_cache() {
        Ok(cache) => cache,
        Err(e) => {
            log::warn!("Hash cache unavailable, continuing without it: {e}");
            None
        }
    };

    let handler = signal::install_handler()?;
    let progress: Arc<dyn ProgressCallback> = Arc::new(Progress::new(quiet));
    let config = settings
        .finder_config(cache)
        .with_shutdown_flag(handler.get_flag())
        .with_progress_callback(progress);

    log::info!(
        "Scanning {} root(s) for duplicates ({} mode)",
        args.walk.paths.len(),
        settings.execution_mode
    );
    let outcome = DuplicateFinder::new(config).find_duplicates(&args.walk.paths)?;
    let code = ExitCode::for_run(&outcome.status, outcome.groups.len(), outcome.skipped_entries());

    let mut stdout = io::stdout().lock();
    match args.walk.output {
        OutputFormat::Text => text::write_duplicates(&mut stdout, &outcome)?,
        OutputFormat::Json => JsonOutput::new(&outcome, code).write_to(&mut stdout, true)?,
    }
    Ok(code)
}

fn run_similar(args: &SimilarArgs, settings: &Settings, quiet: bool) -> anyhow::Result<ExitCode> {
    let handler = signal::install_handler()?;
    let progress: Arc<dyn ProgressCallback> = Arc::new(Progress::new(quiet));
    let config = settings
        .similarity_config()
        .with_shutdown_flag(handler.get_flag())
        .with_progress_callback(progress);

    if settings.video && config.executor.video.is_none() {
        log::info!("ffmpeg/ffprobe not found on PATH, videos will be skipped");
    }

    let outcome = SimilarityDetector::new(config).find_similar(&args.walk.paths)?;
    let code = ExitCode::for_run(&outcome.status, outcome.groups.len(), outcome.skipped_entries());

    let mut stdout = io::stdout().lock();
    match args.walk.output {
        OutputFormat::Text => text::write_clusters(&mut stdout, &outcome)?,
        OutputFormat::Json => {
            JsonSimilarityOutput::new(&outcome, code).write_to(&mut stdout, true)?;
        }
    }
    Ok(code)
}

fn run_cache(args: &CacheArgs, settings: &Settings) -> anyhow::Result<ExitCode> {
    let path = args
        .cache
        .clone()
        .or_else(|| settings.cache_path())
        .context("No cache path configured and no platform cache directory available")?;
    let cache = HashCache::new(&path)
        .with_context(|| format!("Failed to open hash cache at {}", path.display()))?;

    let mut stdout = io::stdout().lock();
    match &args.action {
        CacheAction::Stats { output } => {
            let stats = cache.stats()?;
            match output {
                OutputFormat::Text => {
                    writeln!(stdout, "Cache:         {}", path.display())?;
                    text::write_cache_stats(&mut stdout, &stats)?;
                }
                OutputFormat::Json => {
                    serde_json::to_writer_pretty(&mut stdout, &stats)?;
                    writeln!(stdout)?;
                }
            }
        }
        CacheAction::Clear => {
            let removed = cache.clear()?;
            writeln!(stdout, "Removed {removed} cache entries")?;
        }
        CacheAction::Prune => {
            let removed = cache.prune_missing()?;
            writeln!(stdout, "Pruned {removed} entries for missing files")?;
        }
        CacheAction::Invalidate { path } => {
            let target = std::fs::canonicalize(path).unwrap_or_else(|_| PathBuf::from(path));
            let removed = if target.is_dir() {
                cache.invalidate_prefix(&target)?
            } else {
                cache.invalidate(&target)?
            };
            writeln!(stdout, "Invalidated {removed} entries under {}", target.display())?;
        }
    }
    cache.close()?;
    Ok(ExitCode::Success)
}

/// Serve jobs from the parent process until stdin closes.
fn run_worker(args: &WorkerArgs) -> anyhow::Result<ExitCode> {
    logging::init_worker_logging();

    // Ctrl+C reaches the whole process group; stop between chunks and let
    // the parent decide what happens next.
    let flag = Arc::new(AtomicBool::new(false));
    let hook = Arc::clone(&flag);
    if let Err(e) = ctrlc::set_handler(move || hook.store(true, Ordering::SeqCst)) {
        log::debug!("Worker Ctrl+C hook not installed: {e}");
    }

    let video = if args.no_video {
        None
    } else {
        VideoTools::detect()
    };
    let context = WorkerContext::new(args.partial_bytes)
        .with_shutdown_flag(flag)
        .with_video_tools(video);

    worker::serve(io::stdin().lock(), io::stdout().lock(), &context)?;
    Ok(ExitCode::Success)
}
