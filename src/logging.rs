//! Logging setup for the `log` facade using `env_logger`.
//!
//! The level comes from, in priority order:
//!
//! 1. `RUST_LOG`, if set
//! 2. `--quiet` (errors only) or `--verbose` (`-v` debug, `-vv` trace)
//! 3. info
//!
//! Debug builds prefix records with a timestamp, and with the module path
//! from `-v` on. Release builds print level and message only.
//!
//! Stage boundaries and run summaries log at info, group decisions at debug,
//! per-file cache hits and digests at trace, recovered errors at warn.

use env_logger::Builder;
use log::LevelFilter;
use std::env;
use std::io::Write;

/// Initialize logging once, before any pipeline runs.
///
/// # Arguments
///
/// * `verbose` - Verbosity count from the CLI (0=info, 1=debug, 2+=trace)
/// * `quiet` - Errors only; ignored when `RUST_LOG` is set
///
/// A second call in the same process keeps the first logger.
pub fn init_logging(verbose: u8, quiet: bool) {
    let from_env = env::var("RUST_LOG").ok();

    let mut builder = Builder::new();
    match &from_env {
        Some(_) => {
            builder.parse_default_env();
        }
        None => {
            builder.filter_level(determine_level(verbose, quiet));
        }
    }
    configure_format(&mut builder, verbose);
    if builder.try_init().is_err() {
        return;
    }

    match from_env {
        Some(spec) => log::debug!("Logging configured from RUST_LOG={spec}"),
        None => log::debug!("Logging initialized at level: {}", current_level_name()),
    }
}

/// Initialize logging for a worker process.
///
/// Workers share stderr with the parent, so they stay at warn unless
/// `RUST_LOG` says otherwise. Safe to call more than once.
pub fn init_worker_logging() {
    let mut builder = Builder::new();
    if env::var("RUST_LOG").is_ok() {
        builder.parse_default_env();
    } else {
        builder.filter_level(LevelFilter::Warn);
    }
    builder.format(|buf, record| {
        writeln!(
            buf,
            "[worker {}] {:<5} {}",
            std::process::id(),
            record.level(),
            record.args()
        )
    });
    let _ = builder.try_init();
}

fn determine_level(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Error;
    }
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn configure_format(builder: &mut Builder, verbose: u8) {
    #[cfg(debug_assertions)]
    {
        builder.format(move |buf, record| {
            let timestamp = buf.timestamp_seconds();
            let level = record.level();
            let level_style = buf.default_level_style(level);

            if verbose >= 1 {
                writeln!(
                    buf,
                    "{} {level_style}{:<5}{level_style:#} [{}] {}",
                    timestamp,
                    level,
                    record.module_path().unwrap_or("unknown"),
                    record.args()
                )
            } else {
                writeln!(
                    buf,
                    "{} {level_style}{:<5}{level_style:#} {}",
                    timestamp,
                    level,
                    record.args()
                )
            }
        });
    }

    #[cfg(not(debug_assertions))]
    {
        let _ = verbose;
        builder.format(|buf, record| {
            let level = record.level();
            let level_style = buf.default_level_style(level);
            writeln!(
                buf,
                "{level_style}{:<5}{level_style:#} {}",
                level,
                record.args()
            )
        });
    }
}

/// Name of the current maximum log level.
pub fn current_level_name() -> &'static str {
    match log::max_level() {
        LevelFilter::Off => "off",
        LevelFilter::Error => "error",
        LevelFilter::Warn => "warn",
        LevelFilter::Info => "info",
        LevelFilter::Debug => "debug",
        LevelFilter::Trace => "trace",
    }
}
