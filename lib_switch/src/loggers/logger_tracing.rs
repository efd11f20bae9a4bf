//! # Tracing Setup
//!
//! Installs the global subscriber:
//!
//! - an `EnvFilter` taken from `RUST_LOG`, falling back to the configured level,
//! - a human-readable console layer,
//! - a JSON layer written to a daily rolling file through a non-blocking writer.
//!
//! The returned [`WorkerGuard`] flushes the file writer when dropped, so the
//! caller must keep it alive until shutdown.

use std::fs;
use std::io;
use std::path::Path;

use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// File name prefix of the daily log files, e.g. `switch.2024-05-01`.
pub const LOG_FILE_PREFIX: &str = "switch";

/// Number of daily files kept by [`prune_old_logs`] at startup.
pub const LOG_FILES_KEPT: usize = 7;

pub fn setup_logging(log_dir: &Path, log_level: &str) -> io::Result<WorkerGuard> {
    fs::create_dir_all(log_dir)?;
    prune_old_logs(log_dir, LOG_FILES_KEPT)?;

    let file_appender = rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (non_blocking_appender, guard) = non_blocking(file_appender);

    let console_layer = fmt::layer().with_target(true).with_ansi(true);
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(non_blocking_appender)
        .json();

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(io::Error::other)?;

    info!(log_dir = %log_dir.display(), level = %log_level, "Logging initialized");
    Ok(guard)
}

/// Deletes all but the `keep` most recently modified log files in `log_dir`.
/// Returns how many files were removed.
pub fn prune_old_logs(log_dir: &Path, keep: usize) -> io::Result<usize> {
    let prefix = format!("{}.", LOG_FILE_PREFIX);
    let mut entries: Vec<_> = fs::read_dir(log_dir)?
        .filter_map(|res| res.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(&prefix))
        .filter_map(|e| {
            let modified = e.metadata().and_then(|m| m.modified()).ok()?;
            Some((modified, e.path()))
        })
        .collect();

    // Newest first
    entries.sort_by(|a, b| b.0.cmp(&a.0));

    let mut removed = 0;
    for (_, path) in entries.iter().skip(keep) {
        match fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) => eprintln!("Failed to delete old log file {:?}: {}", path, e),
        }
    }
    Ok(removed)
}
