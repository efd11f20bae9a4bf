//! # Loggers Module
//!
//! Process-wide `tracing` setup shared by every binary in the workspace.

/// Console plus rolling JSON file subscriber.
pub mod logger_tracing;

pub use logger_tracing::{prune_old_logs, setup_logging, LOG_FILE_PREFIX, LOG_FILES_KEPT};
