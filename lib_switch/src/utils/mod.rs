//! # Utilities Module
//!
//! General-purpose helpers shared by the monitor, the notifiers and the
//! rendering layer in `servers`.

/// Human-readable durations and UTC timestamps.
pub mod time_fmt;

pub use time_fmt::{elapsed_since, format_duration, format_utc};
