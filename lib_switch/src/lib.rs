//! # lib_switch
//!
//! The engine behind the dead man's switch service. Remote clients report that
//! they are alive; this crate keeps the durable record of when each client was
//! last seen, flips clients between OK and MISSING exactly once per edge, sends
//! the matching notifications and pushes the live table to every viewer.
//!
//! The HTTP surface lives in the `servers` crate; everything here is
//! transport-agnostic and can be driven directly from tests.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Configuration model, file loading and startup validation.
pub mod configs;
/// The heartbeat store contract and its backends.
pub mod connections;
/// Ingest, evaluation, transitions and live-state publishing.
pub mod core;
/// Tracing subscriber setup for console and rolling JSON files.
pub mod loggers;
/// Notifier contract, dispatcher, registry and built-in senders.
pub mod notify;
/// Duration and timestamp formatting helpers.
pub mod utils;

// Re-export the types every caller touches.
pub use crate::configs::config_switch::{ConfigError, SwitchConfig};
pub use crate::connections::{ClientRecord, HeartbeatStore, StoreError};
pub use crate::core::{LivenessMonitor, Snapshot, Subscription};
pub use crate::notify::{Notifier, NotifierRegistry, NotifyError};
