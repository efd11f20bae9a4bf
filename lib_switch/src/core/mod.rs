//! # Core Engine Module
//!
//! The liveness state machine and the live-state fan-out.
//!
//! - **`monitor`**: [`LivenessMonitor`], the single owner of the store handle,
//!   the notification dispatcher and the publisher. Heartbeat ingest, the
//!   periodic evaluator and administrative deletes all go through it, so both
//!   mutation paths share one transition routine.
//! - **`publisher`**: bounded, non-blocking fan-out of snapshots to viewers.
//! - **`snapshot`**: the name-sorted client table handed to viewers.

/// Ingest, evaluation and transition handling.
pub mod monitor;
/// Per-subscriber bounded queues with drop-if-full delivery.
pub mod publisher;
/// Sorted client table.
pub mod snapshot;

pub use monitor::{EvaluationReport, HeartbeatOutcome, IngestError, LivenessMonitor};
pub use publisher::{Publisher, Subscription};
pub use snapshot::Snapshot;
