use std::sync::Arc;

use lib_switch::{LivenessMonitor, SwitchConfig};
use tokio_util::sync::CancellationToken;

/// Shared by every handler. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub monitor: Arc<LivenessMonitor>,
    pub config: Arc<SwitchConfig>,
    // Cancelled on shutdown; ends SSE streams and the evaluator.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(monitor: Arc<LivenessMonitor>, config: SwitchConfig, shutdown: CancellationToken) -> Self {
        Self {
            monitor,
            config: Arc::new(config),
            shutdown,
        }
    }

    /// Normalized route prefix, empty at the root.
    pub fn base_path(&self) -> String {
        self.config.normalized_base_path()
    }
}
