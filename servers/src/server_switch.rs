//! # Dead Man's Switch Server
//!
//! Accepts heartbeats from remote clients, alerts the configured notification
//! channels when a client goes quiet for longer than the timeout, and alerts
//! again when it comes back. A small web page shows the live client table.
//!
//! Configuration comes from `config.yaml` (or `--config`), overridden by
//! environment variables and CLI flags; see `--help`.

use anyhow::Context;
use clap::Parser;
use lib_switch::NotifierRegistry;
use lib_switch::loggers::setup_logging;
use servers::switch_logic::config::{Cli, resolve_config};
use servers::switch_logic::{self, AppState};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Variables from .env only fill in what the environment does not set.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = match resolve_config(cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(2);
        }
    };

    let _log_guard = setup_logging(&config.log_dir, &config.log_level)
        .with_context(|| format!("failed to initialize logging in {}", config.log_dir.display()))?;
    info!(
        listen_addr = %config.listen_addr,
        timeout_secs = config.timeout_seconds,
        store = %config.store,
        "Starting dead man's switch"
    );

    let store = switch_logic::open_store(&config).await.inspect_err(|e| {
        error!(error = %e, "Could not open heartbeat store");
    })?;
    let registry = NotifierRegistry::with_builtin();
    let monitor = switch_logic::build_monitor(&config, store, &registry).inspect_err(|e| {
        error!(error = %e, "Could not set up notifications");
    })?;

    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;

    let state = AppState::new(Arc::new(monitor), config, CancellationToken::new());
    switch_logic::serve(listener, state, switch_logic::shutdown_signal()).await
}
