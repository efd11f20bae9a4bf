//! # Switch Logic
//!
//! Wiring between the configuration, the `lib_switch` engine and axum.
//!
//! - [`config`]: CLI and environment overrides on top of the YAML file.
//! - [`state`]: handler state shared across requests.
//! - [`routes`]: the HTTP surface, including the SSE live view.
//! - [`render`]: HTML fragments.

pub mod config;
pub mod error;
pub mod render;
pub mod routes;
pub mod state;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use lib_switch::configs::{StoreKind, SwitchConfig};
use lib_switch::connections::{MemoryStore, RedisStore, SqliteStore};
use lib_switch::notify::MessageTemplates;
use lib_switch::{HeartbeatStore, LivenessMonitor, NotifierRegistry};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

pub use state::AppState;

/// Opens the configured heartbeat store backend.
pub async fn open_store(config: &SwitchConfig) -> anyhow::Result<Arc<dyn HeartbeatStore>> {
    let store: Arc<dyn HeartbeatStore> = match config.store {
        StoreKind::Memory => {
            warn!("Using in-memory store; heartbeats are lost on restart");
            Arc::new(MemoryStore::new())
        }
        StoreKind::Sqlite => Arc::new(
            SqliteStore::open(&config.db_path)
                .with_context(|| format!("failed to open database {}", config.db_path.display()))?,
        ),
        StoreKind::Redis => Arc::new(
            RedisStore::connect(&config.redis_url)
                .await
                .context("failed to connect to redis")?,
        ),
    };
    Ok(store)
}

/// Resolves the notification channels and assembles the monitor.
pub fn build_monitor(
    config: &SwitchConfig,
    store: Arc<dyn HeartbeatStore>,
    registry: &NotifierRegistry,
) -> anyhow::Result<LivenessMonitor> {
    let dispatcher = registry
        .build_dispatcher(&config.notification_channels)
        .context("invalid notification channel")?;
    Ok(LivenessMonitor::new(store, dispatcher, config.timeout())
        .with_templates(MessageTemplates::from_config(&config.notification_messages))
        .with_subscriber_queue(config.subscriber_queue))
}

/// # Serve
///
/// Starts the evaluator and serves HTTP on `listener` until `shutdown`
/// resolves. Shutdown cancels the token in `state`, which stops the evaluator
/// and ends open SSE streams so the server can drain. Notifications already
/// handed off get one dispatch timeout to finish.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let token = state.shutdown.clone();
    let evaluator = tokio::spawn(
        Arc::clone(&state.monitor).run(state.config.check_interval(), token.clone()),
    );

    let app = routes::router(state.clone());
    info!(
        addr = %listener.local_addr()?,
        base_path = %state.base_path(),
        "Starting HTTP server"
    );

    let signal_token = token.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = shutdown => {},
                _ = signal_token.cancelled() => {},
            }
            signal_token.cancel();
        })
        .await?;

    token.cancel();
    if let Err(e) = evaluator.await {
        warn!(error = %e, "Evaluator task ended abnormally");
    }
    // Each channel is already bounded by the dispatch timeout.
    let grace = state.monitor.dispatcher().timeout() + Duration::from_secs(1);
    if tokio::time::timeout(grace, state.monitor.flush_notifications()).await.is_err() {
        warn!("Notifications still pending at shutdown");
    }
    info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

