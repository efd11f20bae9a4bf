//! # Shared Test Support
//!
//! Helpers used by the integration tests under `tests/`:
//!
//! - [`RecordingNotifier`]: keeps every `(subject, body)` it is asked to send.
//! - [`FlakyStore`]: a [`MemoryStore`] whose reads and writes can be made to fail.
//! - [`TestApp`]: the full HTTP server running in-process on an ephemeral port.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lib_switch::configs::{StoreKind, SwitchConfig};
use lib_switch::connections::MemoryStore;
use lib_switch::notify::{NotificationDispatcher, Notifier, NotifyError};
use lib_switch::{ClientRecord, HeartbeatStore, LivenessMonitor, StoreError};
use servers::switch_logic::{self, AppState};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn subjects(&self) -> Vec<String> {
        self.sent().into_iter().map(|(subject, _)| subject).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn kind(&self) -> &str {
        "recording"
    }

    async fn notify(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push((subject.to_string(), body.to_string()));
        Ok(())
    }
}

/// A [`MemoryStore`] with switchable failures.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check(flag: &AtomicBool) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Backend("injected failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl HeartbeatStore for FlakyStore {
    async fn get(&self, name: &str) -> Result<Option<ClientRecord>, StoreError> {
        Self::check(&self.fail_reads)?;
        self.inner.get(name).await
    }

    async fn get_all(&self) -> Result<BTreeMap<String, ClientRecord>, StoreError> {
        Self::check(&self.fail_reads)?;
        self.inner.get_all().await
    }

    async fn put(&self, name: &str, last_seen: DateTime<Utc>, missing: bool) -> Result<(), StoreError> {
        Self::check(&self.fail_writes)?;
        self.inner.put(name, last_seen, missing).await
    }

    async fn set_missing(&self, name: &str, missing: bool) -> Result<(), StoreError> {
        Self::check(&self.fail_writes)?;
        self.inner.set_missing(name, missing).await
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        Self::check(&self.fail_writes)?;
        self.inner.delete(name).await
    }
}

/// A monitor over `store` that reports to a fresh [`RecordingNotifier`].
pub fn recording_monitor(
    store: Arc<dyn HeartbeatStore>,
    timeout_secs: u64,
) -> (Arc<LivenessMonitor>, Arc<RecordingNotifier>) {
    let recorder = RecordingNotifier::new();
    let dispatcher = NotificationDispatcher::new(vec![recorder.clone() as Arc<dyn Notifier>]);
    let monitor = LivenessMonitor::new(store, dispatcher, std::time::Duration::from_secs(timeout_secs));
    (Arc::new(monitor), recorder)
}

/// Config for in-process servers: memory store, no channels.
pub fn test_config() -> SwitchConfig {
    SwitchConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        timeout_seconds: 60,
        check_interval_seconds: 1,
        store: StoreKind::Memory,
        ..Default::default()
    }
}

pub struct TestApp {
    pub addr: SocketAddr,
    pub monitor: Arc<LivenessMonitor>,
    pub recorder: Arc<RecordingNotifier>,
    pub client: reqwest::Client,
    token: CancellationToken,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl TestApp {
    /// Starts the server with `config` on an ephemeral port.
    pub async fn spawn(config: SwitchConfig) -> Self {
        let (monitor, recorder) = recording_monitor(Arc::new(MemoryStore::new()), config.timeout_seconds);
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local addr");

        let token = CancellationToken::new();
        let state = AppState::new(Arc::clone(&monitor), config, token.clone());
        let handle = tokio::spawn(switch_logic::serve(
            listener,
            state,
            token.clone().cancelled_owned(),
        ));

        Self {
            addr,
            monitor,
            recorder,
            client: reqwest::Client::new(),
            token,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Triggers graceful shutdown and waits for the server to finish.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        self.token.cancel();
        self.handle.await?
    }
}
