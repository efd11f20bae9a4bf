//! # Liveness Monitor
//!
//! Each client is either **OK** or **MISSING**. The stored `missing` flag
//! records which edge has already been announced, so a notification fires
//! only when the computed status disagrees with the flag:
//!
//! | overdue | stored flag | action                                 |
//! |---------|-------------|----------------------------------------|
//! | yes     | OK          | persist MISSING, send timeout          |
//! | no      | MISSING     | persist OK, send recovery              |
//! | yes     | MISSING     | nothing                                |
//! | no      | OK          | nothing                                |
//!
//! A cycle that changed anything republishes the table once, then hands its
//! notifications to background tasks. Ingest and evaluation never wait on a
//! notification channel; [`LivenessMonitor::flush_notifications`] waits for
//! the ones still in flight.
//!
//! The flag is written before the notification goes out. If the write fails the
//! transition is skipped and retried on the next cycle, so a store outage
//! delays an alert instead of repeating it.
//!
//! Ingest and evaluation both read the flag and then write it without a lock
//! spanning the two steps. A heartbeat landing between the evaluator's read and
//! write can therefore be overwritten for one cycle; the next cycle corrects it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::{Publisher, Snapshot, Subscription};
use crate::connections::{ClientRecord, HeartbeatStore, StoreError};
use crate::notify::{Message, MessageTemplates, NotificationDispatcher};
use crate::utils::elapsed_since;

/// Queue depth used when none is configured.
pub const DEFAULT_SUBSCRIBER_QUEUE: usize = 10;

/// Reads of the initial table a new subscriber gets before it is seeded with
/// whatever the last read returned.
const SEED_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("client name must not be empty")]
    EmptyName,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What a heartbeat did to its client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    /// First heartbeat ever seen for this name.
    Registered,
    /// Known client that was already OK.
    Refreshed,
    /// Client was MISSING and is OK again; a recovery notification was sent.
    Recovered,
}

/// Result of one evaluation cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluationReport {
    pub checked: usize,
    pub timed_out: Vec<String>,
    pub recovered: Vec<String>,
}

impl EvaluationReport {
    pub fn transitions(&self) -> usize {
        self.timed_out.len() + self.recovered.len()
    }
}

pub struct LivenessMonitor {
    store: Arc<dyn HeartbeatStore>,
    dispatcher: NotificationDispatcher,
    templates: MessageTemplates,
    publisher: Arc<Publisher>,
    notifications: TaskTracker,
    timeout: Duration,
}

impl LivenessMonitor {
    pub fn new(store: Arc<dyn HeartbeatStore>, dispatcher: NotificationDispatcher, timeout: Duration) -> Self {
        Self {
            store,
            dispatcher,
            templates: MessageTemplates::default(),
            publisher: Arc::new(Publisher::new(DEFAULT_SUBSCRIBER_QUEUE)),
            notifications: TaskTracker::new(),
            timeout,
        }
    }

    pub fn with_templates(mut self, templates: MessageTemplates) -> Self {
        self.templates = templates;
        self
    }

    /// Replaces the publisher with one using `capacity`-deep queues. Call
    /// before anyone subscribes.
    pub fn with_subscriber_queue(mut self, capacity: usize) -> Self {
        self.publisher = Arc::new(Publisher::new(capacity));
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn publisher(&self) -> &Arc<Publisher> {
        &self.publisher
    }

    pub fn dispatcher(&self) -> &NotificationDispatcher {
        &self.dispatcher
    }

    // --- Heartbeat ingest ---

    pub async fn record_heartbeat(&self, name: &str) -> Result<HeartbeatOutcome, IngestError> {
        self.record_heartbeat_at(name, Utc::now()).await
    }

    /// # Record Heartbeat
    ///
    /// Marks `name` alive as of `now`. A failed read of the previous record is
    /// treated as "was not missing", which can only suppress a recovery notice,
    /// never duplicate one. A failed write is returned and nothing else happens.
    pub async fn record_heartbeat_at(&self, name: &str, now: DateTime<Utc>) -> Result<HeartbeatOutcome, IngestError> {
        if name.is_empty() {
            return Err(IngestError::EmptyName);
        }

        let previous = match self.store.get(name).await {
            Ok(previous) => previous,
            Err(e) => {
                warn!(client = %name, error = %e, "Could not read previous record, assuming not missing");
                None
            }
        };

        if let Err(e) = self.store.put(name, now, false).await {
            warn!(client = %name, error = %e, "Heartbeat write failed");
            return Err(e.into());
        }
        self.publish_current().await;

        let outcome = match previous {
            None => HeartbeatOutcome::Registered,
            Some(ClientRecord { missing: false, .. }) => HeartbeatOutcome::Refreshed,
            Some(ClientRecord { missing: true, last_seen, .. }) => {
                info!(client = %name, "Client recovered");
                let message = self.templates.recovery(name, elapsed_since(last_seen, now));
                self.send(message);
                HeartbeatOutcome::Recovered
            }
        };
        debug!(client = %name, outcome = ?outcome, "Heartbeat recorded");
        Ok(outcome)
    }

    // --- Liveness evaluator ---

    pub async fn evaluate(&self) -> Result<EvaluationReport, StoreError> {
        self.evaluate_at(Utc::now()).await
    }

    /// # Evaluate
    ///
    /// Runs one cycle over every tracked client as of `now`. A failed
    /// enumeration aborts the cycle; a failed flag write skips only that client.
    pub async fn evaluate_at(&self, now: DateTime<Utc>) -> Result<EvaluationReport, StoreError> {
        let records = self.store.get_all().await?;
        let mut report = EvaluationReport {
            checked: records.len(),
            ..Default::default()
        };

        let mut outbox = Vec::new();
        for record in records.into_values() {
            let elapsed = elapsed_since(record.last_seen, now);
            let overdue = elapsed > self.timeout;

            match (overdue, record.missing) {
                (true, false) => {
                    if self.persist_flag(&record.name, true).await {
                        info!(client = %record.name, elapsed_secs = elapsed.as_secs(), "Client timed out");
                        outbox.push(self.templates.timeout(&record.name, elapsed));
                        report.timed_out.push(record.name);
                    }
                }
                (false, true) => {
                    if self.persist_flag(&record.name, false).await {
                        info!(client = %record.name, "Client back within timeout");
                        outbox.push(self.templates.recovery(&record.name, elapsed));
                        report.recovered.push(record.name);
                    }
                }
                _ => {}
            }
        }

        if report.transitions() > 0 {
            self.publish_current().await;
        }
        for message in outbox {
            self.send(message);
        }
        Ok(report)
    }

    /// Runs [`evaluate`](Self::evaluate) every `interval` until `shutdown` fires.
    /// Errors are logged and the next tick tries again.
    pub async fn run(self: Arc<Self>, interval: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            interval_secs = interval.as_secs(),
            timeout_secs = self.timeout.as_secs(),
            "Liveness evaluator started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Liveness evaluator stopped");
                    break;
                }
                _ = ticker.tick() => {
                    match self.evaluate().await {
                        Ok(report) if report.transitions() > 0 => debug!(
                            timed_out = report.timed_out.len(),
                            recovered = report.recovered.len(),
                            "Evaluation cycle finished"
                        ),
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "Evaluation cycle aborted, retrying next tick"),
                    }
                }
            }
        }
    }

    // --- Queries and administration ---

    pub async fn clients(&self) -> Result<BTreeMap<String, ClientRecord>, StoreError> {
        self.store.get_all().await
    }

    pub async fn snapshot(&self) -> Result<Snapshot, StoreError> {
        Ok(Snapshot::from(self.store.get_all().await?))
    }

    /// Removes `name` from the store and republishes the table.
    pub async fn delete_client(&self, name: &str) -> Result<(), StoreError> {
        self.store.delete(name).await?;
        info!(client = %name, "Client deleted");
        self.publish_current().await;
        Ok(())
    }

    /// # Subscribe
    ///
    /// Registers a viewer. Its first message is the current table, or an empty
    /// one if the store cannot be read right now.
    ///
    /// The queue is registered before the table is read. A publish landing
    /// while the read is in progress makes the read stale, so it is repeated.
    pub async fn subscribe(&self) -> Subscription {
        let subscription = self.publisher.subscribe();
        for attempt in 1..SEED_ATTEMPTS {
            let initial = self.initial_snapshot().await;
            if self.publisher.try_seed(subscription.id(), initial) {
                return subscription;
            }
            debug!(subscriber = subscription.id(), attempt, "Table changed while subscribing, reading again");
        }
        let initial = self.initial_snapshot().await;
        self.publisher.seed(subscription.id(), initial);
        subscription
    }

    /// Waits until every notification handed off so far has been delivered
    /// or has failed.
    pub async fn flush_notifications(&self) {
        self.notifications.close();
        self.notifications.wait().await;
        self.notifications.reopen();
    }

    // --- Internals ---

    async fn persist_flag(&self, name: &str, missing: bool) -> bool {
        match self.store.set_missing(name, missing).await {
            Ok(()) => true,
            Err(e) => {
                warn!(client = %name, missing, error = %e, "Could not persist liveness flag");
                false
            }
        }
    }

    async fn initial_snapshot(&self) -> Snapshot {
        match self.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Store unreadable, new subscriber starts empty");
                Snapshot::empty()
            }
        }
    }

    fn send(&self, message: Message) {
        if self.dispatcher.is_empty() {
            return;
        }
        let dispatcher = self.dispatcher.clone();
        self.notifications.spawn(async move {
            let delivered = dispatcher.dispatch(&message.subject, &message.body).await;
            if delivered < dispatcher.len() {
                warn!(
                    delivered,
                    configured = dispatcher.len(),
                    subject = %message.subject,
                    "Some notification channels failed"
                );
            }
        });
    }

    async fn publish_current(&self) {
        match self.snapshot().await {
            Ok(snapshot) => {
                self.publisher.publish(snapshot);
            }
            Err(e) => warn!(error = %e, "Could not read store for live update"),
        }
    }
}
