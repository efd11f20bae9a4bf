//! # Notify Module
//!
//! Everything that turns a liveness transition into outbound messages.
//!
//! - [`Notifier`]: the capability every sender implements, one
//!   `(subject, body)` operation.
//! - [`NotificationDispatcher`]: invokes every configured sender concurrently;
//!   one failing channel never stops the others.
//! - [`NotifierRegistry`]: maps a channel `type` string to a constructor and
//!   resolves the configured channels once at startup.
//! - [`MessageTemplates`]: default and custom wording with `{name}` and
//!   `{duration}` placeholders.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use thiserror::Error;
use tracing::{debug, warn};

pub mod dummy;
pub mod messages;
pub mod registry;

#[cfg(feature = "notify-smtp")]
pub mod smtp;
#[cfg(feature = "notify-telegram")]
pub mod telegram;

pub use dummy::DummyNotifier;
pub use messages::{Message, MessageTemplates};
pub use registry::{NotifierFactory, NotifierRegistry};
#[cfg(feature = "notify-smtp")]
pub use smtp::SmtpNotifier;
#[cfg(feature = "notify-telegram")]
pub use telegram::TelegramNotifier;

/// A notification channel failed to deliver.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("{kind} transport failed: {message}")]
    Transport { kind: String, message: String },

    #[error("{kind} rejected the message with status {status}: {body}")]
    Rejected {
        kind: String,
        status: u16,
        body: String,
    },

    #[error("{kind} gave no answer within {after:?}")]
    TimedOut { kind: String, after: Duration },
}

/// Upper bound on a single channel's `notify` call.
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(30);

impl NotifyError {
    pub fn transport(kind: &str, err: impl std::fmt::Display) -> Self {
        NotifyError::Transport {
            kind: kind.to_string(),
            message: err.to_string(),
        }
    }
}

/// # Notifier
///
/// One outbound channel. Implementations own their transport configuration and
/// are built once at startup from an opaque property map.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// The channel type this sender was registered under, e.g. `"telegram"`.
    fn kind(&self) -> &str;

    async fn notify(&self, subject: &str, body: &str) -> Result<(), NotifyError>;
}

/// # Notification Dispatcher
///
/// Fans a single message out to every configured channel. Delivery is
/// best-effort: failures are logged per channel and counted, never returned.
/// A channel that does not answer within the timeout counts as failed.
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifiers: Vec<Arc<dyn Notifier>>,
    timeout: Duration,
}

impl Default for NotificationDispatcher {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl NotificationDispatcher {
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        Self {
            notifiers,
            timeout: DEFAULT_NOTIFY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }

    pub fn kinds(&self) -> Vec<String> {
        self.notifiers.iter().map(|n| n.kind().to_string()).collect()
    }

    /// Sends `subject`/`body` through every channel concurrently and returns
    /// how many of them succeeded.
    pub async fn dispatch(&self, subject: &str, body: &str) -> usize {
        let limit = self.timeout;
        let sends = self.notifiers.iter().map(|notifier| async move {
            let result = match tokio::time::timeout(limit, notifier.notify(subject, body)).await {
                Ok(result) => result,
                Err(_) => Err(NotifyError::TimedOut {
                    kind: notifier.kind().to_string(),
                    after: limit,
                }),
            };
            (notifier.kind(), result)
        });

        let mut delivered = 0;
        for (kind, result) in join_all(sends).await {
            match result {
                Ok(()) => {
                    debug!(channel = %kind, subject = %subject, "Notification delivered");
                    delivered += 1;
                }
                Err(e) => warn!(channel = %kind, error = %e, "Notification failed"),
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recording {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for Recording {
        fn kind(&self) -> &str {
            "recording"
        }

        async fn notify(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push(format!("{}:{}", subject, body));
            Ok(())
        }
    }

    struct Broken;

    #[async_trait]
    impl Notifier for Broken {
        fn kind(&self) -> &str {
            "broken"
        }

        async fn notify(&self, _subject: &str, _body: &str) -> Result<(), NotifyError> {
            Err(NotifyError::transport("broken", "connection refused"))
        }
    }

    #[tokio::test]
    async fn failing_channel_does_not_stop_the_others() {
        let recording = Arc::new(Recording {
            sent: Mutex::new(Vec::new()),
        });
        let dispatcher = NotificationDispatcher::new(vec![
            Arc::new(Broken) as Arc<dyn Notifier>,
            recording.clone(),
            Arc::new(Broken),
        ]);

        let delivered = dispatcher.dispatch("Subject1", "Message1").await;
        assert_eq!(delivered, 1);
        assert_eq!(*recording.sent.lock().unwrap(), vec!["Subject1:Message1".to_string()]);
    }

    struct Silent;

    #[async_trait]
    impl Notifier for Silent {
        fn kind(&self) -> &str {
            "silent"
        }

        async fn notify(&self, _subject: &str, _body: &str) -> Result<(), NotifyError> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn unanswered_channel_is_cut_off() {
        let recording = Arc::new(Recording {
            sent: Mutex::new(Vec::new()),
        });
        let dispatcher = NotificationDispatcher::new(vec![Arc::new(Silent) as Arc<dyn Notifier>, recording.clone()])
            .with_timeout(Duration::from_millis(100));

        let delivered = tokio::time::timeout(Duration::from_secs(2), dispatcher.dispatch("s", "b"))
            .await
            .expect("dispatch returns once the slow channel times out");
        assert_eq!(delivered, 1);
        assert_eq!(recording.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_dispatcher_delivers_nothing() {
        let dispatcher = NotificationDispatcher::default();
        assert!(dispatcher.is_empty());
        assert_eq!(dispatcher.dispatch("s", "b").await, 0);
    }
}
