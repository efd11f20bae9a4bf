//! # Notifier Registry
//!
//! Resolves configured channels into sender instances by their `type` string.
//! Built-in types are `dummy`, `telegram` and `smtp` (the last two behind
//! their features). Extra types can be registered before startup.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use super::{DummyNotifier, NotificationDispatcher, Notifier};
use crate::configs::{ChannelProperties, ConfigError, NotificationChannel};

/// Builds a sender from a channel's property map.
pub type NotifierFactory =
    Box<dyn Fn(&ChannelProperties) -> Result<Arc<dyn Notifier>, ConfigError> + Send + Sync>;

#[derive(Default)]
pub struct NotifierRegistry {
    factories: HashMap<String, NotifierFactory>,
}

impl NotifierRegistry {
    /// A registry with no types registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every sender compiled into this build.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("dummy", |props| {
            Ok(Arc::new(DummyNotifier::from_properties(props)) as Arc<dyn Notifier>)
        });
        #[cfg(feature = "notify-telegram")]
        registry.register("telegram", |props| {
            Ok(Arc::new(super::TelegramNotifier::from_properties(props)?) as Arc<dyn Notifier>)
        });
        #[cfg(feature = "notify-smtp")]
        registry.register("smtp", |props| {
            Ok(Arc::new(super::SmtpNotifier::from_properties(props)?) as Arc<dyn Notifier>)
        });
        registry
    }

    /// Adds or replaces the constructor for `kind`.
    pub fn register<F>(&mut self, kind: &str, factory: F)
    where
        F: Fn(&ChannelProperties) -> Result<Arc<dyn Notifier>, ConfigError> + Send + Sync + 'static,
    {
        self.factories.insert(kind.to_string(), Box::new(factory));
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Builds the sender for one channel. Unknown types yield `Ok(None)`.
    pub fn build(&self, channel: &NotificationChannel) -> Result<Option<Arc<dyn Notifier>>, ConfigError> {
        match self.factories.get(channel.kind.as_str()) {
            Some(factory) => factory(&channel.string_properties()).map(Some),
            None => {
                warn!(channel = %channel.kind, "Unknown notification channel type, skipping");
                Ok(None)
            }
        }
    }

    /// Resolves every configured channel into one dispatcher.
    pub fn build_dispatcher(&self, channels: &[NotificationChannel]) -> Result<NotificationDispatcher, ConfigError> {
        let mut notifiers = Vec::with_capacity(channels.len());
        for channel in channels {
            if let Some(notifier) = self.build(channel)? {
                notifiers.push(notifier);
            }
        }
        info!(count = notifiers.len(), "Notification channels ready");
        Ok(NotificationDispatcher::new(notifiers))
    }
}

/// Looks up a property that must be present and non-blank.
pub fn required_property(props: &ChannelProperties, kind: &str, key: &str) -> Result<String, ConfigError> {
    props
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ConfigError::InvalidChannel {
            kind: kind.to_string(),
            reason: format!("missing required property '{}'", key),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotifyError;
    use async_trait::async_trait;

    struct Fixed(&'static str);

    #[async_trait]
    impl Notifier for Fixed {
        fn kind(&self) -> &str {
            self.0
        }

        async fn notify(&self, _subject: &str, _body: &str) -> Result<(), NotifyError> {
            Ok(())
        }
    }

    fn channel(kind: &str, pairs: &[(&str, &str)]) -> NotificationChannel {
        NotificationChannel::new(
            kind,
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        )
    }

    #[test]
    fn registered_type_is_built() {
        let mut registry = NotifierRegistry::new();
        registry.register("test", |_| Ok(Arc::new(Fixed("test")) as Arc<dyn Notifier>));

        let notifier = registry.build(&channel("test", &[])).unwrap().expect("notifier");
        assert_eq!(notifier.kind(), "test");
    }

    #[test]
    fn unknown_type_is_skipped() {
        let registry = NotifierRegistry::with_builtin();
        assert!(registry.build(&channel("nonexistent_type", &[])).unwrap().is_none());

        let dispatcher = registry
            .build_dispatcher(&[channel("nonexistent_type", &[]), channel("dummy", &[("to", "ops")])])
            .unwrap();
        assert_eq!(dispatcher.kinds(), vec!["dummy".to_string()]);
    }

    #[tokio::test]
    async fn dummy_always_succeeds() {
        let registry = NotifierRegistry::with_builtin();
        let notifier = registry
            .build(&channel("dummy", &[("to", "test@example.com")]))
            .unwrap()
            .expect("dummy registered");
        assert!(notifier.notify("test", "message").await.is_ok());
    }

    #[cfg(feature = "notify-telegram")]
    #[test]
    fn telegram_without_token_is_a_config_error() {
        let registry = NotifierRegistry::with_builtin();
        let err = registry
            .build(&channel("telegram", &[("bot_token", ""), ("chat_id", "123456789")]))
            .err()
            .expect("empty token rejected");
        assert!(matches!(err, ConfigError::InvalidChannel { ref kind, .. } if kind == "telegram"));
    }

    #[test]
    fn required_property_rejects_blank() {
        let props: ChannelProperties = [("to".to_string(), "  ".to_string())].into_iter().collect();
        assert!(required_property(&props, "smtp", "to").is_err());
        assert!(required_property(&props, "smtp", "from").is_err());
    }
}
