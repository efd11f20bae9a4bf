//! Log-only sender. Handy for wiring checks and local runs.

use async_trait::async_trait;
use tracing::info;

use super::{Notifier, NotifyError};
use crate::configs::ChannelProperties;

pub struct DummyNotifier {
    target: String,
}

impl DummyNotifier {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }

    pub fn from_properties(props: &ChannelProperties) -> Self {
        Self::new(props.get("to").cloned().unwrap_or_default())
    }
}

#[async_trait]
impl Notifier for DummyNotifier {
    fn kind(&self) -> &str {
        "dummy"
    }

    async fn notify(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        info!(channel = "dummy", "To: {} | {}: {}", self.target, subject, body);
        Ok(())
    }
}
