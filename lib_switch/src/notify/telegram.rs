//! # Telegram Sender
//!
//! Posts `{chat_id, text}` to the Bot API `sendMessage` method. The HTTP client
//! retries transient failures with exponential backoff.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Serialize;

use super::registry::required_property;
use super::{Notifier, NotifyError};
use crate::configs::ChannelProperties;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Per-attempt limit on a Bot API call.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const KIND: &str = "telegram";

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: String,
}

pub struct TelegramNotifier {
    client: ClientWithMiddleware,
    api_base: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(api_base: &str, bot_token: String, chat_id: String) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(2);
        let client = ClientBuilder::new(http)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token,
            chat_id,
        })
    }

    /// Reads `bot_token`, `chat_id` and the optional `api_base`.
    pub fn from_properties(props: &ChannelProperties) -> Result<Self, crate::configs::ConfigError> {
        let bot_token = required_property(props, KIND, "bot_token")?;
        let chat_id = required_property(props, KIND, "chat_id")?;
        let api_base = props
            .get("api_base")
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_API_BASE);
        Self::new(api_base, bot_token, chat_id).map_err(|e| crate::configs::ConfigError::InvalidChannel {
            kind: KIND.to_string(),
            reason: format!("cannot build HTTP client: {}", e),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.bot_token)
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    fn kind(&self) -> &str {
        KIND
    }

    async fn notify(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        let payload = SendMessage {
            chat_id: &self.chat_id,
            text: format!("{}\n{}", subject, body),
        };
        let json_body = serde_json::to_string(&payload).map_err(|e| NotifyError::transport(KIND, e))?;

        let response = self
            .client
            .post(self.endpoint())
            .header(CONTENT_TYPE, "application/json")
            .body(json_body)
            .send()
            .await
            .map_err(|e| NotifyError::transport(KIND, e))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(NotifyError::Rejected {
                kind: KIND.to_string(),
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_uses_token_and_trimmed_base() {
        let n = TelegramNotifier::new("http://127.0.0.1:9999/", "123:abc".into(), "42".into()).unwrap();
        assert_eq!(n.endpoint(), "http://127.0.0.1:9999/bot123:abc/sendMessage");
    }

    #[test]
    fn defaults_to_public_api() {
        let props: ChannelProperties = [
            ("bot_token".to_string(), "123456:fake-token".to_string()),
            ("chat_id".to_string(), "123456789".to_string()),
        ]
        .into_iter()
        .collect();
        let n = TelegramNotifier::from_properties(&props).unwrap();
        assert!(n.endpoint().starts_with("https://api.telegram.org/bot123456:fake-token/"));
    }

    #[test]
    fn payload_joins_subject_and_body() {
        let payload = SendMessage {
            chat_id: "42",
            text: format!("{}\n{}", "Subject", "Body"),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json, serde_json::json!({"chat_id": "42", "text": "Subject\nBody"}));
    }
}
