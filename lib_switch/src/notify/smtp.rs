//! # SMTP Sender
//!
//! Plain-text mail over a STARTTLS relay. Properties:
//!
//! - `smtp_host` (default `smtp.gmail.com`), `smtp_port` (default 587)
//! - `smtp_user`, `smtp_pass`: relay credentials, optional as a pair
//! - `smtp_from`: sender address, defaults to `smtp_user`
//! - `to`: comma-separated recipients, required

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::registry::required_property;
use super::{Notifier, NotifyError};
use crate::configs::{ChannelProperties, ConfigError};

pub const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";
pub const DEFAULT_SMTP_PORT: u16 = 587;

const KIND: &str = "smtp";

pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

fn invalid(reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidChannel {
        kind: KIND.to_string(),
        reason: reason.into(),
    }
}

fn parse_mailbox(raw: &str, field: &str) -> Result<Mailbox, ConfigError> {
    raw.trim()
        .parse::<Mailbox>()
        .map_err(|e| invalid(format!("invalid address '{}' in '{}': {}", raw.trim(), field, e)))
}

impl SmtpNotifier {
    pub fn from_properties(props: &ChannelProperties) -> Result<Self, ConfigError> {
        let get = |key: &str| props.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        let host = get("smtp_host").unwrap_or(DEFAULT_SMTP_HOST);
        let port = match get("smtp_port") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| invalid(format!("smtp_port '{}' is not a port number", raw)))?,
            None => DEFAULT_SMTP_PORT,
        };

        let user = get("smtp_user");
        let pass = get("smtp_pass");
        let from_raw = get("smtp_from")
            .or(user)
            .ok_or_else(|| invalid("either smtp_from or smtp_user is required"))?;
        let from = parse_mailbox(from_raw, "smtp_from")?;

        let to = required_property(props, KIND, "to")?
            .split(',')
            .filter(|addr| !addr.trim().is_empty())
            .map(|addr| parse_mailbox(addr, "to"))
            .collect::<Result<Vec<_>, _>>()?;
        if to.is_empty() {
            return Err(invalid("no recipients in 'to'"));
        }

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| invalid(format!("cannot use relay {}: {}", host, e)))?
            .port(port);
        if let (Some(user), Some(pass)) = (user, pass) {
            builder = builder.credentials(Credentials::new(user.to_string(), pass.to_string()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
            to,
        })
    }

    fn build_message(&self, subject: &str, body: &str) -> Result<Message, NotifyError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(subject)
            .header(ContentType::TEXT_PLAIN);
        for recipient in &self.to {
            builder = builder.to(recipient.clone());
        }
        builder
            .body(body.to_string())
            .map_err(|e| NotifyError::transport(KIND, e))
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    fn kind(&self) -> &str {
        KIND
    }

    async fn notify(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        let message = self.build_message(subject, body)?;
        self.transport
            .send(message)
            .await
            .map_err(|e| NotifyError::transport(KIND, e))?;
        Ok(())
    }
}
