//! Notification wording.
//!
//! Bodies may use `{name}` and `{duration}`; the doubled forms `{{name}}` and
//! `{{duration}}` are accepted as well.

use std::time::Duration;

use crate::configs::NotificationMessages;
use crate::utils::format_duration;

pub const DEFAULT_TIMEOUT_SUBJECT: &str = "Dead Man's Switch Triggered";
pub const DEFAULT_RECOVERY_SUBJECT: &str = "Dead Man's Switch Recovery";
pub const DEFAULT_TIMEOUT_BODY: &str =
    "No heartbeat received in time from client: {name}. Last update was {duration} ago.";
pub const DEFAULT_RECOVERY_BODY: &str = "Heartbeat received again from client: {name}";

/// A rendered notification payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTemplates {
    timeout_subject: String,
    timeout_body: String,
    recovery_subject: String,
    recovery_body: String,
}

impl Default for MessageTemplates {
    fn default() -> Self {
        Self {
            timeout_subject: DEFAULT_TIMEOUT_SUBJECT.to_string(),
            timeout_body: DEFAULT_TIMEOUT_BODY.to_string(),
            recovery_subject: DEFAULT_RECOVERY_SUBJECT.to_string(),
            recovery_body: DEFAULT_RECOVERY_BODY.to_string(),
        }
    }
}

impl MessageTemplates {
    /// Uses every non-blank override from the config and the defaults for the rest.
    pub fn from_config(messages: &NotificationMessages) -> Self {
        let pick = |custom: &Option<String>, fallback: &str| {
            custom
                .as_deref()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(fallback)
                .to_string()
        };
        Self {
            timeout_subject: pick(&messages.timeout_subject, DEFAULT_TIMEOUT_SUBJECT),
            timeout_body: pick(&messages.timeout, DEFAULT_TIMEOUT_BODY),
            recovery_subject: pick(&messages.recovery_subject, DEFAULT_RECOVERY_SUBJECT),
            recovery_body: pick(&messages.recovery, DEFAULT_RECOVERY_BODY),
        }
    }

    /// Message for an OK to MISSING transition; `elapsed` is the silence so far.
    pub fn timeout(&self, name: &str, elapsed: Duration) -> Message {
        Message {
            subject: render(&self.timeout_subject, name, elapsed),
            body: render(&self.timeout_body, name, elapsed),
        }
    }

    /// Message for a MISSING to OK transition; `silent_for` is how long the
    /// client had been quiet before it came back.
    pub fn recovery(&self, name: &str, silent_for: Duration) -> Message {
        Message {
            subject: render(&self.recovery_subject, name, silent_for),
            body: render(&self.recovery_body, name, silent_for),
        }
    }
}

/// Substitutes placeholders in one pass, so values are never re-expanded.
fn render(template: &str, name: &str, duration: Duration) -> String {
    let duration = format_duration(duration);
    let placeholders: [(&str, &str); 4] = [
        ("{{name}}", name),
        ("{{duration}}", &duration),
        ("{name}", name),
        ("{duration}", &duration),
    ];

    let mut out = String::with_capacity(template.len() + name.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        match placeholders.iter().find(|(token, _)| tail.starts_with(token)) {
            Some((token, value)) => {
                out.push_str(value);
                rest = &tail[token.len()..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
