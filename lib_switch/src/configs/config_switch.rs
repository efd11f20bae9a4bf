use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use std::{fmt, fs};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Smallest timeout the service accepts.
pub const MIN_TIMEOUT_SECONDS: u64 = 60;

/// Opaque, type-specific settings of a notification channel, stringified.
pub type ChannelProperties = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yml::Error,
    },

    #[error("timeout_seconds must be at least {min}, got {actual}")]
    TimeoutTooShort { actual: u64, min: u64 },

    #[error("check_interval_seconds must be at least 1 and below timeout_seconds ({timeout}), got {actual}")]
    InvalidInterval { actual: u64, timeout: u64 },

    #[error("subscriber_queue must be at least 1")]
    InvalidSubscriberQueue,

    #[error("notification channel #{index} has no type")]
    UntypedChannel { index: usize },

    #[error("invalid {kind} notification channel: {reason}")]
    InvalidChannel { kind: String, reason: String },
}

/// Which heartbeat store backend to open at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Sqlite,
    Memory,
    Redis,
}

impl FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(StoreKind::Sqlite),
            "memory" => Ok(StoreKind::Memory),
            "redis" => Ok(StoreKind::Redis),
            other => Err(format!("unknown store kind '{}' (expected sqlite, memory or redis)", other)),
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreKind::Sqlite => "sqlite",
            StoreKind::Memory => "memory",
            StoreKind::Redis => "redis",
        };
        f.write_str(name)
    }
}

/// A scalar YAML value inside a channel definition. Channel properties are
/// opaque to the service, so numbers and booleans are kept as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Flag(bool),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Text(s) => f.write_str(s),
            PropertyValue::Integer(i) => write!(f, "{}", i),
            PropertyValue::Float(x) => write!(f, "{}", x),
            PropertyValue::Flag(b) => write!(f, "{}", b),
        }
    }
}

/// # Notification Channel
///
/// A `(type, properties)` pair. Every key other than `type` is collected into
/// `properties` and handed untouched to the matching notifier constructor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationChannel {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(flatten)]
    pub properties: BTreeMap<String, PropertyValue>,
}

impl NotificationChannel {
    pub fn new(kind: impl Into<String>, properties: ChannelProperties) -> Self {
        Self {
            kind: kind.into(),
            properties: properties
                .into_iter()
                .map(|(k, v)| (k, PropertyValue::Text(v)))
                .collect(),
        }
    }

    /// The channel's properties with every value rendered as a string.
    pub fn string_properties(&self) -> ChannelProperties {
        self.properties
            .iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .collect()
    }
}

/// Optional overrides for notification wording. Bodies support the
/// `{name}` and `{duration}` placeholders.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationMessages {
    pub timeout: Option<String>,
    pub recovery: Option<String>,
    pub timeout_subject: Option<String>,
    pub recovery_subject: Option<String>,
}

/// # Switch Configuration
///
/// Everything the service needs at startup. Fields missing from the file keep
/// their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchConfig {
    /// Socket address the HTTP server binds to.
    pub listen_addr: String,
    /// Silence longer than this marks a client MISSING.
    pub timeout_seconds: u64,
    /// Cadence of the liveness evaluator.
    pub check_interval_seconds: u64,
    /// Prefix for every HTTP route, e.g. `/dead-mans-switch`.
    pub base_path: String,
    pub store: StoreKind,
    /// SQLite database file, used when `store` is `sqlite`.
    pub db_path: PathBuf,
    /// Redis connection string, used when `store` is `redis`.
    pub redis_url: String,
    /// Directory holding `index.html` and other static assets.
    pub web_dir: PathBuf,
    /// Per-viewer queue depth for live-state snapshots.
    pub subscriber_queue: usize,
    pub log_dir: PathBuf,
    pub log_level: String,
    pub notification_channels: Vec<NotificationChannel>,
    pub notification_messages: NotificationMessages,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            timeout_seconds: 600,
            check_interval_seconds: 5,
            base_path: String::new(),
            store: StoreKind::Sqlite,
            db_path: PathBuf::from("data/heartbeats.db"),
            redis_url: "redis://127.0.0.1/".to_string(),
            web_dir: PathBuf::from("web"),
            subscriber_queue: 10,
            log_dir: PathBuf::from("logs"),
            log_level: "info".to_string(),
            notification_channels: Vec::new(),
            notification_messages: NotificationMessages::default(),
        }
    }
}

impl SwitchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_seconds)
    }

    /// The base path with a single leading slash and no trailing slash;
    /// empty when the service is mounted at the root.
    pub fn normalized_base_path(&self) -> String {
        let trimmed = self.base_path.trim().trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{}", trimmed)
        }
    }

    /// Rejects configurations the service must not start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_seconds < MIN_TIMEOUT_SECONDS {
            return Err(ConfigError::TimeoutTooShort {
                actual: self.timeout_seconds,
                min: MIN_TIMEOUT_SECONDS,
            });
        }
        if self.check_interval_seconds == 0 || self.check_interval_seconds >= self.timeout_seconds {
            return Err(ConfigError::InvalidInterval {
                actual: self.check_interval_seconds,
                timeout: self.timeout_seconds,
            });
        }
        if self.subscriber_queue == 0 {
            return Err(ConfigError::InvalidSubscriberQueue);
        }
        for (index, channel) in self.notification_channels.iter().enumerate() {
            if channel.kind.trim().is_empty() {
                return Err(ConfigError::UntypedChannel { index });
            }
        }
        Ok(())
    }
}

/// Loads the YAML configuration at `path`.
///
/// A missing file is not an error: the defaults are returned so the service can
/// run from environment variables alone. An unreadable or malformed file is.
pub fn load_config(path: &Path) -> Result<SwitchConfig, ConfigError> {
    if !path.exists() {
        info!(path = %path.display(), "Config file not found, using defaults");
        return Ok(SwitchConfig::default());
    }

    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if raw.trim().is_empty() {
        return Ok(SwitchConfig::default());
    }

    serde_yml::from_str::<SwitchConfig>(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_yaml(body: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(body.as_bytes()).expect("write yaml");
        file
    }

    #[test]
    fn loads_channels_and_messages() {
        let file = write_yaml(
            r#"
listen_addr: "127.0.0.1:1234"
timeout_seconds: 120
notification_channels:
  - type: dummy
    to: "a@b.com"
  - type: telegram
    bot_token: "abc"
    chat_id: 123456789
notification_messages:
  timeout: "Timeout for {name}!"
  recovery: "Recovery for {name}!"
"#,
        );

        let cfg = load_config(file.path()).expect("config loads");
        assert_eq!(cfg.listen_addr, "127.0.0.1:1234");
        assert_eq!(cfg.timeout_seconds, 120);
        assert_eq!(cfg.notification_channels.len(), 2);
        assert_eq!(cfg.notification_channels[0].kind, "dummy");
        assert_eq!(
            cfg.notification_channels[0].string_properties().get("to").map(String::as_str),
            Some("a@b.com")
        );
        let telegram = cfg.notification_channels[1].string_properties();
        assert_eq!(telegram.get("chat_id").map(String::as_str), Some("123456789"));
        assert!(!telegram.contains_key("type"));
        assert_eq!(cfg.notification_messages.timeout.as_deref(), Some("Timeout for {name}!"));
        assert_eq!(cfg.notification_messages.recovery.as_deref(), Some("Recovery for {name}!"));
    }

    #[test]
    fn empty_mapping_keeps_defaults() {
        let file = write_yaml("{}");
        let cfg = load_config(file.path()).expect("config loads");
        assert_eq!(cfg, SwitchConfig::default());
        assert_eq!(cfg.timeout_seconds, 600);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let cfg = load_config(&dir.path().join("nope.yaml")).expect("defaults");
        assert_eq!(cfg.listen_addr, "0.0.0.0:8080");
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        let file = write_yaml("invalid: yaml: content: [[[");
        assert!(matches!(load_config(file.path()), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn timeout_below_floor_is_rejected() {
        let cfg = SwitchConfig {
            timeout_seconds: 30,
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::TimeoutTooShort { actual: 30, min: MIN_TIMEOUT_SECONDS })
        ));
    }

    #[test]
    fn interval_must_be_shorter_than_timeout() {
        let cfg = SwitchConfig {
            timeout_seconds: 60,
            check_interval_seconds: 60,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidInterval { .. })));

        let ok = SwitchConfig {
            timeout_seconds: 60,
            check_interval_seconds: 5,
            ..Default::default()
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn untyped_channel_is_rejected() {
        let cfg = SwitchConfig {
            notification_channels: vec![NotificationChannel::new("", ChannelProperties::new())],
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::UntypedChannel { index: 0 })));
    }

    #[test]
    fn base_path_is_normalized() {
        let mut cfg = SwitchConfig::default();
        assert_eq!(cfg.normalized_base_path(), "");
        cfg.base_path = "/".into();
        assert_eq!(cfg.normalized_base_path(), "");
        cfg.base_path = "dead-mans-switch/".into();
        assert_eq!(cfg.normalized_base_path(), "/dead-mans-switch");
    }

    #[test]
    fn store_kind_parses_case_insensitively() {
        assert_eq!("SQLite".parse::<StoreKind>(), Ok(StoreKind::Sqlite));
        assert_eq!("memory".parse::<StoreKind>(), Ok(StoreKind::Memory));
        assert!("etcd".parse::<StoreKind>().is_err());
    }
}
