//! # Configuration Modules
//!
//! The service reads one YAML file and lets the `servers` binary layer
//! environment variables and CLI flags on top of it.

/// Service configuration: model, defaults, file loading and validation.
pub mod config_switch;

pub use config_switch::{
    load_config, ChannelProperties, ConfigError, NotificationChannel, NotificationMessages,
    PropertyValue, StoreKind, SwitchConfig, MIN_TIMEOUT_SECONDS,
};
