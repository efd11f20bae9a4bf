//! # Connections Module
//!
//! The durable heartbeat record and the backends that hold it.
//!
//! Every backend implements [`HeartbeatStore`], a small key/value contract keyed
//! by client name. The store is authoritative: the monitor never caches records
//! between operations, so whatever the store says is the state.
//!
//! - [`store_memory`]: process-local map, lost on restart.
//! - [`store_sqlite`]: single-file embedded database (feature `store-sqlite`).
//! - [`store_redis`]: one Redis hash shared by several processes (feature `store-redis`).

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Process-local store.
pub mod store_memory;

/// SQLite-backed store.
#[cfg(feature = "store-sqlite")]
pub mod store_sqlite;

/// Redis hash store.
#[cfg(feature = "store-redis")]
pub mod store_redis;

pub use store_memory::MemoryStore;
#[cfg(feature = "store-redis")]
pub use store_redis::RedisStore;
#[cfg(feature = "store-sqlite")]
pub use store_sqlite::SqliteStore;

/// Errors raised by heartbeat store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend unavailable: {0}")]
    Backend(String),

    #[cfg(feature = "store-sqlite")]
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[cfg(feature = "store-redis")]
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("corrupt heartbeat record: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// # Client Record
///
/// What the store knows about one client: when it last checked in and whether
/// it is currently considered MISSING. Serialized as
/// `{"name": ..., "timestamp": RFC3339, "missing": bool}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRecord {
    pub name: String,
    #[serde(rename = "timestamp")]
    pub last_seen: DateTime<Utc>,
    pub missing: bool,
}

impl ClientRecord {
    pub fn new(name: impl Into<String>, last_seen: DateTime<Utc>, missing: bool) -> Self {
        Self {
            name: name.into(),
            last_seen,
            missing,
        }
    }
}

/// # Heartbeat Store
///
/// Durable mapping from client name to [`ClientRecord`]. Names are unique and
/// case-sensitive. Implementations must be safe to share across tasks.
#[async_trait]
pub trait HeartbeatStore: Send + Sync {
    /// Returns the record for `name`, or `None` if the client is unknown.
    async fn get(&self, name: &str) -> Result<Option<ClientRecord>, StoreError>;

    /// Returns every record, keyed by name.
    async fn get_all(&self) -> Result<BTreeMap<String, ClientRecord>, StoreError>;

    /// Creates or replaces the record for `name`.
    async fn put(&self, name: &str, last_seen: DateTime<Utc>, missing: bool) -> Result<(), StoreError>;

    /// Updates only the missing flag. Unknown names are left alone.
    async fn set_missing(&self, name: &str, missing: bool) -> Result<(), StoreError>;

    /// Removes the record for `name`. Unknown names are not an error.
    async fn delete(&self, name: &str) -> Result<(), StoreError>;
}
