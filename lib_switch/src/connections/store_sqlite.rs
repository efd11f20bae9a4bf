//! # SQLite Store
//!
//! Single-file embedded store. Records live in one table:
//!
//! ```sql
//! heartbeats(name TEXT PRIMARY KEY, last_seen_ms INTEGER NOT NULL, missing INTEGER NOT NULL)
//! ```
//!
//! `rusqlite` is blocking, so every statement runs on the blocking pool behind a
//! shared connection.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

use super::{ClientRecord, HeartbeatStore, StoreError};

#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (or creates) the database at `path`, creating parent directories
    /// and the schema as needed.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Backend(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "Opened SQLite heartbeat store");
        Self::with_connection(conn)
    }

    /// A private in-memory database, handy for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS heartbeats (
                name TEXT PRIMARY KEY,
                last_seen_ms INTEGER NOT NULL,
                missing INTEGER NOT NULL DEFAULT 0
            );",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StoreError::Backend("sqlite connection lock poisoned".to_string()))?;
            f(&guard)
        })
        .await?
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<ClientRecord> {
    let name: String = row.get(0)?;
    let millis: i64 = row.get(1)?;
    let missing: bool = row.get(2)?;
    let last_seen = DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| {
        rusqlite::Error::IntegralValueOutOfRange(1, millis)
    })?;
    Ok(ClientRecord {
        name,
        last_seen,
        missing,
    })
}

#[async_trait]
impl HeartbeatStore for SqliteStore {
    async fn get(&self, name: &str) -> Result<Option<ClientRecord>, StoreError> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            let record = conn
                .query_row(
                    "SELECT name, last_seen_ms, missing FROM heartbeats WHERE name = ?1",
                    params![name],
                    record_from_row,
                )
                .optional()?;
            Ok(record)
        })
        .await
    }

    async fn get_all(&self) -> Result<BTreeMap<String, ClientRecord>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT name, last_seen_ms, missing FROM heartbeats")?;
            let rows = stmt.query_map([], record_from_row)?;
            let mut out = BTreeMap::new();
            for row in rows {
                let record = row?;
                out.insert(record.name.clone(), record);
            }
            Ok(out)
        })
        .await
    }

    async fn put(&self, name: &str, last_seen: DateTime<Utc>, missing: bool) -> Result<(), StoreError> {
        let name = name.to_string();
        let millis = last_seen.timestamp_millis();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO heartbeats (name, last_seen_ms, missing) VALUES (?1, ?2, ?3)
                 ON CONFLICT(name) DO UPDATE SET last_seen_ms = excluded.last_seen_ms, missing = excluded.missing",
                params![name, millis, missing],
            )?;
            Ok(())
        })
        .await
    }

    async fn set_missing(&self, name: &str, missing: bool) -> Result<(), StoreError> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE heartbeats SET missing = ?2 WHERE name = ?1",
                params![name, missing],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        let name = name.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM heartbeats WHERE name = ?1", params![name])?;
            Ok(())
        })
        .await
    }
}
