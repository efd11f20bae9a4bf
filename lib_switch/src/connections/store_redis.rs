//! # Redis Store
//!
//! Keeps every record as a JSON field of one Redis hash, so several service
//! instances can share state. The connection manager reconnects on its own.
//!
//! Flag updates run as one server-side script, so a heartbeat written by
//! another caller is never replaced by an older `timestamp`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use tracing::info;

use super::{ClientRecord, HeartbeatStore, StoreError};

/// Hash key used when none is given.
pub const DEFAULT_HASH_KEY: &str = "heartbeats";

// KEYS[1] = hash, ARGV[1] = client name, ARGV[2] = "1" for missing.
const SET_MISSING_LUA: &str = r#"
local raw = redis.call('HGET', KEYS[1], ARGV[1])
if not raw then
    return 0
end
local record = cjson.decode(raw)
record['missing'] = ARGV[2] == '1'
redis.call('HSET', KEYS[1], ARGV[1], cjson.encode(record))
return 1
"#;

#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
    key: String,
    set_missing_script: Script,
}

impl RedisStore {
    /// Connects to `url` (e.g. "redis://127.0.0.1/") using the default hash key.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        Self::connect_with_key(url, DEFAULT_HASH_KEY).await
    }

    pub async fn connect_with_key(url: &str, key: &str) -> Result<Self, StoreError> {
        let client = Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;
        info!(key = %key, "Connected Redis heartbeat store");
        Ok(Self {
            manager,
            key: key.to_string(),
            set_missing_script: Script::new(SET_MISSING_LUA),
        })
    }
}

#[async_trait]
impl HeartbeatStore for RedisStore {
    async fn get(&self, name: &str) -> Result<Option<ClientRecord>, StoreError> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn.hget(&self.key, name).await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn get_all(&self) -> Result<BTreeMap<String, ClientRecord>, StoreError> {
        let mut conn = self.manager.clone();
        let raw: BTreeMap<String, String> = conn.hgetall(&self.key).await?;
        raw.into_iter()
            .map(|(name, json)| Ok((name, serde_json::from_str(&json)?)))
            .collect()
    }

    async fn put(&self, name: &str, last_seen: DateTime<Utc>, missing: bool) -> Result<(), StoreError> {
        let json = serde_json::to_string(&ClientRecord::new(name, last_seen, missing))?;
        let mut conn = self.manager.clone();
        let _: () = conn.hset(&self.key, name, json).await?;
        Ok(())
    }

    async fn set_missing(&self, name: &str, missing: bool) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        let _updated: i64 = self
            .set_missing_script
            .key(&self.key)
            .arg(name)
            .arg(if missing { "1" } else { "0" })
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        let mut conn = self.manager.clone();
        let _: () = conn.hdel(&self.key, name).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    // Needs a reachable server; REDIS_URL overrides the local default.
    async fn scratch_store() -> Option<RedisStore> {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string());
        let key = format!("heartbeats-test-{}-{}", std::process::id(), Utc::now().timestamp_nanos_opt()?);
        match RedisStore::connect_with_key(&url, &key).await {
            Ok(store) => Some(store),
            Err(e) => {
                eprintln!("skipping redis test, no server at {url}: {e}");
                None
            }
        }
    }

    async fn drop_key(store: &RedisStore) {
        let mut conn = store.manager.clone();
        let _: () = conn.del(&store.key).await.unwrap();
    }

    #[tokio::test]
    async fn set_missing_keeps_latest_timestamp() {
        let Some(store) = scratch_store().await else {
            return;
        };
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let t1 = t0 + chrono::Duration::seconds(90);

        store.put("a", t0, false).await.unwrap();
        // A newer heartbeat lands before the flag update.
        store.put("a", t1, false).await.unwrap();
        store.set_missing("a", true).await.unwrap();

        let record = store.get("a").await.unwrap().unwrap();
        assert_eq!(record.last_seen, t1);
        assert!(record.missing);

        store.set_missing("a", false).await.unwrap();
        assert!(!store.get("a").await.unwrap().unwrap().missing);

        // Unknown clients are left alone.
        store.set_missing("ghost", true).await.unwrap();
        assert!(store.get("ghost").await.unwrap().is_none());
        assert_eq!(store.get_all().await.unwrap().len(), 1);

        drop_key(&store).await;
    }
}
