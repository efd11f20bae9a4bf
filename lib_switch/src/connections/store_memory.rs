//! # Memory Store
//!
//! Keeps heartbeat records in a process-local map. Used for tests and for
//! throwaway deployments where losing state on restart is acceptable.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{ClientRecord, HeartbeatStore, StoreError};

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<String, ClientRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, ClientRecord>>, StoreError> {
        self.records
            .lock()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl HeartbeatStore for MemoryStore {
    async fn get(&self, name: &str) -> Result<Option<ClientRecord>, StoreError> {
        Ok(self.lock()?.get(name).cloned())
    }

    async fn get_all(&self) -> Result<BTreeMap<String, ClientRecord>, StoreError> {
        Ok(self.lock()?.clone())
    }

    async fn put(&self, name: &str, last_seen: DateTime<Utc>, missing: bool) -> Result<(), StoreError> {
        self.lock()?
            .insert(name.to_string(), ClientRecord::new(name, last_seen, missing));
        Ok(())
    }

    async fn set_missing(&self, name: &str, missing: bool) -> Result<(), StoreError> {
        if let Some(record) = self.lock()?.get_mut(name) {
            record.missing = missing;
        }
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        self.lock()?.remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn put_get_and_overwrite() {
        let store = MemoryStore::new();
        let t0 = Utc::now();
        store.put("alpha", t0, false).await.unwrap();
        assert_eq!(
            store.get("alpha").await.unwrap(),
            Some(ClientRecord::new("alpha", t0, false))
        );

        let t1 = t0 + Duration::seconds(30);
        store.put("alpha", t1, true).await.unwrap();
        let rec = store.get("alpha").await.unwrap().unwrap();
        assert_eq!(rec.last_seen, t1);
        assert!(rec.missing);
        assert_eq!(store.get_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn names_are_case_sensitive() {
        let store = MemoryStore::new();
        store.put("Alpha", Utc::now(), false).await.unwrap();
        assert!(store.get("alpha").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_missing_ignores_unknown_names() {
        let store = MemoryStore::new();
        store.set_missing("ghost", true).await.unwrap();
        assert!(store.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemoryStore::new();
        store.put("alpha", Utc::now(), false).await.unwrap();
        store.delete("alpha").await.unwrap();
        store.delete("alpha").await.unwrap();
        assert!(store.get("alpha").await.unwrap().is_none());
    }
}
