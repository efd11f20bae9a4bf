use std::collections::BTreeMap;

use serde::Serialize;

use crate::connections::ClientRecord;

/// # Snapshot
///
/// The full client table at one point in time, always sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub clients: Vec<ClientRecord>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a snapshot from records in any order.
    pub fn from_records(records: impl IntoIterator<Item = ClientRecord>) -> Self {
        let mut clients: Vec<ClientRecord> = records.into_iter().collect();
        clients.sort_by(|a, b| a.name.cmp(&b.name));
        Self { clients }
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ClientRecord> {
        self.clients
            .binary_search_by(|c| c.name.as_str().cmp(name))
            .ok()
            .map(|i| &self.clients[i])
    }
}

impl From<BTreeMap<String, ClientRecord>> for Snapshot {
    fn from(map: BTreeMap<String, ClientRecord>) -> Self {
        // BTreeMap iteration is already in key order.
        Self {
            clients: map.into_values().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn sorted_regardless_of_insertion_order() {
        let now = Utc::now();
        let snap = Snapshot::from_records(vec![
            ClientRecord::new("zulu", now, false),
            ClientRecord::new("alpha", now, true),
            ClientRecord::new("mike", now, false),
        ]);
        let names: Vec<&str> = snap.clients.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "mike", "zulu"]);
        assert!(snap.get("alpha").unwrap().missing);
        assert!(snap.get("bravo").is_none());
    }
}
