//! In-memory store for tests and dry runs. Same CAS contract as the file
//! store, no durability.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;

use super::KvStore;
use crate::error::StoreError;

#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let collections = self.collections.read().expect("RwLock poisoned");
        Ok(collections
            .get(collection)
            .and_then(|c| c.get(key))
            .cloned())
    }

    async fn compare_and_set(
        &self,
        collection: &str,
        key: &str,
        expected: Option<&[u8]>,
        new: &[u8],
    ) -> Result<bool, StoreError> {
        let mut collections = self.collections.write().expect("RwLock poisoned");
        let coll = collections.entry(collection.to_string()).or_default();
        if coll.get(key).map(|v| v.as_slice()) != expected {
            return Ok(false);
        }
        coll.insert(key.to_string(), new.to_vec());
        Ok(true)
    }

    async fn snapshot(&self, collection: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        let collections = self.collections.read().expect("RwLock poisoned");
        let mut out: Vec<(String, Vec<u8>)> = collections
            .get(collection)
            .map(|c| c.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        out.sort_by(|(a, _), (b, _)| match (a.parse::<u64>(), b.parse::<u64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            _ => a.cmp(b),
        });
        Ok(out)
    }
}
