use async_trait::async_trait;
use scc::{HashMap, hash_map::Entry};

use crate::ports::kv_store::{KvStore, StoreResult};

/// Process-local [`KvStore`] backed by a concurrent `scc::HashMap`.
///
/// Entries never expire; they live until deleted or until the process exits.
#[derive(Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self
            .entries
            .get_async(key)
            .await
            .map(|entry| entry.get().clone()))
    }

    async fn put(&self, key: &str, value: String) -> StoreResult<()> {
        match self.entries.entry_async(key.to_string()).await {
            Entry::Occupied(mut occupied) => {
                occupied.insert(value);
            }
            Entry::Vacant(vacant) => {
                vacant.insert_entry(value);
            }
        }
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, value: String) -> StoreResult<bool> {
        Ok(self
            .entries
            .insert_async(key.to_string(), value)
            .await
            .is_ok())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        Ok(self.entries.remove_async(key).await.is_some())
    }
}
