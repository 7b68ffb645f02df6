// In-memory implementation of KeyValueStore.
//
// Nothing survives a restart. Backs the services' unit tests and
// `STORE_BACKEND=memory` runs.

use crate::core::storage::{Collection, KeyValueStore, StoreError};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
#[cfg(test)]
use std::sync::atomic::{AtomicBool, Ordering};

/// Composite key: the collection plus the normalized (guild, entity) pair.
#[derive(Hash, Eq, PartialEq, Clone, Copy, Debug)]
struct RecordKey {
    collection: Collection,
    guild_id: u64,
    entity_id: u64,
}

impl RecordKey {
    fn new(collection: Collection, guild_id: u64, entity_id: u64) -> Self {
        Self {
            collection,
            guild_id,
            entity_id: collection.entity_key(guild_id, entity_id),
        }
    }
}

/// DashMap-backed store. Safe to share across tasks without an outer lock.
pub struct InMemoryKvStore {
    data: DashMap<RecordKey, Value>,
    #[cfg(test)]
    reject_writes: AtomicBool,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
            #[cfg(test)]
            reject_writes: AtomicBool::new(false),
        }
    }

    /// Make every following mutation fail, as a broken disk would.
    #[cfg(test)]
    pub fn reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        #[cfg(test)]
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "writes rejected",
            )));
        }
        Ok(())
    }
}

impl Default for InMemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKvStore {
    async fn load(
        &self,
        collection: Collection,
        guild_id: u64,
        entity_id: u64,
    ) -> Result<Option<Value>, StoreError> {
        let key = RecordKey::new(collection, guild_id, entity_id);
        Ok(self.data.get(&key).map(|entry| entry.value().clone()))
    }

    async fn save(
        &self,
        collection: Collection,
        guild_id: u64,
        entity_id: u64,
        record: Value,
    ) -> Result<(), StoreError> {
        self.check_writable()?;
        self.data
            .insert(RecordKey::new(collection, guild_id, entity_id), record);
        Ok(())
    }

    async fn erase(
        &self,
        collection: Collection,
        guild_id: u64,
        entity_id: u64,
    ) -> Result<(), StoreError> {
        self.check_writable()?;
        self.data
            .remove(&RecordKey::new(collection, guild_id, entity_id));
        Ok(())
    }

    async fn load_all(
        &self,
        collection: Collection,
        guild_id: u64,
    ) -> Result<Vec<(u64, Value)>, StoreError> {
        Ok(self
            .data
            .iter()
            .filter(|entry| {
                let key = entry.key();
                key.collection == collection && key.guild_id == guild_id
            })
            .map(|entry| (entry.key().entity_id, entry.value().clone()))
            .collect())
    }

    async fn erase_all(&self, collection: Collection, guild_id: u64) -> Result<(), StoreError> {
        self.check_writable()?;
        self.data
            .retain(|key, _| !(key.collection == collection && key.guild_id == guild_id));
        Ok(())
    }
}
