// Storage backends and the startup-time choice between them.

pub mod in_memory;
pub mod json_store;
pub mod sqlite_store;

pub use in_memory::InMemoryKvStore;
pub use json_store::JsonKvStore;
pub use sqlite_store::{ImportRecord, SqliteKvStore};

use crate::config::{StoreConfig, StoreKind};
use crate::core::storage::{Collection, KeyValueStore, StoreError};
use async_trait::async_trait;
use serde_json::Value;

/// The backend the bot runs on, picked once from configuration.
pub enum StoreBackend {
    Json(JsonKvStore),
    Sqlite(SqliteKvStore),
    /// Nothing is written anywhere; state is gone on restart.
    Memory(InMemoryKvStore),
}

impl StoreBackend {
    pub async fn open(config: &StoreConfig) -> anyhow::Result<Self> {
        match config.kind {
            StoreKind::Json => {
                let store = JsonKvStore::open(&config.json_path)?;
                tracing::info!(path = %config.json_path.display(), "Using JSON storage");
                Ok(Self::Json(store))
            }
            StoreKind::Sqlite => {
                let store = SqliteKvStore::new(&config.sqlite_path).await?;
                tracing::info!(path = %config.sqlite_path.display(), "Using SQLite storage");

                if store.is_empty().await? && config.json_path.exists() {
                    let source = JsonKvStore::open(&config.json_path)?;
                    let copied = migrate_json_into_sqlite(&source, &store).await?;
                    tracing::info!(
                        records = copied,
                        from = %config.json_path.display(),
                        "Imported JSON database into SQLite"
                    );
                }
                Ok(Self::Sqlite(store))
            }
            StoreKind::Memory => {
                tracing::warn!("Using in-memory storage, nothing will survive a restart");
                Ok(Self::Memory(InMemoryKvStore::new()))
            }
        }
    }
}

/// Copy every record of every collection from the JSON document into SQLite.
///
/// The copy is one transaction. If it fails the database stays empty and the
/// import is attempted again on the next start.
pub async fn migrate_json_into_sqlite(
    source: &JsonKvStore,
    target: &SqliteKvStore,
) -> Result<usize, StoreError> {
    let mut records: Vec<ImportRecord> = Vec::new();
    for collection in Collection::ALL {
        for guild_id in source.guild_ids(collection).await {
            for (entity_id, record) in source.load_all(collection, guild_id).await? {
                records.push((collection, guild_id, entity_id, record));
            }
        }
    }
    target.import(&records).await
}

#[async_trait]
impl KeyValueStore for StoreBackend {
    async fn load(
        &self,
        collection: Collection,
        guild_id: u64,
        entity_id: u64,
    ) -> Result<Option<Value>, StoreError> {
        match self {
            Self::Json(store) => store.load(collection, guild_id, entity_id).await,
            Self::Sqlite(store) => store.load(collection, guild_id, entity_id).await,
            Self::Memory(store) => store.load(collection, guild_id, entity_id).await,
        }
    }

    async fn save(
        &self,
        collection: Collection,
        guild_id: u64,
        entity_id: u64,
        record: Value,
    ) -> Result<(), StoreError> {
        match self {
            Self::Json(store) => store.save(collection, guild_id, entity_id, record).await,
            Self::Sqlite(store) => store.save(collection, guild_id, entity_id, record).await,
            Self::Memory(store) => store.save(collection, guild_id, entity_id, record).await,
        }
    }

    async fn erase(
        &self,
        collection: Collection,
        guild_id: u64,
        entity_id: u64,
    ) -> Result<(), StoreError> {
        match self {
            Self::Json(store) => store.erase(collection, guild_id, entity_id).await,
            Self::Sqlite(store) => store.erase(collection, guild_id, entity_id).await,
            Self::Memory(store) => store.erase(collection, guild_id, entity_id).await,
        }
    }

    async fn load_all(
        &self,
        collection: Collection,
        guild_id: u64,
    ) -> Result<Vec<(u64, Value)>, StoreError> {
        match self {
            Self::Json(store) => store.load_all(collection, guild_id).await,
            Self::Sqlite(store) => store.load_all(collection, guild_id).await,
            Self::Memory(store) => store.load_all(collection, guild_id).await,
        }
    }

    async fn erase_all(&self, collection: Collection, guild_id: u64) -> Result<(), StoreError> {
        match self {
            Self::Json(store) => store.erase_all(collection, guild_id).await,
            Self::Sqlite(store) => store.erase_all(collection, guild_id).await,
            Self::Memory(store) => store.erase_all(collection, guild_id).await,
        }
    }
}
