// The storage port shared by every feature.
//
// Everything the bot persists goes through `KeyValueStore`: a record is a JSON
// value addressed by (collection, guild id, entity id). The core only knows
// this trait; the infra layer decides whether the records end up in one JSON
// document or in SQLite tables.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// COLLECTIONS
// ============================================================================

/// How records of a collection are keyed inside a guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layout {
    /// One record per guild. The entity id is always the guild id.
    PerGuild,
    /// One record per (guild, entity) pair.
    PerEntity,
}

/// A named partition of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Guilds,
    Users,
    Giveaways,
    Autoroles,
    Levels,
    Tickets,
    Invites,
    MessageCounts,
    ReactionRoles,
    Polls,
}

impl Collection {
    pub const ALL: [Collection; 10] = [
        Collection::Guilds,
        Collection::Users,
        Collection::Giveaways,
        Collection::Autoroles,
        Collection::Levels,
        Collection::Tickets,
        Collection::Invites,
        Collection::MessageCounts,
        Collection::ReactionRoles,
        Collection::Polls,
    ];

    /// Top-level collections every JSON document must contain.
    pub const REQUIRED: [Collection; 9] = [
        Collection::Guilds,
        Collection::Users,
        Collection::Giveaways,
        Collection::Autoroles,
        Collection::Levels,
        Collection::Tickets,
        Collection::Invites,
        Collection::MessageCounts,
        Collection::ReactionRoles,
    ];

    /// Key of the collection in the JSON document.
    pub fn name(self) -> &'static str {
        match self {
            Collection::Guilds => "guilds",
            Collection::Users => "users",
            Collection::Giveaways => "giveaways",
            Collection::Autoroles => "autoroles",
            Collection::Levels => "levels",
            Collection::Tickets => "tickets",
            Collection::Invites => "invites",
            Collection::MessageCounts => "message_counts",
            Collection::ReactionRoles => "reaction_roles",
            Collection::Polls => "polls",
        }
    }

    /// Table backing the collection in the relational store.
    ///
    /// User progress lives in `users` (keyed by guild + user), so the
    /// free-form per-user settings collection gets its own table name.
    pub fn table(self) -> &'static str {
        match self {
            Collection::Users => "user_settings",
            Collection::Levels => "users",
            other => other.name(),
        }
    }

    pub fn layout(self) -> Layout {
        match self {
            Collection::Guilds | Collection::Autoroles => Layout::PerGuild,
            _ => Layout::PerEntity,
        }
    }

    /// Normalize an entity id for this collection.
    pub fn entity_key(self, guild_id: u64, entity_id: u64) -> u64 {
        match self.layout() {
            Layout::PerGuild => guild_id,
            Layout::PerEntity => entity_id,
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(String),
}

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

/// Guild-scoped key-value persistence.
///
/// Backends implement the fallible primitives (`load`, `save`, `erase`,
/// `load_all`, `erase_all`). Callers use the provided methods, which give the
/// store boundary its contract: absence is a value, failures are logged and
/// turned into defaults or `false`, nothing propagates as a panic.
///
/// Writes are last-writer-wins. A read-modify-write through `fetch` + `put`
/// is not isolated from a concurrent writer to the same key.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Raw record at the key, `None` if absent.
    async fn load(
        &self,
        collection: Collection,
        guild_id: u64,
        entity_id: u64,
    ) -> Result<Option<Value>, StoreError>;

    /// Create or overwrite the record at the key.
    async fn save(
        &self,
        collection: Collection,
        guild_id: u64,
        entity_id: u64,
        record: Value,
    ) -> Result<(), StoreError>;

    /// Remove the record at the key. Absent keys are not an error.
    async fn erase(
        &self,
        collection: Collection,
        guild_id: u64,
        entity_id: u64,
    ) -> Result<(), StoreError>;

    /// Every record of a guild in the collection.
    async fn load_all(
        &self,
        collection: Collection,
        guild_id: u64,
    ) -> Result<Vec<(u64, Value)>, StoreError>;

    /// Remove every record of a guild in the collection.
    async fn erase_all(&self, collection: Collection, guild_id: u64) -> Result<(), StoreError>;

    /// Typed read that keeps failures apart from absence.
    async fn fetch<T>(
        &self,
        collection: Collection,
        guild_id: u64,
        entity_id: u64,
    ) -> Result<Option<T>, StoreError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        match self.load(collection, guild_id, entity_id).await? {
            Some(raw) => Ok(Some(serde_json::from_value(raw)?)),
            None => Ok(None),
        }
    }

    /// The stored record, or `default` when it is absent or unreadable.
    async fn get<T>(&self, collection: Collection, guild_id: u64, entity_id: u64, default: T) -> T
    where
        T: DeserializeOwned + Send + 'static,
    {
        match self.fetch(collection, guild_id, entity_id).await {
            Ok(Some(record)) => record,
            Ok(None) => default,
            Err(err) => {
                tracing::warn!(
                    %collection,
                    guild_id,
                    entity_id,
                    "Failed to read record, using default: {err}"
                );
                default
            }
        }
    }

    /// Store `record` in full. Returns `false` if it could not be persisted.
    async fn put<T>(&self, collection: Collection, guild_id: u64, entity_id: u64, record: &T) -> bool
    where
        T: Serialize + Sync,
    {
        let raw = match serde_json::to_value(record) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::error!(%collection, guild_id, entity_id, "Failed to encode record: {err}");
                return false;
            }
        };

        match self.save(collection, guild_id, entity_id, raw).await {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(%collection, guild_id, entity_id, "Failed to save record: {err}");
                false
            }
        }
    }

    /// Remove a record. Removing an absent record succeeds.
    async fn delete(&self, collection: Collection, guild_id: u64, entity_id: u64) -> bool {
        match self.erase(collection, guild_id, entity_id).await {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(%collection, guild_id, entity_id, "Failed to delete record: {err}");
                false
            }
        }
    }

    /// All decodable records of a guild. Order is unspecified.
    async fn scan<T>(&self, collection: Collection, guild_id: u64) -> Vec<(u64, T)>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let rows = match self.load_all(collection, guild_id).await {
            Ok(rows) => rows,
            Err(err) => {
                tracing::error!(%collection, guild_id, "Failed to scan records: {err}");
                return Vec::new();
            }
        };

        rows.into_iter()
            .filter_map(|(entity_id, raw)| match serde_json::from_value(raw) {
                Ok(record) => Some((entity_id, record)),
                Err(err) => {
                    tracing::warn!(
                        %collection,
                        guild_id,
                        entity_id,
                        "Skipping undecodable record: {err}"
                    );
                    None
                }
            })
            .collect()
    }

    /// Drop every record of a guild in one mutation.
    async fn clear_guild(&self, collection: Collection, guild_id: u64) -> bool {
        match self.erase_all(collection, guild_id).await {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(%collection, guild_id, "Failed to clear guild records: {err}");
                false
            }
        }
    }
}
