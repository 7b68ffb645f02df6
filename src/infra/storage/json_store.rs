use crate::core::storage::{Collection, KeyValueStore, Layout, StoreError};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// The whole store as it sits on disk:
/// { collection: { guild_id: record } } for per-guild collections and
/// { collection: { guild_id: { entity_id: record } } } for everything else.
/// Ids are strings because JSON object keys are.
type Document = BTreeMap<String, BTreeMap<String, Value>>;

/// File-backed document store.
///
/// The document lives in memory and is rewritten to disk in full on every
/// mutation. Mutations hold the write lock across the disk write, so writers
/// inside this process are serialized. Two processes sharing the file will
/// silently lose each other's changes.
pub struct JsonKvStore {
    path: PathBuf,
    document: RwLock<Document>,
}

impl JsonKvStore {
    /// Open (or create) the document at `path`.
    ///
    /// A file that does not parse is moved to `<path>.corrupt` and replaced
    /// with an empty document. Missing top-level collections are added and
    /// the document is saved once.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut document = if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            match serde_json::from_reader::<_, Document>(reader) {
                Ok(document) => document,
                Err(err) => {
                    let backup = sidecar(&path, "corrupt");
                    tracing::error!(
                        path = %path.display(),
                        backup = %backup.display(),
                        "Failed to decode database file, starting a new one: {err}"
                    );
                    std::fs::rename(&path, &backup)?;
                    Document::new()
                }
            }
        } else {
            tracing::info!(path = %path.display(), "Database file not found, creating a new one");
            Document::new()
        };

        for collection in Collection::REQUIRED {
            document.entry(collection.name().to_string()).or_default();
        }
        write_document(&path, &document)?;

        Ok(Self {
            path,
            document: RwLock::new(document),
        })
    }

    /// Guild ids that have at least one record in the collection.
    pub async fn guild_ids(&self, collection: Collection) -> Vec<u64> {
        let document = self.document.read().await;
        document
            .get(collection.name())
            .map(|section| {
                section
                    .keys()
                    .filter_map(|key| key.parse::<u64>().ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Apply `mutate` to the guild's slot and write the document. When the
    /// write fails the slot is put back the way it was.
    async fn mutate_guild<F>(
        &self,
        collection: Collection,
        guild_id: u64,
        mutate: F,
    ) -> Result<(), StoreError>
    where
        F: FnOnce(&mut BTreeMap<String, Value>, &str) -> bool + Send,
    {
        let guild_key = guild_id.to_string();
        let mut document = self.document.write().await;
        let section = document.entry(collection.name().to_string()).or_default();
        let snapshot = section.get(&guild_key).cloned();

        if !mutate(section, &guild_key) {
            return Ok(());
        }

        if let Err(err) = write_document(&self.path, &document) {
            let section = document.entry(collection.name().to_string()).or_default();
            match snapshot {
                Some(previous) => {
                    section.insert(guild_key, previous);
                }
                None => {
                    section.remove(&guild_key);
                }
            }
            return Err(err);
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for JsonKvStore {
    async fn load(
        &self,
        collection: Collection,
        guild_id: u64,
        entity_id: u64,
    ) -> Result<Option<Value>, StoreError> {
        let document = self.document.read().await;
        let Some(slot) = document
            .get(collection.name())
            .and_then(|section| section.get(&guild_id.to_string()))
        else {
            return Ok(None);
        };

        Ok(match collection.layout() {
            Layout::PerGuild => Some(slot.clone()),
            Layout::PerEntity => slot.get(entity_id.to_string()).cloned(),
        })
    }

    async fn save(
        &self,
        collection: Collection,
        guild_id: u64,
        entity_id: u64,
        record: Value,
    ) -> Result<(), StoreError> {
        let layout = collection.layout();
        self.mutate_guild(collection, guild_id, move |section, guild_key| {
            match layout {
                Layout::PerGuild => {
                    section.insert(guild_key.to_string(), record);
                }
                Layout::PerEntity => {
                    let slot = section
                        .entry(guild_key.to_string())
                        .or_insert_with(|| Value::Object(Map::new()));
                    if !slot.is_object() {
                        *slot = Value::Object(Map::new());
                    }
                    if let Value::Object(entities) = slot {
                        entities.insert(entity_id.to_string(), record);
                    }
                }
            }
            true
        })
        .await
    }

    async fn erase(
        &self,
        collection: Collection,
        guild_id: u64,
        entity_id: u64,
    ) -> Result<(), StoreError> {
        let layout = collection.layout();
        self.mutate_guild(collection, guild_id, move |section, guild_key| match layout {
            Layout::PerGuild => section.remove(guild_key).is_some(),
            Layout::PerEntity => {
                let Some(Value::Object(entities)) = section.get_mut(guild_key) else {
                    return false;
                };
                let removed = entities.remove(&entity_id.to_string()).is_some();
                if entities.is_empty() {
                    section.remove(guild_key);
                }
                removed
            }
        })
        .await
    }

    async fn load_all(
        &self,
        collection: Collection,
        guild_id: u64,
    ) -> Result<Vec<(u64, Value)>, StoreError> {
        let document = self.document.read().await;
        let Some(slot) = document
            .get(collection.name())
            .and_then(|section| section.get(&guild_id.to_string()))
        else {
            return Ok(Vec::new());
        };

        Ok(match collection.layout() {
            Layout::PerGuild => vec![(guild_id, slot.clone())],
            Layout::PerEntity => slot
                .as_object()
                .map(|entities| {
                    entities
                        .iter()
                        .filter_map(|(key, record)| match key.parse::<u64>() {
                            Ok(entity_id) => Some((entity_id, record.clone())),
                            Err(_) => {
                                tracing::warn!(%collection, guild_id, key = %key, "Ignoring non-numeric entity key");
                                None
                            }
                        })
                        .collect()
                })
                .unwrap_or_default(),
        })
    }

    async fn erase_all(&self, collection: Collection, guild_id: u64) -> Result<(), StoreError> {
        self.mutate_guild(collection, guild_id, |section, guild_key| {
            section.remove(guild_key).is_some()
        })
        .await
    }
}

fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// Write the full document next to `path`, then move it into place so a
/// crash mid-write never leaves a truncated file behind.
fn write_document(path: &Path, document: &Document) -> Result<(), StoreError> {
    let tmp = sidecar(path, "tmp");
    let mut file = File::create(&tmp)?;
    serde_json::to_writer_pretty(&mut file, document)?;
    file.flush()?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn new_document_contains_required_collections() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bot_database.json");

        JsonKvStore::open(&path).unwrap();

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        for collection in Collection::REQUIRED {
            assert!(raw.get(collection.name()).is_some(), "missing {collection}");
        }
    }

    #[tokio::test]
    async fn records_survive_a_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db.json");

        let store = JsonKvStore::open(&path).unwrap();
        assert!(store.put(Collection::Levels, 7, 5, &json!({"xp": 123})).await);
        assert!(store.put(Collection::Guilds, 7, 7, &json!({"leveling_enabled": true})).await);
        drop(store);

        let reloaded = JsonKvStore::open(&path).unwrap();
        let progress: Value = reloaded.get(Collection::Levels, 7, 5, Value::Null).await;
        assert_eq!(progress, json!({"xp": 123}));
        let guild: Value = reloaded.get(Collection::Guilds, 7, 7, Value::Null).await;
        assert_eq!(guild, json!({"leveling_enabled": true}));
    }

    #[tokio::test]
    async fn layout_uses_string_keyed_nesting() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db.json");

        let store = JsonKvStore::open(&path).unwrap();
        store.put(Collection::Levels, 7, 5, &json!({"xp": 1})).await;
        store.put(Collection::Guilds, 7, 7, &json!({"welcome_enabled": false})).await;

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["levels"]["7"]["5"], json!({"xp": 1}));
        assert_eq!(raw["guilds"]["7"], json!({"welcome_enabled": false}));
    }

    #[tokio::test]
    async fn reading_an_absent_key_writes_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db.json");
        let store = JsonKvStore::open(&path).unwrap();
        let before = std::fs::read_to_string(&path).unwrap();

        let value: Value = store.get(Collection::Levels, 1, 2, json!("default")).await;

        assert_eq!(value, json!("default"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
        assert!(store.guild_ids(Collection::Levels).await.is_empty());
    }

    #[tokio::test]
    async fn failed_write_leaves_memory_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("db.json");
        let store = JsonKvStore::open(&path).unwrap();
        assert!(store.put(Collection::Levels, 1, 2, &json!({"xp": 10})).await);

        std::fs::remove_dir_all(dir.path().join("nested")).unwrap();

        assert!(!store.put(Collection::Levels, 1, 2, &json!({"xp": 99})).await);
        assert!(!store.put(Collection::Levels, 1, 3, &json!({"xp": 5})).await);
        assert!(!store.delete(Collection::Levels, 1, 2).await);

        let value: Value = store.get(Collection::Levels, 1, 2, Value::Null).await;
        assert_eq!(value, json!({"xp": 10}));
        let missing: Value = store.get(Collection::Levels, 1, 3, Value::Null).await;
        assert_eq!(missing, Value::Null);
    }

    #[tokio::test]
    async fn deleting_an_absent_record_succeeds() {
        let dir = tempdir().unwrap();
        let store = JsonKvStore::open(dir.path().join("db.json")).unwrap();

        assert!(store.delete(Collection::Levels, 1, 2).await);
        assert!(store.delete(Collection::Guilds, 1, 1).await);
    }

    #[tokio::test]
    async fn corrupt_file_is_set_aside() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = JsonKvStore::open(&path).unwrap();

        assert!(dir.path().join("db.json.corrupt").exists());
        assert!(store.load_all(Collection::Levels, 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clearing_a_guild_removes_only_that_guild() {
        let dir = tempdir().unwrap();
        let store = JsonKvStore::open(dir.path().join("db.json")).unwrap();
        store.put(Collection::Levels, 1, 10, &json!({})).await;
        store.put(Collection::Levels, 2, 10, &json!({})).await;

        assert!(store.clear_guild(Collection::Levels, 1).await);

        assert_eq!(store.guild_ids(Collection::Levels).await, vec![2]);
    }
}
