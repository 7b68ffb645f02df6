use crate::core::storage::{Collection, KeyValueStore, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;

/// Relational store: one table per collection, one row per record.
///
/// Every call is a single statement, so each record changes atomically. There
/// is no row locking; read-modify-write sequences are last-writer-wins.
pub struct SqliteKvStore {
    pool: Pool<Sqlite>,
}

/// One record to bulk-load: (collection, guild id, entity id, record).
pub type ImportRecord = (Collection, u64, u64, Value);

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

fn upsert_sql(collection: Collection) -> String {
    format!(
        r#"
        INSERT INTO {} (guild_id, entity_id, data, updated_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(guild_id, entity_id) DO UPDATE SET
            data = excluded.data,
            updated_at = excluded.updated_at
        "#,
        collection.table()
    )
}

impl SqliteKvStore {
    pub async fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(db_err)?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        for collection in Collection::ALL {
            let ddl = format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    guild_id INTEGER NOT NULL,
                    entity_id INTEGER NOT NULL,
                    data TEXT NOT NULL,
                    updated_at INTEGER NOT NULL,
                    PRIMARY KEY (guild_id, entity_id)
                );
                "#,
                table = collection.table()
            );
            sqlx::query(&ddl)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
        }
        Ok(())
    }

    /// True when no collection holds a single row.
    pub async fn is_empty(&self) -> Result<bool, StoreError> {
        for collection in Collection::ALL {
            let sql = format!("SELECT 1 FROM {} LIMIT 1", collection.table());
            let row = sqlx::query(&sql)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
            if row.is_some() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Write every record inside one transaction: all of them land or none do.
    pub async fn import(&self, records: &[ImportRecord]) -> Result<usize, StoreError> {
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        for (collection, guild_id, entity_id, record) in records {
            let data = serde_json::to_string(record)?;
            sqlx::query(&upsert_sql(*collection))
                .bind(*guild_id as i64)
                .bind(collection.entity_key(*guild_id, *entity_id) as i64)
                .bind(data)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(records.len())
    }
}

#[async_trait]
impl KeyValueStore for SqliteKvStore {
    async fn load(
        &self,
        collection: Collection,
        guild_id: u64,
        entity_id: u64,
    ) -> Result<Option<Value>, StoreError> {
        let sql = format!(
            "SELECT data FROM {} WHERE guild_id = ? AND entity_id = ?",
            collection.table()
        );
        let row = sqlx::query(&sql)
            .bind(guild_id as i64)
            .bind(collection.entity_key(guild_id, entity_id) as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        match row {
            Some(row) => {
                let data: String = row.get("data");
                Ok(Some(serde_json::from_str(&data)?))
            }
            None => Ok(None),
        }
    }

    async fn save(
        &self,
        collection: Collection,
        guild_id: u64,
        entity_id: u64,
        record: Value,
    ) -> Result<(), StoreError> {
        let data = serde_json::to_string(&record)?;
        sqlx::query(&upsert_sql(collection))
            .bind(guild_id as i64)
            .bind(collection.entity_key(guild_id, entity_id) as i64)
            .bind(data)
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn erase(
        &self,
        collection: Collection,
        guild_id: u64,
        entity_id: u64,
    ) -> Result<(), StoreError> {
        let sql = format!(
            "DELETE FROM {} WHERE guild_id = ? AND entity_id = ?",
            collection.table()
        );
        sqlx::query(&sql)
            .bind(guild_id as i64)
            .bind(collection.entity_key(guild_id, entity_id) as i64)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn load_all(
        &self,
        collection: Collection,
        guild_id: u64,
    ) -> Result<Vec<(u64, Value)>, StoreError> {
        let sql = format!(
            "SELECT entity_id, data FROM {} WHERE guild_id = ?",
            collection.table()
        );
        let rows = sqlx::query(&sql)
            .bind(guild_id as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let entity_id: i64 = row.get("entity_id");
            let data: String = row.get("data");
            match serde_json::from_str(&data) {
                Ok(record) => records.push((entity_id as u64, record)),
                Err(err) => {
                    tracing::warn!(%collection, guild_id, entity_id, "Skipping malformed row: {err}");
                }
            }
        }
        Ok(records)
    }

    async fn erase_all(&self, collection: Collection, guild_id: u64) -> Result<(), StoreError> {
        let sql = format!("DELETE FROM {} WHERE guild_id = ?", collection.table());
        sqlx::query(&sql)
            .bind(guild_id as i64)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}
