// Guild settings: typed access to the one `GuildRecord` each guild has.
//
// Every setter is a partial update: fetch (or start from defaults), change
// only the supplied fields, put once, hand back the result.

pub mod settings_models;

pub use settings_models::{GuildRecord, Snowflake, WelcomeUpdate};

use crate::core::storage::{Collection, KeyValueStore};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("Could not read or write settings for guild {0}")]
    PersistenceFailure(u64),

    #[error("Invalid guild ID")]
    InvalidId,
}

pub struct GuildSettingsService<S> {
    store: Arc<S>,
}

impl<S: KeyValueStore> GuildSettingsService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Stored settings or the defaults. A read never creates a record.
    pub async fn get_settings(&self, guild_id: u64) -> GuildRecord {
        let mut record = self
            .store
            .get(Collection::Guilds, guild_id, guild_id, GuildRecord::default())
            .await;
        record.autorole_id = self.get_autorole(guild_id).await;
        record
    }

    /// The autorole has its own collection, one role id per guild.
    pub async fn get_autorole(&self, guild_id: u64) -> Option<u64> {
        self.store
            .get::<Option<Snowflake>>(Collection::Autoroles, guild_id, guild_id, None)
            .await
            .map(|role| role.0)
    }

    async fn load_record(&self, guild_id: u64) -> Result<GuildRecord, SettingsError> {
        match self
            .store
            .fetch::<GuildRecord>(Collection::Guilds, guild_id, guild_id)
            .await
        {
            Ok(record) => Ok(record.unwrap_or_default()),
            Err(err) => {
                tracing::error!(guild_id, "Failed to load guild settings: {err}");
                Err(SettingsError::PersistenceFailure(guild_id))
            }
        }
    }

    async fn update<F>(&self, guild_id: u64, change: F) -> Result<GuildRecord, SettingsError>
    where
        F: FnOnce(&mut GuildRecord),
    {
        if guild_id == 0 {
            return Err(SettingsError::InvalidId);
        }

        let mut record = self.load_record(guild_id).await?;
        change(&mut record);

        if !self
            .store
            .put(Collection::Guilds, guild_id, guild_id, &record)
            .await
        {
            return Err(SettingsError::PersistenceFailure(guild_id));
        }
        record.autorole_id = self.get_autorole(guild_id).await;
        Ok(record)
    }

    /// Set or clear the role given on join. Only the `autoroles` entry is
    /// written; the guild document is left alone.
    pub async fn set_autorole(
        &self,
        guild_id: u64,
        role_id: Option<u64>,
    ) -> Result<GuildRecord, SettingsError> {
        if guild_id == 0 {
            return Err(SettingsError::InvalidId);
        }

        let saved = match role_id {
            Some(role_id) => {
                self.store
                    .put(Collection::Autoroles, guild_id, guild_id, &Snowflake(role_id))
                    .await
            }
            None => {
                self.store
                    .delete(Collection::Autoroles, guild_id, guild_id)
                    .await
            }
        };
        if !saved {
            return Err(SettingsError::PersistenceFailure(guild_id));
        }

        let mut record = self.load_record(guild_id).await?;
        record.autorole_id = role_id;
        Ok(record)
    }

    pub async fn set_welcome(
        &self,
        guild_id: u64,
        update: WelcomeUpdate,
    ) -> Result<GuildRecord, SettingsError> {
        self.update(guild_id, |record| {
            if let Some(enabled) = update.enabled {
                record.welcome_enabled = enabled;
            }
            if let Some(channel_id) = update.channel_id {
                record.welcome_channel_id = Some(channel_id);
            }
            if let Some(template) = update.template {
                record.welcome_message = Some(template);
            }
        })
        .await
    }

    pub async fn set_leveling_enabled(
        &self,
        guild_id: u64,
        enabled: bool,
    ) -> Result<GuildRecord, SettingsError> {
        self.update(guild_id, |record| record.leveling_enabled = enabled)
            .await
    }

    /// `None` sends announcements to the channel the message came from.
    pub async fn set_level_notification_channel(
        &self,
        guild_id: u64,
        channel_id: Option<u64>,
    ) -> Result<GuildRecord, SettingsError> {
        self.update(guild_id, |record| record.level_channel_id = channel_id)
            .await
    }

    /// Map `level` to a reward role, or drop the reward with `None`.
    pub async fn set_level_role_reward(
        &self,
        guild_id: u64,
        level: u32,
        role_id: Option<u64>,
    ) -> Result<GuildRecord, SettingsError> {
        self.update(guild_id, |record| match role_id {
            Some(role_id) => {
                record.level_roles.insert(level, role_id);
            }
            None => {
                record.level_roles.remove(&level);
            }
        })
        .await
    }

    /// `None` keeps the stored value.
    pub async fn set_logging(
        &self,
        guild_id: u64,
        enabled: Option<bool>,
        channel_id: Option<u64>,
    ) -> Result<GuildRecord, SettingsError> {
        self.update(guild_id, |record| {
            if let Some(enabled) = enabled {
                record.logging_enabled = enabled;
            }
            if let Some(channel_id) = channel_id {
                record.logging_channel_id = Some(channel_id);
            }
        })
        .await
    }

    pub async fn set_ticket_system(
        &self,
        guild_id: u64,
        enabled: Option<bool>,
        channel_id: Option<u64>,
    ) -> Result<GuildRecord, SettingsError> {
        self.update(guild_id, |record| {
            if let Some(enabled) = enabled {
                record.ticket_enabled = enabled;
            }
            if let Some(channel_id) = channel_id {
                record.ticket_channel_id = Some(channel_id);
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::storage::{InMemoryKvStore, JsonKvStore};
    use serde_json::{json, Value};
    use tempfile::tempdir;

    const GUILD: u64 = 42;

    fn make_service() -> (Arc<InMemoryKvStore>, GuildSettingsService<InMemoryKvStore>) {
        let store = Arc::new(InMemoryKvStore::new());
        (Arc::clone(&store), GuildSettingsService::new(store))
    }

    #[tokio::test]
    async fn unseen_guild_reads_as_defaults_without_writing() {
        let (store, service) = make_service();

        assert_eq!(service.get_settings(GUILD).await, GuildRecord::default());
        assert!(store.load(Collection::Guilds, GUILD, GUILD).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn welcome_updates_are_partial() {
        let (_, service) = make_service();

        service
            .set_welcome(
                GUILD,
                WelcomeUpdate {
                    template: Some("hi {member}".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let record = service
            .set_welcome(
                GUILD,
                WelcomeUpdate {
                    enabled: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(record.welcome_enabled);
        assert_eq!(record.welcome_message.as_deref(), Some("hi {member}"));
        assert_eq!(service.get_settings(GUILD).await, record);
    }

    #[tokio::test]
    async fn setters_leave_unrelated_fields_alone() {
        let (_, service) = make_service();

        service.set_autorole(GUILD, Some(5)).await.unwrap();
        service.set_leveling_enabled(GUILD, true).await.unwrap();
        service.set_level_notification_channel(GUILD, Some(9)).await.unwrap();
        service.set_logging(GUILD, Some(true), None).await.unwrap();
        let record = service.set_ticket_system(GUILD, None, Some(77)).await.unwrap();

        assert_eq!(record.autorole_id, Some(5));
        assert!(record.leveling_enabled);
        assert_eq!(record.level_channel_id, Some(9));
        assert!(record.logging_enabled);
        assert_eq!(record.logging_channel_id, None);
        assert!(!record.ticket_enabled);
        assert_eq!(record.ticket_channel_id, Some(77));
    }

    #[tokio::test]
    async fn level_rewards_can_be_added_and_removed() {
        let (_, service) = make_service();

        service.set_level_role_reward(GUILD, 5, Some(500)).await.unwrap();
        service.set_level_role_reward(GUILD, 10, Some(1000)).await.unwrap();
        let record = service.set_level_role_reward(GUILD, 5, None).await.unwrap();

        assert_eq!(record.level_roles.len(), 1);
        assert_eq!(record.level_roles.get(&10), Some(&1000));
    }

    #[tokio::test]
    async fn clearing_the_autorole() {
        let (_, service) = make_service();
        service.set_autorole(GUILD, Some(5)).await.unwrap();

        let record = service.set_autorole(GUILD, None).await.unwrap();

        assert_eq!(record.autorole_id, None);
        assert_eq!(service.get_settings(GUILD).await.autorole_id, None);
    }

    #[tokio::test]
    async fn autorole_lives_in_its_own_collection() {
        let (store, service) = make_service();

        let record = service.set_autorole(GUILD, Some(77)).await.unwrap();

        assert_eq!(record.autorole_id, Some(77));
        assert_eq!(
            store.load(Collection::Autoroles, GUILD, GUILD).await.unwrap(),
            Some(json!("77"))
        );
        assert!(store.load(Collection::Guilds, GUILD, GUILD).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn existing_bot_database_keeps_its_settings() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bot_database.json");
        let legacy = json!({
            "guilds": {
                "42": {
                    "settings": {},
                    "autorole": null,
                    "welcome": {"enabled": true, "channel_id": "55", "message": "Hey {user}!"},
                    "logging": {"enabled": false, "channel_id": null, "events": []},
                    "levels": {"enabled": true, "channel_id": null, "roles": {"5": "500"}},
                    "reaction_roles": {},
                    "ticket_system": {"enabled": false, "category_id": null, "message_id": null, "channel_id": null}
                }
            },
            "users": {}, "giveaways": {}, "autoroles": {"42": "77"}, "levels": {},
            "tickets": {}, "invites": {}, "message_counts": {}, "reaction_roles": {}
        });
        std::fs::write(&path, legacy.to_string()).unwrap();
        let service = GuildSettingsService::new(Arc::new(JsonKvStore::open(&path).unwrap()));

        let settings = service.get_settings(GUILD).await;
        assert!(settings.welcome_enabled);
        assert_eq!(settings.welcome_channel_id, Some(55));
        assert_eq!(settings.render_welcome("bob", "x"), "Hey bob!");
        assert!(settings.leveling_enabled);
        assert_eq!(settings.level_roles.get(&5), Some(&500));
        assert_eq!(settings.autorole_id, Some(77));

        service.set_level_notification_channel(GUILD, Some(9)).await.unwrap();

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let guild = &raw["guilds"]["42"];
        assert_eq!(guild["welcome"]["channel_id"], json!("55"));
        assert_eq!(guild["welcome"]["message"], json!("Hey {user}!"));
        assert_eq!(guild["levels"]["roles"], json!({"5": "500"}));
        assert_eq!(guild["levels"]["channel_id"], json!("9"));
        assert_eq!(guild["logging"]["events"], json!([]));
        assert_eq!(guild["ticket_system"]["category_id"], Value::Null);
        assert_eq!(raw["autoroles"]["42"], json!("77"));
    }

    #[tokio::test]
    async fn failed_write_is_reported_and_invisible() {
        let (store, service) = make_service();
        store.reject_writes(true);

        let err = service.set_leveling_enabled(GUILD, true).await.unwrap_err();

        assert_eq!(err, SettingsError::PersistenceFailure(GUILD));
        assert!(!service.get_settings(GUILD).await.leveling_enabled);
    }

    #[tokio::test]
    async fn guild_zero_is_rejected() {
        let (_, service) = make_service();

        assert_eq!(
            service.set_autorole(0, Some(1)).await.unwrap_err(),
            SettingsError::InvalidId
        );
    }
}
