// The leveling module: message xp, cooldowns, admin grants and resets.
// No Discord types in here; ids are plain u64 so the same service backs
// slash commands, event handlers and tests alike.

pub mod leaderboard;
pub mod progression;

pub use leaderboard::{LeaderboardService, Metric};
pub use progression::{xp_for_level, ProgressionConfig, UserProgress};

use crate::core::storage::{Collection, KeyValueStore};
use chrono::{DateTime, Utc};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// DOMAIN MODELS
// ============================================================================

/// Outcome of a message award.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Award {
    Granted(XpGain),
    /// Nothing changed; the user may earn xp again after this long.
    OnCooldown(Duration),
}

/// What an xp mutation did to a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XpGain {
    pub guild_id: u64,
    pub user_id: u64,
    pub amount: u64,
    pub total_xp: u64,
    pub old_level: u32,
    pub new_level: u32,
    pub messages: u64,
}

impl XpGain {
    pub fn leveled_up(&self) -> bool {
        self.new_level > self.old_level
    }

    /// One event per gain, even when several levels were crossed at once.
    pub fn level_up(&self) -> Option<LevelUpEvent> {
        self.leveled_up().then(|| LevelUpEvent {
            user_id: self.user_id,
            guild_id: self.guild_id,
            old_level: self.old_level,
            new_level: self.new_level,
            total_xp: self.total_xp,
        })
    }
}

/// Returned to the Discord layer so it can announce the new level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelUpEvent {
    pub user_id: u64,
    pub guild_id: u64,
    pub old_level: u32,
    pub new_level: u32,
    pub total_xp: u64,
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LevelingError {
    #[error("Could not read or write progress in guild {guild_id}")]
    PersistenceFailure { guild_id: u64, user_id: Option<u64> },

    #[error("XP amount must not be negative (got {0})")]
    NegativeDelta(i64),

    #[error("Invalid user or guild ID")]
    InvalidId,
}

// ============================================================================
// SERVICE
// ============================================================================

/// Owns every change to `UserProgress` records.
///
/// Each mutation is one fetch followed by one put. Two concurrent awards for
/// the same user can both read the old record; the later put wins.
pub struct LevelingService<S> {
    store: Arc<S>,
    config: ProgressionConfig,
}

impl<S: KeyValueStore> LevelingService<S> {
    pub fn new(store: Arc<S>, config: ProgressionConfig) -> Self {
        Self { store, config }
    }

    fn validate_ids(guild_id: u64, user_id: u64) -> Result<(), LevelingError> {
        if user_id == 0 || guild_id == 0 {
            Err(LevelingError::InvalidId)
        } else {
            Ok(())
        }
    }

    /// The stored record, a fresh one if absent. A failed read is an error,
    /// never a reason to start the user over.
    async fn load_progress(
        &self,
        guild_id: u64,
        user_id: u64,
    ) -> Result<UserProgress, LevelingError> {
        match self
            .store
            .fetch::<UserProgress>(Collection::Levels, guild_id, user_id)
            .await
        {
            Ok(progress) => Ok(progress.unwrap_or_default()),
            Err(err) => {
                tracing::error!(guild_id, user_id, "Failed to load progress: {err}");
                Err(LevelingError::PersistenceFailure {
                    guild_id,
                    user_id: Some(user_id),
                })
            }
        }
    }

    async fn save_progress(
        &self,
        guild_id: u64,
        user_id: u64,
        progress: &UserProgress,
    ) -> Result<(), LevelingError> {
        if self
            .store
            .put(Collection::Levels, guild_id, user_id, progress)
            .await
        {
            Ok(())
        } else {
            Err(LevelingError::PersistenceFailure {
                guild_id,
                user_id: Some(user_id),
            })
        }
    }

    /// Award message xp unless the user is still cooling down.
    ///
    /// The amount is `base_amount` plus a uniform roll in `0..=bonus_upper`.
    pub async fn award(
        &self,
        guild_id: u64,
        user_id: u64,
        base_amount: u64,
        bonus_upper: u64,
        now: DateTime<Utc>,
    ) -> Result<Award, LevelingError> {
        Self::validate_ids(guild_id, user_id)?;

        let mut progress = self.load_progress(guild_id, user_id).await?;
        if let Some(remaining) = progress.cooldown_remaining(now, self.config.cooldown) {
            return Ok(Award::OnCooldown(remaining));
        }

        let amount = base_amount.saturating_add(roll_bonus(bonus_upper));
        let old_level = progress.level();
        progress.record_message(amount, now);
        self.save_progress(guild_id, user_id, &progress).await?;

        tracing::debug!(guild_id, user_id, amount, total_xp = progress.xp(), "Awarded message xp");

        Ok(Award::Granted(XpGain {
            guild_id,
            user_id,
            amount,
            total_xp: progress.xp(),
            old_level,
            new_level: progress.level(),
            messages: progress.messages(),
        }))
    }

    /// Award for a message sent right now, with the configured amounts.
    pub async fn process_message(&self, guild_id: u64, user_id: u64) -> Result<Award, LevelingError> {
        self.award(
            guild_id,
            user_id,
            self.config.base_xp,
            self.config.random_bonus,
            Utc::now(),
        )
        .await
    }

    /// Admin grant. Ignores the cooldown and does not count as a message.
    pub async fn grant_xp(
        &self,
        guild_id: u64,
        user_id: u64,
        delta: i64,
    ) -> Result<XpGain, LevelingError> {
        if delta < 0 {
            return Err(LevelingError::NegativeDelta(delta));
        }
        Self::validate_ids(guild_id, user_id)?;

        let amount = delta as u64;
        let mut progress = self.load_progress(guild_id, user_id).await?;
        let old_level = progress.level();
        progress.add_xp(amount);
        self.save_progress(guild_id, user_id, &progress).await?;

        tracing::info!(guild_id, user_id, amount, total_xp = progress.xp(), "Granted xp");

        Ok(XpGain {
            guild_id,
            user_id,
            amount,
            total_xp: progress.xp(),
            old_level,
            new_level: progress.level(),
            messages: progress.messages(),
        })
    }

    /// Read-only view of a user's progress. Nothing is written for new users.
    pub async fn get_progress(
        &self,
        guild_id: u64,
        user_id: u64,
    ) -> Result<UserProgress, LevelingError> {
        Self::validate_ids(guild_id, user_id)?;
        Ok(self
            .store
            .get(Collection::Levels, guild_id, user_id, UserProgress::default())
            .await)
    }

    pub async fn reset_user(&self, guild_id: u64, user_id: u64) -> Result<(), LevelingError> {
        Self::validate_ids(guild_id, user_id)?;
        if self.store.delete(Collection::Levels, guild_id, user_id).await {
            tracing::info!(guild_id, user_id, "Reset user progress");
            Ok(())
        } else {
            Err(LevelingError::PersistenceFailure {
                guild_id,
                user_id: Some(user_id),
            })
        }
    }

    pub async fn reset_guild(&self, guild_id: u64) -> Result<(), LevelingError> {
        if guild_id == 0 {
            return Err(LevelingError::InvalidId);
        }
        if self.store.clear_guild(Collection::Levels, guild_id).await {
            tracing::info!(guild_id, "Reset guild progress");
            Ok(())
        } else {
            Err(LevelingError::PersistenceFailure {
                guild_id,
                user_id: None,
            })
        }
    }
}

fn roll_bonus(upper: u64) -> u64 {
    if upper == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..=upper)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::storage::StoreError;
    use crate::infra::storage::InMemoryKvStore;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use serde_json::Value;

    const GUILD: u64 = 100;
    const USER: u64 = 7;

    /// Store whose reads always fail.
    struct UnreadableStore;

    #[async_trait]
    impl KeyValueStore for UnreadableStore {
        async fn load(&self, _: Collection, _: u64, _: u64) -> Result<Option<Value>, StoreError> {
            Err(StoreError::Database("unreadable".to_string()))
        }

        async fn save(&self, _: Collection, _: u64, _: u64, _: Value) -> Result<(), StoreError> {
            panic!("nothing may be written after a failed read");
        }

        async fn erase(&self, _: Collection, _: u64, _: u64) -> Result<(), StoreError> {
            Err(StoreError::Database("unreadable".to_string()))
        }

        async fn load_all(&self, _: Collection, _: u64) -> Result<Vec<(u64, Value)>, StoreError> {
            Err(StoreError::Database("unreadable".to_string()))
        }

        async fn erase_all(&self, _: Collection, _: u64) -> Result<(), StoreError> {
            Err(StoreError::Database("unreadable".to_string()))
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn make_service() -> (Arc<InMemoryKvStore>, LevelingService<InMemoryKvStore>) {
        let store = Arc::new(InMemoryKvStore::new());
        let service = LevelingService::new(Arc::clone(&store), ProgressionConfig::default());
        (store, service)
    }

    fn granted(award: Award) -> XpGain {
        match award {
            Award::Granted(gain) => gain,
            Award::OnCooldown(remaining) => panic!("unexpected cooldown ({remaining:?})"),
        }
    }

    #[tokio::test]
    async fn first_message_creates_the_record() {
        let (_, service) = make_service();

        let gain = granted(service.award(GUILD, USER, 15, 5, at(1_000)).await.unwrap());

        assert!((15..=20).contains(&gain.amount));
        assert_eq!(gain.total_xp, gain.amount);
        assert_eq!(gain.new_level, 0);
        assert_eq!(gain.messages, 1);
        assert!(!gain.leveled_up());

        let progress = service.get_progress(GUILD, USER).await.unwrap();
        assert_eq!(progress.xp(), gain.total_xp);
        assert_eq!(progress.messages(), 1);
        assert_eq!(progress.last_award(), Some(at(1_000)));
    }

    #[tokio::test]
    async fn second_award_inside_the_window_changes_nothing() {
        let (_, service) = make_service();
        let first = granted(service.award(GUILD, USER, 15, 5, at(1_000)).await.unwrap());

        let second = service.award(GUILD, USER, 15, 5, at(1_059)).await.unwrap();

        assert_eq!(second, Award::OnCooldown(Duration::from_secs(1)));
        let progress = service.get_progress(GUILD, USER).await.unwrap();
        assert_eq!(progress.xp(), first.total_xp);
        assert_eq!(progress.messages(), 1);
        assert_eq!(progress.last_award(), Some(at(1_000)));
    }

    #[tokio::test]
    async fn awards_less_than_a_window_apart_stay_on_cooldown() {
        let (_, service) = make_service();
        let first = Utc.timestamp_opt(1_000, 900_000_000).unwrap();
        let second = Utc.timestamp_opt(1_060, 500_000_000).unwrap();
        granted(service.award(GUILD, USER, 15, 0, first).await.unwrap());

        let award = service.award(GUILD, USER, 15, 0, second).await.unwrap();

        assert!(matches!(award, Award::OnCooldown(_)));
        assert_eq!(service.get_progress(GUILD, USER).await.unwrap().messages(), 1);
    }

    #[tokio::test]
    async fn award_after_the_window_adds_one_message() {
        let (_, service) = make_service();
        let first = granted(service.award(GUILD, USER, 15, 5, at(1_000)).await.unwrap());

        let second = granted(service.award(GUILD, USER, 15, 5, at(1_060)).await.unwrap());

        assert_eq!(second.messages, 2);
        assert!((15..=20).contains(&second.amount));
        assert_eq!(second.total_xp, first.total_xp + second.amount);
    }

    #[tokio::test]
    async fn staying_below_the_next_threshold_keeps_the_level() {
        let (_, service) = make_service();
        service.grant_xp(GUILD, USER, 10_000).await.unwrap();

        let gain = granted(service.award(GUILD, USER, 5, 0, at(1_000)).await.unwrap());

        assert_eq!(gain.total_xp, 10_005);
        assert_eq!(gain.old_level, 10);
        assert_eq!(gain.new_level, 10);
        assert!(gain.level_up().is_none());
    }

    #[tokio::test]
    async fn crossing_several_levels_reports_one_event() {
        let (_, service) = make_service();

        let gain = service.grant_xp(GUILD, USER, 950).await.unwrap();

        assert_eq!(
            gain.level_up(),
            Some(LevelUpEvent {
                user_id: USER,
                guild_id: GUILD,
                old_level: 0,
                new_level: 3,
                total_xp: 950,
            })
        );
    }

    #[tokio::test]
    async fn grant_ignores_cooldown_and_message_count() {
        let (_, service) = make_service();
        granted(service.award(GUILD, USER, 15, 0, at(1_000)).await.unwrap());

        let gain = service.grant_xp(GUILD, USER, 100).await.unwrap();

        assert_eq!(gain.total_xp, 115);
        assert_eq!(gain.messages, 1);
        let progress = service.get_progress(GUILD, USER).await.unwrap();
        assert_eq!(progress.last_award(), Some(at(1_000)));
    }

    #[tokio::test]
    async fn negative_grant_is_rejected_before_any_write() {
        let (store, service) = make_service();

        let err = service.grant_xp(GUILD, USER, -50).await.unwrap_err();

        assert_eq!(err, LevelingError::NegativeDelta(-50));
        assert!(store.load(Collection::Levels, GUILD, USER).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn zero_ids_are_rejected() {
        let (_, service) = make_service();

        assert_eq!(
            service.award(0, USER, 15, 5, at(0)).await.unwrap_err(),
            LevelingError::InvalidId
        );
        assert_eq!(service.get_progress(GUILD, 0).await.unwrap_err(), LevelingError::InvalidId);
        assert_eq!(service.reset_guild(0).await.unwrap_err(), LevelingError::InvalidId);
    }

    #[tokio::test]
    async fn reading_progress_does_not_create_a_record() {
        let (store, service) = make_service();

        let progress = service.get_progress(GUILD, USER).await.unwrap();

        assert_eq!(progress, UserProgress::default());
        assert!(store.load(Collection::Levels, GUILD, USER).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_write_leaves_no_trace() {
        let (store, service) = make_service();
        granted(service.award(GUILD, USER, 15, 0, at(1_000)).await.unwrap());
        store.reject_writes(true);

        let err = service.award(GUILD, USER, 15, 0, at(2_000)).await.unwrap_err();

        assert!(matches!(err, LevelingError::PersistenceFailure { .. }));
        let progress = service.get_progress(GUILD, USER).await.unwrap();
        assert_eq!(progress.xp(), 15);
        assert_eq!(progress.messages(), 1);
    }

    #[tokio::test]
    async fn failed_read_is_not_treated_as_a_new_user() {
        let service = LevelingService::new(Arc::new(UnreadableStore), ProgressionConfig::default());

        let err = service.award(GUILD, USER, 15, 5, at(0)).await.unwrap_err();

        assert_eq!(
            err,
            LevelingError::PersistenceFailure {
                guild_id: GUILD,
                user_id: Some(USER)
            }
        );
    }

    #[tokio::test]
    async fn resets_remove_progress() {
        let (_, service) = make_service();
        service.grant_xp(GUILD, 1, 500).await.unwrap();
        service.grant_xp(GUILD, 2, 500).await.unwrap();
        service.grant_xp(GUILD + 1, 1, 500).await.unwrap();

        service.reset_user(GUILD, 1).await.unwrap();
        assert_eq!(service.get_progress(GUILD, 1).await.unwrap().xp(), 0);
        assert_eq!(service.get_progress(GUILD, 2).await.unwrap().xp(), 500);

        service.reset_guild(GUILD).await.unwrap();
        assert_eq!(service.get_progress(GUILD, 2).await.unwrap().xp(), 0);
        assert_eq!(service.get_progress(GUILD + 1, 1).await.unwrap().xp(), 500);
    }

    #[tokio::test]
    async fn process_message_uses_the_configured_amounts() {
        let store = Arc::new(InMemoryKvStore::new());
        let config = ProgressionConfig {
            base_xp: 40,
            random_bonus: 0,
            cooldown: Duration::from_secs(60),
        };
        let service = LevelingService::new(store, config);

        let gain = granted(service.process_message(GUILD, USER).await.unwrap());
        assert_eq!(gain.amount, 40);

        let again = service.process_message(GUILD, USER).await.unwrap();
        assert!(matches!(again, Award::OnCooldown(_)));
    }
}
