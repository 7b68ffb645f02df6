use super::progression::UserProgress;
use crate::core::storage::{Collection, KeyValueStore};
use std::cmp::Reverse;
use std::sync::Arc;

/// What a leaderboard ranks by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Level,
    Xp,
    Messages,
}

impl Metric {
    pub fn label(self) -> &'static str {
        match self {
            Metric::Level => "Level",
            Metric::Xp => "XP",
            Metric::Messages => "Messages",
        }
    }

    fn value(self, progress: &UserProgress) -> u64 {
        match self {
            Metric::Level => u64::from(progress.level()),
            Metric::Xp => progress.xp(),
            Metric::Messages => progress.messages(),
        }
    }

    /// Descending primary key, xp as the tie-breaker, then user id ascending.
    fn sort_key(self, user_id: u64, progress: &UserProgress) -> (Reverse<u64>, Reverse<u64>, u64) {
        let tie = match self {
            Metric::Xp => 0,
            Metric::Level | Metric::Messages => progress.xp(),
        };
        (Reverse(self.value(progress)), Reverse(tie), user_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub user_id: u64,
    /// The ranked value (level, xp or message count).
    pub value: u64,
    pub progress: UserProgress,
}

/// Ranked, read-only views over a guild's progress records.
pub struct LeaderboardService<S> {
    store: Arc<S>,
}

impl<S: KeyValueStore> LeaderboardService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    async fn ranked(&self, guild_id: u64, metric: Metric) -> Vec<(u64, UserProgress)> {
        let mut rows: Vec<(u64, UserProgress)> =
            self.store.scan(Collection::Levels, guild_id).await;
        rows.sort_by_cached_key(|(user_id, progress)| metric.sort_key(*user_id, progress));
        rows
    }

    pub async fn top_n(&self, guild_id: u64, n: usize, metric: Metric) -> Vec<LeaderboardEntry> {
        if n == 0 {
            return Vec::new();
        }
        self.ranked(guild_id, metric)
            .await
            .into_iter()
            .take(n)
            .map(|(user_id, progress)| LeaderboardEntry {
                user_id,
                value: metric.value(&progress),
                progress,
            })
            .collect()
    }

    /// 1-based position of the user, `None` if they have no record.
    pub async fn rank_of(&self, guild_id: u64, user_id: u64, metric: Metric) -> Option<usize> {
        self.ranked(guild_id, metric)
            .await
            .iter()
            .position(|(id, _)| *id == user_id)
            .map(|index| index + 1)
    }
}
