// Level math and the per-user progress record.
//
// Everything here is pure: no store, no clock. The service feeds in `now`.

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Level reached with `xp` total experience: floor(sqrt(xp / 100)).
///
/// Computed on integers so large totals never round up into the next level.
pub fn level_for_xp(xp: u64) -> u32 {
    let n = xp / 100;
    let mut root = (n as f64).sqrt() as u64;
    while root * root > n {
        root -= 1;
    }
    while (root + 1) * (root + 1) <= n {
        root += 1;
    }
    root as u32
}

/// Minimum total xp for `level`: level² × 100, saturating at `u64::MAX`.
pub fn xp_for_level(level: u32) -> u64 {
    let level = u64::from(level);
    level.saturating_mul(level).saturating_mul(100)
}

/// Tunables for message xp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressionConfig {
    /// Fixed xp for every qualifying message.
    pub base_xp: u64,
    /// Upper bound (inclusive) of the random bonus on top of `base_xp`.
    pub random_bonus: u64,
    /// Minimum time between two awards for the same user in the same guild.
    pub cooldown: Duration,
}

impl Default for ProgressionConfig {
    fn default() -> Self {
        Self {
            base_xp: 15,
            random_bonus: 5,
            cooldown: Duration::from_secs(60),
        }
    }
}

// ============================================================================
// USER PROGRESS
// ============================================================================

/// A user's standing in one guild.
///
/// The level is derived from xp and cannot be set on its own: every mutation
/// recomputes it, and so does deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "StoredProgress")]
pub struct UserProgress {
    xp: u64,
    level: u32,
    messages: u64,
    #[serde(rename = "last_message_time", with = "unix_seconds")]
    last_award: Option<DateTime<Utc>>,
}

/// On-disk shape. A stored `level` is ignored.
#[derive(Deserialize)]
struct StoredProgress {
    #[serde(default)]
    xp: u64,
    #[serde(default)]
    messages: u64,
    #[serde(default, rename = "last_message_time", with = "unix_seconds")]
    last_award: Option<DateTime<Utc>>,
}

impl From<StoredProgress> for UserProgress {
    fn from(stored: StoredProgress) -> Self {
        Self {
            xp: stored.xp,
            level: level_for_xp(stored.xp),
            messages: stored.messages,
            last_award: stored.last_award,
        }
    }
}

impl UserProgress {
    pub fn xp(&self) -> u64 {
        self.xp
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn messages(&self) -> u64 {
        self.messages
    }

    pub fn last_award(&self) -> Option<DateTime<Utc>> {
        self.last_award
    }

    /// Total xp at which the next level starts.
    pub fn next_level_xp(&self) -> u64 {
        xp_for_level(self.level.saturating_add(1))
    }

    /// Time left before another award is allowed, or `None` if eligible.
    /// A last award in the future counts as a full cooldown still running.
    pub fn cooldown_remaining(&self, now: DateTime<Utc>, cooldown: Duration) -> Option<Duration> {
        let last = self.last_award?;
        let elapsed = now
            .signed_duration_since(last)
            .to_std()
            .unwrap_or(Duration::ZERO);
        if elapsed < cooldown {
            Some(cooldown - elapsed)
        } else {
            None
        }
    }

    /// Add xp without touching the message count or the cooldown clock.
    pub fn add_xp(&mut self, amount: u64) {
        self.xp = self.xp.saturating_add(amount);
        self.level = level_for_xp(self.xp);
    }

    /// Count a qualifying message worth `amount` xp, sent at `now`.
    ///
    /// The award time is stored in whole seconds, rounded up, so the stored
    /// clock never runs ahead of the real gap between two messages.
    pub fn record_message(&mut self, amount: u64, now: DateTime<Utc>) {
        self.add_xp(amount);
        self.messages = self.messages.saturating_add(1);
        self.last_award = Some(ceil_to_second(now));
    }
}

fn ceil_to_second(at: DateTime<Utc>) -> DateTime<Utc> {
    let floor = at.trunc_subsecs(0);
    if floor < at {
        floor + TimeDelta::seconds(1)
    } else {
        floor
    }
}

/// `Option<DateTime<Utc>>` as whole unix seconds. Older documents wrote `0`
/// for "never" and sometimes fractional seconds; both are read back, the
/// fractions rounded up like fresh award times.
mod unix_seconds {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(at) => serializer.serialize_i64(at.timestamp()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<f64>::deserialize(deserializer)?;
        Ok(raw
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .and_then(|secs| DateTime::from_timestamp(secs.ceil() as i64, 0)))
    }
}
