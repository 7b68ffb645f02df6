use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

pub const DEFAULT_WELCOME_TEMPLATE: &str = "Welcome {member} to {server}!";

/// Per-guild configuration. One record per guild, created on the first write.
///
/// On disk the record keeps the nested layout older bot databases use
/// (`welcome`, `logging`, `levels` and `ticket_system` sections, ids as
/// strings). Keys this bot does not know about are carried through untouched,
/// so a setter never drops data written by another version.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "StoredGuild", into = "StoredGuild")]
pub struct GuildRecord {
    pub leveling_enabled: bool,
    pub logging_enabled: bool,
    pub welcome_enabled: bool,
    pub ticket_enabled: bool,

    /// Where level-up announcements go. `None` means the channel of the message.
    pub level_channel_id: Option<u64>,
    pub welcome_channel_id: Option<u64>,
    pub logging_channel_id: Option<u64>,
    pub ticket_channel_id: Option<u64>,

    /// `{member}` and `{server}` are substituted when a member joins.
    pub welcome_message: Option<String>,
    /// Role given to every member on join. Lives in the `autoroles`
    /// collection, not in the guild document; the settings service fills it in.
    pub autorole_id: Option<u64>,
    /// Level -> role granted when that level is reached.
    pub level_roles: BTreeMap<u32, u64>,

    unknown: UnknownKeys,
}

/// Keys found on disk that no field above claims, per section.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct UnknownKeys {
    guild: Map<String, Value>,
    welcome: Map<String, Value>,
    logging: Map<String, Value>,
    levels: Map<String, Value>,
    ticket_system: Map<String, Value>,
}

impl GuildRecord {
    pub fn welcome_template(&self) -> &str {
        self.welcome_message
            .as_deref()
            .unwrap_or(DEFAULT_WELCOME_TEMPLATE)
    }

    /// Older templates say `{user}` where newer ones say `{member}`.
    pub fn render_welcome(&self, member: &str, server: &str) -> String {
        self.welcome_template()
            .replace("{member}", member)
            .replace("{user}", member)
            .replace("{server}", server)
    }

    /// Channel for activity logs, only while logging is switched on.
    pub fn active_log_channel(&self) -> Option<u64> {
        self.logging_channel_id.filter(|_| self.logging_enabled)
    }

    /// Reward roles for every level in `(old_level, new_level]`, lowest first.
    pub fn rewards_between(&self, old_level: u32, new_level: u32) -> Vec<(u32, u64)> {
        if new_level <= old_level {
            return Vec::new();
        }
        self.level_roles
            .range(old_level + 1..=new_level)
            .map(|(level, role)| (*level, *role))
            .collect()
    }
}

/// Partial update of the welcome settings. `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WelcomeUpdate {
    pub enabled: Option<bool>,
    pub channel_id: Option<u64>,
    pub template: Option<String>,
}

// ============================================================================
// ON-DISK SHAPE
// ============================================================================

/// A Discord id. Written as a string; read back from a string or a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snowflake(pub u64);

impl Serialize for Snowflake {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Snowflake {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SnowflakeVisitor;

        impl Visitor<'_> for SnowflakeVisitor {
            type Value = Snowflake;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a Discord id as a number or a string of digits")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Snowflake, E> {
                Ok(Snowflake(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Snowflake, E> {
                u64::try_from(v)
                    .map(Snowflake)
                    .map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Snowflake, E> {
                v.trim()
                    .parse()
                    .map(Snowflake)
                    .map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
            }
        }

        deserializer.deserialize_any(SnowflakeVisitor)
    }
}

#[derive(Default, Serialize, Deserialize)]
#[serde(default)]
struct StoredGuild {
    welcome: WelcomeSection,
    logging: ToggleSection,
    levels: LevelsSection,
    ticket_system: ToggleSection,
    #[serde(flatten)]
    unknown: Map<String, Value>,
}

#[derive(Default, Serialize, Deserialize)]
#[serde(default)]
struct ToggleSection {
    enabled: bool,
    channel_id: Option<Snowflake>,
    #[serde(flatten)]
    unknown: Map<String, Value>,
}

#[derive(Default, Serialize, Deserialize)]
#[serde(default)]
struct WelcomeSection {
    enabled: bool,
    channel_id: Option<Snowflake>,
    message: Option<String>,
    #[serde(flatten)]
    unknown: Map<String, Value>,
}

/// `roles` keys are level numbers as strings. They stay strings here because
/// integer map keys do not survive serde's flatten buffering.
#[derive(Default, Serialize, Deserialize)]
#[serde(default)]
struct LevelsSection {
    enabled: bool,
    channel_id: Option<Snowflake>,
    roles: BTreeMap<String, Snowflake>,
    #[serde(flatten)]
    unknown: Map<String, Value>,
}

impl From<StoredGuild> for GuildRecord {
    fn from(stored: StoredGuild) -> Self {
        let mut level_roles = BTreeMap::new();
        for (level, role) in stored.levels.roles {
            match level.trim().parse::<u32>() {
                Ok(level) => {
                    level_roles.insert(level, role.0);
                }
                Err(_) => tracing::warn!(level = %level, "Ignoring level reward with a non-numeric level"),
            }
        }

        Self {
            leveling_enabled: stored.levels.enabled,
            logging_enabled: stored.logging.enabled,
            welcome_enabled: stored.welcome.enabled,
            ticket_enabled: stored.ticket_system.enabled,
            level_channel_id: stored.levels.channel_id.map(|id| id.0),
            welcome_channel_id: stored.welcome.channel_id.map(|id| id.0),
            logging_channel_id: stored.logging.channel_id.map(|id| id.0),
            ticket_channel_id: stored.ticket_system.channel_id.map(|id| id.0),
            welcome_message: stored.welcome.message,
            autorole_id: None,
            level_roles,
            unknown: UnknownKeys {
                guild: stored.unknown,
                welcome: stored.welcome.unknown,
                logging: stored.logging.unknown,
                levels: stored.levels.unknown,
                ticket_system: stored.ticket_system.unknown,
            },
        }
    }
}

impl From<GuildRecord> for StoredGuild {
    fn from(record: GuildRecord) -> Self {
        Self {
            welcome: WelcomeSection {
                enabled: record.welcome_enabled,
                channel_id: record.welcome_channel_id.map(Snowflake),
                message: record.welcome_message,
                unknown: record.unknown.welcome,
            },
            logging: ToggleSection {
                enabled: record.logging_enabled,
                channel_id: record.logging_channel_id.map(Snowflake),
                unknown: record.unknown.logging,
            },
            levels: LevelsSection {
                enabled: record.leveling_enabled,
                channel_id: record.level_channel_id.map(Snowflake),
                roles: record
                    .level_roles
                    .into_iter()
                    .map(|(level, role)| (level.to_string(), Snowflake(role)))
                    .collect(),
                unknown: record.unknown.levels,
            },
            ticket_system: ToggleSection {
                enabled: record.ticket_enabled,
                channel_id: record.ticket_channel_id.map(Snowflake),
                unknown: record.unknown.ticket_system,
            },
            unknown: record.unknown.guild,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn welcome_placeholders_are_substituted() {
        let mut record = GuildRecord::default();
        assert_eq!(record.render_welcome("<@1>", "Rustaceans"), "Welcome <@1> to Rustaceans!");

        record.welcome_message = Some("hi {member}, {member}!".to_string());
        assert_eq!(record.render_welcome("bob", "x"), "hi bob, bob!");

        record.welcome_message = Some("Welcome {user} to {server}!".to_string());
        assert_eq!(record.render_welcome("bob", "x"), "Welcome bob to x!");
    }

    #[test]
    fn rewards_cover_the_crossed_levels_only() {
        let record = GuildRecord {
            level_roles: BTreeMap::from([(1, 11), (3, 33), (5, 55)]),
            ..Default::default()
        };

        assert_eq!(record.rewards_between(0, 3), vec![(1, 11), (3, 33)]);
        assert_eq!(record.rewards_between(1, 4), vec![(3, 33)]);
        assert_eq!(record.rewards_between(5, 5), vec![]);
        assert_eq!(record.rewards_between(6, 2), vec![]);
    }

    #[test]
    fn log_channel_needs_both_toggle_and_channel() {
        let mut record = GuildRecord::default();
        record.logging_channel_id = Some(3);
        assert_eq!(record.active_log_channel(), None);

        record.logging_enabled = true;
        assert_eq!(record.active_log_channel(), Some(3));

        record.logging_channel_id = None;
        assert_eq!(record.active_log_channel(), None);
    }

    #[test]
    fn nested_documents_load_with_string_ids() {
        let record: GuildRecord = serde_json::from_value(json!({
            "settings": {},
            "autorole": null,
            "welcome": {"enabled": true, "channel_id": "55", "message": "Hi {user}"},
            "logging": {"enabled": false, "channel_id": null, "events": []},
            "levels": {"enabled": true, "channel_id": 66, "roles": {"5": "500", "10": 1000}},
            "ticket_system": {"enabled": false, "category_id": null, "message_id": null, "channel_id": null}
        }))
        .unwrap();

        assert!(record.welcome_enabled);
        assert_eq!(record.welcome_channel_id, Some(55));
        assert_eq!(record.welcome_message.as_deref(), Some("Hi {user}"));
        assert!(record.leveling_enabled);
        assert_eq!(record.level_channel_id, Some(66));
        assert_eq!(record.level_roles, BTreeMap::from([(5, 500), (10, 1000)]));
        assert!(!record.logging_enabled);
        assert_eq!(record.ticket_channel_id, None);
    }

    #[test]
    fn partial_documents_load_with_defaults() {
        let record: GuildRecord =
            serde_json::from_value(json!({"welcome": {"enabled": true}})).unwrap();

        assert!(record.welcome_enabled);
        assert!(!record.leveling_enabled);
        assert!(record.level_roles.is_empty());
        assert_eq!(record.autorole_id, None);
    }

    #[test]
    fn unknown_keys_survive_a_rewrite() {
        let mut record: GuildRecord = serde_json::from_value(json!({
            "settings": {"prefix": "!"},
            "logging": {"enabled": true, "events": ["join"]},
            "ticket_system": {"category_id": "9"}
        }))
        .unwrap();

        record.welcome_enabled = true;
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["settings"], json!({"prefix": "!"}));
        assert_eq!(value["logging"]["events"], json!(["join"]));
        assert_eq!(value["logging"]["enabled"], json!(true));
        assert_eq!(value["ticket_system"]["category_id"], json!("9"));
        assert_eq!(value["welcome"]["enabled"], json!(true));
    }

    #[test]
    fn ids_are_written_as_strings() {
        let record = GuildRecord {
            welcome_channel_id: Some(55),
            level_roles: BTreeMap::from([(5, 500)]),
            autorole_id: Some(77),
            ..Default::default()
        };

        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["welcome"]["channel_id"], json!("55"));
        assert_eq!(value["levels"]["roles"], json!({"5": "500"}));
        assert!(value.get("autorole_id").is_none());
    }
}
