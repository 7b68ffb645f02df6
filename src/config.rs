// Runtime configuration, read once at startup from the environment
// (optionally seeded from a `.env` file).

use crate::core::leveling::ProgressionConfig;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_JSON_PATH: &str = "data/bot_database.json";
pub const DEFAULT_SQLITE_PATH: &str = "data/bot.db";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Missing {0} environment variable! Create a .env file with your bot token.")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Json,
    Sqlite,
    Memory,
}

impl FromStr for StoreKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "sqlite" => Ok(Self::Sqlite),
            "memory" => Ok(Self::Memory),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    pub kind: StoreKind,
    /// The JSON document. For the SQLite backend this is the import source.
    pub json_path: PathBuf,
    pub sqlite_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub token: String,
    pub store: StoreConfig,
    pub progression: ProgressionConfig,
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let token = lookup("DISCORD_TOKEN")
            .filter(|token| !token.trim().is_empty())
            .ok_or(ConfigError::Missing("DISCORD_TOKEN"))?;

        let kind = parse_or(&lookup, "STORE_BACKEND", StoreKind::Json)?;
        let json_path = lookup("JSON_DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_JSON_PATH));
        let sqlite_path = lookup("SQLITE_DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SQLITE_PATH));

        let defaults = ProgressionConfig::default();
        let progression = ProgressionConfig {
            base_xp: parse_or(&lookup, "XP_PER_MESSAGE", defaults.base_xp)?,
            random_bonus: parse_or(&lookup, "XP_RANDOM_BONUS", defaults.random_bonus)?,
            cooldown: Duration::from_secs(parse_or(
                &lookup,
                "XP_COOLDOWN_SECS",
                defaults.cooldown.as_secs(),
            )?),
        };

        Ok(Self {
            token,
            store: StoreConfig {
                kind,
                json_path,
                sqlite_path,
            },
            progression,
        })
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<BotConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        BotConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_the_token_is_set() {
        let config = config_from(&[("DISCORD_TOKEN", "abc")]).unwrap();

        assert_eq!(config.token, "abc");
        assert_eq!(config.store.kind, StoreKind::Json);
        assert_eq!(config.store.json_path, PathBuf::from(DEFAULT_JSON_PATH));
        assert_eq!(config.store.sqlite_path, PathBuf::from(DEFAULT_SQLITE_PATH));
        assert_eq!(config.progression.base_xp, 15);
        assert_eq!(config.progression.random_bonus, 5);
        assert_eq!(config.progression.cooldown, Duration::from_secs(60));
    }

    #[test]
    fn missing_token_is_an_error() {
        assert_eq!(
            config_from(&[]).unwrap_err(),
            ConfigError::Missing("DISCORD_TOKEN")
        );
        assert!(config_from(&[("DISCORD_TOKEN", "  ")]).is_err());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = config_from(&[
            ("DISCORD_TOKEN", "abc"),
            ("STORE_BACKEND", "SQLite"),
            ("SQLITE_DATABASE_PATH", "/tmp/x.db"),
            ("XP_PER_MESSAGE", "20"),
            ("XP_RANDOM_BONUS", "0"),
            ("XP_COOLDOWN_SECS", "30"),
        ])
        .unwrap();

        assert_eq!(config.store.kind, StoreKind::Sqlite);
        assert_eq!(config.store.sqlite_path, PathBuf::from("/tmp/x.db"));
        assert_eq!(config.progression.base_xp, 20);
        assert_eq!(config.progression.random_bonus, 0);
        assert_eq!(config.progression.cooldown, Duration::from_secs(30));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = config_from(&[("DISCORD_TOKEN", "abc"), ("STORE_BACKEND", "redis")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "STORE_BACKEND", .. }));

        let err = config_from(&[("DISCORD_TOKEN", "abc"), ("XP_PER_MESSAGE", "-3")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "XP_PER_MESSAGE", .. }));
    }
}
