//! Process settings from the environment (`.env` is read by the binary via dotenvy).

use crate::error::ConfigError;
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct Settings {
    /// `DATABASE_URL`, e.g. `sqlite://provider.db` or `sqlite::memory:`.
    pub database_url: String,
    /// `DATABASE_MAX_CONNECTIONS`. Forced to 1 for in-memory databases.
    pub max_connections: u32,
    /// `SQLITE_FOREIGN_KEYS`. When off, foreign keys are advisory and deletes never cascade.
    pub foreign_keys: bool,
    /// `SCHEMA_PATH`: JSON schema document.
    pub schema_path: String,
    /// `SCHEMA_VERSION`: target version for create/upgrade.
    pub schema_version: i64,
    /// `BIND_ADDR`.
    pub bind_addr: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            database_url: "sqlite://provider.db".into(),
            max_connections: 5,
            foreign_keys: true,
            schema_path: "schema.json".into(),
            schema_version: 1,
            bind_addr: "0.0.0.0:3000".into(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let d = Settings::default();
        Ok(Settings {
            database_url: lookup("DATABASE_URL").unwrap_or(d.database_url),
            max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", d.max_connections)?,
            foreign_keys: match lookup("SQLITE_FOREIGN_KEYS") {
                Some(v) => parse_bool(&v).ok_or_else(|| {
                    ConfigError::Validation(format!("SQLITE_FOREIGN_KEYS: expected a boolean, got {}", v))
                })?,
                None => d.foreign_keys,
            },
            schema_path: lookup("SCHEMA_PATH").unwrap_or(d.schema_path),
            schema_version: parse_or(&lookup, "SCHEMA_VERSION", d.schema_version)?,
            bind_addr: lookup("BIND_ADDR").unwrap_or(d.bind_addr),
        })
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| ConfigError::Validation(format!("{}: invalid value {}", key, v))),
        None => Ok(default),
    }
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.trim().to_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}
