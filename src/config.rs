//! Data layer configuration
//!
//! Values come from the process environment, optionally seeded from a `.env`
//! file, and fall back to defaults that suit a local single-user install.

use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DataError, Result};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://haulage.db";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// SQLite connection string
    pub database_url: String,
    /// Upper bound on pooled connections
    pub max_connections: u32,
    /// How long SQLite waits on a locked database before failing
    pub busy_timeout_ms: u64,
    pub foreign_keys: bool,
    /// Apply bundled migrations when bootstrapping
    pub run_migrations: bool,
    /// `tracing_subscriber::EnvFilter` directive
    pub log_filter: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: 5,
            busy_timeout_ms: 5000,
            foreign_keys: true,
            run_migrations: true,
            log_filter: "info".to_string(),
        }
    }
}

impl DataConfig {
    /// Load configuration from the environment, reading `.env` first if present
    pub fn from_env() -> Result<Self> {
        // A missing .env file is fine
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            max_connections: parse_or(&lookup, "DATA_MAX_CONNECTIONS", defaults.max_connections)?,
            busy_timeout_ms: parse_or(&lookup, "DATA_BUSY_TIMEOUT_MS", defaults.busy_timeout_ms)?,
            foreign_keys: parse_or(&lookup, "DATA_FOREIGN_KEYS", defaults.foreign_keys)?,
            run_migrations: parse_or(&lookup, "DATA_RUN_MIGRATIONS", defaults.run_migrations)?,
            log_filter: lookup("RUST_LOG").unwrap_or(defaults.log_filter),
        };
        config.validate()?;
        Ok(config)
    }

    /// Configuration for a database file at `path`
    pub fn for_path(path: impl AsRef<std::path::Path>) -> Self {
        Self {
            database_url: format!("sqlite://{}", path.as_ref().display()),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.database_url.trim().is_empty() {
            return Err(DataError::argument("DATABASE_URL must not be empty"));
        }
        if self.max_connections == 0 {
            return Err(DataError::argument("DATA_MAX_CONNECTIONS must be at least 1"));
        }
        Ok(())
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| DataError::argument(format!("{key} has an invalid value: {raw:?}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = DataConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, DataConfig::default());
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = DataConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "sqlite://other.db"),
            ("DATA_MAX_CONNECTIONS", "12"),
            ("DATA_FOREIGN_KEYS", "false"),
            ("RUST_LOG", "haulage_data=debug"),
        ]))
        .unwrap();
        assert_eq!(config.database_url, "sqlite://other.db");
        assert_eq!(config.max_connections, 12);
        assert!(!config.foreign_keys);
        assert_eq!(config.busy_timeout_ms, 5000);
        assert_eq!(config.log_filter, "haulage_data=debug");
    }

    #[test]
    fn bad_values_are_argument_errors() {
        let err = DataConfig::from_lookup(lookup_from(&[("DATA_MAX_CONNECTIONS", "many")])).unwrap_err();
        assert!(matches!(err, DataError::Argument(_)));

        let err = DataConfig::from_lookup(lookup_from(&[("DATA_MAX_CONNECTIONS", "0")])).unwrap_err();
        assert!(matches!(err, DataError::Argument(_)));

        let err = DataConfig::from_lookup(lookup_from(&[("DATABASE_URL", "  ")])).unwrap_err();
        assert!(matches!(err, DataError::Argument(_)));
    }
}
