//! Ledger configuration.
//!
//! Configuration is loaded from environment variables with fallback to defaults.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use passbook_core::clock::{parse_timezone, DEFAULT_TIMEZONE};

use crate::pool::DbConfig;

/// Ledger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// SQLite database file
    pub database_path: String,

    /// Pool size (default: 5)
    pub max_connections: u32,

    /// How long a writer waits for the database lock, in milliseconds (default: 5000)
    pub busy_timeout_ms: u64,

    /// Timezone for stores that do not configure one
    pub default_timezone: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            database_path: "passbook.db".to_string(),
            max_connections: 5,
            busy_timeout_ms: 5000,
            default_timezone: DEFAULT_TIMEZONE.to_string(),
        }
    }
}

impl LedgerConfig {
    /// Load configuration from `PASSBOOK_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup (environment, test maps).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = LedgerConfig::default();

        let config = LedgerConfig {
            database_path: lookup("PASSBOOK_DATABASE_PATH").unwrap_or(defaults.database_path),

            max_connections: lookup("PASSBOOK_MAX_CONNECTIONS")
                .map(|v| v.trim().parse())
                .transpose()
                .map_err(|_| ConfigError::InvalidValue("PASSBOOK_MAX_CONNECTIONS".to_string()))?
                .unwrap_or(defaults.max_connections),

            busy_timeout_ms: lookup("PASSBOOK_BUSY_TIMEOUT_MS")
                .map(|v| v.trim().parse())
                .transpose()
                .map_err(|_| ConfigError::InvalidValue("PASSBOOK_BUSY_TIMEOUT_MS".to_string()))?
                .unwrap_or(defaults.busy_timeout_ms),

            default_timezone: lookup("PASSBOOK_DEFAULT_TIMEZONE")
                .unwrap_or(defaults.default_timezone),
        };

        if config.database_path.trim().is_empty() {
            return Err(ConfigError::MissingRequired(
                "PASSBOOK_DATABASE_PATH".to_string(),
            ));
        }

        if config.max_connections == 0 {
            return Err(ConfigError::InvalidValue(
                "PASSBOOK_MAX_CONNECTIONS".to_string(),
            ));
        }

        parse_timezone(&config.default_timezone)
            .map_err(|_| ConfigError::InvalidValue("PASSBOOK_DEFAULT_TIMEZONE".to_string()))?;

        Ok(config)
    }

    /// Pool configuration derived from these settings.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database_path)
            .max_connections(self.max_connections)
            .busy_timeout(Duration::from_millis(self.busy_timeout_ms))
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
