//! Runtime configuration.
//!
//! Values come from `CURRICULUM__*` environment variables (and a `.env` file
//! when present), with `__` separating nested keys:
//!
//! - `CURRICULUM__DATABASE__URL=sqlite://curriculum.sqlite3`
//! - `CURRICULUM__DATABASE__MAX_CONNECTIONS=5`
//! - `CURRICULUM__PROGRESSION__EMPTY_SEMESTER_COMPLETES=true`
//! - `CURRICULUM__LOG__FILTER=info,services=debug`

use std::time::Duration;

use serde::Deserialize;
use services::ProgressionPolicy;
use storage::sqlite::SqlitePoolSettings;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

const ENV_PREFIX: &str = "CURRICULUM";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("database.url must be a sqlite URL or path")]
    DatabaseUrl,
    #[error("database.max_connections must be between 1 and {max}, got {got}")]
    MaxConnections { got: u32, max: u32 },
    #[error("database.acquire_timeout_secs must be positive")]
    AcquireTimeout,
    #[error("log.filter is not a valid filter directive: {0}")]
    LogFilter(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://curriculum.sqlite3".into(),
            max_connections: 5,
            acquire_timeout_secs: 5,
        }
    }
}

impl DatabaseConfig {
    const MAX_CONNECTIONS: u32 = 64;

    #[must_use]
    pub fn pool_settings(&self) -> SqlitePoolSettings {
        SqlitePoolSettings {
            max_connections: self.max_connections,
            acquire_timeout: Duration::from_secs(self.acquire_timeout_secs),
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        let url = self.url.trim();
        if url.is_empty() || (url.contains("://") && !url.starts_with("sqlite:")) {
            return Err(ValidationError::DatabaseUrl);
        }
        if self.max_connections == 0 || self.max_connections > Self::MAX_CONNECTIONS {
            return Err(ValidationError::MaxConnections {
                got: self.max_connections,
                max: Self::MAX_CONNECTIONS,
            });
        }
        if self.acquire_timeout_secs == 0 {
            return Err(ValidationError::AcquireTimeout);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Used when `RUST_LOG` is not set.
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub progression: ProgressionPolicy,
    pub log: LogConfig,
}

impl AppConfig {
    /// Load `.env` if present, then read `CURRICULUM__*` variables.
    ///
    /// # Errors
    ///
    /// Returns `config::ConfigError` if a value cannot be parsed into its field.
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_vars(None)
    }

    /// `vars` replaces the process environment; `None` reads the real one.
    fn from_vars(
        vars: Option<config::Map<String, String>>,
    ) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix(ENV_PREFIX)
                    .separator("__")
                    .source(vars),
            )
            .build()?
            .try_deserialize()
    }

    /// # Errors
    ///
    /// Returns the first `ValidationError` found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.database.validate()?;
        EnvFilter::try_new(&self.log.filter)
            .map_err(|e| ValidationError::LogFilter(e.to_string()))?;
        Ok(())
    }
}
