//! Database primitives shared by the CLI and the integration tests.

use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Shared connection pool alias.
pub type DbPool = DatabaseConnection;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database url missing (set {0})")]
    MissingUrl(String),
    #[error("failed to connect to database: {0}")]
    Connect(#[from] DbErr),
}

pub type DbResult<T> = Result<T, DbError>;

/// Environment-driven connection settings.
#[derive(Clone, Debug, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_url_key")]
    env_key: String,
    #[serde(default = "default_max_connections")]
    max_connections: u32,
    #[serde(default)]
    sql_logging: bool,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self::new(default_url_key())
    }
}

fn default_url_key() -> String {
    "DATABASE_URL".to_string()
}

fn default_max_connections() -> u32 {
    10
}

impl DatabaseSettings {
    pub fn new(env_key: impl Into<String>) -> Self {
        Self {
            env_key: env_key.into(),
            max_connections: default_max_connections(),
            sql_logging: false,
        }
    }

    /// Reads `DATABASE_URL` and the optional `DATABASE_MAX_CONNECTIONS`.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Some(max) = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|raw| raw.trim().parse::<u32>().ok())
            .filter(|max| *max > 0)
        {
            settings.max_connections = max;
        }
        settings.sql_logging = std::env::var("DATABASE_SQL_LOG")
            .map(|val| matches!(val.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        settings
    }

    pub fn database_url(&self) -> DbResult<String> {
        std::env::var(&self.env_key).map_err(|_| DbError::MissingUrl(self.env_key.clone()))
    }

    pub fn max_connections(&self) -> u32 {
        self.max_connections
    }
}

/// Open a pool using the URL named by `settings`.
pub async fn connect(settings: &DatabaseSettings) -> DbResult<DbPool> {
    let url = settings.database_url()?;
    connect_url(&url, settings).await
}

/// Open a pool against an explicit URL (tests hand in container URLs).
pub async fn connect_url(url: &str, settings: &DatabaseSettings) -> DbResult<DbPool> {
    let mut options = ConnectOptions::new(url.to_owned());
    options
        .max_connections(settings.max_connections)
        .connect_timeout(Duration::from_secs(10))
        .sqlx_logging(settings.sql_logging);
    debug!(max_connections = settings.max_connections, "opening database pool");
    let pool = Database::connect(options).await?;
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_url_names_the_env_key() {
        let settings = DatabaseSettings::new("PIPELINE_TEST_UNSET_DATABASE_URL");
        let err = settings.database_url().unwrap_err();
        assert_eq!(
            err.to_string(),
            "database url missing (set PIPELINE_TEST_UNSET_DATABASE_URL)"
        );
    }

    #[test]
    fn defaults_to_ten_connections() {
        assert_eq!(DatabaseSettings::default().max_connections(), 10);
    }
}
