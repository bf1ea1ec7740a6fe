//! Database primitives: where the connection string comes from, how the
//! pool is opened, and the error type stores report.

use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr, SqlErr};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

/// Shared connection pool alias.
pub type DbPool = DatabaseConnection;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database url missing")]
    MissingUrl,
    #[error("record {0} not found")]
    NotFound(Uuid),
    #[error("unique constraint violated: {0}")]
    Conflict(String),
    #[error(transparent)]
    Query(DbErr),
}

impl From<DbErr> for DbError {
    fn from(err: DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(detail)) => DbError::Conflict(detail),
            _ => DbError::Query(err),
        }
    }
}

pub type DbResult<T> = Result<T, DbError>;

/// Environment-driven connection settings.
#[derive(Clone, Debug, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_url_key")]
    env_key: String,
    #[serde(default = "default_max_connections")]
    max_connections: u32,
    #[serde(skip)]
    url: Option<String>,
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
            url: None,
        }
    }

    /// Settings reading `DATABASE_URL`.
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Settings pinned to an explicit URL, bypassing the environment.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn database_url(&self) -> Option<String> {
        self.url
            .clone()
            .or_else(|| std::env::var(&self.env_key).ok())
            .filter(|url| !url.trim().is_empty())
    }
}

/// Opens a pool for the configured URL.
pub async fn connect(settings: &DatabaseSettings) -> DbResult<DbPool> {
    let url = settings.database_url().ok_or(DbError::MissingUrl)?;
    let mut options = ConnectOptions::new(url);
    options
        .max_connections(settings.max_connections)
        .connect_timeout(Duration::from_secs(10))
        .sqlx_logging(false);
    let pool = Database::connect(options).await?;
    info!(max_connections = settings.max_connections, "database pool ready");
    Ok(pool)
}
