//! Connection configuration

use crate::error::{DispatchError, Result};
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use std::str::FromStr;

/// PostgreSQL connection descriptor
///
/// Built once at startup and handed to the pool constructor; nothing in the
/// crate reads connection settings from the environment on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    /// libpq-style `sslmode` (`disable`, `prefer`, `require`, ...)
    pub ssl_mode: String,
    /// Full connection URL; takes precedence over the individual fields
    pub url: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9932,
            user: "postgres".to_string(),
            password: "postgres".to_string(),
            database: "postgres".to_string(),
            ssl_mode: "disable".to_string(),
            url: None,
        }
    }
}

impl DatabaseConfig {
    /// Config that only carries a connection URL
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    pub fn ssl_mode(&self) -> Result<PgSslMode> {
        PgSslMode::from_str(&self.ssl_mode).map_err(|e| {
            DispatchError::Config(format!("invalid sslmode {:?}: {}", self.ssl_mode, e))
        })
    }

    /// Resolve into sqlx connect options
    pub fn connect_options(&self) -> Result<PgConnectOptions> {
        if let Some(url) = &self.url {
            return PgConnectOptions::from_str(url)
                .map_err(|e| DispatchError::Config(format!("invalid database url: {}", e)));
        }

        Ok(PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database)
            .ssl_mode(self.ssl_mode()?))
    }

    /// Connection target without credentials, for log lines
    pub fn display_target(&self) -> String {
        match &self.url {
            Some(_) => "DATABASE_URL".to_string(),
            None => format!("{}@{}:{}/{}", self.user, self.host, self.port, self.database),
        }
    }
}
