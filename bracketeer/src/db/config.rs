//! Database configuration module.

use std::{env, str::FromStr};

/// Database configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub database_url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Connection timeout in seconds
    pub connection_timeout_secs: u64,

    /// Idle connection timeout in seconds
    pub idle_timeout_secs: u64,

    /// Maximum connection lifetime in seconds
    pub max_lifetime_secs: u64,
}

/// Invalid or missing database settings
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DatabaseConfigError {
    #[error("DATABASE_URL must be set")]
    MissingUrl,

    #[error("{name} must be a number, got '{value}'")]
    InvalidNumber { name: &'static str, value: String },
}

fn env_number<T: FromStr>(name: &'static str, default: T) -> Result<T, DatabaseConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| DatabaseConfigError::InvalidNumber { name, value }),
        Err(_) => Ok(default),
    }
}

impl DatabaseConfig {
    /// Create configuration from environment variables
    ///
    /// Expected environment variables:
    /// - `DATABASE_URL`: PostgreSQL connection string (required)
    /// - `DB_MAX_CONNECTIONS`: Maximum pool size (default: 20)
    /// - `DB_MIN_CONNECTIONS`: Minimum pool size (default: 5)
    /// - `DB_CONNECTION_TIMEOUT`: Connection timeout in seconds (default: 10)
    /// - `DB_IDLE_TIMEOUT`: Idle timeout in seconds (default: 600)
    /// - `DB_MAX_LIFETIME`: Max lifetime in seconds (default: 1800)
    pub fn from_env() -> Result<Self, DatabaseConfigError> {
        let defaults = Self::development();
        Ok(Self {
            database_url: env::var("DATABASE_URL").map_err(|_| DatabaseConfigError::MissingUrl)?,
            max_connections: env_number("DB_MAX_CONNECTIONS", defaults.max_connections)?,
            min_connections: env_number("DB_MIN_CONNECTIONS", defaults.min_connections)?,
            connection_timeout_secs: env_number(
                "DB_CONNECTION_TIMEOUT",
                defaults.connection_timeout_secs,
            )?,
            idle_timeout_secs: env_number("DB_IDLE_TIMEOUT", defaults.idle_timeout_secs)?,
            max_lifetime_secs: env_number("DB_MAX_LIFETIME", defaults.max_lifetime_secs)?,
        })
    }

    /// Default configuration for development
    ///
    /// Uses `postgres://postgres@localhost/bracketeer` as the database URL
    pub fn development() -> Self {
        Self {
            database_url: "postgres://postgres@localhost/bracketeer".to_string(),
            max_connections: 20,
            min_connections: 5,
            connection_timeout_secs: 10,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::development()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for name in [
            "DATABASE_URL",
            "DB_MAX_CONNECTIONS",
            "DB_MIN_CONNECTIONS",
            "DB_CONNECTION_TIMEOUT",
            "DB_IDLE_TIMEOUT",
            "DB_MAX_LIFETIME",
        ] {
            unsafe { env::remove_var(name) };
        }
    }

    #[test]
    #[serial]
    fn test_from_env_requires_url() {
        clear_env();
        assert_eq!(DatabaseConfig::from_env(), Err(DatabaseConfigError::MissingUrl));
    }

    #[test]
    #[serial]
    fn test_from_env_defaults_and_overrides() {
        clear_env();
        unsafe {
            env::set_var("DATABASE_URL", "postgres://u@db/cup");
            env::set_var("DB_MAX_CONNECTIONS", "8");
        }

        let config = DatabaseConfig::from_env().unwrap();
        assert_eq!(config.database_url, "postgres://u@db/cup");
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.idle_timeout_secs, 600);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_garbage() {
        clear_env();
        unsafe {
            env::set_var("DATABASE_URL", "postgres://u@db/cup");
            env::set_var("DB_IDLE_TIMEOUT", "soon");
        }

        let err = DatabaseConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("DB_IDLE_TIMEOUT"));
        clear_env();
    }
}
