//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use bracketeer::db::DatabaseConfig;
use std::{net::SocketAddr, str::FromStr, time::Duration};

/// Default HTTP bind address
pub const DEFAULT_BIND: ([u8; 4], u16) = ([127, 0, 0, 1], 6969);

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind: SocketAddr,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Serve from the in-memory store instead of PostgreSQL
    pub use_memory: bool,
    /// Prometheus scrape address; metrics are off when unset
    pub metrics_bind: Option<SocketAddr>,
    /// Time between payment deadline sweeps
    pub payment_sweep_interval: Duration,
    /// Time between auto-confirm scans
    pub auto_confirm_interval: Duration,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `bind_override` - Optional bind address override (from CLI args)
    /// * `database_url_override` - Optional database URL override (from CLI args)
    /// * `use_memory` - Run against the in-memory store (from CLI args)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` when a variable is set but cannot be parsed
    pub fn from_env(
        bind_override: Option<SocketAddr>,
        database_url_override: Option<String>,
        use_memory: bool,
    ) -> Result<Self, ConfigError> {
        let bind = match bind_override {
            Some(bind) => bind,
            None => parse_env_or("SERVER_BIND", SocketAddr::from(DEFAULT_BIND))?,
        };

        let defaults = DatabaseConfig::development();
        let database_url = database_url_override
            .or_else(|| std::env::var("DATABASE_URL").ok())
            .unwrap_or(defaults.database_url);

        let database = DatabaseConfig {
            database_url,
            max_connections: parse_env_or("DB_MAX_CONNECTIONS", defaults.max_connections)?,
            min_connections: parse_env_or("DB_MIN_CONNECTIONS", defaults.min_connections)?,
            connection_timeout_secs: parse_env_or(
                "DB_CONNECTION_TIMEOUT_SECS",
                defaults.connection_timeout_secs,
            )?,
            idle_timeout_secs: parse_env_or("DB_IDLE_TIMEOUT_SECS", defaults.idle_timeout_secs)?,
            max_lifetime_secs: parse_env_or("DB_MAX_LIFETIME_SECS", defaults.max_lifetime_secs)?,
        };

        let metrics_bind = match std::env::var("METRICS_BIND") {
            Ok(value) => Some(value.parse().map_err(|_| ConfigError::Invalid {
                var: "METRICS_BIND".to_string(),
                reason: format!("'{value}' is not an IP:PORT address"),
            })?),
            Err(_) => None,
        };

        Ok(ServerConfig {
            bind,
            database,
            use_memory,
            metrics_bind,
            payment_sweep_interval: Duration::from_secs(parse_env_or(
                "PAYMENT_SWEEP_INTERVAL_SECS",
                900,
            )?),
            auto_confirm_interval: Duration::from_secs(parse_env_or(
                "AUTO_CONFIRM_SCAN_INTERVAL_SECS",
                60,
            )?),
        })
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.payment_sweep_interval.is_zero() {
            return Err(ConfigError::Invalid {
                var: "PAYMENT_SWEEP_INTERVAL_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.auto_confirm_interval.is_zero() {
            return Err(ConfigError::Invalid {
                var: "AUTO_CONFIRM_SCAN_INTERVAL_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.use_memory {
            return Ok(());
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid {
                var: "DB_MAX_CONNECTIONS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Invalid {
                var: "DB_MIN_CONNECTIONS".to_string(),
                reason: format!(
                    "Cannot exceed max connections ({})",
                    self.database.max_connections
                ),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Parse an environment variable, falling back to `default` when unset
fn parse_env_or<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
{
    match std::env::var(key) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            var: key.to_string(),
            reason: format!("cannot parse '{value}'"),
        }),
        Err(_) => Ok(default),
    }
}
