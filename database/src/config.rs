//! # Database Configuration
//!
//! Configuration for the PostgreSQL connection pool, environment-based with
//! validation and defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Database configuration for PostgreSQL connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub database_url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of connections in the pool
    pub min_connections: u32,
    /// Connection acquisition timeout
    pub acquire_timeout: Duration,
    /// Connection idle timeout
    pub idle_timeout: Duration,
    /// Connection max lifetime
    pub max_lifetime: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost:5432/trade_journal".to_string()),
            max_connections: 20,
            min_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
        }
    }
}

impl DatabaseConfig {
    /// Build a config for the given URL with pool defaults
    pub fn for_url(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Default::default()
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.database_url.is_empty() {
            return Err("Database URL cannot be empty".to_string());
        }
        if self.max_connections < self.min_connections {
            return Err("Max connections must be >= min connections".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DatabaseConfig::default();
        assert_eq!(config.max_connections, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_for_url() {
        let config = DatabaseConfig::for_url("postgresql://localhost/journal_test");
        assert_eq!(config.database_url, "postgresql://localhost/journal_test");
        assert_eq!(config.min_connections, 5);
    }

    #[test]
    fn test_invalid_config() {
        let mut config = DatabaseConfig::default();
        config.database_url = "".to_string();
        assert!(config.validate().is_err());

        let mut config = DatabaseConfig::default();
        config.max_connections = 1;
        assert!(config.validate().is_err());
    }
}
