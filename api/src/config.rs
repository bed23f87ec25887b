//! API Configuration Module
//!
//! Handles configuration loading for the ingestion server. Supports an
//! optional TOML file plus `JOURNAL_API_*` environment overrides.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tracing::info;

/// Server configuration for the ingestion API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Server bind address and port
    pub bind_address: SocketAddr,

    /// Database connection URL
    pub database_url: String,

    /// Server environment (development, staging, production)
    pub environment: String,

    /// CORS allowed origins
    pub cors_origins: Vec<String>,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Retry hint returned with transient failures, in milliseconds
    pub retry_after_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::new(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)), 8080),
            database_url: "postgresql://localhost:5432/trade_journal".to_string(),
            environment: "development".to_string(),
            cors_origins: vec![],
            request_timeout_secs: 30,
            retry_after_ms: 5000,
        }
    }
}

impl ApiConfig {
    /// Loads configuration from environment variables and config files
    pub fn from_env() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name("journal.toml").required(false))
            .add_source(File::with_name("config/journal.toml").required(false))
            .add_source(
                Environment::with_prefix("JOURNAL_API")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("database_url", std::env::var("DATABASE_URL").ok())?
            .set_default("bind_address", "0.0.0.0:8080")?
            .set_default("database_url", "postgresql://localhost:5432/trade_journal")?
            .set_default("environment", "development")?
            .set_default("cors_origins", Vec::<String>::new())?
            .set_default("request_timeout_secs", 30)?
            .set_default("retry_after_ms", 5000)?;

        let api_config: ApiConfig = builder.build()?.try_deserialize()?;
        api_config.validate()?;

        info!("API configuration loaded:");
        info!("  Environment: {}", api_config.environment);
        info!("  Bind address: {}", api_config.bind_address);
        // Connection strings can embed credentials; keep them out of the logs
        info!("  Database: [REDACTED]");
        info!("  Retry hint: {}ms", api_config.retry_after_ms);

        Ok(api_config)
    }

    /// Validates the configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "Request timeout must be greater than 0".to_string(),
            ));
        }

        if self.retry_after_ms == 0 {
            return Err(ConfigError::Message(
                "Retry hint must be greater than 0".to_string(),
            ));
        }

        if self.database_url.is_empty() {
            return Err(ConfigError::Message(
                "Database URL cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Returns true if running in development mode
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    /// Returns true if running in production mode
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert_eq!(config.bind_address.port(), 8080);
        assert_eq!(config.retry_after_ms, 5000);
        assert!(config.is_development());
        assert!(!config.is_production());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = ApiConfig::default();
        config.request_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = ApiConfig::default();
        config.retry_after_ms = 0;
        assert!(config.validate().is_err());

        let mut config = ApiConfig::default();
        config.database_url = "".to_string();
        assert!(config.validate().is_err());
    }
}
