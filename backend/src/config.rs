//! Configuration management for the inventory ledger server
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides with LEDGER__ prefix

use config::{ConfigError, Environment, File};
use serde::Deserialize;
use shared::OverdrawPolicy;
use uuid::Uuid;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Log output: "pretty" or "json"
    pub log_format: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// JWT authentication configuration
    pub jwt: JwtConfig,

    /// Ledger store and attachment storage
    pub storage: StorageConfig,

    /// Ledger behaviour
    pub ledger: LedgerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL; required for the postgres backend
    pub url: Option<String>,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JwtConfig {
    /// Secret key for verifying JWT tokens
    pub secret: String,

    /// Access token expiration in seconds
    pub access_token_expiry: i64,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Where items and movements live
    pub backend: StoreBackend,

    /// File storage upload endpoint; attachments are disabled when unset
    pub file_endpoint: Option<String>,

    /// File storage API key
    pub file_api_key: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    /// Behaviour of an OUT larger than the on-hand quantity
    pub overdraw_policy: OverdrawPolicy,

    /// Default number of movements in the global feed
    pub movement_feed_limit: u32,

    /// Upper bound a caller may request for the feed
    pub max_movement_feed_limit: u32,

    /// Seconds between reconciliation passes; 0 disables the worker
    pub reconcile_interval_secs: u64,

    /// Tenants reconciled by the background worker
    pub reconcile_tenants: Vec<Uuid>,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment =
            std::env::var("LEDGER_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("log_format", "pretty")?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("jwt.access_token_expiry", 3600)?
            .set_default("storage.backend", "memory")?
            .set_default("ledger.overdraw_policy", "clamp")?
            .set_default("ledger.movement_feed_limit", 50)?
            .set_default("ledger.max_movement_feed_limit", 500)?
            .set_default("ledger.reconcile_interval_secs", 0)?
            .set_default("ledger.reconcile_tenants", Vec::<String>::new())?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (LEDGER__ prefix)
            .add_source(
                Environment::with_prefix("LEDGER")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("ledger.reconcile_tenants")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations that cannot start a server
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.backend == StoreBackend::Postgres && self.database.url.is_none() {
            return Err(ConfigError::Message(
                "database.url is required when storage.backend = \"postgres\"".into(),
            ));
        }
        if self.jwt.secret.is_empty() {
            return Err(ConfigError::Message("jwt.secret must not be empty".into()));
        }
        if self.ledger.movement_feed_limit == 0
            || self.ledger.movement_feed_limit > self.ledger.max_movement_feed_limit
        {
            return Err(ConfigError::Message(
                "ledger.movement_feed_limit must be between 1 and max_movement_feed_limit".into(),
            ));
        }
        Ok(())
    }

    /// Settings handed to the inventory service
    pub fn ledger_settings(&self) -> crate::services::LedgerSettings {
        crate::services::LedgerSettings {
            overdraw_policy: self.ledger.overdraw_policy,
            movement_feed_limit: self.ledger.movement_feed_limit,
            max_movement_feed_limit: self.ledger.max_movement_feed_limit,
        }
    }

    /// Configuration for tests and local runs without a config file
    pub fn for_memory_store(jwt_secret: impl Into<String>) -> Self {
        Self {
            environment: "test".to_string(),
            log_format: "pretty".to_string(),
            server: ServerConfig::default(),
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
                min_connections: 2,
            },
            jwt: JwtConfig {
                secret: jwt_secret.into(),
                access_token_expiry: 3600,
            },
            storage: StorageConfig {
                backend: StoreBackend::Memory,
                file_endpoint: None,
                file_api_key: None,
            },
            ledger: LedgerConfig {
                overdraw_policy: OverdrawPolicy::Clamp,
                movement_feed_limit: 50,
                max_movement_feed_limit: 500,
                reconcile_interval_secs: 0,
                reconcile_tenants: Vec::new(),
            },
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_config_is_valid() {
        assert!(Config::for_memory_store("secret").validate().is_ok());
    }

    #[test]
    fn test_postgres_requires_url() {
        let mut config = Config::for_memory_store("secret");
        config.storage.backend = StoreBackend::Postgres;
        assert!(config.validate().is_err());

        config.database.url = Some("postgres://localhost/ledger".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_feed_limit_bounds() {
        let mut config = Config::for_memory_store("secret");
        config.ledger.movement_feed_limit = 0;
        assert!(config.validate().is_err());

        config.ledger.movement_feed_limit = 501;
        assert!(config.validate().is_err());
    }
}
