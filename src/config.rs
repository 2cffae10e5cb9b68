//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub transaction: TransactionConfig,
    pub fanout: FanoutConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
}

/// Database configuration (SQLite only)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: PathBuf,
    /// Size of the connection pool
    pub max_connections: u32,
    /// How long a connection waits on the write lock before reporting a conflict.
    ///
    /// Zero makes every lock conflict surface immediately to the retry loop.
    pub busy_timeout_ms: u64,
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Retry policy for write transactions
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionConfig {
    /// Attempts before giving up on a conflicting transaction
    pub max_attempts: u32,
    /// First backoff delay in milliseconds (doubles per attempt)
    pub base_backoff_ms: u64,
    /// Backoff ceiling in milliseconds
    pub max_backoff_ms: u64,
}

/// Fan-out worker pool configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FanoutConfig {
    /// Number of worker tasks
    pub workers: usize,
    /// Jobs buffered before enqueueing blocks
    pub queue_capacity: usize,
    /// How long a request waits for queue space before the job is dropped
    pub enqueue_timeout_ms: u64,
}

/// Session token configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Session secret key (32+ bytes)
    pub session_secret: String,
    /// Session max age in seconds (default: 31536000 = 1 year)
    pub session_max_age: i64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (MURMUR__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("database.path", "data/murmur.db")?
            .set_default("database.max_connections", 8)?
            .set_default("database.busy_timeout_ms", 250)?
            .set_default("transaction.max_attempts", 8)?
            .set_default("transaction.base_backoff_ms", 5)?
            .set_default("transaction.max_backoff_ms", 200)?
            .set_default("fanout.workers", 4)?
            .set_default("fanout.queue_capacity", 1024)?
            .set_default("fanout.enqueue_timeout_ms", 50)?
            .set_default("auth.session_max_age", 31_536_000)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (MURMUR__*)
            .add_source(
                Environment::with_prefix("MURMUR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub(crate) fn validate(&self) -> Result<(), crate::error::AppError> {
        const MIN_SESSION_SECRET_BYTES: usize = 32;

        if self.auth.session_secret.as_bytes().len() < MIN_SESSION_SECRET_BYTES {
            return Err(crate::error::AppError::Config(format!(
                "auth.session_secret must be at least {} bytes",
                MIN_SESSION_SECRET_BYTES
            )));
        }

        if self.auth.session_max_age <= 0 {
            return Err(crate::error::AppError::Config(
                "auth.session_max_age must be greater than 0".to_string(),
            ));
        }

        if self.database.max_connections == 0 {
            return Err(crate::error::AppError::Config(
                "database.max_connections must be greater than 0".to_string(),
            ));
        }

        if self.transaction.max_attempts == 0 {
            return Err(crate::error::AppError::Config(
                "transaction.max_attempts must be greater than 0".to_string(),
            ));
        }

        if self.transaction.base_backoff_ms > self.transaction.max_backoff_ms {
            return Err(crate::error::AppError::Config(
                "transaction.base_backoff_ms must not exceed transaction.max_backoff_ms"
                    .to_string(),
            ));
        }

        if self.fanout.workers == 0 || self.fanout.queue_capacity == 0 {
            return Err(crate::error::AppError::Config(
                "fanout.workers and fanout.queue_capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
